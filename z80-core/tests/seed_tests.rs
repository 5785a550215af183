//! The seed scenarios: small hand-assembled programs with known register,
//! flag and T-state outcomes, run against a flat 64K RAM host.

use z80_core::{CF, HF, NF, PF, ZF};
use z80_core::Z80;
use z80_pins::{MREQ_BIT, RD_BIT, WR_BIT, addr, data, get, set_data};

fn harness(program: &[u8]) -> Z80 {
    let mut mem = vec![0u8; 0x1_0000];
    mem[0..program.len()].copy_from_slice(program);
    let mut cpu = Z80::new();
    cpu.reset();
    let mut cb = move |_num_ticks: u32, pins: u64| -> u64 {
        let a = addr(pins) as usize;
        if get(pins, RD_BIT) && get(pins, MREQ_BIT) {
            set_data(pins, mem[a])
        } else if get(pins, WR_BIT) && get(pins, MREQ_BIT) {
            mem[a] = data(pins);
            pins
        } else {
            pins
        }
    };
    while cpu.pc() < program.len() as u16 {
        cpu.exec(0, &mut cb);
    }
    cpu
}

fn run_and_count_ticks(program: &[u8], steps: usize) -> (Z80, Vec<usize>) {
    let mut mem = vec![0u8; 0x1_0000];
    mem[0..program.len()].copy_from_slice(program);
    let mut cpu = Z80::new();
    cpu.reset();
    let mut cb = move |_num_ticks: u32, pins: u64| -> u64 {
        let a = addr(pins) as usize;
        if get(pins, RD_BIT) && get(pins, MREQ_BIT) {
            set_data(pins, mem[a])
        } else if get(pins, WR_BIT) && get(pins, MREQ_BIT) {
            mem[a] = data(pins);
            pins
        } else {
            pins
        }
    };
    let mut ticks = Vec::new();
    for _ in 0..steps {
        ticks.push(cpu.exec(0, &mut cb));
    }
    (cpu, ticks)
}

#[test]
fn scenario_1_ld_a_n_then_fan_out_to_every_register() {
    let program = [0x3E, 0x12, 0x47, 0x4F, 0x57, 0x5F, 0x67, 0x6F, 0x7F];
    let (cpu, ticks) = run_and_count_ticks(&program, 8);
    assert_eq!(ticks, vec![7, 4, 4, 4, 4, 4, 4, 4]);
    assert_eq!(cpu.regs.a, 0x12);
    assert_eq!(cpu.regs.b, 0x12);
    assert_eq!(cpu.regs.c, 0x12);
    assert_eq!(cpu.regs.d, 0x12);
    assert_eq!(cpu.regs.e, 0x12);
    assert_eq!(cpu.regs.h, 0x12);
    assert_eq!(cpu.regs.l, 0x12);
}

#[test]
fn scenario_2_add_a_a_sets_half_carry_only() {
    let cpu = harness(&[0x3E, 0x0F, 0x87]);
    assert_eq!(cpu.regs.a, 0x1E);
    assert_eq!(cpu.regs.f, HF);
}

#[test]
fn scenario_3_add_a_c_sets_overflow_and_carry() {
    let cpu = harness(&[0x3E, 0x81, 0x0E, 0x80, 0x81]);
    assert_eq!(cpu.regs.a, 0x01);
    assert_eq!(cpu.regs.f, PF | CF);
}

#[test]
fn scenario_4_sub_a_zeroes_accumulator() {
    let cpu = harness(&[0x3E, 0x04, 0x97]);
    assert_eq!(cpu.regs.a, 0x00);
    assert_eq!(cpu.regs.f, ZF | NF);
}

#[test]
fn scenario_5_and_b_sets_half_carry_from_logic_op() {
    let cpu = harness(&[0x3E, 0xFF, 0x06, 0x01, 0xA0]);
    assert_eq!(cpu.regs.a, 0x01);
    assert_eq!(cpu.regs.f, HF);
}

#[test]
fn scenario_6_sub_a_then_xor_a_sets_zero_and_parity() {
    let cpu = harness(&[0x97, 0xAF]);
    assert_eq!(cpu.regs.a, 0x00);
    assert_eq!(cpu.regs.f, ZF | PF);
}

/// Scenario 7: the full ZEXDOC suite. Needs the exerciser's `.com` image,
/// which isn't vendored into this repository — drop it at
/// `tests/data/zexdoc.com` and run with `--ignored` to exercise it.
#[test]
#[ignore = "requires tests/data/zexdoc.com — run with --ignored"]
fn scenario_7_zexdoc_suite_reports_all_ok() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/zexdoc.com");
    let image = std::fs::read(path).expect("tests/data/zexdoc.com not found");

    const BDOS_ENTRY: u16 = 0x0005;
    const WARM_BOOT: u16 = 0x0000;

    let mut mem = vec![0u8; 0x1_0000];
    mem[0x0100..0x0100 + image.len()].copy_from_slice(&image);
    mem[WARM_BOOT as usize] = 0x76; // HALT
    mem[BDOS_ENTRY as usize] = 0x76; // HALT; stepped over by force_ret()

    let mut cpu = Z80::new();
    cpu.reset();
    cpu.set_pc(0x0100);
    cpu.set_sp(0xFFFE);

    let mut cb = move |_num_ticks: u32, pins: u64| -> u64 {
        let a = addr(pins) as usize;
        if get(pins, RD_BIT) && get(pins, MREQ_BIT) {
            set_data(pins, mem[a])
        } else if get(pins, WR_BIT) && get(pins, MREQ_BIT) {
            mem[a] = data(pins);
            pins
        } else {
            pins
        }
    };

    let mut output = String::new();
    loop {
        if cpu.pc() == BDOS_ENTRY {
            match cpu.c() {
                2 => output.push(cpu.e() as char),
                9 => {
                    let mut addr = cpu.de();
                    loop {
                        let byte = read_byte(&mut cb, addr);
                        if byte == b'$' {
                            break;
                        }
                        output.push(byte as char);
                        addr = addr.wrapping_add(1);
                    }
                }
                _ => {}
            }
            cpu.force_ret(&mut cb);
            continue;
        }
        cpu.exec(0, &mut cb);
        if cpu.is_halted() {
            break;
        }
    }

    assert!(!output.contains("ERROR"), "ZEXDOC reported a failure:\n{output}");
}

fn read_byte(cb: &mut dyn FnMut(u32, u64) -> u64, address: u16) -> u8 {
    use z80_pins::set_addr;
    let pins = z80_pins::set(z80_pins::set(set_addr(0, address), MREQ_BIT), RD_BIT);
    data(cb(3, pins))
}
