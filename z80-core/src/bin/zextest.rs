//! CP/M BDOS shim for running the ZEXDOC/ZEXALL Z80 instruction exercisers.
//!
//! Loads a `.com` image at 0x0100 into a flat 64K RAM, plants a `HALT` at
//! address 0 (CP/M's warm-boot vector) and a `RET`-trap at address 5 (the
//! BDOS entry point), then single-steps the core until it halts. BDOS
//! functions 2 (console output, character in `E`) and 9 (console output,
//! `$`-terminated string at `DE`) are the only two ZEXDOC/ZEXALL actually
//! use.

use std::env;
use std::fs;
use std::process::ExitCode;

use z80_core::Z80;
use z80_pins::{MREQ_BIT, RD_BIT, WR_BIT, addr, data, get, set_data};

const BDOS_ENTRY: u16 = 0x0005;
const WARM_BOOT: u16 = 0x0000;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: zextest <path-to-zexdoc-or-zexall.com>");
        return ExitCode::FAILURE;
    };
    let image = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("failed to read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut mem = vec![0u8; 0x1_0000];
    mem[0x0100..0x0100 + image.len()].copy_from_slice(&image);
    mem[WARM_BOOT as usize] = 0x76; // HALT
    mem[BDOS_ENTRY as usize] = 0x76; // HALT; core's force_ret() steps over this

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

    loop {
        if cpu.pc() == BDOS_ENTRY {
            bdos_call(&mut cpu, &mut cb);
            continue;
        }
        cpu.exec(0, &mut cb);
        if cpu.is_halted() {
            break;
        }
    }

    ExitCode::SUCCESS
}

fn bdos_call(cpu: &mut Z80, cb: &mut dyn FnMut(u32, u64) -> u64) {
    match cpu.c() {
        2 => print!("{}", cpu.e() as char),
        9 => {
            let mut addr = cpu.de();
            loop {
                let byte = read_byte(cb, addr);
                if byte == b'$' {
                    break;
                }
                print!("{}", byte as char);
                addr = addr.wrapping_add(1);
            }
        }
        _ => {}
    }
    cpu.force_ret(cb);
}

fn read_byte(cb: &mut dyn FnMut(u32, u64) -> u64, address: u16) -> u8 {
    use z80_pins::{set, set_addr};
    let pins = set(set(set_addr(0, address), MREQ_BIT), RD_BIT);
    data(cb(3, pins))
}
