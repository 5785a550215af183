//! Integration tests using Tom Harte's `SingleStepTests` for the Z80.
//!
//! Each JSON file under `test-data/z80/v1/` holds 1,000 single-instruction
//! test cases comparing register, flag and memory state before and after.
//! Test data isn't vendored; point `Z80_SINGLE_STEP_TESTS_DIR` at a local
//! checkout (or drop it at `<workspace>/test-data/z80/v1`) and run with
//! `--ignored`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use z80_core::Z80;
use z80_pins::{IORQ_BIT, MREQ_BIT, RD_BIT, WR_BIT, addr, data, get, set_data};

struct TestBus {
    ram: Vec<u8>,
    io_read_values: HashMap<u16, u8>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000],
            io_read_values: HashMap::new(),
        }
    }

    fn load_ram(&mut self, entries: &[(u16, u8)]) {
        for &(a, v) in entries {
            self.ram[a as usize] = v;
        }
    }

    fn peek(&self, a: u16) -> u8 {
        self.ram[a as usize]
    }

    fn tick(&mut self, _num_ticks: u32, pins: u64) -> u64 {
        let a = addr(pins) as usize;
        if get(pins, IORQ_BIT) {
            if get(pins, RD_BIT) {
                let value = self.io_read_values.get(&(a as u16)).copied().unwrap_or(0xFF);
                return set_data(pins, value);
            }
            return pins;
        }
        if get(pins, RD_BIT) && get(pins, MREQ_BIT) {
            set_data(pins, self.ram[a])
        } else if get(pins, WR_BIT) && get(pins, MREQ_BIT) {
            self.ram[a] = data(pins);
            pins
        } else {
            pins
        }
    }
}

#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Vec<serde_json::Value>,
    #[serde(default)]
    ports: Vec<(u16, u8, String)>,
}

#[derive(Deserialize)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    i: u8,
    r: u8,
    ix: u16,
    iy: u16,
    wz: u16,
    #[serde(rename = "af_")]
    af_alt: u16,
    #[serde(rename = "bc_")]
    bc_alt: u16,
    #[serde(rename = "de_")]
    de_alt: u16,
    #[serde(rename = "hl_")]
    hl_alt: u16,
    iff1: u8,
    iff2: u8,
    im: u8,
    ei: u8,
    p: u8,
    q: u8,
    ram: Vec<(u16, u8)>,
}

fn setup(cpu: &mut Z80, bus: &mut TestBus, state: &CpuState, ports: &[(u16, u8, String)]) {
    bus.load_ram(&state.ram);

    bus.io_read_values.clear();
    for (port, value, dir) in ports {
        if dir == "r" {
            bus.io_read_values.insert(*port, *value);
        }
    }

    cpu.regs.a = state.a;
    cpu.regs.f = state.f;
    cpu.regs.b = state.b;
    cpu.regs.c = state.c;
    cpu.regs.d = state.d;
    cpu.regs.e = state.e;
    cpu.regs.h = state.h;
    cpu.regs.l = state.l;

    cpu.regs.a_alt = (state.af_alt >> 8) as u8;
    cpu.regs.f_alt = state.af_alt as u8;
    cpu.regs.b_alt = (state.bc_alt >> 8) as u8;
    cpu.regs.c_alt = state.bc_alt as u8;
    cpu.regs.d_alt = (state.de_alt >> 8) as u8;
    cpu.regs.e_alt = state.de_alt as u8;
    cpu.regs.h_alt = (state.hl_alt >> 8) as u8;
    cpu.regs.l_alt = state.hl_alt as u8;

    cpu.regs.ix = state.ix;
    cpu.regs.iy = state.iy;
    cpu.regs.sp = state.sp;
    cpu.regs.pc = state.pc;
    cpu.regs.i = state.i;
    cpu.regs.r = state.r;
    cpu.regs.wz = state.wz;

    cpu.regs.iff1 = state.iff1 != 0;
    cpu.regs.iff2 = state.iff2 != 0;
    cpu.regs.im = state.im;

    cpu.set_ei_delay(state.ei != 0);
    cpu.set_last_was_ld_a_ir(state.p != 0);
    cpu.set_last_q(state.q);
}

fn compare(cpu: &Z80, bus: &TestBus, expected: &CpuState) -> Vec<String> {
    let mut errors = Vec::new();

    check_u8(&mut errors, "A", cpu.regs.a, expected.a);
    check_u8(&mut errors, "F", cpu.regs.f, expected.f);
    check_u8(&mut errors, "B", cpu.regs.b, expected.b);
    check_u8(&mut errors, "C", cpu.regs.c, expected.c);
    check_u8(&mut errors, "D", cpu.regs.d, expected.d);
    check_u8(&mut errors, "E", cpu.regs.e, expected.e);
    check_u8(&mut errors, "H", cpu.regs.h, expected.h);
    check_u8(&mut errors, "L", cpu.regs.l, expected.l);

    let actual_af_alt = (u16::from(cpu.regs.a_alt) << 8) | u16::from(cpu.regs.f_alt);
    check_u16(&mut errors, "AF'", actual_af_alt, expected.af_alt);
    let actual_bc_alt = (u16::from(cpu.regs.b_alt) << 8) | u16::from(cpu.regs.c_alt);
    check_u16(&mut errors, "BC'", actual_bc_alt, expected.bc_alt);
    let actual_de_alt = (u16::from(cpu.regs.d_alt) << 8) | u16::from(cpu.regs.e_alt);
    check_u16(&mut errors, "DE'", actual_de_alt, expected.de_alt);
    let actual_hl_alt = (u16::from(cpu.regs.h_alt) << 8) | u16::from(cpu.regs.l_alt);
    check_u16(&mut errors, "HL'", actual_hl_alt, expected.hl_alt);

    check_u16(&mut errors, "IX", cpu.regs.ix, expected.ix);
    check_u16(&mut errors, "IY", cpu.regs.iy, expected.iy);
    check_u16(&mut errors, "SP", cpu.regs.sp, expected.sp);
    check_u16(&mut errors, "PC", cpu.regs.pc, expected.pc);
    check_u8(&mut errors, "I", cpu.regs.i, expected.i);
    check_u8(&mut errors, "R", cpu.regs.r, expected.r);
    check_u16(&mut errors, "WZ", cpu.regs.wz, expected.wz);

    let actual_iff1 = u8::from(cpu.regs.iff1);
    if actual_iff1 != expected.iff1 {
        errors.push(format!("IFF1: got {actual_iff1}, want {}", expected.iff1));
    }
    let actual_iff2 = u8::from(cpu.regs.iff2);
    if actual_iff2 != expected.iff2 {
        errors.push(format!("IFF2: got {actual_iff2}, want {}", expected.iff2));
    }
    check_u8(&mut errors, "IM", cpu.regs.im, expected.im);

    let actual_ei = u8::from(cpu.ei_delay());
    if actual_ei != expected.ei {
        errors.push(format!("EI: got {actual_ei}, want {}", expected.ei));
    }
    let actual_p = u8::from(cpu.last_was_ld_a_ir());
    if actual_p != expected.p {
        errors.push(format!("P: got {actual_p}, want {}", expected.p));
    }
    if cpu.last_q() != expected.q {
        errors.push(format!("Q: got {}, want {}", cpu.last_q(), expected.q));
    }

    for &(addr, expected_val) in &expected.ram {
        let actual_val = bus.peek(addr);
        if actual_val != expected_val {
            errors.push(format!(
                "RAM[${addr:04X}]: got ${actual_val:02X}, want ${expected_val:02X}"
            ));
        }
    }

    errors
}

fn check_u8(errors: &mut Vec<String>, name: &str, actual: u8, expected: u8) {
    if actual != expected {
        errors.push(format!("{name}: got ${actual:02X}, want ${expected:02X}"));
    }
}

fn check_u16(errors: &mut Vec<String>, name: &str, actual: u16, expected: u16) {
    if actual != expected {
        errors.push(format!("{name}: got ${actual:04X}, want ${expected:04X}"));
    }
}

fn test_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("Z80_SINGLE_STEP_TESTS_DIR") {
        return PathBuf::from(dir);
    }
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("workspace root")
        .join("test-data/z80/v1")
}

#[test]
#[ignore = "requires a local checkout of the Z80 SingleStepTests JSON suite"]
fn run_all() {
    let test_dir = test_data_dir();
    if !test_dir.exists() {
        eprintln!("Test data not found at {}", test_dir.display());
        eprintln!("Set Z80_SINGLE_STEP_TESTS_DIR or skip this test.");
        return;
    }

    let mut total_pass = 0u64;
    let mut total_fail = 0u64;
    let mut total_files = 0u32;

    let mut filenames: Vec<String> = Vec::new();
    for opcode in 0..=0xFFu8 {
        if matches!(opcode, 0xCB | 0xDD | 0xED | 0xFD) {
            continue;
        }
        filenames.push(format!("{opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("cb {opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("dd {opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("ed {opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("fd {opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("dd cb __ {opcode:02x}.json"));
    }
    for opcode in 0..=0xFFu8 {
        filenames.push(format!("fd cb __ {opcode:02x}.json"));
    }

    for filename in &filenames {
        let path = test_dir.join(filename);
        if !path.exists() {
            continue;
        }

        let raw = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
        let tests: Vec<TestCase> = serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("failed to parse {}: {e}", path.display()));

        let mut file_pass = 0u32;
        let mut file_fail = 0u32;
        let mut first_failures: Vec<String> = Vec::new();

        for case in &tests {
            let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                let mut cpu = Z80::new();
                let mut bus = TestBus::new();
                setup(&mut cpu, &mut bus, &case.initial, &case.ports);

                let expected_ticks = case.cycles.len();
                let mut cb = |n: u32, pins: u64| bus.tick(n, pins);
                let actual_ticks = cpu.exec(0, &mut cb);

                let mut errors = compare(&cpu, &bus, &case.final_state);
                if actual_ticks != expected_ticks {
                    errors.push(format!(
                        "ticks: got {actual_ticks}, want {expected_ticks}"
                    ));
                }
                errors
            }));

            match result {
                Ok(errors) if errors.is_empty() => file_pass += 1,
                Ok(errors) => {
                    file_fail += 1;
                    if first_failures.len() < 5 {
                        first_failures.push(format!(
                            "  FAIL [{}]: {}",
                            case.name,
                            errors.join(", ")
                        ));
                    }
                }
                Err(_) => {
                    file_fail += 1;
                    if first_failures.len() < 5 {
                        first_failures.push(format!("  PANIC [{}]", case.name));
                    }
                }
            }
        }

        let status = if file_fail == 0 { "PASS" } else { "FAIL" };
        println!(
            "{filename}: {status} — {file_pass}/{} passed",
            file_pass + file_fail
        );
        for msg in &first_failures {
            println!("{msg}");
        }

        total_pass += u64::from(file_pass);
        total_fail += u64::from(file_fail);
        total_files += 1;
    }

    println!();
    println!("=== Z80 SingleStepTests Summary ===");
    println!(
        "Files: {total_files}, Total: {}/{}, Pass: {total_pass}, Fail: {total_fail}",
        total_pass + total_fail,
        total_pass + total_fail
    );

    assert_eq!(total_fail, 0, "{total_fail} tests failed");
}
