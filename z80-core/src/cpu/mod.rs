//! The Z80 state machine: register file plus the scratch fields an
//! instruction needs while it's in flight, and the driver that turns the
//! microcode queue ([`crate::microcode::MicroOp`]) into pin-word bus
//! cycles through a host-supplied tick callback.

mod execute;

use std::collections::VecDeque;

use z80_pins::{
    HALT_BIT, INT_BIT, IORQ_BIT, M1_BIT, MREQ_BIT, NMI_BIT, RD_BIT, RFSH_BIT, WR_BIT, addr, clear,
    clear_control, data, get, set, set_addr, set_data,
};

use crate::microcode::MicroOp;
use crate::registers::Registers;

/// Cycle-aware Z80 CPU core.
///
/// Owns its register file and the in-flight scratch for whatever
/// instruction is currently being decoded, but owns no memory or I/O —
/// every bus access goes through the tick callback passed to [`Z80::exec`].
pub struct Z80 {
    pub regs: Registers,

    /// Last pin-word returned by the host; carried forward between bus
    /// cycles so host-driven async lines (INT, NMI, WAIT, ...) survive
    /// between calls instead of being clobbered by the next cycle's setup.
    pins: u64,

    opcode: u8,
    /// 0, or the active prefix byte (0xCB, 0xDD, 0xED, 0xFD).
    prefix: u8,
    /// Set to 0xCB when `prefix` is 0xDD/0xFD and a DDCB/FDCB form is in flight.
    prefix2: u8,
    addr: u16,
    data_lo: u8,
    data_hi: u8,
    displacement: i8,
    micro_ops: VecDeque<MicroOp>,
    followup_stage: u8,

    /// Set by EI; consumed (and cleared) at the start of the *next*
    /// instruction, which then suppresses its own interrupt check.
    ei_delay: bool,
    suppress_interrupt_once: bool,

    /// Undocumented SCF/CCF X/Y flags come from `(prev_q ^ F) | A`, where Q
    /// is whatever the previous instruction last wrote to F.
    prev_q: u8,
    last_q: u8,
    last_was_ld_a_ir: bool,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            pins: 0,
            opcode: 0,
            prefix: 0,
            prefix2: 0,
            addr: 0,
            data_lo: 0,
            data_hi: 0,
            displacement: 0,
            micro_ops: VecDeque::new(),
            followup_stage: 0,
            ei_delay: false,
            suppress_interrupt_once: false,
            prev_q: 0,
            last_q: 0,
            last_was_ld_a_ir: false,
        }
    }

    /// Reset to the documented Z80 power-on/reset contract: `PC=0, I=0,
    /// R=0, IM=0, IFF1=IFF2=0`. `SP` and the main register set are left
    /// untouched, matching real hardware.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.prefix = 0;
        self.prefix2 = 0;
        self.micro_ops.clear();
        self.ei_delay = false;
        self.suppress_interrupt_once = false;
    }

    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Run at least one full instruction (including any pending interrupt
    /// acknowledge and the whole CB/ED/DD/FD/DDCB/FDCB prefix chain), then
    /// keep running further instructions until at least `min_ticks`
    /// T-states have elapsed. Returns the total T-states consumed.
    pub fn exec(&mut self, min_ticks: usize, tick_cb: &mut dyn FnMut(u32, u64) -> u64) -> usize {
        let mut total = 0usize;
        loop {
            total += self.run_one_instruction(tick_cb) as usize;
            if total >= min_ticks {
                return total;
            }
        }
    }

    fn run_one_instruction(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64) -> u32 {
        self.prefix = 0;
        self.prefix2 = 0;
        self.followup_stage = 0;
        self.micro_ops.clear();
        self.suppress_interrupt_once = false;

        let mut ticks = 0u32;
        if self.regs.halted {
            self.fetch_halted_nop(tick_cb, &mut ticks);
        } else {
            self.micro_ops.push_back(MicroOp::FetchOpcode);
            ticks += self.drain_micro_ops(tick_cb);
        }

        let suppress = self.suppress_interrupt_once;
        if !suppress {
            if get(self.pins, NMI_BIT) {
                ticks += self.ack_nmi(tick_cb);
            } else if get(self.pins, INT_BIT) && self.regs.iff1 {
                ticks += self.ack_int(tick_cb);
            }
        }
        ticks
    }

    /// Reset the per-instruction Q-register tracking and EI-delay state.
    /// Called exactly once per real instruction, at the point the actual
    /// (non-prefix) opcode is known — *not* at every prefix byte in a
    /// redundant DD/FD chain.
    fn begin_instruction(&mut self) {
        self.suppress_interrupt_once = self.ei_delay;
        self.ei_delay = false;
        self.last_was_ld_a_ir = false;
        self.prev_q = self.last_q;
        self.last_q = 0;
    }

    fn on_opcode_fetched(&mut self) {
        let op = self.opcode;

        if (self.prefix == 0xDD || self.prefix == 0xFD) && op == 0xCB {
            // DDCB/FDCB: displacement and sub-opcode are fetched as plain
            // memory reads (no M1, no R increment), and the only dispatch
            // point for the whole form is the follow-up once both bytes
            // have arrived — see execute::execute_followup.
            self.prefix2 = 0xCB;
            self.micro_ops.push_back(MicroOp::FetchDisplacement);
            self.micro_ops.push_back(MicroOp::ReadImm8);
            self.queue_execute_followup();
            return;
        }

        let still_chaining = match self.prefix {
            0 => matches!(op, 0xCB | 0xDD | 0xED | 0xFD),
            0xDD | 0xFD => op == 0xDD || op == 0xFD,
            _ => false,
        };
        if !still_chaining {
            self.begin_instruction();
        }

        match self.prefix {
            0 => self.execute_unprefixed(),
            0xCB => self.execute_cb(),
            0xED => self.execute_ed(),
            0xDD | 0xFD => self.execute_dd_fd(),
            _ => unreachable!("invalid prefix state {:#04x}", self.prefix),
        }
    }

    fn queue_internal(&mut self, n: u8) {
        self.micro_ops.push_back(MicroOp::Internal(n));
    }

    fn queue_execute_followup(&mut self) {
        self.micro_ops.push_back(MicroOp::Execute);
    }

    fn drain_micro_ops(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64) -> u32 {
        let mut ticks = 0u32;
        while let Some(op) = self.micro_ops.pop_front() {
            match op {
                MicroOp::FetchOpcode => {
                    self.opcode = self.m1_fetch(tick_cb, &mut ticks);
                    self.on_opcode_fetched();
                }
                MicroOp::ReadImm8 | MicroOp::ReadImm16Lo => {
                    self.data_lo = self.mem_read(self.regs.pc, tick_cb, &mut ticks);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::ReadImm16Hi => {
                    self.data_hi = self.mem_read(self.regs.pc, tick_cb, &mut ticks);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::ReadMem => {
                    self.data_lo = self.mem_read(self.addr, tick_cb, &mut ticks);
                }
                MicroOp::WriteMem => {
                    self.mem_write(self.addr, self.data_lo, tick_cb, &mut ticks);
                }
                MicroOp::ReadMem16Lo => {
                    self.data_lo = self.mem_read(self.addr, tick_cb, &mut ticks);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::ReadMem16Hi => {
                    self.data_hi = self.mem_read(self.addr, tick_cb, &mut ticks);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::WriteMem16Lo => {
                    self.mem_write(self.addr, self.data_lo, tick_cb, &mut ticks);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::WriteMem16Hi => {
                    self.mem_write(self.addr, self.data_hi, tick_cb, &mut ticks);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::WriteMemHiFirst => {
                    self.regs.sp = self.regs.sp.wrapping_sub(1);
                    self.mem_write(self.regs.sp, self.data_hi, tick_cb, &mut ticks);
                }
                MicroOp::WriteMemLoSecond => {
                    self.regs.sp = self.regs.sp.wrapping_sub(1);
                    self.mem_write(self.regs.sp, self.data_lo, tick_cb, &mut ticks);
                }
                MicroOp::IoRead => {
                    self.data_lo = self.io_read(self.addr, tick_cb, &mut ticks);
                }
                MicroOp::IoWrite => {
                    self.io_write(self.addr, self.data_lo, tick_cb, &mut ticks);
                }
                MicroOp::FetchDisplacement => {
                    let byte = self.mem_read(self.regs.pc, tick_cb, &mut ticks);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    self.displacement = byte as i8;
                }
                MicroOp::Internal(n) => {
                    self.internal(n, tick_cb, &mut ticks);
                }
                MicroOp::Execute => {
                    self.followup_stage += 1;
                    self.execute_followup();
                }
            }
        }
        ticks
    }

    // ---------------------------------------------------------------
    // Bus-cycle primitives (component D): each sets the matching control
    // pins, invokes the tick callback for the canonical T-state count,
    // and leaves `self.pins` holding whatever the host returned so async
    // lines (INT/NMI/WAIT/...) persist to the next cycle.
    // ---------------------------------------------------------------

    fn m1_fetch(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64, ticks: &mut u32) -> u8 {
        let pc = self.regs.pc;
        self.regs.pc = pc.wrapping_add(1);
        self.m1_cycle(pc, tick_cb, ticks)
    }

    fn fetch_halted_nop(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64, ticks: &mut u32) {
        let pc = self.regs.pc;
        self.m1_cycle(pc, tick_cb, ticks);
    }

    fn m1_cycle(
        &mut self,
        address: u16,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) -> u8 {
        let mut pins = set_addr(clear_control(self.pins), address);
        pins = set(pins, M1_BIT);
        pins = set(pins, MREQ_BIT);
        pins = set(pins, RD_BIT);
        if self.regs.halted {
            pins = set(pins, HALT_BIT);
        } else {
            pins = clear(pins, HALT_BIT);
        }
        self.pins = tick_cb(2, pins);
        *ticks += 2;
        let byte = data(self.pins);

        let ir = (u16::from(self.regs.i) << 8) | u16::from(self.regs.r);
        self.regs.r = (self.regs.r & 0x80) | ((self.regs.r.wrapping_add(1)) & 0x7F);
        let mut rpins = set_addr(clear_control(self.pins), ir);
        rpins = set(rpins, RFSH_BIT);
        rpins = set(rpins, MREQ_BIT);
        self.pins = tick_cb(2, rpins);
        *ticks += 2;
        byte
    }

    fn mem_read(
        &mut self,
        address: u16,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) -> u8 {
        let mut pins = set_addr(clear_control(self.pins), address);
        pins = set(pins, MREQ_BIT);
        pins = set(pins, RD_BIT);
        self.pins = tick_cb(3, pins);
        *ticks += 3;
        data(self.pins)
    }

    fn mem_write(
        &mut self,
        address: u16,
        value: u8,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) {
        let mut pins = set_data(set_addr(clear_control(self.pins), address), value);
        pins = set(pins, MREQ_BIT);
        pins = set(pins, WR_BIT);
        self.pins = tick_cb(3, pins);
        *ticks += 3;
    }

    fn io_read(
        &mut self,
        address: u16,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) -> u8 {
        let mut pins = set_addr(clear_control(self.pins), address);
        pins = set(pins, IORQ_BIT);
        pins = set(pins, RD_BIT);
        self.pins = tick_cb(4, pins);
        *ticks += 4;
        data(self.pins)
    }

    fn io_write(
        &mut self,
        address: u16,
        value: u8,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) {
        let mut pins = set_data(set_addr(clear_control(self.pins), address), value);
        pins = set(pins, IORQ_BIT);
        pins = set(pins, WR_BIT);
        self.pins = tick_cb(4, pins);
        *ticks += 4;
    }

    /// Burn `n` T-states with no bus activity (control lines all clear).
    fn internal(&mut self, n: u8, tick_cb: &mut dyn FnMut(u32, u64) -> u64, ticks: &mut u32) {
        if n == 0 {
            return;
        }
        let pins = clear_control(self.pins);
        self.pins = tick_cb(u32::from(n), pins);
        *ticks += u32::from(n);
    }

    fn io_ack_read(
        &mut self,
        n: u32,
        tick_cb: &mut dyn FnMut(u32, u64) -> u64,
        ticks: &mut u32,
    ) -> u8 {
        let ir = (u16::from(self.regs.i) << 8) | u16::from(self.regs.r);
        self.regs.r = (self.regs.r & 0x80) | ((self.regs.r.wrapping_add(1)) & 0x7F);
        let mut pins = set_addr(clear_control(self.pins), ir);
        pins = set(pins, M1_BIT);
        pins = set(pins, IORQ_BIT);
        self.pins = tick_cb(n, pins);
        *ticks += n;
        data(self.pins)
    }

    fn push16(&mut self, value: u16, tick_cb: &mut dyn FnMut(u32, u64) -> u64, ticks: &mut u32) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.mem_write(self.regs.sp, (value >> 8) as u8, tick_cb, ticks);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.mem_write(self.regs.sp, value as u8, tick_cb, ticks);
    }

    // ---------------------------------------------------------------
    // Interrupt controller (component G)
    // ---------------------------------------------------------------

    fn ack_nmi(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64) -> u32 {
        let mut ticks = 0u32;
        self.regs.halted = false;
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        let pins = clear_control(self.pins);
        self.pins = tick_cb(5, pins);
        ticks += 5;
        let pc = self.regs.pc;
        self.push16(pc, tick_cb, &mut ticks);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        ticks
    }

    fn ack_int(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64) -> u32 {
        let mut ticks = 0u32;
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        match self.regs.im {
            0 => {
                let byte = self.io_ack_read(6, tick_cb, &mut ticks);
                self.opcode = byte;
                self.prefix = 0;
                self.micro_ops.clear();
                self.begin_instruction();
                self.execute_unprefixed();
                ticks += self.drain_micro_ops(tick_cb);
            }
            1 => {
                self.io_ack_read(7, tick_cb, &mut ticks);
                let pc = self.regs.pc;
                self.push16(pc, tick_cb, &mut ticks);
                self.regs.pc = 0x0038;
                self.regs.wz = 0x0038;
            }
            _ => {
                let vec_lo = self.io_ack_read(7, tick_cb, &mut ticks);
                let vec_addr = (u16::from(self.regs.i) << 8) | u16::from(vec_lo & 0xFE);
                let pc = self.regs.pc;
                self.push16(pc, tick_cb, &mut ticks);
                let lo = self.mem_read(vec_addr, tick_cb, &mut ticks);
                let hi = self.mem_read(vec_addr.wrapping_add(1), tick_cb, &mut ticks);
                self.regs.pc = (u16::from(hi) << 8) | u16::from(lo);
                self.regs.wz = self.regs.pc;
            }
        }
        ticks
    }

    // ---------------------------------------------------------------
    // Register-pair and indexed-register accessors shared by execute.rs
    // ---------------------------------------------------------------

    fn get_reg8(&self, r: u8) -> u8 {
        match r {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => panic!("(HL) not a simple register"),
            7 => self.regs.a,
            _ => unreachable!(),
        }
    }

    fn set_reg8(&mut self, r: u8, value: u8) {
        match r {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => panic!("(HL) not a simple register"),
            7 => self.regs.a = value,
            _ => unreachable!(),
        }
    }

    fn get_reg16(&self, rp: u8) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.sp,
            _ => unreachable!(),
        }
    }

    fn set_reg16(&mut self, rp: u8, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.sp = value,
            _ => unreachable!(),
        }
    }

    fn get_reg16_af(&self, rp: u8) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.af(),
            _ => unreachable!(),
        }
    }

    fn set_reg16_af(&mut self, rp: u8, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.set_af(value),
            _ => unreachable!(),
        }
    }

    fn get_index_reg(&self) -> u16 {
        if self.prefix == 0xFD { self.regs.iy } else { self.regs.ix }
    }

    fn set_index_reg(&mut self, value: u16) {
        if self.prefix == 0xFD {
            self.regs.iy = value;
        } else {
            self.regs.ix = value;
        }
    }

    /// Undocumented DD/FD `LD r,r'` substitution: H/L become IXH/IXL (or
    /// IYH/IYL) but every other register is unaffected.
    fn get_reg8_indexed(&self, r: u8) -> u8 {
        match r {
            4 => (self.get_index_reg() >> 8) as u8,
            5 => self.get_index_reg() as u8,
            _ => self.get_reg8(r),
        }
    }

    fn set_reg8_indexed(&mut self, r: u8, value: u8) {
        match r {
            4 => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0x00FF) | (u16::from(value) << 8));
            }
            5 => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0xFF00) | u16::from(value));
            }
            _ => self.set_reg8(r, value),
        }
    }

    fn condition(&self, cc: u8) -> bool {
        use crate::flags::{CF, PF, SF, ZF};
        match cc {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            7 => self.regs.f & SF != 0,
            _ => unreachable!(),
        }
    }

    fn set_f(&mut self, value: u8) {
        self.regs.f = value;
        self.last_q = value;
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "test-utils")]
impl Z80 {
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
    }

    #[must_use]
    pub fn c(&self) -> u8 {
        self.regs.c
    }

    #[must_use]
    pub fn e(&self) -> u8 {
        self.regs.e
    }

    #[must_use]
    pub fn de(&self) -> u16 {
        self.regs.de()
    }

    /// Pop a return address off the stack and jump to it, as if a `RET`
    /// had just executed. Used by harnesses that intercept a CALL target
    /// (e.g. a CP/M BDOS shim at PC=5) instead of letting the core run it.
    pub fn force_ret(&mut self, tick_cb: &mut dyn FnMut(u32, u64) -> u64) {
        let mut ticks = 0u32;
        let lo = self.mem_read(self.regs.sp, tick_cb, &mut ticks);
        let hi = self.mem_read(self.regs.sp.wrapping_add(1), tick_cb, &mut ticks);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        self.regs.pc = (u16::from(hi) << 8) | u16::from(lo);
        self.regs.wz = self.regs.pc;
    }

    pub fn set_ei_delay(&mut self, value: bool) {
        self.ei_delay = value;
    }

    #[must_use]
    pub fn ei_delay(&self) -> bool {
        self.ei_delay
    }

    pub fn set_last_was_ld_a_ir(&mut self, value: bool) {
        self.last_was_ld_a_ir = value;
    }

    #[must_use]
    pub fn last_was_ld_a_ir(&self) -> bool {
        self.last_was_ld_a_ir
    }

    pub fn set_last_q(&mut self, value: u8) {
        self.last_q = value;
    }

    #[must_use]
    pub fn last_q(&self) -> u8 {
        self.last_q
    }
}
