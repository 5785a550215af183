//! Opcode dispatch: unprefixed, CB, ED, DD/FD and DDCB/FDCB forms.
//!
//! Every `execute_*` method here only ever reads `self.opcode`/`self.prefix`
//! state and pushes [`crate::microcode::MicroOp`]s — none of them touch a
//! bus directly. The driver in `cpu::mod` drains the queue and calls back
//! into the matching `*_followup` once the bytes an instruction asked for
//! have arrived.

use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53p};
use crate::microcode::MicroOp;

use super::Z80;

impl Z80 {
    pub(super) fn execute_followup(&mut self) {
        if self.prefix == 0xED {
            self.execute_ed_followup();
            return;
        }
        if (self.prefix == 0xDD || self.prefix == 0xFD) && self.prefix2 == 0xCB {
            if self.followup_stage <= 1 {
                self.opcode = self.data_lo;
                self.execute_ddcb_fdcb();
            } else {
                self.execute_ddcb_fdcb_followup();
            }
            return;
        }
        if self.prefix == 0xDD || self.prefix == 0xFD {
            self.execute_dd_fd_followup();
            return;
        }
        if self.prefix == 0xCB {
            self.execute_cb_followup();
            return;
        }
        self.execute_unprefixed_followup();
    }

    // -----------------------------------------------------------------
    // Unprefixed
    // -----------------------------------------------------------------

    pub(super) fn execute_unprefixed(&mut self) {
        let op = self.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => self.execute_x0(y, z, p, q),
            1 => self.execute_ld_r_r(y, z),
            2 => self.execute_alu_r(y, z),
            3 => self.execute_x3(y, z, p, q),
            _ => unreachable!(),
        }
    }

    fn execute_x0(&mut self, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => match y {
                0 => {}
                1 => {
                    std::mem::swap(&mut self.regs.a, &mut self.regs.a_alt);
                    std::mem::swap(&mut self.regs.f, &mut self.regs.f_alt);
                }
                2 => {
                    self.micro_ops.push_back(MicroOp::FetchDisplacement);
                    self.queue_execute_followup();
                }
                3..=7 => {
                    self.micro_ops.push_back(MicroOp::FetchDisplacement);
                    self.queue_execute_followup();
                }
                _ => unreachable!(),
            },
            1 => {
                if q == 0 {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                } else {
                    self.queue_internal(7);
                    self.queue_execute_followup();
                }
            }
            2 => match (q, p) {
                (0, 0) => {
                    self.addr = self.regs.bc();
                    self.data_lo = self.regs.a;
                    self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                    self.micro_ops.push_back(MicroOp::WriteMem);
                }
                (0, 1) => {
                    self.addr = self.regs.de();
                    self.data_lo = self.regs.a;
                    self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                    self.micro_ops.push_back(MicroOp::WriteMem);
                }
                (0, 2) => {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                }
                (0, 3) => {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                }
                (1, 0) => {
                    self.addr = self.regs.bc();
                    self.micro_ops.push_back(MicroOp::ReadMem);
                    self.queue_execute_followup();
                }
                (1, 1) => {
                    self.addr = self.regs.de();
                    self.micro_ops.push_back(MicroOp::ReadMem);
                    self.queue_execute_followup();
                }
                (1, 2) => {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                }
                (1, 3) => {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                }
                _ => unreachable!(),
            },
            3 => {
                if q == 0 {
                    self.set_reg16(p, self.get_reg16(p).wrapping_add(1));
                } else {
                    self.set_reg16(p, self.get_reg16(p).wrapping_sub(1));
                }
                self.queue_internal(2);
            }
            4 => {
                if y == 6 {
                    self.addr = self.regs.hl();
                    self.micro_ops.push_back(MicroOp::ReadMem);
                    self.queue_execute_followup();
                } else {
                    let r = alu::inc8(self.get_reg8(y));
                    self.set_reg8(y, r.value);
                    self.set_f((self.regs.f & CF) | r.flags);
                }
            }
            5 => {
                if y == 6 {
                    self.addr = self.regs.hl();
                    self.micro_ops.push_back(MicroOp::ReadMem);
                    self.queue_execute_followup();
                } else {
                    let r = alu::dec8(self.get_reg8(y));
                    self.set_reg8(y, r.value);
                    self.set_f((self.regs.f & CF) | r.flags);
                }
            }
            6 => {
                if y == 6 {
                    self.addr = self.regs.hl();
                    self.micro_ops.push_back(MicroOp::ReadImm8);
                    self.queue_execute_followup();
                } else {
                    self.micro_ops.push_back(MicroOp::ReadImm8);
                    self.queue_execute_followup();
                }
            }
            7 => self.execute_accumulator_op(y),
            _ => unreachable!(),
        }
    }

    fn execute_accumulator_op(&mut self, y: u8) {
        let a = self.regs.a;
        match y {
            0 => {
                let carry = a >> 7;
                let r = (a << 1) | carry;
                self.regs.a = r;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF)) | (r & (XF | YF)) | if carry != 0 { CF } else { 0 },
                );
            }
            1 => {
                let carry = a & 1;
                let r = (a >> 1) | (carry << 7);
                self.regs.a = r;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF)) | (r & (XF | YF)) | if carry != 0 { CF } else { 0 },
                );
            }
            2 => {
                let carry_out = a >> 7;
                let r = (a << 1) | u8::from(self.regs.f & CF != 0);
                self.regs.a = r;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (r & (XF | YF))
                        | if carry_out != 0 { CF } else { 0 },
                );
            }
            3 => {
                let carry_out = a & 1;
                let r = (a >> 1) | ((u8::from(self.regs.f & CF != 0)) << 7);
                self.regs.a = r;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (r & (XF | YF))
                        | if carry_out != 0 { CF } else { 0 },
                );
            }
            4 => self.execute_daa(),
            5 => {
                let r = !a;
                self.regs.a = r;
                self.set_f((self.regs.f & (SF | ZF | PF | CF)) | HF | NF | (r & (XF | YF)));
            }
            6 => {
                let xy = ((self.prev_q ^ self.regs.f) | a) & (XF | YF);
                self.set_f((self.regs.f & (SF | ZF | PF)) | xy | CF);
            }
            7 => {
                let old_c = self.regs.f & CF != 0;
                let xy = ((self.prev_q ^ self.regs.f) | a) & (XF | YF);
                let mut flags = (self.regs.f & (SF | ZF | PF)) | xy;
                if old_c {
                    flags |= HF;
                } else {
                    flags |= CF;
                }
                self.set_f(flags);
            }
            _ => unreachable!(),
        }
    }

    fn execute_daa(&mut self) {
        let a = self.regs.a;
        let n = self.regs.f & NF != 0;
        let h = self.regs.f & HF != 0;
        let c = self.regs.f & CF != 0;
        let mut correction = 0u8;
        let mut new_c = c;
        if h || (a & 0x0F) > 9 {
            correction |= 0x06;
        }
        if c || a > 0x99 {
            correction |= 0x60;
            new_c = true;
        }
        let r = if n { a.wrapping_sub(correction) } else { a.wrapping_add(correction) };
        let new_h = if n { h && (a & 0x0F) < 6 } else { (a & 0x0F) + (correction & 0x0F) > 0x0F };
        self.regs.a = r;
        self.set_f(sz53p(r) | if new_h { HF } else { 0 } | if new_c { CF } else { 0 } | (self.regs.f & NF));
    }

    fn execute_ld_r_r(&mut self, y: u8, z: u8) {
        if z == 6 && y == 6 {
            self.regs.halted = true;
        } else if y == 6 {
            self.addr = self.regs.hl();
            self.data_lo = self.get_reg8(z);
            self.micro_ops.push_back(MicroOp::WriteMem);
        } else if z == 6 {
            self.addr = self.regs.hl();
            self.micro_ops.push_back(MicroOp::ReadMem);
            self.queue_execute_followup();
        } else {
            let v = self.get_reg8(z);
            self.set_reg8(y, v);
        }
    }

    fn execute_alu_r(&mut self, y: u8, z: u8) {
        if z == 6 {
            self.addr = self.regs.hl();
            self.micro_ops.push_back(MicroOp::ReadMem);
            self.queue_execute_followup();
        } else {
            let v = self.get_reg8(z);
            self.alu_a(y, v);
        }
    }

    fn execute_x3(&mut self, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                self.queue_internal(1);
                self.queue_execute_followup();
            }
            1 => {
                if q == 0 {
                    let v = self.get_reg16_af(p);
                    self.data_hi = (v >> 8) as u8;
                    self.data_lo = v as u8;
                    self.queue_internal(1);
                    self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                    self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
                } else {
                    match p {
                        0 => {
                            self.addr = self.regs.sp;
                            self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                            self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                            self.queue_execute_followup();
                        }
                        1 => {
                            std::mem::swap(&mut self.regs.b, &mut self.regs.b_alt);
                            std::mem::swap(&mut self.regs.c, &mut self.regs.c_alt);
                            std::mem::swap(&mut self.regs.d, &mut self.regs.d_alt);
                            std::mem::swap(&mut self.regs.e, &mut self.regs.e_alt);
                            std::mem::swap(&mut self.regs.h, &mut self.regs.h_alt);
                            std::mem::swap(&mut self.regs.l, &mut self.regs.l_alt);
                        }
                        2 => self.regs.pc = self.regs.hl(),
                        3 => {
                            self.queue_internal(2);
                            self.queue_execute_followup();
                        }
                        _ => unreachable!(),
                    }
                }
            }
            2 => {
                self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }
            3 => match y {
                0 => {
                    self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                    self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                    self.queue_execute_followup();
                }
                1 => {
                    self.prefix = 0xCB;
                    self.micro_ops.push_back(MicroOp::FetchOpcode);
                }
                2 => {
                    self.micro_ops.push_back(MicroOp::ReadImm8);
                    self.queue_execute_followup();
                }
                3 => {
                    self.micro_ops.push_back(MicroOp::ReadImm8);
                    self.queue_execute_followup();
                }
                4 => {
                    self.addr = self.regs.sp;
                    self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                    self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                    self.queue_execute_followup();
                }
                5 => {
                    std::mem::swap(&mut self.regs.d, &mut self.regs.h);
                    std::mem::swap(&mut self.regs.e, &mut self.regs.l);
                }
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                }
                7 => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    self.ei_delay = true;
                }
                _ => unreachable!(),
            },
            4 => {
                self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }
            5 => {
                if q == 0 {
                    let v = self.get_reg16_af(p);
                    self.data_hi = (v >> 8) as u8;
                    self.data_lo = v as u8;
                    self.queue_internal(1);
                    self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                    self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
                } else {
                    match p {
                        0 => {
                            self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                            self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                            self.queue_execute_followup();
                        }
                        1 => {
                            self.prefix = 0xDD;
                            self.micro_ops.push_back(MicroOp::FetchOpcode);
                        }
                        2 => {
                            self.prefix = 0xED;
                            self.micro_ops.push_back(MicroOp::FetchOpcode);
                        }
                        3 => {
                            self.prefix = 0xFD;
                            self.micro_ops.push_back(MicroOp::FetchOpcode);
                        }
                        _ => unreachable!(),
                    }
                }
            }
            6 => {
                self.micro_ops.push_back(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }
            7 => {
                self.data_hi = (self.regs.pc >> 8) as u8;
                self.data_lo = self.regs.pc as u8;
                self.queue_internal(1);
                self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
                self.queue_execute_followup();
            }
            _ => unreachable!(),
        }
    }

    pub(super) fn execute_unprefixed_followup(&mut self) {
        let op = self.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (0, 0) if y == 2 => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_add(i16::from(self.displacement) as u16);
                    self.regs.wz = self.regs.pc;
                }
            }
            (0, 0) if y == 3 => {
                self.queue_internal(5);
                self.regs.pc = self.regs.pc.wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.regs.pc;
            }
            (0, 0) => {
                let cc = y - 4;
                if self.condition(cc) {
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_add(i16::from(self.displacement) as u16);
                    self.regs.wz = self.regs.pc;
                }
            }
            (0, 1) if q == 0 => {
                let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.set_reg16(p, v);
            }
            (0, 1) => {
                let hl = self.regs.hl();
                let operand = self.get_reg16(p);
                let (r, flags) = alu::add16(hl, operand);
                self.regs.set_hl(r);
                self.set_f((flags & !(SF | ZF | PF)) | (self.regs.f & (SF | ZF | PF)));
                self.regs.wz = hl.wrapping_add(1);
            }
            (0, 2) if self.followup_stage == 1 => match (q, p) {
                (0, 2) => {
                    self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.wz = self.addr.wrapping_add(1);
                    self.data_lo = self.regs.l;
                    self.data_hi = self.regs.h;
                    self.micro_ops.push_back(MicroOp::WriteMem16Lo);
                    self.micro_ops.push_back(MicroOp::WriteMem16Hi);
                }
                (0, 3) => {
                    self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                    self.data_lo = self.regs.a;
                    self.micro_ops.push_back(MicroOp::WriteMem);
                }
                (1, 2) => {
                    self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.wz = self.addr.wrapping_add(1);
                    self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                    self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                    self.queue_execute_followup();
                }
                (1, 3) => {
                    self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.wz = self.addr.wrapping_add(1);
                    self.micro_ops.push_back(MicroOp::ReadMem);
                    self.queue_execute_followup();
                }
                _ => unreachable!(),
            },
            (0, 2) => match (q, p) {
                (1, 2) => {
                    let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.set_hl(v);
                }
                (1, 3) => {
                    self.regs.a = self.data_lo;
                }
                _ => unreachable!(),
            },
            (0, 4) if y == 6 => {
                let r = alu::inc8(self.data_lo);
                self.data_lo = r.value;
                self.set_f((self.regs.f & CF) | r.flags);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            (0, 5) if y == 6 => {
                let r = alu::dec8(self.data_lo);
                self.data_lo = r.value;
                self.set_f((self.regs.f & CF) | r.flags);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            (0, 6) if y == 6 => {
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            (0, 6) => {
                self.set_reg8(y, self.data_lo);
            }
            (1, 6) => {
                self.set_reg8(y, self.data_lo);
            }
            (2, 6) => {
                self.alu_a(y, self.data_lo);
            }
            (3, 0) if self.followup_stage >= 2 => {
                self.regs.pc = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.regs.pc;
                self.regs.sp = self.regs.sp.wrapping_add(2);
            }
            (3, 0) => {
                if self.condition(y) {
                    self.addr = self.regs.sp;
                    self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                    self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                    self.queue_execute_followup();
                }
            }
            (3, 1) if q == 0 => {
                let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.set_reg16_af(p, v);
                self.regs.sp = self.regs.sp.wrapping_add(2);
            }
            (3, 1) if p == 0 => {
                self.regs.pc = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.regs.pc;
                self.regs.sp = self.regs.sp.wrapping_add(2);
            }
            (3, 1) => {
                self.regs.sp = self.regs.hl();
            }
            (3, 2) => {
                self.regs.wz = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                if self.condition(y) {
                    self.regs.pc = self.regs.wz;
                }
            }
            (3, 3) if y == 0 => {
                self.regs.pc = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.regs.pc;
            }
            (3, 3) if y == 2 => {
                self.addr = (u16::from(self.regs.a) << 8) | u16::from(self.data_lo);
                self.data_lo = self.regs.a;
                self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                self.micro_ops.push_back(MicroOp::IoWrite);
            }
            (3, 3) if y == 3 && self.followup_stage >= 2 => {
                self.regs.a = self.data_lo;
                self.regs.wz = self.addr.wrapping_add(1);
            }
            (3, 3) if y == 3 => {
                self.addr = (u16::from(self.regs.a) << 8) | u16::from(self.data_lo);
                self.micro_ops.push_back(MicroOp::IoRead);
                self.queue_execute_followup();
            }
            (3, 3) if y == 4 => {
                let old = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                let hl = self.regs.hl();
                self.addr = self.regs.sp;
                self.data_lo = hl as u8;
                self.data_hi = (hl >> 8) as u8;
                self.regs.set_hl(old);
                self.regs.wz = old;
                self.micro_ops.push_back(MicroOp::WriteMem16Lo);
                self.micro_ops.push_back(MicroOp::WriteMem16Hi);
                self.queue_internal(2);
            }
            (3, 4) if self.followup_stage >= 2 => {
                self.regs.pc = self.regs.wz;
            }
            (3, 4) => {
                self.regs.wz = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                if self.condition(y) {
                    self.queue_internal(1);
                    self.data_hi = (self.regs.pc >> 8) as u8;
                    self.data_lo = self.regs.pc as u8;
                    self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                    self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
                    self.queue_execute_followup();
                }
            }
            (3, 5) if self.followup_stage == 1 && p == 0 && q == 1 => {
                self.regs.wz = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.queue_internal(1);
                self.data_hi = (self.regs.pc >> 8) as u8;
                self.data_lo = self.regs.pc as u8;
                self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
                self.queue_execute_followup();
            }
            (3, 5) => {
                self.regs.pc = self.regs.wz;
            }
            (3, 6) => {
                self.alu_a(y, self.data_lo);
            }
            (3, 7) => {
                self.regs.pc = u16::from(y) * 8;
                self.regs.wz = self.regs.pc;
            }
            _ => {}
        }
    }

    fn alu_a(&mut self, y: u8, value: u8) {
        let carry = self.regs.f & CF != 0;
        let a = self.regs.a;
        match y {
            0 => {
                let r = alu::add8(a, value, false);
                self.regs.a = r.value;
                self.set_f(r.flags);
            }
            1 => {
                let r = alu::add8(a, value, carry);
                self.regs.a = r.value;
                self.set_f(r.flags);
            }
            2 => {
                let r = alu::sub8(a, value, false);
                self.regs.a = r.value;
                self.set_f(r.flags);
            }
            3 => {
                let r = alu::sub8(a, value, carry);
                self.regs.a = r.value;
                self.set_f(r.flags);
            }
            4 => {
                let r = a & value;
                self.regs.a = r;
                self.set_f(sz53p(r) | HF);
            }
            5 => {
                let r = a ^ value;
                self.regs.a = r;
                self.set_f(sz53p(r));
            }
            6 => {
                let r = a | value;
                self.regs.a = r;
                self.set_f(sz53p(r));
            }
            7 => {
                let r = alu::sub8(a, value, false);
                self.set_f((r.flags & !(XF | YF)) | (value & (XF | YF)));
            }
            _ => unreachable!(),
        }
    }

    // -----------------------------------------------------------------
    // CB-prefixed rotate/shift/BIT/RES/SET
    // -----------------------------------------------------------------

    pub(super) fn execute_cb(&mut self) {
        let op = self.opcode;
        let z = op & 7;
        if z == 6 {
            self.addr = self.regs.hl();
            self.regs.wz = self.regs.hl().wrapping_add(1);
            self.micro_ops.push_back(MicroOp::ReadMem);
            self.queue_execute_followup();
        } else {
            let v = self.get_reg8(z);
            if let Some(r) = self.cb_operation(op, v, None) {
                self.set_reg8(z, r);
            }
        }
    }

    pub(super) fn execute_cb_followup(&mut self) {
        let op = self.opcode;
        let x = op >> 6;
        let value = self.data_lo;
        let flag_src = if x == 1 { Some((self.regs.wz >> 8) as u8) } else { None };
        if let Some(r) = self.cb_operation(op, value, flag_src) {
            self.data_lo = r;
            self.micro_ops.push_back(MicroOp::WriteMem);
        }
    }

    /// Shared by CB, DDCB and FDCB forms. `flag_high_byte` supplies the
    /// undocumented X/Y source for `BIT (HL)`/`BIT (IX+d)` (WZ's high byte
    /// rather than the tested operand); `None` uses `value` itself.
    fn cb_operation(&mut self, op: u8, value: u8, flag_high_byte: Option<u8>) -> Option<u8> {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        match x {
            0 => {
                let r = match y {
                    0 => alu::rlc8(value),
                    1 => alu::rrc8(value),
                    2 => alu::rl8(value, self.regs.f & CF != 0),
                    3 => alu::rr8(value, self.regs.f & CF != 0),
                    4 => alu::sla8(value),
                    5 => alu::sra8(value),
                    6 => alu::sll8(value),
                    7 => alu::srl8(value),
                    _ => unreachable!(),
                };
                self.set_f(r.flags);
                Some(r.value)
            }
            1 => {
                let bit = 1u8 << y;
                let is_set = value & bit != 0;
                let xy_source = flag_high_byte.unwrap_or(value);
                let mut flags = (self.regs.f & CF) | HF | (xy_source & (XF | YF));
                if !is_set {
                    flags |= ZF | PF;
                }
                if y == 7 && is_set {
                    flags |= SF;
                }
                self.set_f(flags);
                None
            }
            2 => Some(value & !(1u8 << y)),
            3 => Some(value | (1u8 << y)),
            _ => unreachable!(),
        }
    }

    // -----------------------------------------------------------------
    // DD/FD-prefixed (IX/IY substitution)
    // -----------------------------------------------------------------

    pub(super) fn execute_dd_fd(&mut self) {
        let op = self.opcode;
        match op {
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.queue_internal(7);
                self.queue_execute_followup();
            }
            0x21 | 0x2A => {
                self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }
            0x22 => {
                self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }
            0x23 => {
                self.set_index_reg(self.get_index_reg().wrapping_add(1));
                self.queue_internal(2);
            }
            0x24 => {
                let r = alu::inc8((self.get_index_reg() >> 8) as u8);
                self.set_reg8_indexed(4, r.value);
                self.set_f((self.regs.f & CF) | r.flags);
            }
            0x25 => {
                let r = alu::dec8((self.get_index_reg() >> 8) as u8);
                self.set_reg8_indexed(4, r.value);
                self.set_f((self.regs.f & CF) | r.flags);
            }
            0x26 => {
                self.micro_ops.push_back(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }
            0x2B => {
                self.set_index_reg(self.get_index_reg().wrapping_sub(1));
                self.queue_internal(2);
            }
            0x2C => {
                let r = alu::inc8(self.get_index_reg() as u8);
                self.set_reg8_indexed(5, r.value);
                self.set_f((self.regs.f & CF) | r.flags);
            }
            0x2D => {
                let r = alu::dec8(self.get_index_reg() as u8);
                self.set_reg8_indexed(5, r.value);
                self.set_f((self.regs.f & CF) | r.flags);
            }
            0x2E => {
                self.micro_ops.push_back(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }
            0x34 | 0x35 => {
                self.micro_ops.push_back(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }
            0x36 => {
                self.micro_ops.push_back(MicroOp::FetchDisplacement);
                self.micro_ops.push_back(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                self.micro_ops.push_back(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }
            0x76 => {
                self.regs.halted = true;
            }
            0x70..=0x77 => {
                self.micro_ops.push_back(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                self.micro_ops.push_back(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }
            0x84 | 0x85 | 0x8C | 0x8D | 0x94 | 0x95 | 0x9C | 0x9D | 0xA4 | 0xA5 | 0xAC | 0xAD
            | 0xB4 | 0xB5 | 0xBC | 0xBD => {
                let z = op & 7;
                let y = (op >> 3) & 7;
                let v = self.get_reg8_indexed(z);
                self.alu_a(y, v);
            }
            0x40..=0x7F => {
                let src = op & 7;
                let dst = (op >> 3) & 7;
                let v = self.get_reg8_indexed(src);
                self.set_reg8_indexed(dst, v);
            }
            0xE1 => {
                self.addr = self.regs.sp;
                self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }
            0xE3 => {
                self.addr = self.regs.sp;
                self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }
            0xE5 => {
                let v = self.get_index_reg();
                self.data_hi = (v >> 8) as u8;
                self.data_lo = v as u8;
                self.queue_internal(1);
                self.micro_ops.push_back(MicroOp::WriteMemHiFirst);
                self.micro_ops.push_back(MicroOp::WriteMemLoSecond);
            }
            0xE9 => {
                self.regs.pc = self.get_index_reg();
            }
            0xF9 => {
                self.queue_internal(2);
                self.queue_execute_followup();
            }
            _ => {
                self.prefix = 0;
                self.execute_unprefixed();
            }
        }
    }

    pub(super) fn execute_dd_fd_followup(&mut self) {
        let op = self.opcode;
        if self.followup_stage == 1 {
            self.execute_dd_fd_stage1(op);
        } else {
            self.execute_dd_fd_stage2(op);
        }
    }

    fn execute_dd_fd_stage1(&mut self, op: u8) {
        match op {
            0x09 | 0x19 | 0x29 | 0x39 => {
                let p = (op >> 4) & 3;
                let idx = self.get_index_reg();
                let rp_val = if p == 2 { idx } else { self.get_reg16(p) };
                let (r, flags) = alu::add16(idx, rp_val);
                self.set_index_reg(r);
                self.set_f((flags & !(SF | ZF | PF)) | (self.regs.f & (SF | ZF | PF)));
                self.regs.wz = idx.wrapping_add(1);
            }
            0x21 => {
                let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.set_index_reg(v);
            }
            0x22 => {
                self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                let idx = self.get_index_reg();
                self.data_lo = idx as u8;
                self.data_hi = (idx >> 8) as u8;
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push_back(MicroOp::WriteMem16Lo);
                self.micro_ops.push_back(MicroOp::WriteMem16Hi);
            }
            0x26 => {
                self.set_reg8_indexed(4, self.data_lo);
            }
            0x2A => {
                self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }
            0x2E => {
                self.set_reg8_indexed(5, self.data_lo);
            }
            0x34 | 0x35 => {
                self.addr = self.get_index_reg().wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.addr;
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0x36 => {
                self.addr = self.get_index_reg().wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.addr;
                self.queue_internal(2);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                self.addr = self.get_index_reg().wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.addr;
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0x70..=0x77 => {
                self.addr = self.get_index_reg().wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.addr;
                let z = op & 7;
                self.data_lo = self.get_reg8(z);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                self.addr = self.get_index_reg().wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.addr;
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0xE1 => {
                let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.set_index_reg(v);
                self.regs.sp = self.regs.sp.wrapping_add(2);
            }
            0xE3 => {
                let old = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                let idx = self.get_index_reg();
                self.data_lo = idx as u8;
                self.data_hi = (idx >> 8) as u8;
                self.set_index_reg(old);
                self.regs.wz = old;
                self.queue_internal(1);
                self.micro_ops.push_back(MicroOp::WriteMem16Lo);
                self.micro_ops.push_back(MicroOp::WriteMem16Hi);
                self.queue_internal(2);
            }
            0xF9 => {
                self.regs.sp = self.get_index_reg();
            }
            _ => {}
        }
    }

    fn execute_dd_fd_stage2(&mut self, op: u8) {
        match op {
            0x2A => {
                let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.set_index_reg(v);
            }
            0x34 => {
                let r = alu::inc8(self.data_lo);
                self.data_lo = r.value;
                self.set_f((self.regs.f & CF) | r.flags);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0x35 => {
                let r = alu::dec8(self.data_lo);
                self.data_lo = r.value;
                self.set_f((self.regs.f & CF) | r.flags);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let y = (op >> 3) & 7;
                self.set_reg8(y, self.data_lo);
            }
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let y = (op >> 3) & 7;
                self.alu_a(y, self.data_lo);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------
    // DDCB/FDCB: displacement + sub-opcode fetched with no M1/R increment.
    // -----------------------------------------------------------------

    pub(super) fn execute_ddcb_fdcb(&mut self) {
        let base = self.get_index_reg();
        self.addr = base.wrapping_add(i16::from(self.displacement) as u16);
        self.regs.wz = self.addr;
        self.micro_ops.push_back(MicroOp::ReadMem);
        self.queue_execute_followup();
    }

    pub(super) fn execute_ddcb_fdcb_followup(&mut self) {
        let op = self.opcode;
        let x = op >> 6;
        let z = op & 7;
        let value = self.data_lo;
        let flag_src = if x == 1 { Some((self.addr >> 8) as u8) } else { None };
        if let Some(r) = self.cb_operation(op, value, flag_src) {
            self.data_lo = r;
            self.micro_ops.push_back(MicroOp::WriteMem);
            if z != 6 {
                self.set_reg8(z, r);
            }
        }
    }

    // -----------------------------------------------------------------
    // ED-prefixed
    // -----------------------------------------------------------------

    pub(super) fn execute_ed(&mut self) {
        let op = self.opcode;
        match op {
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                self.addr = self.regs.bc();
                self.micro_ops.push_back(MicroOp::IoRead);
                self.queue_execute_followup();
            }
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                self.addr = self.regs.bc();
                let y = (op >> 3) & 7;
                self.data_lo = if y == 6 { 0 } else { self.get_reg8(y) };
                self.regs.wz = self.regs.bc().wrapping_add(1);
                self.micro_ops.push_back(MicroOp::IoWrite);
            }
            0x42 | 0x52 | 0x62 | 0x72 | 0x4A | 0x5A | 0x6A | 0x7A => {
                self.queue_internal(7);
                self.queue_execute_followup();
            }
            0x43 | 0x53 | 0x63 | 0x73 | 0x4B | 0x5B | 0x6B | 0x7B => {
                self.micro_ops.push_back(MicroOp::ReadImm16Lo);
                self.micro_ops.push_back(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let a = self.regs.a;
                let r = alu::sub8(0, a, false);
                self.regs.a = r.value;
                self.set_f(r.flags);
            }
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.addr = self.regs.sp;
                self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }
            0x46 | 0x4E | 0x66 | 0x6E => self.regs.im = 0,
            0x56 | 0x76 => self.regs.im = 1,
            0x5E | 0x7E => self.regs.im = 2,
            0x47 => {
                self.regs.i = self.regs.a;
                self.queue_internal(1);
            }
            0x4F => {
                self.regs.r = self.regs.a;
                self.queue_internal(1);
            }
            0x57 => {
                self.regs.a = self.regs.i;
                self.last_was_ld_a_ir = true;
                self.set_ld_a_ir_flags();
                self.queue_internal(1);
            }
            0x5F => {
                self.regs.a = self.regs.r;
                self.last_was_ld_a_ir = true;
                self.set_ld_a_ir_flags();
                self.queue_internal(1);
            }
            0x67 | 0x6F => {
                self.addr = self.regs.hl();
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                self.addr = self.regs.hl();
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0xA1 | 0xA9 | 0xB1 | 0xB9 => {
                self.addr = self.regs.hl();
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            0xA2 | 0xAA | 0xB2 | 0xBA => {
                self.addr = self.regs.bc();
                self.micro_ops.push_back(MicroOp::IoRead);
                self.queue_execute_followup();
            }
            0xA3 | 0xAB | 0xB3 | 0xBB => {
                self.addr = self.regs.hl();
                self.micro_ops.push_back(MicroOp::ReadMem);
                self.queue_execute_followup();
            }
            _ => {}
        }
    }

    fn set_ld_a_ir_flags(&mut self) {
        let a = self.regs.a;
        let sz_xy = sz53p(a) & (SF | ZF | XF | YF);
        let flags = sz_xy | if self.regs.iff2 { PF } else { 0 } | (self.regs.f & CF);
        self.set_f(flags);
    }

    pub(super) fn execute_ed_followup(&mut self) {
        let op = self.opcode;
        match op {
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let y = (op >> 3) & 7;
                let v = self.data_lo;
                if y != 6 {
                    self.set_reg8(y, v);
                }
                self.set_f(sz53p(v) | (self.regs.f & CF));
                self.regs.wz = self.regs.bc().wrapping_add(1);
            }
            0x42 | 0x52 | 0x62 | 0x72 => {
                let p = (op >> 4) & 3;
                let hl = self.regs.hl();
                let rp = self.get_reg16(p);
                let (r, flags) = alu::sbc16(hl, rp, self.regs.f & CF != 0);
                self.regs.set_hl(r);
                self.set_f(flags);
                self.regs.wz = hl.wrapping_add(1);
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                let p = (op >> 4) & 3;
                let hl = self.regs.hl();
                let rp = self.get_reg16(p);
                let (r, flags) = alu::adc16(hl, rp, self.regs.f & CF != 0);
                self.regs.set_hl(r);
                self.set_f(flags);
                self.regs.wz = hl.wrapping_add(1);
            }
            0x43 | 0x53 | 0x63 | 0x73 => {
                self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.addr.wrapping_add(1);
                let p = (op >> 4) & 3;
                let v = self.get_reg16(p);
                self.data_lo = v as u8;
                self.data_hi = (v >> 8) as u8;
                self.micro_ops.push_back(MicroOp::WriteMem16Lo);
                self.micro_ops.push_back(MicroOp::WriteMem16Hi);
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                if self.followup_stage == 1 {
                    self.addr = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.regs.wz = self.addr.wrapping_add(1);
                    self.micro_ops.push_back(MicroOp::ReadMem16Lo);
                    self.micro_ops.push_back(MicroOp::ReadMem16Hi);
                    self.queue_execute_followup();
                } else {
                    let p = (op >> 4) & 3;
                    let v = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                    self.set_reg16(p, v);
                }
            }
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.pc = (u16::from(self.data_hi) << 8) | u16::from(self.data_lo);
                self.regs.wz = self.regs.pc;
                self.regs.sp = self.regs.sp.wrapping_add(2);
                self.regs.iff1 = self.regs.iff2;
            }
            0x67 => {
                let mem_val = self.data_lo;
                let a = self.regs.a;
                let new_mem = (mem_val >> 4) | (a << 4);
                let new_a = (a & 0xF0) | (mem_val & 0x0F);
                self.data_lo = new_mem;
                self.regs.a = new_a;
                self.set_f(sz53p(new_a) | (self.regs.f & CF));
                self.regs.wz = self.regs.hl().wrapping_add(1);
                self.queue_internal(4);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0x6F => {
                let mem_val = self.data_lo;
                let a = self.regs.a;
                let new_mem = (mem_val << 4) | (a & 0x0F);
                let new_a = (a & 0xF0) | (mem_val >> 4);
                self.data_lo = new_mem;
                self.regs.a = new_a;
                self.set_f(sz53p(new_a) | (self.regs.f & CF));
                self.regs.wz = self.regs.hl().wrapping_add(1);
                self.queue_internal(4);
                self.micro_ops.push_back(MicroOp::WriteMem);
            }
            0xA0 | 0xA8 | 0xB0 | 0xB8 => self.block_ld_followup(),
            0xA1 | 0xA9 | 0xB1 | 0xB9 => self.block_cp_followup(),
            0xA2 | 0xAA | 0xB2 | 0xBA => self.block_in_followup(),
            0xA3 | 0xAB | 0xB3 | 0xBB => self.block_out_followup(),
            _ => {}
        }
    }

    fn block_ld_followup(&mut self) {
        let op = self.opcode;
        let step: i16 = if op == 0xA0 || op == 0xB0 { 1 } else { -1 };
        let value = self.data_lo;
        self.addr = self.regs.de();
        self.data_lo = value;
        self.micro_ops.push_back(MicroOp::WriteMem);

        let hl = self.regs.hl().wrapping_add(step as u16);
        let de = self.regs.de().wrapping_add(step as u16);
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_hl(hl);
        self.regs.set_de(de);
        self.regs.set_bc(bc);

        let n = value.wrapping_add(self.regs.a);
        let flags = (self.regs.f & (SF | ZF | CF))
            | if n & 0x02 != 0 { YF } else { 0 }
            | if n & 0x08 != 0 { XF } else { 0 }
            | if bc != 0 { PF } else { 0 };
        self.set_f(flags);

        let repeat = (op == 0xB0 || op == 0xB8) && bc != 0;
        if repeat {
            self.queue_internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        }
    }

    fn block_cp_followup(&mut self) {
        let op = self.opcode;
        let step: i16 = if op == 0xA1 || op == 0xB1 { 1 } else { -1 };
        let value = self.data_lo;
        let a = self.regs.a;
        let r = a.wrapping_sub(value);
        let hf = (a & 0x0F) < (value & 0x0F);
        let n = if hf { r.wrapping_sub(1) } else { r };

        let hl = self.regs.hl().wrapping_add(step as u16);
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_hl(hl);
        self.regs.set_bc(bc);

        let flags = (if r & 0x80 != 0 { SF } else { 0 })
            | (if r == 0 { ZF } else { 0 })
            | (if hf { HF } else { 0 })
            | NF
            | (if n & 0x02 != 0 { YF } else { 0 })
            | (if n & 0x08 != 0 { XF } else { 0 })
            | (if bc != 0 { PF } else { 0 })
            | (self.regs.f & CF);
        self.set_f(flags);
        self.regs.wz = self.regs.wz.wrapping_add(step as u16);

        let repeat = (op == 0xB1 || op == 0xB9) && bc != 0 && r != 0;
        if repeat {
            self.queue_internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
        }
    }

    fn block_in_followup(&mut self) {
        let op = self.opcode;
        let step: i16 = if op == 0xA2 || op == 0xB2 { 1 } else { -1 };
        let value = self.data_lo;
        self.regs.b = self.regs.b.wrapping_sub(1);
        self.addr = self.regs.hl();
        self.data_lo = value;
        self.micro_ops.push_back(MicroOp::WriteMem);
        let hl = self.regs.hl().wrapping_add(step as u16);
        self.regs.set_hl(hl);

        let c_reg = self.regs.c.wrapping_add(step as u8);
        let k = u16::from(value).wrapping_add(u16::from(c_reg));
        let b = self.regs.b;
        let flags = (if b & 0x80 != 0 { SF } else { 0 })
            | (if b == 0 { ZF } else { 0 })
            | (b & (XF | YF))
            | (if value & 0x80 != 0 { NF } else { 0 })
            | (if k > 0xFF { HF | CF } else { 0 })
            | (sz53p(((k as u8) & 7) ^ b) & PF);
        self.set_f(flags);
        self.regs.wz = self.regs.bc().wrapping_add(step as u16);

        let repeat = (op == 0xB2 || op == 0xBA) && b != 0;
        if repeat {
            self.queue_internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
    }

    fn block_out_followup(&mut self) {
        let op = self.opcode;
        let step: i16 = if op == 0xA3 || op == 0xB3 { 1 } else { -1 };
        let value = self.data_lo;
        self.regs.b = self.regs.b.wrapping_sub(1);
        let hl = self.regs.hl().wrapping_add(step as u16);
        self.regs.set_hl(hl);
        self.addr = self.regs.bc();
        self.data_lo = value;
        self.micro_ops.push_back(MicroOp::IoWrite);

        let l = hl as u8;
        let k = u16::from(value).wrapping_add(u16::from(l));
        let b = self.regs.b;
        let flags = (if b & 0x80 != 0 { SF } else { 0 })
            | (if b == 0 { ZF } else { 0 })
            | (b & (XF | YF))
            | (if value & 0x80 != 0 { NF } else { 0 })
            | (if k > 0xFF { HF | CF } else { 0 })
            | (sz53p(((k as u8) & 7) ^ b) & PF);
        self.set_f(flags);
        self.regs.wz = self.regs.bc().wrapping_add(step as u16);

        let repeat = (op == 0xB3 || op == 0xBB) && b != 0;
        if repeat {
            self.queue_internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
    }
}
