//! The microcode queue: abstract bus/internal steps an instruction handler
//! schedules, consumed one at a time by the driver in [`crate::cpu`].
//!
//! Handlers in `cpu::execute` never touch a bus directly — they push the
//! primitive steps they need (a memory read, an internal delay, ...) onto
//! the queue and return. The driver drains the queue, turning each step
//! into the matching pin-word bus cycle (or a register callback into the
//! same instruction for multi-stage ops) and re-enters the handler only
//! when all the data it asked for has arrived.

/// One scheduled step of an instruction in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    /// M1 opcode fetch at the current PC; advances PC and R.
    FetchOpcode,
    /// Read one immediate byte at PC into `data_lo`; advances PC.
    ReadImm8,
    /// Read the low byte of a 16-bit immediate into `data_lo`; advances PC.
    ReadImm16Lo,
    /// Read the high byte of a 16-bit immediate into `data_hi`; advances PC.
    ReadImm16Hi,
    /// Read one byte from `addr` into `data_lo`.
    ReadMem,
    /// Write `data_lo` to `addr`.
    WriteMem,
    /// Read the low byte of a 16-bit value from `addr` into `data_lo`; advances `addr`.
    ReadMem16Lo,
    /// Read the high byte of a 16-bit value from `addr` into `data_hi`; advances `addr`.
    ReadMem16Hi,
    /// Write `data_lo` to `addr` as the low byte of a 16-bit value; advances `addr`.
    WriteMem16Lo,
    /// Write `data_hi` to `addr` as the high byte of a 16-bit value; advances `addr`.
    WriteMem16Hi,
    /// PUSH-style write: high byte first, to `sp-1`, decrementing SP.
    WriteMemHiFirst,
    /// PUSH-style write: low byte second, to `sp-2` (already decremented), decrementing SP.
    WriteMemLoSecond,
    /// Read one byte from I/O port `addr` into `data_lo`.
    IoRead,
    /// Write `data_lo` to I/O port `addr`.
    IoWrite,
    /// Read the (IX+d)/(IY+d) displacement byte at PC into `displacement`; advances PC.
    FetchDisplacement,
    /// Burn `n` T-states with no bus activity (e.g. the 7 internal T of `ADD HL,rr`).
    Internal(u8),
    /// Re-enter the instruction's follow-up handler once the ops before
    /// this marker have completed; used for multi-stage instructions.
    Execute,
}
