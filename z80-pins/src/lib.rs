//! Z80 bus pin-word: the wire format between a [`z80_core`](https://docs.rs/z80-core)
//! CPU core and whatever owns memory, I/O and interrupt lines.
//!
//! A pin-word is a single `u64`. The core never reads or writes memory
//! directly — every bus cycle is one call to a host-supplied tick callback
//! of the shape `fn(num_ticks: u32, pins_in: u64) -> u64`. The host decodes
//! `pins_in` with the accessors below, performs the operation, and returns
//! `pins_out` with the data field updated for reads.
//!
//! Layout (bit positions are a public, stable contract):
//!
//! | Bits | Field |
//! |------|-------|
//! | 0..=15 | address |
//! | 16..=23 | data |
//! | 24 | M1 |
//! | 25 | MREQ |
//! | 26 | IORQ |
//! | 27 | RD |
//! | 28 | WR |
//! | 29 | RFSH |
//! | 30 | HALT |
//! | 31 | WAIT |
//! | 32 | INT |
//! | 33 | NMI |
//! | 34 | RESET |
//! | 35 | BUSREQ |
//! | 36 | BUSACK |
#![no_std]

/// Bit position of the low bit of the 16-bit address field.
pub const ADDR_SHIFT: u32 = 0;
/// Bit position of the low bit of the 8-bit data field.
pub const DATA_SHIFT: u32 = 16;

/// Opcode fetch cycle in progress.
pub const M1_BIT: u32 = 24;
/// Memory request: address bus holds a valid memory address.
pub const MREQ_BIT: u32 = 25;
/// I/O request: address bus (low byte, or full word for IM2) holds a port address.
pub const IORQ_BIT: u32 = 26;
/// Read: the addressed device should drive the data field.
pub const RD_BIT: u32 = 27;
/// Write: the data field holds the byte to be written.
pub const WR_BIT: u32 = 28;
/// Refresh cycle: address bus holds `(I<<8)|R` for DRAM refresh.
pub const RFSH_BIT: u32 = 29;
/// CPU has executed a HALT and is refetching NOPs until an interrupt arrives.
pub const HALT_BIT: u32 = 30;
/// Host sets this to stall the current bus cycle for one extra T-state.
pub const WAIT_BIT: u32 = 31;
/// Maskable interrupt request, sampled at instruction boundaries.
pub const INT_BIT: u32 = 32;
/// Non-maskable interrupt request, sampled at instruction boundaries.
pub const NMI_BIT: u32 = 33;
/// Reset request.
pub const RESET_BIT: u32 = 34;
/// Bus request (DMA), not driven by the core itself.
pub const BUSREQ_BIT: u32 = 35;
/// Bus acknowledge (DMA), not driven by the core itself.
pub const BUSACK_BIT: u32 = 36;

const ADDR_MASK: u64 = 0xFFFF;
const DATA_MASK: u64 = 0xFF;

/// Read the 16-bit address field.
#[must_use]
pub const fn addr(pins: u64) -> u16 {
    ((pins >> ADDR_SHIFT) & ADDR_MASK) as u16
}

/// Set the 16-bit address field, leaving all other bits untouched.
#[must_use]
pub const fn set_addr(pins: u64, address: u16) -> u64 {
    (pins & !(ADDR_MASK << ADDR_SHIFT)) | ((address as u64) << ADDR_SHIFT)
}

/// Read the 8-bit data field.
#[must_use]
pub const fn data(pins: u64) -> u8 {
    ((pins >> DATA_SHIFT) & DATA_MASK) as u8
}

/// Set the 8-bit data field, leaving all other bits untouched.
#[must_use]
pub const fn set_data(pins: u64, value: u8) -> u64 {
    (pins & !(DATA_MASK << DATA_SHIFT)) | ((value as u64) << DATA_SHIFT)
}

/// Test whether a named control line is asserted.
#[must_use]
pub const fn get(pins: u64, bit: u32) -> bool {
    pins & (1 << bit) != 0
}

/// Assert a named control line.
#[must_use]
pub const fn set(pins: u64, bit: u32) -> u64 {
    pins | (1 << bit)
}

/// Clear a named control line.
#[must_use]
pub const fn clear(pins: u64, bit: u32) -> u64 {
    pins & !(1 << bit)
}

/// All control-line bits the core drives itself, cleared; address/data untouched.
///
/// A host's tick callback typically starts its response from `pins_in` (to see
/// what the core asked for) and a driver typically starts a fresh cycle from
/// `clear_control(0)` before setting the bits for the next bus operation.
#[must_use]
pub const fn clear_control(pins: u64) -> u64 {
    let mask = (1u64 << M1_BIT)
        | (1u64 << MREQ_BIT)
        | (1u64 << IORQ_BIT)
        | (1u64 << RD_BIT)
        | (1u64 << WR_BIT)
        | (1u64 << RFSH_BIT);
    pins & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_roundtrip() {
        let pins = set_addr(0, 0xBEEF);
        assert_eq!(addr(pins), 0xBEEF);
    }

    #[test]
    fn data_roundtrip() {
        let pins = set_data(0, 0xA5);
        assert_eq!(data(pins), 0xA5);
    }

    #[test]
    fn addr_and_data_independent() {
        let pins = set_data(set_addr(0, 0x1234), 0x56);
        assert_eq!(addr(pins), 0x1234);
        assert_eq!(data(pins), 0x56);
    }

    #[test]
    fn control_bits_independent_of_addr_data() {
        let pins = set(set_data(set_addr(0, 0xFFFF), 0xFF), M1_BIT);
        assert!(get(pins, M1_BIT));
        assert_eq!(addr(pins), 0xFFFF);
        assert_eq!(data(pins), 0xFF);
        let cleared = clear(pins, M1_BIT);
        assert!(!get(cleared, M1_BIT));
    }

    #[test]
    fn clear_control_leaves_addr_data_and_async_lines() {
        let pins = set(set(set_addr(0, 0x4000), M1_BIT), INT_BIT);
        let cleared = clear_control(pins);
        assert!(!get(cleared, M1_BIT));
        assert!(get(cleared, INT_BIT));
        assert_eq!(addr(cleared), 0x4000);
    }
}
