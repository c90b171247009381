//! Control bytes the host sends over the serial link.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use stepscope_core::config::{INTERRUPT, SOFT_RESET};

/// Out-of-band request decoded from a single received byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Control {
    /// Restart the program; a fresh run follows the reboot.
    SoftReset,
    /// Stop the run in progress.
    Interrupt,
}

impl Control {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOFT_RESET => Some(Self::SoftReset),
            INTERRUPT => Some(Self::Interrupt),
            _ => None,
        }
    }
}

/// Returns the first control request in `bytes`, if any.
///
/// A soft reset wins over an interrupt that precedes it in the same chunk,
/// since the reboot ends the run anyway.
pub fn scan(bytes: &[u8]) -> Option<Control> {
    let mut found = None;
    for control in bytes.iter().copied().filter_map(Control::from_byte) {
        match control {
            Control::SoftReset => return Some(Control::SoftReset),
            Control::Interrupt => found = Some(Control::Interrupt),
        }
    }
    found
}
