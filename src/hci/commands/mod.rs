mod hci_control;
mod info_params;
mod link_control;

use std::fmt::{Debug, Formatter};
use num_enum::TryFromPrimitive;

use crate::ensure;
use crate::hci::Error;

pub use info_params::*;

// Opcode group field definitions.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u16)]
pub enum OpcodeGroup {
    LinkControl = 0x01,
    LinkPolicy = 0x02,
    HciControl = 0x03,
    InfoParams = 0x04,
    StatusParams = 0x05,
    Testing = 0x06,
    Le = 0x08,
    Vendor = 0x3F // [Vol 4] Part E, Section 5.4.1
}

/// HCI command opcode: OGF in bits 10..16, OCF in bits 0..10
/// ([Vol 4] Part E, Section 5.4.1).
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Opcode(u16);

impl Opcode {
    /// Opcode 0x0000 is used to update `Num_HCI_Command_Packets`
    /// ([Vol 4] Part E, Section 7.7.14).
    pub const NONE: Opcode = Opcode(0x0000);

    const OGF_MAX: u8 = 0x3F;
    const OCF_MAX: u16 = 0x3FF;
}

impl Opcode {
    /// Creates a new opcode from the specified group and command fields.
    #[inline]
    pub const fn new(group: OpcodeGroup, ocf: u16) -> Self {
        // Combines OGF with OCF to create a full opcode.
        Self((group as u16) << 10 | (ocf & Self::OCF_MAX))
    }

    /// Creates an opcode from raw group and command fields, rejecting values
    /// that don't fit into their 6 and 10 bit fields.
    pub fn from_parts(ogf: u8, ocf: u16) -> Result<Self, Error> {
        ensure!(ogf <= Self::OGF_MAX, Error::InvalidArgument("OGF exceeds 6 bits"));
        ensure!(ocf <= Self::OCF_MAX, Error::InvalidArgument("OCF exceeds 10 bits"));
        Ok(Self((ogf as u16) << 10 | ocf))
    }

    #[inline]
    pub const fn ogf(self) -> u8 {
        (self.0 >> 10) as u8
    }

    #[inline]
    pub const fn ocf(self) -> u16 {
        self.0 & Self::OCF_MAX
    }

    pub fn split(&self) -> Option<(OpcodeGroup, u16)> {
        OpcodeGroup::try_from(self.ogf() as u16)
            .ok()
            .map(|group| (group, self.ocf()))
    }

    #[inline]
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl Debug for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.split() {
            Some((group, ocf)) => write!(f, "Opcode({:?}, 0x{:03X})", group, ocf),
            None => write!(f, "Opcode(0x{:04X})", self.0)
        }
    }
}

impl From<Opcode> for u16 {
    #[inline]
    fn from(opcode: Opcode) -> u16 {
        opcode.0
    }
}

impl From<u16> for Opcode {
    #[inline]
    fn from(opcode: u16) -> Opcode {
        Opcode(opcode)
    }
}
