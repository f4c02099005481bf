mod events;
mod status;

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use num_enum::IntoPrimitive;

pub use events::*;
pub use status::*;
use crate::hci::buffer::ReceiveBuffer;
use crate::hci::Error;
use crate::hci::events::FromEvent;

/// HCI/LMP version number as reported by Read Local Version Information
/// ([Assigned Numbers] Section 2.1). Values newer than this crate are kept as-is.
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[repr(transparent)]
pub struct CoreVersion(pub u8);

impl CoreVersion {
    pub const V1_0: Self = Self(0x00);
    pub const V1_1: Self = Self(0x01);
    pub const V1_2: Self = Self(0x02);
    pub const V2_0: Self = Self(0x03);
    pub const V2_1: Self = Self(0x04);
    pub const V3_0: Self = Self(0x05);
    pub const V4_0: Self = Self(0x06);
    pub const V4_1: Self = Self(0x07);
    pub const V4_2: Self = Self(0x08);
    pub const V5_0: Self = Self(0x09);
    pub const V5_1: Self = Self(0x0A);
    pub const V5_2: Self = Self(0x0B);
    pub const V5_3: Self = Self(0x0C);
    pub const V5_4: Self = Self(0x0D);

    const NAMES: [&'static str; 14] = [
        "1.0b", "1.1", "1.2", "2.0+EDR", "2.1+EDR", "3.0+HS", "4.0",
        "4.1", "4.2", "5.0", "5.1", "5.2", "5.3", "5.4",
    ];

    /// Marketing name of the core version, if known.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES.get(self.0 as usize).copied()
    }
}

impl From<u8> for CoreVersion {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl Debug for CoreVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "v{}", name),
            None => write!(f, "v?(0x{:02X})", self.0),
        }
    }
}

/// Company identifier ([Assigned Numbers] Section 7.1).
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[repr(transparent)]
pub struct CompanyId(pub u16);

impl Debug for CompanyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompanyId(0x{:04X})", self.0)
    }
}

/// Inquiry access code LAP ([Assigned Numbers] Section 2.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Lap(u32);

impl Lap {
    /// General/Unlimited Inquiry Access Code.
    pub const GENERAL: Self = Self(0x9E8B33);
    /// Limited Dedicated Inquiry Access Code.
    pub const LIMITED: Self = Self(0x9E8B00);

    /// Dedicated inquiry access codes occupy 0x9E8B00 to 0x9E8B3F.
    pub fn dedicated(offset: u8) -> Option<Self> {
        (offset <= 0x3F).then(|| Self(0x9E8B00 + offset as u32))
    }

    /// The three octets sent on the wire.
    pub fn to_le_bytes(self) -> [u8; 3] {
        let [a, b, c, _] = self.0.to_le_bytes();
        [a, b, c]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive)]
#[repr(u8)]
pub enum Role {
    Central = 0x00,
    Peripheral = 0x01,
}

/// A BD_ADDR in wire order (least significant octet first).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct RemoteAddr([u8; 6]);

impl Display for RemoteAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, octet) in self.0.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", octet)?;
        }
        Ok(())
    }
}

impl FromStr for RemoteAddr {
    type Err = Error;

    /// Parses the `XX:XX:XX:XX:XX:XX` notation produced by [`Display`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const INVALID: Error = Error::InvalidArgument("address must look like 01:23:45:67:89:AB");
        let mut addr = [0u8; 6];
        let mut parts = s.split(':');
        for octet in addr.iter_mut().rev() {
            let part = parts.next().filter(|p| p.len() == 2).ok_or(INVALID)?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| INVALID)?;
        }
        match parts.next() {
            Some(_) => Err(INVALID),
            None => Ok(Self(addr))
        }
    }
}

impl From<[u8; 6]> for RemoteAddr {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl AsRef<[u8]> for RemoteAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromEvent for RemoteAddr {
    fn unpack(buf: &mut ReceiveBuffer) -> Result<Self, Error> {
        buf.array().map(Self::from)
    }
}
