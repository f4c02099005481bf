use enum_iterator::Sequence;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// HCI event codes the event loop knows how to route ([Vol 4] Part E, Section 7.7).
/// Events with any other code are dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Sequence, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EventCode {
    InquiryComplete = 0x01,
    InquiryResult = 0x02,
    ConnectionComplete = 0x03,
    ConnectionRequest = 0x04,
    DisconnectionComplete = 0x05,
    AuthenticationComplete = 0x06,
    RemoteNameRequestComplete = 0x07,
    EncryptionChange = 0x08,
    ReadRemoteSupportedFeaturesComplete = 0x0B,
    ReadRemoteVersionInformationComplete = 0x0C,
    CommandComplete = 0x0E,
    CommandStatus = 0x0F,
    HardwareError = 0x10,
    RoleChange = 0x12,
    NumberOfCompletedPackets = 0x13,
    ModeChange = 0x14,
    PinCodeRequest = 0x16,
    LinkKeyRequest = 0x17,
    LinkKeyNotification = 0x18,
    MaxSlotsChange = 0x1B,
    InquiryResultWithRssi = 0x22,
    ReadRemoteExtendedFeaturesComplete = 0x23,
    SynchronousConnectionComplete = 0x2C,
    ExtendedInquiryResult = 0x2F,
    EncryptionKeyRefreshComplete = 0x30,
    IoCapabilityRequest = 0x31,
    IoCapabilityResponse = 0x32,
    UserConfirmationRequest = 0x33,
    SimplePairingComplete = 0x36,
    LeMeta = 0x3E,
    Vendor = 0xFF,
}

impl EventCode {
    /// Bit of the event in the Set_Event_Mask bitmap ([Vol 4] Part E, Section 7.3.1).
    /// Bit `n` enables event code `n + 1`; events that are always reported have none.
    pub fn mask_bit(self) -> Option<u32> {
        match self {
            Self::CommandComplete | Self::CommandStatus | Self::NumberOfCompletedPackets | Self::Vendor => None,
            code => Some(u8::from(code) as u32 - 1),
        }
    }
}

/// Events the controller may report, as written by Set Event Mask.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EventMask(u64);

impl EventMask {
    /// Mask a controller starts with after a reset.
    pub const CONTROLLER_DEFAULT: Self = Self(0x0000_1FFF_FFFF_FFFF);

    pub const fn none() -> Self {
        Self(0)
    }

    /// Every maskable event in [`EventCode`].
    pub fn all() -> Self {
        enum_iterator::all::<EventCode>().collect()
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, code: EventCode) -> bool {
        code.mask_bit().map_or(false, |bit| self.0 & (1 << bit) != 0)
    }

    /// Enables or disables `code`. Unmaskable events leave the mask unchanged.
    pub fn with(self, code: EventCode, enable: bool) -> Self {
        match code.mask_bit() {
            Some(bit) if enable => Self(self.0 | 1 << bit),
            Some(bit) => Self(self.0 & !(1 << bit)),
            None => self
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::CONTROLLER_DEFAULT
    }
}

impl FromIterator<EventCode> for EventMask {
    fn from_iter<I: IntoIterator<Item = EventCode>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), |mask, code| mask.with(code, true))
    }
}
