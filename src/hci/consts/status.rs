use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// HCI status codes ([Vol 1] Part F, Section 1.3).
///
/// Every code from `0x00` to `0x45` has a variant, including the ones the
/// specification marks as reserved, so that a controller reporting one of them
/// still yields a distinct error instead of being mistaken for a framing problem.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Error, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Status {
    #[error("Success")]
    Success = 0x00,
    #[error("Unknown HCI Command")]
    UnknownCommand = 0x01,
    #[error("Unknown Connection Identifier")]
    UnknownConnectionIdentifier = 0x02,
    #[error("Hardware Failure")]
    HardwareFailure = 0x03,
    #[error("Page Timeout")]
    PageTimeout = 0x04,
    #[error("Authentication Failure")]
    AuthenticationFailure = 0x05,
    #[error("PIN or Key Missing")]
    PinOrKeyMissing = 0x06,
    #[error("Memory Capacity Exceeded")]
    MemoryCapacityExceeded = 0x07,
    #[error("Connection Timeout")]
    ConnectionTimeout = 0x08,
    #[error("Connection Limit Exceeded")]
    ConnectionLimitExceeded = 0x09,
    #[error("Synchronous Connection Limit To A Device Exceeded")]
    SynchronousConnectionLimitToADeviceExceeded = 0x0A,
    #[error("Connection Already Exists")]
    ConnectionAlreadyExists = 0x0B,
    #[error("Command Disallowed")]
    CommandDisallowed = 0x0C,
    #[error("Connection Rejected due to Limited Resources")]
    ConnectionRejectedDueToLimitedResources = 0x0D,
    #[error("Connection Rejected Due To Security Reasons")]
    ConnectionRejectedDueToSecurityReasons = 0x0E,
    #[error("Connection Rejected due to Unacceptable BD_ADDR")]
    ConnectionRejectedDueToUnacceptableBdAddr = 0x0F,
    #[error("Connection Accept Timeout Exceeded")]
    ConnectionAcceptTimeoutExceeded = 0x10,
    #[error("Unsupported Feature or Parameter Value")]
    UnsupportedFeatureOrParameterValue = 0x11,
    #[error("Invalid HCI Command Parameters")]
    InvalidCommandParameters = 0x12,
    #[error("Remote User Terminated Connection")]
    RemoteUserTerminatedConnection = 0x13,
    #[error("Remote Device Terminated Connection due to Low Resources")]
    RemoteDeviceTerminatedConnectionDueToLowResources = 0x14,
    #[error("Remote Device Terminated Connection due to Power Off")]
    RemoteDeviceTerminatedConnectionDueToPowerOff = 0x15,
    #[error("Connection Terminated By Local Host")]
    ConnectionTerminatedByLocalHost = 0x16,
    #[error("Repeated Attempts")]
    RepeatedAttempts = 0x17,
    #[error("Pairing Not Allowed")]
    PairingNotAllowed = 0x18,
    #[error("Unknown LMP PDU")]
    UnknownLmpPdu = 0x19,
    #[error("Unsupported Remote Feature")]
    UnsupportedRemoteFeature = 0x1A,
    #[error("SCO Offset Rejected")]
    ScoOffsetRejected = 0x1B,
    #[error("SCO Interval Rejected")]
    ScoIntervalRejected = 0x1C,
    #[error("SCO Air Mode Rejected")]
    ScoAirModeRejected = 0x1D,
    #[error("Invalid LMP Parameters / Invalid LL Parameters")]
    InvalidLmpLlParameters = 0x1E,
    #[error("Unspecified Error")]
    UnspecifiedError = 0x1F,
    #[error("Unsupported LMP Parameter Value / Unsupported LL Parameter Value")]
    UnsupportedLmpLlParameterValue = 0x20,
    #[error("Role Change Not Allowed")]
    RoleChangeNotAllowed = 0x21,
    #[error("LMP Response Timeout / LL Response Timeout")]
    LmpLlResponseTimeout = 0x22,
    #[error("LMP Error Transaction Collision / LL Procedure Collision")]
    LmpLlErrorTransactionCollision = 0x23,
    #[error("LMP PDU Not Allowed")]
    LmpPduNotAllowed = 0x24,
    #[error("Encryption Mode Not Acceptable")]
    EncryptionModeNotAcceptable = 0x25,
    #[error("Link Key cannot be Changed")]
    LinkKeyCannotBeChanged = 0x26,
    #[error("Requested QoS Not Supported")]
    RequestedQosNotSupported = 0x27,
    #[error("Instant Passed")]
    InstantPassed = 0x28,
    #[error("Pairing With Unit Key Not Supported")]
    PairingWithUnitKeyNotSupported = 0x29,
    #[error("Different Transaction Collision")]
    DifferentTransactionCollision = 0x2A,
    #[error("Reserved (0x2B)")]
    Reserved2B = 0x2B,
    #[error("QoS Unacceptable Parameter")]
    QosUnacceptableParameter = 0x2C,
    #[error("QoS Rejected")]
    QosRejected = 0x2D,
    #[error("Channel Classification Not Supported")]
    ChannelClassificationNotSupported = 0x2E,
    #[error("Insufficient Security")]
    InsufficientSecurity = 0x2F,
    #[error("Parameter Out Of Mandatory Range")]
    ParameterOutOfMandatoryRange = 0x30,
    #[error("Reserved (0x31)")]
    Reserved31 = 0x31,
    #[error("Role Switch Pending")]
    RoleSwitchPending = 0x32,
    #[error("Reserved (0x33)")]
    Reserved33 = 0x33,
    #[error("Reserved Slot Violation")]
    ReservedSlotViolation = 0x34,
    #[error("Role Switch Failed")]
    RoleSwitchFailed = 0x35,
    #[error("Extended Inquiry Response Too Large")]
    ExtendedInquiryResponseTooLarge = 0x36,
    #[error("Secure Simple Pairing Not Supported By Host")]
    SecureSimplePairingNotSupportedByHost = 0x37,
    #[error("Host Busy - Pairing")]
    HostBusyPairing = 0x38,
    #[error("Connection Rejected due to No Suitable Channel Found")]
    ConnectionRejectedDueToNoSuitableChannelFound = 0x39,
    #[error("Controller Busy")]
    ControllerBusy = 0x3A,
    #[error("Unacceptable Connection Parameters")]
    UnacceptableConnectionParameters = 0x3B,
    #[error("Advertising Timeout")]
    AdvertisingTimeout = 0x3C,
    #[error("Connection Terminated due to MIC Failure")]
    ConnectionTerminatedDueToMicFailure = 0x3D,
    #[error("Connection Failed to be Established / Synchronization Timeout")]
    ConnectionFailedToBeEstablished = 0x3E,
    #[error("MAC Connection Failed")]
    MacConnectionFailed = 0x3F,
    #[error("Coarse Clock Adjustment Rejected but Will Try to Adjust Using Clock Dragging")]
    CoarseClockAdjustmentRejected = 0x40,
    #[error("Type0 Submap Not Defined")]
    Type0SubmapNotDefined = 0x41,
    #[error("Unknown Advertising Identifier")]
    UnknownAdvertisingIdentifier = 0x42,
    #[error("Limit Reached")]
    LimitReached = 0x43,
    #[error("Operation Cancelled by Host")]
    OperationCancelledByHost = 0x44,
    #[error("Packet Too Long")]
    PacketTooLong = 0x45
}

impl Status {
    /// Highest status code defined by the Core Specification.
    pub const MAX: u8 = Status::PacketTooLong as u8;

    /// Returns whether status is `Success`.
    #[inline(always)]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns whether the code is one of the values the specification leaves reserved.
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved2B | Self::Reserved31 | Self::Reserved33)
    }
}
