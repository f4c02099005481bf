use crate::hci::buffer::ReceiveBuffer;
use crate::hci::consts::Status;
use crate::hci::Opcode;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The controller rejected the command with a non-zero status.
    #[error(transparent)]
    Controller(#[from] Status),
    /// The response was missing, too short, or carried a status outside of the known table.
    #[error("Malformed HCI response")]
    Malformed,
    #[error("No response to {0:?} before the deadline")]
    Timeout(Opcode),
    #[error(transparent)]
    Transport(#[from] std::io::Error),
    #[error("Transport closed")]
    TransportClosed,
    #[error("Buffer was already released or does not belong to this pool")]
    InvalidBuffer,
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Payload exceeds maximum size (255)")]
    PayloadTooLarge,
    #[error("HCI Event has an invalid size")]
    BadEventPacketSize,
    #[error("Unknown HCI Event code: 0x{0:02X}")]
    UnknownEventCode(u8),
    #[error("Event loop closed")]
    EventLoopClosed,
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Transport(err) => err.kind() == std::io::ErrorKind::TimedOut,
            _ => false
        }
    }

    /// The controller's own diagnosis, if this error carries one.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Controller(status) => Some(*status),
            _ => None
        }
    }
}

/// Maps a raw status byte to its meaning.
///
/// `0x00` is success, `0x01..=0x45` are errors reported by the controller and
/// every other value points to a framing problem rather than a controller diagnosis.
pub fn translate_status(code: u8) -> Result<(), Error> {
    match Status::try_from(code) {
        Ok(Status::Success) => Ok(()),
        Ok(status) => Err(Error::Controller(status)),
        Err(_) => Err(Error::Malformed)
    }
}

/// Consumes the status byte at the start of the return parameters
/// ([Vol 4] Part E, Section 7.7.14).
pub fn check_status(params: &mut ReceiveBuffer) -> Result<(), Error> {
    translate_status(params.u8()?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use bytes::Bytes;
    use super::*;

    #[test]
    fn success_is_ok() {
        assert!(translate_status(0x00).is_ok());
    }

    #[test]
    fn every_defined_code_is_a_distinct_controller_error() {
        let mut seen = BTreeSet::new();
        for code in 0x01..=Status::MAX {
            let status = translate_status(code)
                .unwrap_err()
                .status()
                .unwrap();
            assert_eq!(u8::from(status), code);
            assert!(seen.insert(status));
        }
        assert_eq!(seen.len(), 0x45);
        assert_eq!(translate_status(0x2B).unwrap_err().status(), Some(Status::Reserved2B));
        assert!(Status::Reserved33.is_reserved());
        assert!(!Status::CommandDisallowed.is_reserved());
    }

    #[test]
    fn undefined_codes_are_malformed() {
        for code in 0x46..=u8::MAX {
            assert!(matches!(translate_status(code), Err(Error::Malformed)));
        }
    }

    #[test]
    fn empty_return_parameters_are_malformed() {
        let mut params = ReceiveBuffer::default();
        assert!(matches!(check_status(&mut params), Err(Error::Malformed)));

        let mut params = ReceiveBuffer::from_payload(Bytes::from_static(&[0x0C, 0xAA]));
        assert!(matches!(check_status(&mut params), Err(Error::Controller(Status::CommandDisallowed))));
        assert_eq!(params.remaining(), 1);
    }

    #[test]
    fn controller_errors_keep_their_description() {
        let err = translate_status(0x02).unwrap_err();
        assert_eq!(err.to_string(), "Unknown Connection Identifier");
        assert!(Error::Timeout(Opcode::NONE).is_timeout());
    }
}
