use bytes::BufMut;
use instructor::BufferMut;
use crate::ensure;
use crate::hci::{CallOptions, Error, Hci, Opcode, OpcodeGroup};
use crate::hci::consts::{Lap, RemoteAddr, Role, Status};
use crate::host::Transport;

/// Largest valid connection handle ([Vol 4] Part E, Section 5.4.2).
pub const MAX_CONNECTION_HANDLE: u16 = 0x0EFF;

/// Link control commands ([Vol 4] Part E, Section 7.1).
impl<T: Transport> Hci<T> {

    /// Start the inquiry process to discover other Bluetooth devices in the vicinity.
    /// ([Vol 4] Part E, Section 7.1.1).
    ///
    /// # Parameters
    /// - `time`: The duration of the inquiry process in 1.28s units. Range: 1-48.
    /// - `max_responses`: The maximum number of responses to receive. 0 means no limit.
    ///
    /// The controller only acknowledges the start; results arrive as
    /// `InquiryResult` events followed by `InquiryComplete`.
    pub async fn inquiry(&self, lap: Lap, time: u8, max_responses: u8) -> Result<(), Error> {
        ensure!((0x01..=0x30).contains(&time), Error::InvalidArgument("inquiry length must be within 1..=48"));
        self.call_with_args(Opcode::new(OpcodeGroup::LinkControl, 0x0001), |p| {
            p.put_slice(&lap.to_le_bytes());
            p.write_le(time);
            p.write_le(max_responses);
        }).await
    }

    /// ([Vol 4] Part E, Section 7.1.2).
    pub async fn inquiry_cancel(&self) -> Result<(), Error> {
        self.call(Opcode::new(OpcodeGroup::LinkControl, 0x0002)).await
    }

    /// Terminates an existing connection ([Vol 4] Part E, Section 7.1.6).
    pub async fn disconnect(&self, handle: u16, reason: Status) -> Result<(), Error> {
        ensure!(handle <= MAX_CONNECTION_HANDLE, Error::InvalidArgument("connection handle out of range"));
        ensure!(matches!(reason,
            Status::AuthenticationFailure |
            Status::RemoteUserTerminatedConnection |
            Status::RemoteDeviceTerminatedConnectionDueToLowResources |
            Status::RemoteDeviceTerminatedConnectionDueToPowerOff |
            Status::UnsupportedRemoteFeature |
            Status::PairingWithUnitKeyNotSupported |
            Status::UnacceptableConnectionParameters),
            Error::InvalidArgument("reason is not allowed for a disconnect"));
        self.call_with_options(Opcode::new(OpcodeGroup::LinkControl, 0x0006), CallOptions::high_priority(), |p| {
            p.write_le(handle);
            p.write_le(u8::from(reason));
        }).await
    }

    /// Accept a connection request from a remote device.
    /// ([Vol 4] Part E, Section 7.1.8).
    pub async fn accept_connection_request(&self, bd_addr: RemoteAddr, role: Role) -> Result<(), Error> {
        self.call_with_args(Opcode::new(OpcodeGroup::LinkControl, 0x0009), |p| {
            p.put_slice(bd_addr.as_ref());
            p.write_le(u8::from(role));
        }).await
    }

    /// Reject a connection request from a remote device.
    /// ([Vol 4] Part E, Section 7.1.9).
    pub async fn reject_connection_request(&self, bd_addr: RemoteAddr, reason: Status) -> Result<(), Error> {
        ensure!(matches!(reason,
            Status::ConnectionRejectedDueToLimitedResources |
            Status::ConnectionRejectedDueToSecurityReasons |
            Status::ConnectionRejectedDueToUnacceptableBdAddr),
            Error::InvalidArgument("reason is not allowed for a connection rejection"));
        self.call_with_args(Opcode::new(OpcodeGroup::LinkControl, 0x000A), |p| {
            p.put_slice(bd_addr.as_ref());
            p.write_le(u8::from(reason));
        }).await
    }

    /// ([Vol 4] Part E, Section 7.1.12).
    pub async fn pin_code_request_reply(&self, bd_addr: RemoteAddr, pin: &str) -> Result<RemoteAddr, Error> {
        ensure!((1..=16).contains(&pin.len()), Error::InvalidArgument("PIN must be 1 to 16 bytes long"));
        self.call_with_args(Opcode::new(OpcodeGroup::LinkControl, 0x000D), |p| {
            p.put_slice(bd_addr.as_ref());
            p.write_le(pin.len() as u8);
            p.put_slice(pin.as_bytes());
            p.put_bytes(0, 16 - pin.len());
        }).await
    }

}

#[cfg(test)]
mod tests {
    use crate::hci::commands::testing::{complete, session, status};
    use super::*;

    const ADDR: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    #[tokio::test]
    async fn inquiry_is_acknowledged_with_a_status() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(hci.inquiry(Lap::GENERAL, 8, 0), status(&mut controller, Status::Success));
        result.unwrap();
        assert_eq!(cmd.opcode, Opcode::from(0x0401));
        assert_eq!(&cmd.params[..], &[0x33, 0x8B, 0x9E, 0x08, 0x00]);

        let (result, _) = tokio::join!(hci.inquiry(Lap::LIMITED, 8, 0), status(&mut controller, Status::CommandDisallowed));
        assert!(matches!(result, Err(Error::Controller(Status::CommandDisallowed))));
    }

    #[tokio::test]
    async fn inquiry_length_is_checked() {
        let (hci, mut controller) = session().await;
        assert!(matches!(hci.inquiry(Lap::GENERAL, 0, 0).await, Err(Error::InvalidArgument(_))));
        assert!(matches!(hci.inquiry(Lap::GENERAL, 0x31, 0).await, Err(Error::InvalidArgument(_))));
        assert!(controller.try_next_command().is_none());
    }

    #[tokio::test]
    async fn inquiry_cancel_completes() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(hci.inquiry_cancel(), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(cmd.opcode, Opcode::from(0x0402));
        assert!(cmd.params.is_empty());
    }

    #[tokio::test]
    async fn disconnect_parameters() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(
            hci.disconnect(0x0040, Status::RemoteUserTerminatedConnection),
            status(&mut controller, Status::Success));
        result.unwrap();
        assert_eq!(&cmd.params[..], &[0x40, 0x00, 0x13]);

        assert!(matches!(hci.disconnect(0x0F00, Status::RemoteUserTerminatedConnection).await, Err(Error::InvalidArgument(_))));
        assert!(matches!(hci.disconnect(0x0040, Status::UnknownCommand).await, Err(Error::InvalidArgument(_))));
        assert!(controller.try_next_command().is_none());
    }

    #[tokio::test]
    async fn connection_requests() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(
            hci.accept_connection_request(RemoteAddr::from(ADDR), Role::Peripheral),
            status(&mut controller, Status::Success));
        result.unwrap();
        assert_eq!(&cmd.params[..], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x01]);

        let (result, cmd) = tokio::join!(
            hci.reject_connection_request(RemoteAddr::from(ADDR), Status::ConnectionRejectedDueToSecurityReasons),
            status(&mut controller, Status::Success));
        result.unwrap();
        assert_eq!(cmd.params[6], 0x0E);

        let rejected = hci.reject_connection_request(RemoteAddr::from(ADDR), Status::RemoteUserTerminatedConnection).await;
        assert!(matches!(rejected, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn pin_code_reply() {
        let (hci, mut controller) = session().await;
        let mut response = vec![0x00];
        response.extend_from_slice(&ADDR);
        let (result, cmd) = tokio::join!(
            hci.pin_code_request_reply(RemoteAddr::from(ADDR), "0000"),
            complete(&mut controller, &response));
        assert_eq!(result.unwrap(), RemoteAddr::from(ADDR));
        assert_eq!(cmd.params.len(), 6 + 1 + 16);
        assert_eq!(cmd.params[6], 4);
        assert_eq!(&cmd.params[7..11], b"0000");

        let too_long = hci.pin_code_request_reply(RemoteAddr::from(ADDR), "01234567890123456").await;
        assert!(matches!(too_long, Err(Error::InvalidArgument(_))));
        assert!(controller.try_next_command().is_none());
    }
}
