use bytes::BufMut;
use instructor::BufferMut;
use crate::ensure;
use crate::hci::{CallOptions, Error, Hci};
use crate::hci::commands::{Opcode, OpcodeGroup};
use crate::hci::consts::EventMask;
use crate::host::Transport;

/// Fixed size of the `Local_Name` parameter, terminating zero included.
pub const LOCAL_NAME_LEN: usize = 248;

/// Controller and baseband commands ([Vol 4] Part E, Section 7.3).
impl<T: Transport> Hci<T> {

    /// ([Vol 4] Part E, Section 7.3.1).
    pub async fn set_event_mask(&self, mask: EventMask) -> Result<(), Error> {
        self.call_with_args(Opcode::new(OpcodeGroup::HciControl, 0x0001), |p| {
            p.write_le(mask.bits());
        }).await
    }

    /// Resets the controller's link manager, baseband, and link layer
    /// ([Vol 4] Part E, Section 7.3.2).
    pub async fn reset(&self) -> Result<(), Error> {
        self.call_with_options(Opcode::new(OpcodeGroup::HciControl, 0x0003), CallOptions::high_priority(), |_| {}).await
    }

    /// Sets the user-friendly name for the BR/EDR controller
    /// ([Vol 4] Part E, Section 7.3.11).
    pub async fn write_local_name(&self, name: &str) -> Result<(), Error> {
        ensure!(name.len() < LOCAL_NAME_LEN, Error::InvalidArgument("local name must be shorter than 248 bytes"));
        self.call_with_args(Opcode::new(OpcodeGroup::HciControl, 0x0013), |p| {
            p.put_slice(name.as_bytes());
            p.put_bytes(0, LOCAL_NAME_LEN - name.len());
        }).await
    }

    /// Makes this device discoverable and/or connectable
    /// ([Vol 4] Part E, Section 7.3.18).
    pub async fn set_scan_enabled(&self, connectable: bool, discoverable: bool) -> Result<(), Error> {
        self.call_with_args(Opcode::new(OpcodeGroup::HciControl, 0x001A), |p| {
            p.write_le(u8::from(connectable) << 1 | u8::from(discoverable));
        }).await
    }

    /// ([Vol 4] Part E, Section 7.3.59).
    pub async fn set_simple_pairing_support(&self, enabled: bool) -> Result<(), Error> {
        self.call_with_args(Opcode::new(OpcodeGroup::HciControl, 0x0056), |p| {
            p.write_le(u8::from(enabled));
        }).await
    }

    /// ([Vol 4] Part E, Section 7.3.92).
    pub async fn set_secure_connections_support(&self, enabled: bool) -> Result<(), Error> {
        self.call_with_args(Opcode::new(OpcodeGroup::HciControl, 0x007A), |p| {
            p.write_le(u8::from(enabled));
        }).await
    }

}

#[cfg(test)]
mod tests {
    use crate::hci::commands::testing::{complete, session};
    use crate::hci::consts::EventCode;
    use super::*;

    #[tokio::test]
    async fn event_mask_is_little_endian() {
        let (hci, mut controller) = session().await;
        let mask = EventMask::none()
            .with(EventCode::InquiryComplete, true)
            .with(EventCode::DisconnectionComplete, true);
        let (result, cmd) = tokio::join!(hci.set_event_mask(mask), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(cmd.opcode, Opcode::new(OpcodeGroup::HciControl, 0x0001));
        assert_eq!(&cmd.params[..], &[0x11, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn local_name_is_zero_padded() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(hci.write_local_name("bluefang"), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(cmd.params.len(), LOCAL_NAME_LEN);
        assert_eq!(&cmd.params[..8], b"bluefang");
        assert!(cmd.params[8..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn overlong_local_name_is_rejected() {
        let (hci, mut controller) = session().await;
        let name = "x".repeat(LOCAL_NAME_LEN);
        assert!(matches!(hci.write_local_name(&name).await, Err(Error::InvalidArgument(_))));
        assert!(controller.try_next_command().is_none());
    }

    #[tokio::test]
    async fn scan_enable_flags() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(hci.set_scan_enabled(true, false), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(&cmd.params[..], &[0x02]);
        let (result, cmd) = tokio::join!(hci.set_scan_enabled(true, true), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(&cmd.params[..], &[0x03]);
    }

    #[tokio::test]
    async fn pairing_switches() {
        let (hci, mut controller) = session().await;
        let (result, cmd) = tokio::join!(hci.set_simple_pairing_support(true), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(cmd.opcode, Opcode::from(0x0C56));
        assert_eq!(&cmd.params[..], &[0x01]);
        let (result, cmd) = tokio::join!(hci.set_secure_connections_support(false), complete(&mut controller, &[0x00]));
        result.unwrap();
        assert_eq!(cmd.opcode, Opcode::from(0x0C7A));
        assert_eq!(&cmd.params[..], &[0x00]);
    }
}
