pub mod channel;

use std::future::Future;
use bytes::Bytes;

use crate::hci::Error;

/// Duplex packet channel to a controller.
///
/// Implementations deliver whole HCI packets in order; framing and reassembly
/// (H4, USB endpoints, ...) happen below this trait.
pub trait Transport: Send + Sync + 'static {
    /// Writes one HCI command packet: opcode, parameter length and parameters
    /// ([Vol 4] Part E, Section 5.4.1).
    fn write_command(&self, packet: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Waits for the next HCI event packet: event code, parameter length and parameters
    /// ([Vol 4] Part E, Section 5.4.4). Returns `None` once the transport is closed.
    ///
    /// Only the event loop reads events, so this is never polled concurrently.
    fn read_event(&self) -> impl Future<Output = Option<Result<Bytes, Error>>> + Send;
}
