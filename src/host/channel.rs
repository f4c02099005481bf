use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver as MpscReceiver, UnboundedSender as MpscSender};
use tracing::warn;

use crate::hci::consts::{EventCode, Status};
use crate::hci::{Error, Opcode};
use crate::hci::buffer::CMD_HDR;
use crate::host::Transport;

/// Creates an in-memory transport.
///
/// The [`ChannelTransport`] goes to the host; the [`ControllerEnd`] goes to
/// whatever drives the real device (or to a simulated controller).
pub fn channel_transport() -> (ChannelTransport, ControllerEnd) {
    let (cmd_out, cmd_in) = unbounded_channel();
    let (evt_out, evt_in) = unbounded_channel();
    let transport = ChannelTransport {
        commands: cmd_out,
        events: Mutex::new(evt_in),
    };
    let controller = ControllerEnd {
        commands: cmd_in,
        events: evt_out,
    };
    (transport, controller)
}

#[derive(Debug)]
pub struct ChannelTransport {
    commands: MpscSender<Bytes>,
    events: Mutex<MpscReceiver<Bytes>>,
}

impl Transport for ChannelTransport {
    async fn write_command(&self, packet: &[u8]) -> Result<(), Error> {
        self.commands
            .send(Bytes::copy_from_slice(packet))
            .map_err(|_| Error::TransportClosed)
    }

    async fn read_event(&self) -> Option<Result<Bytes, Error>> {
        self.events.lock().await.recv().await.map(Ok)
    }
}

/// A command packet as seen by the controller.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandPacket {
    pub opcode: Opcode,
    pub params: Bytes,
}

impl CommandPacket {
    fn parse(mut packet: Bytes) -> Result<Self, Bytes> {
        let header = packet
            .get(..CMD_HDR)
            .and_then(|header| <[u8; CMD_HDR]>::try_from(header).ok());
        match header {
            Some([lo, hi, len]) if packet.len() == CMD_HDR + len as usize => {
                let params = packet.split_off(CMD_HDR);
                Ok(Self {
                    opcode: Opcode::from(u16::from_le_bytes([lo, hi])),
                    params,
                })
            }
            _ => Err(packet)
        }
    }
}

#[derive(Debug)]
pub struct ControllerEnd {
    commands: MpscReceiver<Bytes>,
    events: MpscSender<Bytes>,
}

impl ControllerEnd {

    /// Waits for the next command written by the host. Returns `None` once the host is gone.
    pub async fn next_command(&mut self) -> Option<CommandPacket> {
        while let Some(packet) = self.commands.recv().await {
            match CommandPacket::parse(packet) {
                Ok(cmd) => return Some(cmd),
                Err(packet) => warn!("Dropping malformed command packet: {:02X?}", packet)
            }
        }
        None
    }

    /// Returns a command that was already written, without waiting.
    pub fn try_next_command(&mut self) -> Option<CommandPacket> {
        let packet = self.commands.try_recv().ok()?;
        CommandPacket::parse(packet).ok()
    }

    /// Sends a raw event packet.
    pub fn send_raw(&self, packet: Bytes) -> Result<(), Error> {
        self.events.send(packet).map_err(|_| Error::TransportClosed)
    }

    /// Sends an event packet with the given code and parameters
    /// ([Vol 4] Part E, Section 5.4.4).
    pub fn send_event(&self, code: EventCode, params: &[u8]) -> Result<(), Error> {
        let len = u8::try_from(params.len()).map_err(|_| Error::PayloadTooLarge)?;
        let mut packet = BytesMut::with_capacity(2 + params.len());
        packet.put_u8(code.into());
        packet.put_u8(len);
        packet.put_slice(params);
        self.send_raw(packet.freeze())
    }

    /// Sends a Command Complete event; `return_params` starts with the status
    /// ([Vol 4] Part E, Section 7.7.14).
    pub fn command_complete(&self, credits: u8, opcode: Opcode, return_params: &[u8]) -> Result<(), Error> {
        let mut params = BytesMut::with_capacity(3 + return_params.len());
        params.put_u8(credits);
        params.put_slice(&opcode.to_le_bytes());
        params.put_slice(return_params);
        self.send_event(EventCode::CommandComplete, &params)
    }

    /// Sends a Command Status event ([Vol 4] Part E, Section 7.7.15).
    pub fn command_status(&self, status: Status, credits: u8, opcode: Opcode) -> Result<(), Error> {
        let [lo, hi] = opcode.to_le_bytes();
        self.send_event(EventCode::CommandStatus, &[status.into(), credits, lo, hi])
    }
}
