use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use bytes::{Buf, Bytes};
use tokio::sync::mpsc::{UnboundedSender as MpscSender, UnboundedReceiver as MpscReceiver};
use tracing::{debug, error, trace, warn};

use crate::ensure;
use crate::hci::btsnoop::{LogWriter, PacketType};
use crate::hci::buffer::ReceiveBuffer;
use crate::hci::consts::EventCode;
use crate::hci::credits::CreditCounter;
use crate::hci::dispatcher::OutstandingTable;
use crate::hci::{Error, Opcode};
use crate::host::Transport;
use crate::utils::DispatchExt;

pub enum EventLoopCommand {
    Shutdown,
    RegisterHciEventHandler {
        events: BTreeSet<EventCode>,
        handler: MpscSender<Event>,
    },
}

pub async fn event_loop<T: Transport>(
    transport: Arc<T>,
    mut demux: Demultiplexer,
    mut ctl_receiver: MpscReceiver<EventLoopCommand>,
    log: Arc<LogWriter>,
) {
    loop {
        tokio::select! {
            biased;
            cmd = ctl_receiver.recv() => {
                match cmd {
                    Some(EventLoopCommand::RegisterHciEventHandler { events, handler }) => {
                        demux.register(events, handler);
                    }
                    Some(EventLoopCommand::Shutdown) | None => {
                        break;
                    }
                }
            },
            event = transport.read_event() => {
                match event {
                    Some(Ok(data)) => {
                        log.write(PacketType::Event, data.clone());
                        match demux.process_hci_event(data) {
                            Ok(true) => (),
                            Ok(false) => log.write(PacketType::SystemNote, Bytes::from_static(b"Unhandled HCI event")),
                            Err(err) => error!("Error processing HCI event: {:?}", err),
                        }
                    },
                    Some(Err(err)) => error!("Error reading HCI event: {:?}", err),
                    None => {
                        debug!("Transport closed");
                        break;
                    }
                }
            }
        }
    }
    demux.table.close();
    demux.credits.close();
    debug!("Event loop closed");
}

/// Routes incoming events: command responses to their waiting callers,
/// everything else to the registered subscribers.
pub struct Demultiplexer {
    credits: Arc<CreditCounter>,
    table: Arc<OutstandingTable>,
    hci_event_handlers: BTreeMap<EventCode, Vec<MpscSender<Event>>>,
}

impl Demultiplexer {

    pub fn new(credits: Arc<CreditCounter>, table: Arc<OutstandingTable>) -> Self {
        Self {
            credits,
            table,
            hci_event_handlers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, events: BTreeSet<EventCode>, handler: MpscSender<Event>) {
        for event in events {
            self.hci_event_handlers.entry(event).or_default().push(handler.clone());
        }
    }

    /// Returns whether somebody was interested in the event.
    pub fn process_hci_event(&mut self, event: Bytes) -> Result<bool, Error> {
        let event = match Event::parse(event) {
            Ok(event) => event,
            Err(Error::UnknownEventCode(code)) => {
                debug!("Ignoring event with unknown code 0x{:02X}", code);
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        trace!("Received HCI event: {:?}", event.code);
        match event.code {
            EventCode::CommandComplete | EventCode::CommandStatus => {
                let (credits, opcode, params) = parse_command_response(event.code, event.data.into_bytes())?;
                self.credits.set(credits);
                if opcode == Opcode::NONE {
                    // Credit update only
                    return Ok(true);
                }
                let resolved = self.table.resolve(opcode, ReceiveBuffer::from_payload(params));
                if !resolved {
                    debug!("Discarding {:?} for {:?}: no command pending", event.code, opcode);
                }
                Ok(resolved)
            },
            _ => {
                let code = event.code;
                let handled = self.hci_event_handlers
                    .get_mut(&code)
                    .map_or(false, |handlers| handlers.dispatch(event));
                if !handled {
                    self.hci_event_handlers.remove(&code);
                    warn!("Unhandled HCI event: {:?}", code);
                }
                Ok(handled)
            },
        }
    }

}

/// Splits a Command Complete or Command Status event into credits, opcode and
/// the parameters handed to the caller, which always start with the status.
fn parse_command_response(code: EventCode, mut params: Bytes) -> Result<(u8, Opcode, Bytes), Error> {
    match code {
        // ([Vol 4] Part E, Section 7.7.14).
        EventCode::CommandComplete => {
            ensure!(params.remaining() >= 3, Error::BadEventPacketSize);
            let credits = params.get_u8();
            let opcode = Opcode::from(params.get_u16_le());
            Ok((credits, opcode, params))
        }
        // ([Vol 4] Part E, Section 7.7.15).
        _ => {
            ensure!(params.remaining() == 4, Error::BadEventPacketSize);
            let status = params.split_to(1);
            let credits = params.get_u8();
            let opcode = Opcode::from(params.get_u16_le());
            Ok((credits, opcode, status))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub code: EventCode,
    pub data: ReceiveBuffer,
}

impl Event {
    /// HCI event packet ([Vol 4] Part E, Section 5.4.4).
    fn parse(mut data: Bytes) -> Result<Self, Error> {
        ensure!(data.remaining() >= 2, Error::BadEventPacketSize);
        let code = data.get_u8();
        let len = data.get_u8();
        let code = EventCode::try_from(code)
            .map_err(|_| Error::UnknownEventCode(code))?;
        ensure!(len as usize == data.len(), Error::BadEventPacketSize);
        Ok(Self {
            code,
            data: ReceiveBuffer::from_payload(data)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;
    use super::*;
    use crate::hci::OpcodeGroup;

    const RESET: Opcode = Opcode::new(OpcodeGroup::HciControl, 0x0003);

    fn demux(max_outstanding: usize) -> Demultiplexer {
        Demultiplexer::new(Arc::new(CreditCounter::new(1)), Arc::new(OutstandingTable::new(max_outstanding)))
    }

    #[test]
    fn event_framing_is_checked() {
        assert!(matches!(Event::parse(Bytes::from_static(&[0x0E])), Err(Error::BadEventPacketSize)));
        assert!(matches!(Event::parse(Bytes::from_static(&[0x0E, 0x02, 0x01])), Err(Error::BadEventPacketSize)));
        assert!(matches!(Event::parse(Bytes::from_static(&[0x25, 0x00])), Err(Error::UnknownEventCode(0x25))));
        let event = Event::parse(Bytes::from_static(&[0x05, 0x01, 0xAB])).unwrap();
        assert_eq!(event.code, EventCode::DisconnectionComplete);
        assert_eq!(event.data.as_slice(), &[0xAB]);
    }

    #[test]
    fn command_status_is_reordered() {
        let (credits, opcode, params) = parse_command_response(
            EventCode::CommandStatus,
            Bytes::from_static(&[0x0C, 0x02, 0x01, 0x04])).unwrap();
        assert_eq!((credits, opcode), (2, Opcode::from(0x0401)));
        assert_eq!(&params[..], &[0x0C]);
        assert!(parse_command_response(EventCode::CommandStatus, Bytes::from_static(&[0x00, 0x01, 0x03])).is_err());
        assert!(parse_command_response(EventCode::CommandComplete, Bytes::from_static(&[0x01, 0x03])).is_err());
    }

    #[tokio::test]
    async fn command_complete_resolves_and_assigns_credits() {
        let mut demux = demux(1);
        let table = demux.table.clone();
        let mut slot = table.reserve(RESET).await.unwrap();
        slot.arm().unwrap();
        assert!(demux.process_hci_event(Bytes::from_static(&[0x0E, 0x04, 0x05, 0x03, 0x0C, 0x00])).unwrap());
        assert_eq!(demux.credits.available(), 5);
        assert_eq!(slot.response().await.unwrap().as_slice(), &[0x00]);
    }

    #[tokio::test]
    async fn empty_return_parameters_are_delivered() {
        let mut demux = demux(1);
        let table = demux.table.clone();
        let mut slot = table.reserve(RESET).await.unwrap();
        slot.arm().unwrap();
        assert!(demux.process_hci_event(Bytes::from_static(&[0x0E, 0x03, 0x01, 0x03, 0x0C])).unwrap());
        assert!(slot.response().await.unwrap().is_empty());
    }

    #[test]
    fn unmatched_responses_only_update_credits() {
        let mut demux = demux(1);
        assert!(!demux.process_hci_event(Bytes::from_static(&[0x0E, 0x04, 0x03, 0x03, 0x0C, 0x00])).unwrap());
        assert_eq!(demux.credits.available(), 3);
        // Opcode 0x0000 carries nothing but the credit count
        assert!(demux.process_hci_event(Bytes::from_static(&[0x0E, 0x03, 0x00, 0x00, 0x00])).unwrap());
        assert_eq!(demux.credits.available(), 0);
    }

    #[test]
    fn unknown_event_codes_are_skipped() {
        let mut demux = demux(1);
        assert!(!demux.process_hci_event(Bytes::from_static(&[0x25, 0x00])).unwrap());
        assert!(!demux.process_hci_event(Bytes::from_static(&[0x25, 0x02, 0x01, 0x02])).unwrap());
        assert!(matches!(demux.process_hci_event(Bytes::from_static(&[0x25])), Err(Error::BadEventPacketSize)));
    }

    #[tokio::test]
    async fn stale_response_leaves_unsent_command_pending() {
        let mut demux = demux(1);
        let table = demux.table.clone();
        let mut slot = table.reserve(RESET).await.unwrap();
        assert!(!demux.process_hci_event(Bytes::from_static(&[0x0E, 0x04, 0x01, 0x03, 0x0C, 0x0C])).unwrap());
        assert!(table.is_pending(RESET));

        slot.arm().unwrap();
        assert!(demux.process_hci_event(Bytes::from_static(&[0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00])).unwrap());
        assert_eq!(slot.response().await.unwrap().as_slice(), &[0x00]);
    }

    #[test]
    fn other_events_go_to_subscribers() {
        let mut demux = demux(1);
        let (tx, mut rx) = unbounded_channel();
        demux.register(BTreeSet::from([EventCode::DisconnectionComplete]), tx);

        assert!(demux.process_hci_event(Bytes::from_static(&[0x05, 0x04, 0x00, 0x40, 0x00, 0x13])).unwrap());
        let event = rx.try_recv().unwrap();
        assert_eq!(event.code, EventCode::DisconnectionComplete);
        assert_eq!(event.data.as_slice(), &[0x00, 0x40, 0x00, 0x13]);

        assert!(!demux.process_hci_event(Bytes::from_static(&[0x10, 0x01, 0x00])).unwrap());
        drop(rx);
        assert!(!demux.process_hci_event(Bytes::from_static(&[0x05, 0x04, 0x00, 0x40, 0x00, 0x13])).unwrap());
        assert!(demux.hci_event_handlers.is_empty());
    }
}
