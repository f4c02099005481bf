use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::ensure;
use crate::hci::btsnoop::{LogWriter, PacketType};
use crate::hci::buffer::{CommandBuffer, ReceiveBuffer};
use crate::hci::credits::CreditCounter;
use crate::hci::{Error, Opcode};
use crate::host::Transport;

/// Commands admitted for sending and, once written, waiting for their
/// Command Complete or Command Status event.
///
/// At most one command per opcode is admitted at any time, and at most
/// `max_outstanding` in total. An admitted command only becomes resolvable
/// when it is armed right before its packet is written, so a late response to
/// an earlier command cannot complete one that is still waiting for a credit.
pub struct OutstandingTable {
    max_outstanding: usize,
    state: Mutex<TableState>,
    vacated: Notify,
}

#[derive(Default)]
struct TableState {
    next_id: u64,
    closed: bool,
    pending: BTreeMap<Opcode, Outstanding>,
}

struct Outstanding {
    id: u64,
    tx: Option<oneshot::Sender<ReceiveBuffer>>,
}

impl OutstandingTable {
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            max_outstanding: max_outstanding.max(1),
            state: Mutex::new(TableState::default()),
            vacated: Notify::new(),
        }
    }

    fn try_reserve(&self, opcode: Opcode) -> Result<Option<CommandSlot<'_>>, Error> {
        let mut state = self.state.lock();
        ensure!(!state.closed, Error::EventLoopClosed);
        if state.pending.len() >= self.max_outstanding || state.pending.contains_key(&opcode) {
            return Ok(None);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.pending.insert(opcode, Outstanding { id, tx: None });
        Ok(Some(CommandSlot { table: self, opcode, id, rx: None }))
    }

    /// Admits a command, waiting while the same opcode is still pending
    /// or the table is full.
    pub async fn reserve(&self, opcode: Opcode) -> Result<CommandSlot<'_>, Error> {
        loop {
            let mut vacated = pin!(self.vacated.notified());
            vacated.as_mut().enable();
            if let Some(slot) = self.try_reserve(opcode)? {
                return Ok(slot);
            }
            trace!("Waiting for a free command slot for {:?}", opcode);
            vacated.await;
        }
    }

    /// Hands the return parameters to the caller waiting for `opcode`.
    /// Returns `false` if no written command is waiting for it.
    pub fn resolve(&self, opcode: Opcode, params: ReceiveBuffer) -> bool {
        let entry = {
            let mut state = self.state.lock();
            match state.pending.get(&opcode) {
                Some(entry) if entry.tx.is_some() => state.pending.remove(&opcode),
                _ => None
            }
        };
        let Some(tx) = entry.and_then(|entry| entry.tx) else {
            return false;
        };
        self.vacated.notify_waiters();
        tx
            .send(params)
            .unwrap_or_else(|_| debug!("Response receiver for {:?} dropped", opcode));
        true
    }

    /// Fails every admitted command and every later [`Self::reserve`] with
    /// [`Error::EventLoopClosed`].
    pub fn close(&self) {
        let aborted = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.pending)
        };
        if !aborted.is_empty() {
            debug!("Aborting {} outstanding command(s)", aborted.len());
        }
        drop(aborted);
        self.vacated.notify_waiters();
    }

    pub fn is_pending(&self, opcode: Opcode) -> bool {
        self.state.lock().pending.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn arm(&self, opcode: Opcode, id: u64) -> Result<oneshot::Receiver<ReceiveBuffer>, Error> {
        let mut state = self.state.lock();
        let entry = state.pending
            .get_mut(&opcode)
            .filter(|entry| entry.id == id)
            .ok_or(Error::EventLoopClosed)?;
        let (tx, rx) = oneshot::channel();
        entry.tx = Some(tx);
        Ok(rx)
    }

    fn remove(&self, opcode: Opcode, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            match state.pending.get(&opcode) {
                Some(entry) if entry.id == id => state.pending.remove(&opcode),
                _ => None
            }
        };
        if removed.is_some() {
            self.vacated.notify_waiters();
        }
    }
}

/// Admission of one command. Dropping it withdraws the command,
/// so a response arriving afterwards finds nobody waiting and is discarded.
pub struct CommandSlot<'a> {
    table: &'a OutstandingTable,
    opcode: Opcode,
    id: u64,
    rx: Option<oneshot::Receiver<ReceiveBuffer>>,
}

impl CommandSlot<'_> {
    /// Makes the command resolvable. Called right before its packet is written.
    pub(crate) fn arm(&mut self) -> Result<(), Error> {
        self.rx = Some(self.table.arm(self.opcode, self.id)?);
        Ok(())
    }

    pub(crate) async fn response(&mut self) -> Result<ReceiveBuffer, Error> {
        match self.rx.as_mut() {
            Some(rx) => rx.await.map_err(|_| Error::EventLoopClosed),
            None => Err(Error::EventLoopClosed)
        }
    }
}

impl Drop for CommandSlot<'_> {
    fn drop(&mut self) {
        self.table.remove(self.opcode, self.id);
    }
}

/// Writes commands to the transport and correlates them with their responses.
pub struct CommandDispatcher<T> {
    transport: Arc<T>,
    send_lock: tokio::sync::Mutex<()>,
    credits: Arc<CreditCounter>,
    table: Arc<OutstandingTable>,
    log: Arc<LogWriter>,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: Arc<T>, credits: Arc<CreditCounter>, table: Arc<OutstandingTable>, log: Arc<LogWriter>) -> Self {
        Self {
            transport,
            send_lock: tokio::sync::Mutex::new(()),
            credits,
            table,
            log,
        }
    }

    /// Sends the command in `buffer` and waits at most `timeout` for its response.
    ///
    /// Returns the return parameters of the Command Complete event, or the status
    /// of the Command Status event, starting with the status byte. The buffer stays
    /// with the caller on every path.
    pub async fn run(&self, opcode: Opcode, buffer: &mut CommandBuffer, timeout: Duration) -> Result<ReceiveBuffer, Error> {
        self.run_until(opcode, buffer, Instant::now() + timeout).await
    }

    pub async fn run_until(&self, opcode: Opcode, buffer: &mut CommandBuffer, deadline: Instant) -> Result<ReceiveBuffer, Error> {
        ensure!(buffer.opcode() == Some(opcode), Error::InvalidArgument("buffer was prepared for a different opcode"));
        let packet = buffer.finish()?;
        match timeout_at(deadline, self.execute(opcode, packet)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Command {:?} timed out", opcode);
                self.log.write(PacketType::SystemNote, Bytes::from(format!("Timeout: {:?}", opcode)));
                Err(Error::Timeout(opcode))
            }
        }
    }

    async fn execute(&self, opcode: Opcode, packet: &[u8]) -> Result<ReceiveBuffer, Error> {
        let mut slot = self.table.reserve(opcode).await?;
        {
            let _guard = self.send_lock.lock().await;
            let credit = self.credits.take().await?;
            slot.arm()?;
            trace!("Sending {:?} ({} bytes)", opcode, packet.len());
            self.log.write(PacketType::Command, Bytes::copy_from_slice(packet));
            self.transport.write_command(packet).await?;
            credit.spend();
        }
        slot.response().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use bytes::Bytes;
    use tokio::time::timeout;
    use super::*;
    use crate::hci::buffer::Priority;
    use crate::hci::OpcodeGroup;
    use crate::host::channel::channel_transport;

    const RESET: Opcode = Opcode::new(OpcodeGroup::HciControl, 0x0003);
    const READ_BD_ADDR: Opcode = Opcode::new(OpcodeGroup::InfoParams, 0x0009);

    fn params(data: &'static [u8]) -> ReceiveBuffer {
        ReceiveBuffer::from_payload(Bytes::from_static(data))
    }

    async fn armed(table: &OutstandingTable, opcode: Opcode) -> CommandSlot<'_> {
        let mut slot = table.reserve(opcode).await.unwrap();
        slot.arm().unwrap();
        slot
    }

    #[tokio::test]
    async fn resolve_delivers_to_the_matching_slot() {
        let table = OutstandingTable::new(2);
        let mut reset = armed(&table, RESET).await;
        let mut addr = armed(&table, READ_BD_ADDR).await;
        assert_eq!(table.len(), 2);

        assert!(table.resolve(READ_BD_ADDR, params(&[0x00, 1, 2, 3, 4, 5, 6])));
        assert!(table.resolve(RESET, params(&[0x00])));
        assert_eq!(reset.response().await.unwrap().as_slice(), &[0x00]);
        assert_eq!(addr.response().await.unwrap().as_slice(), &[0x00, 1, 2, 3, 4, 5, 6]);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_late_responses_are_ignored() {
        let table = OutstandingTable::new(1);
        assert!(!table.resolve(RESET, params(&[0x00])));

        let slot = armed(&table, RESET).await;
        assert!(table.is_pending(RESET));
        drop(slot);
        assert!(!table.is_pending(RESET));
        assert!(!table.resolve(RESET, params(&[0x00])));
    }

    #[tokio::test]
    async fn unsent_commands_cannot_be_resolved() {
        let table = OutstandingTable::new(1);
        let mut slot = table.reserve(RESET).await.unwrap();
        assert!(!table.resolve(RESET, params(&[0x0C])));
        assert!(table.is_pending(RESET));

        slot.arm().unwrap();
        assert!(table.resolve(RESET, params(&[0x00])));
        assert_eq!(slot.response().await.unwrap().as_slice(), &[0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_opcode_waits_for_the_pending_command() {
        let table = OutstandingTable::new(4);
        let first = table.reserve(RESET).await.unwrap();
        assert!(timeout(Duration::from_millis(10), table.reserve(RESET)).await.is_err());
        let _other = table.reserve(READ_BD_ADDR).await.unwrap();

        drop(first);
        let _second = timeout(Duration::from_millis(10), table.reserve(RESET)).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_slot_does_not_remove_its_successor() {
        let table = OutstandingTable::new(1);
        let first = armed(&table, RESET).await;
        let first_id = first.id;
        table.resolve(RESET, params(&[0x00]));
        drop(first);

        let second = table.reserve(RESET).await.unwrap();
        table.remove(RESET, first_id);
        assert!(table.is_pending(RESET));
        drop(second);
    }

    #[tokio::test]
    async fn close_fails_waiters() {
        let table = Arc::new(OutstandingTable::new(1));
        let mut slot = armed(&table, RESET).await;

        let queued = tokio::spawn({
            let table = table.clone();
            async move { table.reserve(READ_BD_ADDR).await.map(drop) }
        });
        tokio::task::yield_now().await;
        assert!(!queued.is_finished());

        table.close();
        assert!(matches!(slot.response().await, Err(Error::EventLoopClosed)));
        assert!(matches!(queued.await.unwrap(), Err(Error::EventLoopClosed)));
        assert!(matches!(table.reserve(RESET).await, Err(Error::EventLoopClosed)));
    }

    #[tokio::test]
    async fn buffer_must_match_the_opcode() {
        let (transport, _controller) = channel_transport();
        let dispatcher = CommandDispatcher::new(
            Arc::new(transport),
            Arc::new(CreditCounter::new(1)),
            Arc::new(OutstandingTable::new(1)),
            Arc::new(LogWriter::disabled()));
        let mut buffer = CommandBuffer::new(Priority::Low);
        buffer.begin(READ_BD_ADDR);
        let result = dispatcher.run(RESET, &mut buffer, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
