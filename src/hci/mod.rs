pub mod consts;
mod error;
pub mod buffer;
pub mod events;
mod commands;
pub mod pool;
pub mod credits;
pub mod dispatcher;
mod event_loop;
pub mod btsnoop;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender as MpscSender};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error};

use crate::ensure;
use crate::hci::btsnoop::LogWriter;
use crate::hci::buffer::{Priority, ReceiveBuffer};
use crate::hci::consts::EventCode;
use crate::hci::credits::CreditCounter;
use crate::hci::dispatcher::{CommandDispatcher, OutstandingTable};
use crate::hci::event_loop::{Demultiplexer, EventLoopCommand};
use crate::hci::events::FromEvent;
use crate::hci::pool::{BufferPool, PoolConfig, PooledBuffer};
use crate::host::Transport;

pub use commands::*;
pub use error::*;
pub use event_loop::Event;

/// Settings of an [`Hci`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct HciConfig {
    /// Deadline for a command that does not specify its own.
    pub command_timeout: Duration,
    /// How many commands may wait for their response at the same time.
    pub max_outstanding: usize,
    /// Credits assumed before the controller reports any.
    pub initial_credits: u8,
    pub pool: PoolConfig,
    /// Where to write a btsnoop capture. Falls back to `$BTSNOOP_LOG`.
    pub btsnoop_log: Option<PathBuf>,
    pub reset_on_start: bool,
}

impl Default for HciConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(1),
            max_outstanding: 1,
            initial_credits: 1,
            pool: PoolConfig::default(),
            btsnoop_log: None,
            reset_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HciBuilder {
    config: HciConfig,
}

impl HciBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: HciConfig) -> Self {
        Self { config }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.config.max_outstanding = max_outstanding;
        self
    }

    pub fn with_initial_credits(mut self, credits: u8) -> Self {
        self.config.initial_credits = credits;
        self
    }

    pub fn with_pool_config(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn with_btsnoop_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.btsnoop_log = Some(path.into());
        self
    }

    pub fn with_reset_on_start(mut self, reset: bool) -> Self {
        self.config.reset_on_start = reset;
        self
    }

    pub fn config(&self) -> &HciConfig {
        &self.config
    }

    /// Starts the event loop on `transport` and, unless disabled, resets the controller.
    pub async fn spawn<T: Transport>(self, transport: T) -> Result<Hci<T>, Error> {
        let config = self.config;
        let transport = Arc::new(transport);
        let credits = Arc::new(CreditCounter::new(config.initial_credits));
        let table = Arc::new(OutstandingTable::new(config.max_outstanding));
        let log = Arc::new(LogWriter::new(config.btsnoop_log));

        let (ctl_out, ctl_in) = unbounded_channel();
        let demux = Demultiplexer::new(credits.clone(), table.clone());
        let event_loop = spawn(event_loop::event_loop(transport.clone(), demux, ctl_in, log.clone()));
        let hci = Hci {
            dispatcher: CommandDispatcher::new(transport, credits.clone(), table.clone(), log.clone()),
            pool: BufferPool::new(config.pool),
            credits,
            table,
            ctl_out,
            command_timeout: config.command_timeout,
            log,
            event_loop: Mutex::new(Some(event_loop)),
        };

        if config.reset_on_start {
            // Reset after allowing the event loop to discard any unexpected events
            sleep(Duration::from_millis(100)).await;
            debug!("HCI reset...");
            hci.reset().await?;
        }

        Ok(hci)
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CallOptions {
    pub priority: Priority,
    /// Replaces [`HciConfig::command_timeout`] for this call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn high_priority() -> Self {
        Self::default().with_priority(Priority::High)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Command interface to a controller.
pub struct Hci<T: Transport> {
    dispatcher: CommandDispatcher<T>,
    pool: BufferPool,
    credits: Arc<CreditCounter>,
    table: Arc<OutstandingTable>,
    ctl_out: MpscSender<EventLoopCommand>,
    command_timeout: Duration,
    log: Arc<LogWriter>,
    event_loop: Mutex<Option<JoinHandle<()>>>
}

impl<T: Transport> Hci<T> {
    pub async fn new(transport: T) -> Result<Self, Error> {
        HciBuilder::default().spawn(transport).await
    }

    pub fn register_event_handler(&self, events: impl Into<BTreeSet<EventCode>>, handler: MpscSender<Event>) -> Result<(), Error> {
        let events = events.into();
        ensure!(!events.is_empty(), Error::InvalidArgument("no events to subscribe to"));
        ensure!(!events.contains(&EventCode::CommandComplete) && !events.contains(&EventCode::CommandStatus),
            Error::InvalidArgument("command responses are delivered to the issuing call"));
        self.ctl_out.send(EventLoopCommand::RegisterHciEventHandler {
            events,
            handler
        }).map_err(|_| Error::EventLoopClosed)
    }

    /// Executes a command with raw parameters and returns the raw return parameters,
    /// status byte included.
    pub async fn run(&self, opcode: Opcode, params: &[u8], options: CallOptions) -> Result<ReceiveBuffer, Error> {
        let deadline = self.deadline(&options);
        let mut buffer = self.acquire_until(opcode, options.priority, deadline).await?;
        buffer.begin(opcode).params_mut().put_slice(params);
        let result = self.dispatcher.run_until(opcode, &mut buffer, deadline).await;
        let released = buffer.release();
        let resp = result?;
        released?;
        Ok(resp)
    }

    pub async fn call<R: FromEvent>(&self, cmd: Opcode) -> Result<R, Error> {
        self.call_with_args(cmd, |_| {}).await
    }

    pub async fn call_with_args<R: FromEvent>(&self, cmd: Opcode, packer: impl FnOnce(&mut BytesMut)) -> Result<R, Error> {
        self.call_with_options(cmd, CallOptions::default(), packer).await
    }

    /// Executes a command, checks the returned status and decodes the remaining
    /// return parameters. The deadline also covers waiting for a command buffer.
    pub async fn call_with_options<R: FromEvent>(&self, cmd: Opcode, options: CallOptions, packer: impl FnOnce(&mut BytesMut)) -> Result<R, Error> {
        let deadline = self.deadline(&options);
        let mut buffer = self.acquire_until(cmd, options.priority, deadline).await?;
        packer(buffer.begin(cmd).params_mut());
        let result = self.dispatcher.run_until(cmd, &mut buffer, deadline).await;
        let released = buffer.release();
        let mut resp = result?;
        released?;

        check_status(&mut resp)?;
        let result = R::unpack(&mut resp)?;
        resp.finish()?;
        Ok(result)
    }

    fn deadline(&self, options: &CallOptions) -> Instant {
        Instant::now() + options.timeout.unwrap_or(self.command_timeout)
    }

    async fn acquire_until(&self, opcode: Opcode, priority: Priority, deadline: Instant) -> Result<PooledBuffer, Error> {
        ensure!(!self.ctl_out.is_closed(), Error::EventLoopClosed);
        timeout_at(deadline, self.pool.acquire(priority))
            .await
            .map_err(|_| {
                debug!("No command buffer for {:?} before the deadline", opcode);
                Error::Timeout(opcode)
            })
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Credits most recently reported by the controller, minus the ones used since.
    pub fn credits(&self) -> u8 {
        self.credits.available()
    }

    /// Number of commands waiting for their response.
    pub fn outstanding(&self) -> usize {
        self.table.len()
    }

    /// Stops the event loop. Commands still waiting fail with [`Error::EventLoopClosed`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        let event_loop = self.event_loop.lock().take();
        if let Some(event_loop) = event_loop {
            // The loop may already be gone if the transport closed
            let _ = self.ctl_out.send(EventLoopCommand::Shutdown);
            event_loop.await.map_err(|_| Error::EventLoopClosed)?;
            self.log.close();
        } else {
            error!("Another thread already called shutdown");
        }
        Ok(())
    }

}

impl<T: Transport> Drop for Hci<T> {
    fn drop(&mut self) {
        if let Some(event_loop) = self.event_loop.get_mut().take() {
            event_loop.abort();
        }
    }
}
