use std::pin::pin;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::ensure;
use crate::hci::Error;

/// Number of commands the controller is currently willing to accept
/// (`Num_HCI_Command_Packets`, [Vol 4] Part E, Section 4.4).
#[derive(Debug)]
pub struct CreditCounter {
    state: Mutex<CreditState>,
    granted: Notify,
}

#[derive(Debug)]
struct CreditState {
    credits: u8,
    closed: bool,
}

impl CreditCounter {
    pub fn new(initial: u8) -> Self {
        Self {
            state: Mutex::new(CreditState { credits: initial, closed: false }),
            granted: Notify::new(),
        }
    }

    pub fn available(&self) -> u8 {
        self.state.lock().credits
    }

    /// Replaces the counter with the value reported by the controller.
    /// The reported value is absolute, not a delta.
    pub fn set(&self, credits: u8) {
        let previous = std::mem::replace(&mut self.state.lock().credits, credits);
        if previous != credits {
            trace!("Command credits: {} -> {}", previous, credits);
        }
        if credits > 0 {
            self.granted.notify_waiters();
        }
    }

    /// Consumes a credit if there is one.
    pub fn try_take(&self) -> Result<Option<CreditPermit<'_>>, Error> {
        let mut state = self.state.lock();
        ensure!(!state.closed, Error::EventLoopClosed);
        Ok(state.credits.checked_sub(1).map(|remaining| {
            state.credits = remaining;
            CreditPermit { counter: self, spent: false }
        }))
    }

    /// Waits until a credit is available and consumes it.
    pub async fn take(&self) -> Result<CreditPermit<'_>, Error> {
        loop {
            let mut granted = pin!(self.granted.notified());
            granted.as_mut().enable();
            if let Some(permit) = self.try_take()? {
                return Ok(permit);
            }
            trace!("Out of command credits, waiting for the controller");
            granted.await;
        }
    }

    /// Gives back a credit that was taken for a packet that never reached the controller.
    pub fn refund(&self) {
        {
            let mut state = self.state.lock();
            state.credits = state.credits.saturating_add(1);
        }
        self.granted.notify_waiters();
    }

    /// Fails current and future waiters with [`Error::EventLoopClosed`].
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.granted.notify_waiters();
    }
}

/// A taken credit. Unless [`CreditPermit::spend`] is called, dropping it
/// returns the credit, so a write that failed or was cancelled does not leak it.
#[derive(Debug)]
#[must_use]
pub struct CreditPermit<'a> {
    counter: &'a CreditCounter,
    spent: bool,
}

impl CreditPermit<'_> {
    /// Marks the credit as used by a packet that reached the controller.
    pub fn spend(mut self) {
        self.spent = true;
    }
}

impl Drop for CreditPermit<'_> {
    fn drop(&mut self) {
        if !self.spent {
            trace!("Returning unused command credit");
            self.counter.refund();
        }
    }
}
