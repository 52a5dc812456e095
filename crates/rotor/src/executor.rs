//! Executor handles
//!
//! One handle per pool slot. The handle owns a dedicated OS thread running a
//! single [`Program`]; messages go in through an unbounded inbox and replies
//! leave through the shared fan-in channel. Terminating a handle raises its
//! shutdown flag: the thread finishes at most the message it is running and
//! discards whatever is still queued.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::envelope::Envelope;
use crate::error::{PoolError, Result};
use crate::runtime::{Outbox, Program, RawReply};

/// Executor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Accepting messages
    Ready,
    /// Thread exited on its own, usually because the program panicked
    Faulted,
    /// Shut down by the pool
    Terminated,
}

/// Handle to one isolated executor
pub struct ExecutorHandle {
    slot: usize,
    state: ExecutorState,
    inbox: Option<mpsc::UnboundedSender<Envelope>>,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl ExecutorHandle {
    /// Spawn the executor thread for `slot`
    pub(crate) fn spawn(
        slot: usize,
        thread_name: String,
        mut program: Box<dyn Program>,
        replies: mpsc::UnboundedSender<RawReply>,
    ) -> Result<Self> {
        let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<Envelope>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let outbox = Outbox::new(slot, replies);

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                debug!(slot, "Executor started");
                while let Some(message) = inbox_rx.blocking_recv() {
                    if *shutdown_rx.borrow() {
                        let mut discarded = 1;
                        while inbox_rx.try_recv().is_ok() {
                            discarded += 1;
                        }
                        debug!(slot, discarded, "Executor shut down with queued work");
                        return;
                    }
                    program.on_message(message, &outbox);
                }
                debug!(slot, "Executor exited");
            })
            .map_err(|e| PoolError::spawn(slot, e))?;

        Ok(Self {
            slot,
            state: ExecutorState::Ready,
            inbox: Some(inbox_tx),
            shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current state, reporting `Faulted` once the thread has died
    pub fn state(&self) -> ExecutorState {
        match self.state {
            ExecutorState::Ready if self.is_finished() => ExecutorState::Faulted,
            state => state,
        }
    }

    /// Post a message to the executor
    ///
    /// Fails with `ExecutorFault` if the executor is terminated or its thread
    /// has died.
    pub(crate) fn post(&self, message: Envelope) -> Result<()> {
        let inbox = self.inbox.as_ref().ok_or_else(|| self.fault("terminated"))?;
        trace!(slot = self.slot, run_id = ?message.run_id, "Posting to executor");
        inbox
            .send(message)
            .map_err(|_| self.fault("executor thread is gone"))
    }

    /// Raise the shutdown flag and close the inbox
    ///
    /// The thread finishes at most the message it is running, then discards
    /// its backlog and exits. Returns false if the handle was already
    /// terminated.
    pub(crate) fn terminate(&mut self) -> bool {
        if self.state == ExecutorState::Terminated {
            return false;
        }
        // Flag first so the thread never picks up queued work after waking.
        self.shutdown_tx.send_replace(true);
        self.inbox = None;
        // Detached: a program blocked inside on_message cannot be interrupted.
        self.thread = None;
        self.state = ExecutorState::Terminated;
        debug!(slot = self.slot, "Executor terminated");
        true
    }

    /// Whether the executor thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    fn fault(&self, reason: &str) -> PoolError {
        PoolError::ExecutorFault {
            slot: self.slot,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("slot", &self.slot)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}
