//! Programs run by executors
//!
//! A [`Runtime`] turns the pool's concatenated source text into one
//! [`Program`] per executor. Each program lives on its own thread and talks to
//! the control side only through its [`Outbox`].

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::envelope::Envelope;

/// Failure to build a program from source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProgramError {
    pub message: String,
}

impl ProgramError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Code running inside one executor
pub trait Program: Send {
    /// Handle one message posted to this executor
    fn on_message(&mut self, message: Envelope, outbox: &Outbox);
}

impl<F> Program for F
where
    F: FnMut(Envelope, &Outbox) + Send,
{
    fn on_message(&mut self, message: Envelope, outbox: &Outbox) {
        self(message, outbox)
    }
}

/// Builds programs from source text
///
/// Called once per executor slot with the same source.
pub trait Runtime: Send + Sync {
    fn instantiate(&self, source: &str) -> Result<Box<dyn Program>, ProgramError>;
}

impl<F> Runtime for F
where
    F: Fn(&str) -> Result<Box<dyn Program>, ProgramError> + Send + Sync,
{
    fn instantiate(&self, source: &str) -> Result<Box<dyn Program>, ProgramError> {
        self(source)
    }
}

/// Raw reply as received on the fan-in channel
#[derive(Debug)]
pub(crate) struct RawReply {
    pub slot: usize,
    pub value: Value,
}

/// Reply path from an executor back to the pool
#[derive(Debug, Clone)]
pub struct Outbox {
    slot: usize,
    tx: mpsc::UnboundedSender<RawReply>,
}

impl Outbox {
    pub(crate) fn new(slot: usize, tx: mpsc::UnboundedSender<RawReply>) -> Self {
        Self { slot, tx }
    }

    /// Slot of the executor this outbox belongs to
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Post a raw reply of any shape
    ///
    /// Returns false once the pool has been torn down.
    pub fn post(&self, value: Value) -> bool {
        self.tx
            .send(RawReply {
                slot: self.slot,
                value,
            })
            .is_ok()
    }

    /// Reply to a request, echoing its run id
    pub fn reply(&self, request: &Envelope, data: Value) -> bool {
        match request.reply(data).into_value() {
            Ok(value) => self.post(value),
            Err(e) => {
                warn!(slot = self.slot, error = %e, "Reply could not be serialized");
                false
            }
        }
    }
}
