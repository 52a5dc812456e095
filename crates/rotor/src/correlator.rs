//! Run-id correlation of replies to one-shot callbacks

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::envelope::{Reply, RunId};
use crate::error::{PoolError, Result};

/// One-shot reply callback
pub type Callback = Box<dyn FnOnce(Value) + Send + 'static>;

/// Owns the run-id counter and the in-flight callback table
///
/// Run ids start at 1 and only ever increase for the lifetime of the value.
#[derive(Default)]
pub struct Correlator {
    last_run_id: u64,
    callbacks: HashMap<RunId, Callback>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next run id and store `callback` under it
    pub fn register(&mut self, callback: Callback) -> Result<RunId> {
        let next = self
            .last_run_id
            .checked_add(1)
            .ok_or(PoolError::RunIdsExhausted)?;
        self.last_run_id = next;

        let run_id = RunId::new(next);
        self.callbacks.insert(run_id, callback);
        Ok(run_id)
    }

    /// Fire the callback for a correlated reply, at most once
    ///
    /// Returns the stripped payload for the event sink and whether a callback
    /// was invoked. Unknown run ids are not an error.
    pub fn resolve(&mut self, reply: Reply) -> (Value, bool) {
        match reply {
            Reply::Correlated { run_id, data } => match self.callbacks.remove(&run_id) {
                Some(callback) => {
                    debug!(%run_id, "Invoking reply callback");
                    callback(data.clone());
                    (data, true)
                }
                None => {
                    debug!(%run_id, "No callback pending for run id");
                    (data, false)
                }
            },
            Reply::Uncorrelated { data } => (data, false),
        }
    }

    /// Drop every pending callback without invoking it
    pub fn abandon_all(&mut self) -> usize {
        let count = self.callbacks.len();
        self.callbacks.clear();
        count
    }

    /// Callbacks still waiting for a reply
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_pending(&self, run_id: RunId) -> bool {
        self.callbacks.contains_key(&run_id)
    }

    /// Last issued run id, if any
    pub fn last_run_id(&self) -> Option<RunId> {
        (self.last_run_id > 0).then(|| RunId::new(self.last_run_id))
    }

    #[cfg(test)]
    fn with_last_run_id(last_run_id: u64) -> Self {
        Self {
            last_run_id,
            callbacks: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("last_run_id", &self.last_run_id)
            .field("pending", &self.callbacks.len())
            .finish()
    }
}
