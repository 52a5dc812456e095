//! Executor pool
//!
//! Owns the executors, the round-robin dispatcher, the run-id correlator and
//! the event sink. Whoever holds the `WorkerPool` is the control thread: every
//! mutation goes through `&mut self`, and callbacks fire on the task that pulls
//! events with [`WorkerPool::next_event`].

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::correlator::Correlator;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, Reply, RunId};
use crate::error::{PoolError, Result};
use crate::events::{EventSink, PoolEvent};
use crate::executor::ExecutorHandle;
use crate::runtime::{RawReply, Runtime};
use crate::source::{resolve_scripts, DefaultSourceLoader, SourceLoader, WorkerScript};

/// Pool lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Never initialized
    Uninitialized,
    /// Executors running and accepting work
    Ready,
    /// Torn down; may be initialized again
    Terminated,
}

/// Where a callback-bearing submission went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub slot: usize,
    pub run_id: RunId,
}

/// Fixed pool of executors fed in round-robin order
///
/// # Example
///
/// ```ignore
/// use rotor::prelude::*;
///
/// let mut pool = WorkerPool::new(PoolConfig::new(2), my_runtime);
/// pool.initialize(&[WorkerScript::inline(source)]).await?;
///
/// pool.submit(json!("broadcast"))?;
/// pool.submit_with_callback(json!("x"), |reply| println!("got {reply}"))?;
///
/// while let Some(event) = pool.next_event().await {
///     // Ready, then one Message per reply
/// }
///
/// pool.teardown();
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    loader: Arc<dyn SourceLoader>,
    runtime: Arc<dyn Runtime>,
    status: PoolStatus,
    executors: Vec<ExecutorHandle>,
    dispatcher: Dispatcher,
    correlator: Correlator,
    sink: EventSink,
    replies: Option<mpsc::UnboundedReceiver<RawReply>>,
    queued: VecDeque<PoolEvent>,
}

impl WorkerPool {
    /// Create an uninitialized pool using the default source loader
    pub fn new(config: PoolConfig, runtime: impl Runtime + 'static) -> Self {
        let sink = EventSink::new(config.event_capacity);
        Self {
            config,
            loader: Arc::new(DefaultSourceLoader::new()),
            runtime: Arc::new(runtime),
            status: PoolStatus::Uninitialized,
            executors: Vec::new(),
            dispatcher: Dispatcher::default(),
            correlator: Correlator::new(),
            sink,
            replies: None,
            queued: VecDeque::new(),
        }
    }

    /// Replace the source loader
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Load all scripts and start `thread_count` executors running their
    /// concatenation
    ///
    /// All or nothing: on error no executor is left running.
    #[instrument(skip(self, scripts), fields(pool_id = %self.config.pool_id))]
    pub async fn initialize(&mut self, scripts: &[WorkerScript]) -> Result<()> {
        if self.status == PoolStatus::Ready {
            return Err(PoolError::AlreadyRunning);
        }
        self.config.validate()?;

        info!(
            thread_count = self.config.thread_count,
            scripts = scripts.len(),
            "Initializing executor pool"
        );

        let source = resolve_scripts(self.loader.as_ref(), scripts)
            .await
            .map_err(|e| {
                warn!(error = %e, "Executor source unavailable");
                PoolError::from(e)
            })?;

        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let executors = self.spawn_executors(&source, reply_tx)?;

        self.dispatcher = Dispatcher::new(executors.len());
        self.executors = executors;
        self.replies = Some(reply_rx);
        self.status = PoolStatus::Ready;

        let ready = PoolEvent::Ready {
            thread_count: self.executors.len(),
        };
        self.sink.publish(ready.clone());
        self.queued.push_back(ready);

        info!(thread_count = self.executors.len(), "Executor pool ready");
        Ok(())
    }

    fn spawn_executors(
        &self,
        source: &str,
        replies: mpsc::UnboundedSender<RawReply>,
    ) -> Result<Vec<ExecutorHandle>> {
        let mut executors = Vec::with_capacity(self.config.thread_count);
        for slot in 0..self.config.thread_count {
            // Handles already in `executors` terminate on drop if this fails.
            let program = self
                .runtime
                .instantiate(source)
                .map_err(|e| PoolError::spawn(slot, e))?;
            let handle = ExecutorHandle::spawn(
                slot,
                self.config.thread_name(slot),
                program,
                replies.clone(),
            )?;
            executors.push(handle);
        }
        Ok(executors)
    }

    /// Post `data` to the next executor in rotation
    ///
    /// Returns the slot used.
    pub fn submit(&mut self, data: Value) -> Result<usize> {
        self.dispatch(Envelope::broadcast(data))
    }

    /// Post `data` with a fresh run id; `callback` fires once with the reply
    /// payload carrying that run id
    pub fn submit_with_callback<F>(&mut self, data: Value, callback: F) -> Result<Submission>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.ensure_ready()?;
        let run_id = self.correlator.register(Box::new(callback))?;
        let slot = self.dispatch(Envelope::correlated(run_id, data))?;
        Ok(Submission { slot, run_id })
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<usize> {
        self.ensure_ready()?;
        let slot = self.dispatcher.next_slot()?;
        let executor = self.executors.get(slot).ok_or(PoolError::PoolNotReady)?;

        let run_id = envelope.run_id;
        match executor.post(envelope) {
            Ok(()) => debug!(slot, ?run_id, "Dispatched to executor"),
            Err(fault) => warn!(slot, ?run_id, error = %fault, "Message lost to faulted executor"),
        }
        Ok(slot)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.status == PoolStatus::Ready && !self.executors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::PoolNotReady)
        }
    }

    /// Wait for the next event
    ///
    /// Correlated replies fire their callback before the event is returned.
    /// Returns `None` when the pool is not running or every executor is gone.
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            let raw = self.replies.as_mut()?.recv().await?;
            if let Some(event) = self.handle_reply(raw) {
                return Some(event);
            }
        }
    }

    /// Next event if one is already available
    pub fn try_next_event(&mut self) -> Option<PoolEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            let raw = self.replies.as_mut()?.try_recv().ok()?;
            if let Some(event) = self.handle_reply(raw) {
                return Some(event);
            }
        }
    }

    fn handle_reply(&mut self, raw: RawReply) -> Option<PoolEvent> {
        let slot = raw.slot;
        let reply = match Reply::parse(raw.value) {
            Ok(reply) => reply,
            Err(e) => {
                let fault = PoolError::ExecutorFault {
                    slot,
                    reason: e.to_string(),
                };
                warn!(error = %fault, "Dropping malformed reply");
                return None;
            }
        };

        let (data, fired) = self.correlator.resolve(reply);
        debug!(slot, fired, "Executor replied");

        let event = PoolEvent::Message { slot, data };
        self.sink.publish(event.clone());
        Some(event)
    }

    /// Terminate every executor and abandon pending callbacks
    ///
    /// Idempotent.
    #[instrument(skip(self), fields(pool_id = %self.config.pool_id))]
    pub fn teardown(&mut self) {
        if self.status != PoolStatus::Ready && self.executors.is_empty() {
            debug!("Teardown on empty pool");
            return;
        }

        let mut terminated = 0;
        while let Some(mut executor) = self.executors.pop() {
            if executor.terminate() {
                terminated += 1;
            }
        }
        let abandoned = self.correlator.abandon_all();

        self.replies = None;
        self.queued.clear();
        self.dispatcher = Dispatcher::default();
        self.status = PoolStatus::Terminated;

        info!(terminated, abandoned, "Executor pool torn down");
    }

    /// Listen to every event without driving correlation
    ///
    /// `Ready` is published by `initialize`, but `Message` events are only
    /// published while the owner pulls with [`WorkerPool::next_event`] or
    /// [`WorkerPool::try_next_event`]. A host that only listens here never
    /// sees a reply, and unpulled replies accumulate in the unbounded fan-in
    /// channel until teardown. Keep a task pumping `next_event` alongside any
    /// subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sink.subscribe()
    }

    pub fn status(&self) -> PoolStatus {
        self.status
    }

    /// Number of executors
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn executors(&self) -> &[ExecutorHandle] {
        &self.executors
    }

    /// Slot the next submission will go to
    pub fn next_slot(&self) -> Option<usize> {
        (self.status == PoolStatus::Ready).then(|| self.dispatcher.cursor())
    }

    /// Callbacks waiting for a reply
    pub fn pending_callbacks(&self) -> usize {
        self.correlator.pending()
    }

    pub fn pool_id(&self) -> &str {
        &self.config.pool_id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_id", &self.config.pool_id)
            .field("status", &self.status)
            .field("executors", &self.executors.len())
            .field("dispatcher", &self.dispatcher)
            .field("correlator", &self.correlator)
            .finish()
    }
}
