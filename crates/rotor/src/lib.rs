//! # Rotor
//!
//! A fixed pool of isolated executor threads fed in strict round-robin order,
//! with optional one-shot callbacks correlated through run ids.
//!
//! ## Features
//!
//! - **Positional dispatch**: the k-th submission goes to slot `(k - 1) % N`
//! - **Reply correlation**: callback-bearing submissions carry a run id that
//!   executors echo back; each callback fires at most once
//! - **Single event stream**: every reply is republished as a
//!   [`PoolEvent::Message`], correlated or not
//! - **Shared program**: every executor runs the same program built from the
//!   concatenation of all supplied scripts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │   submit / submit_with_callback          next_event          │
//! │        │                                      ▲              │
//! │        ▼                                      │              │
//! │  ┌────────────┐  ┌────────────┐      ┌─────────────────┐     │
//! │  │ Correlator │─►│ Dispatcher │      │ Correlator      │     │
//! │  │ (run ids)  │  │ (cursor)   │      │ resolve ► Sink  │     │
//! │  └────────────┘  └─────┬──────┘      └────────▲────────┘     │
//! └────────────────────────┼──────────────────────┼──────────────┘
//!                          ▼                      │ fan-in
//!          [Executor 0] [Executor 1] ... [Executor N-1]
//!           (thread)     (thread)          (thread)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rotor::prelude::*;
//! use serde_json::json;
//!
//! let runtime = |_source: &str| -> std::result::Result<Box<dyn Program>, ProgramError> {
//!     Ok(Box::new(|msg: Envelope, out: &Outbox| {
//!         out.reply(&msg, msg.data.clone());
//!     }))
//! };
//!
//! let mut pool = WorkerPool::new(PoolConfig::new(2), runtime);
//! pool.initialize(&[WorkerScript::inline("echo")]).await?;
//!
//! pool.submit_with_callback(json!("x"), |reply| println!("{reply}"))?;
//! while let Some(event) = pool.next_event().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod events;
pub mod executor;
pub mod pool;
pub mod runtime;
pub mod source;
pub mod telemetry;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::PoolConfig;
    pub use crate::envelope::{Envelope, RunId};
    pub use crate::error::{PoolError, Result};
    pub use crate::events::PoolEvent;
    pub use crate::pool::{PoolStatus, Submission, WorkerPool};
    pub use crate::runtime::{Outbox, Program, ProgramError, Runtime};
    pub use crate::source::{DefaultSourceLoader, SourceLoader, SourceLocation, WorkerScript};
}

// Re-export key types at crate root
pub use config::PoolConfig;
pub use correlator::{Callback, Correlator};
pub use dispatcher::Dispatcher;
pub use envelope::{Envelope, MalformedReply, Reply, RunId};
pub use error::{PoolError, Result};
pub use events::{EventSink, PoolEvent};
pub use executor::{ExecutorHandle, ExecutorState};
pub use pool::{PoolStatus, Submission, WorkerPool};
pub use runtime::{Outbox, Program, ProgramError, Runtime};
pub use source::{
    resolve_scripts, DefaultSourceLoader, LoadError, SourceLoader, SourceLocation, WorkerScript,
};
