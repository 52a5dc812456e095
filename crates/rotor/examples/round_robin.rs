//! Round-robin demo
//!
//! Run with: cargo run -p rotor --example round_robin
//!
//! Configure via environment variables (or a `.env` file):
//! - `ROTOR_THREAD_COUNT`: number of executors (default: 2)
//! - `RUST_LOG`: log filter (default: "info")

use anyhow::{Context, Result};
use serde_json::json;

use rotor::prelude::*;
use rotor::telemetry::{init_telemetry, TelemetryConfig};

/// Each executor upper-cases what it receives and prefixes the source text
fn shouting_runtime(source: &str) -> std::result::Result<Box<dyn Program>, ProgramError> {
    if source.trim().is_empty() {
        return Err(ProgramError::new("empty program"));
    }
    let prefix = source.trim().to_string();
    Ok(Box::new(move |msg: Envelope, out: &Outbox| {
        let text = msg.data.as_str().unwrap_or_default().to_uppercase();
        out.reply(
            &msg,
            json!({ "from": out.slot(), "text": format!("{prefix} {text}") }),
        );
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry(TelemetryConfig::from_env());

    let config = PoolConfig::from_env();
    let mut pool = WorkerPool::new(config, shouting_runtime);
    pool.initialize(&[WorkerScript::inline("worker says:")])
        .await
        .context("Failed to start executor pool")?;

    let mut expected = 0;
    for word in ["alpha", "beta", "gamma"] {
        let slot = pool.submit(json!(word))?;
        tracing::info!(word, slot, "Submitted");
        expected += 1;
    }
    for word in ["delta", "epsilon"] {
        let submission = pool.submit_with_callback(json!(word), move |reply| {
            println!("callback for {word}: {reply}");
        })?;
        tracing::info!(word, slot = submission.slot, run_id = %submission.run_id, "Submitted with callback");
        expected += 1;
    }

    while expected > 0 {
        match pool.next_event().await {
            Some(PoolEvent::Ready { thread_count }) => println!("pool ready with {thread_count} executors"),
            Some(PoolEvent::Message { slot, data }) => {
                println!("message from {slot}: {data}");
                expected -= 1;
            }
            None => break,
        }
    }

    pool.teardown();
    Ok(())
}
