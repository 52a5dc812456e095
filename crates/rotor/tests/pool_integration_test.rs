//! Integration tests for WorkerPool
//!
//! Run with: cargo test -p rotor --test pool_integration_test

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use rotor::prelude::*;

type ProgramResult = std::result::Result<Box<dyn Program>, ProgramError>;

fn echo_runtime(_source: &str) -> ProgramResult {
    Ok(Box::new(|msg: Envelope, out: &Outbox| {
        out.reply(&msg, msg.data.clone());
    }))
}

async fn next(pool: &mut WorkerPool) -> PoolEvent {
    tokio::time::timeout(Duration::from_secs(5), pool.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

async fn started(mut pool: WorkerPool, scripts: &[WorkerScript]) -> WorkerPool {
    pool.initialize(scripts).await.unwrap();
    assert!(next(&mut pool).await.is_ready());
    pool
}

/// Blocks executor threads until opened
#[derive(Clone, Default)]
struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

fn record(calls: &Calls, name: &'static str) -> impl FnOnce(Value) + Send + 'static {
    let calls = Arc::clone(calls);
    move |data| calls.lock().unwrap().push((name, data))
}

// ============================================
// Dispatch
// ============================================

#[test_log::test(tokio::test)]
async fn test_three_submissions_on_two_threads() {
    let mut pool = started(WorkerPool::new(PoolConfig::new(2), echo_runtime), &[]).await;

    let slots: Vec<usize> = ["A", "B", "C"]
        .into_iter()
        .map(|d| pool.submit(json!(d)).unwrap())
        .collect();
    assert_eq!(slots, vec![0, 1, 0]);

    let mut seen = Vec::new();
    for _ in 0..3 {
        match next(&mut pool).await {
            PoolEvent::Message { slot, data } => seen.push((slot, data)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    seen.sort_by_key(|(_, d)| d.as_str().map(str::to_string));
    assert_eq!(
        seen,
        vec![(0, json!("A")), (1, json!("B")), (0, json!("C"))]
    );
}

#[test_log::test(tokio::test)]
async fn test_kth_submission_goes_to_k_minus_one_mod_n() {
    for n in 1..=5 {
        let mut pool = started(WorkerPool::new(PoolConfig::new(n), echo_runtime), &[]).await;
        for k in 1..=(2 * n + 1) {
            let slot = if k % 2 == 0 {
                pool.submit(json!(k)).unwrap()
            } else {
                pool.submit_with_callback(json!(k), |_| {}).unwrap().slot
            };
            assert_eq!(slot, (k - 1) % n, "n={n} k={k}");
        }
        pool.teardown();
    }
}

#[test_log::test(tokio::test)]
async fn test_single_thread_pool_always_uses_slot_zero() {
    let mut pool = started(WorkerPool::new(PoolConfig::new(1), echo_runtime), &[]).await;
    for i in 0..5 {
        assert_eq!(pool.submit(json!(i)).unwrap(), 0);
    }
    for i in 0..5 {
        assert_eq!(
            next(&mut pool).await,
            PoolEvent::Message {
                slot: 0,
                data: json!(i)
            }
        );
    }
}

// ============================================
// Correlation
// ============================================

#[test_log::test(tokio::test)]
async fn test_out_of_order_replies_fire_matching_callbacks() {
    let gate = Gate::default();
    let runtime = {
        let gate = gate.clone();
        move |_: &str| -> ProgramResult {
            let gate = gate.clone();
            Ok(Box::new(move |msg: Envelope, out: &Outbox| {
                if msg.data == json!("x") {
                    gate.wait();
                }
                let reply = format!("{}!", msg.data.as_str().unwrap_or_default().to_uppercase());
                out.reply(&msg, json!(reply));
            }))
        }
    };
    let mut pool = started(WorkerPool::new(PoolConfig::new(2), runtime), &[]).await;

    let calls: Calls = Arc::default();
    let x = pool
        .submit_with_callback(json!("x"), record(&calls, "cb1"))
        .unwrap();
    let y = pool
        .submit_with_callback(json!("y"), record(&calls, "cb2"))
        .unwrap();
    assert_eq!((x.run_id.get(), y.run_id.get()), (1, 2));
    assert_eq!((x.slot, y.slot), (0, 1));

    assert_eq!(next(&mut pool).await.data(), Some(&json!("Y!")));
    assert_eq!(*calls.lock().unwrap(), vec![("cb2", json!("Y!"))]);

    gate.open();
    assert_eq!(next(&mut pool).await.data(), Some(&json!("X!")));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("cb2", json!("Y!")), ("cb1", json!("X!"))]
    );
    assert_eq!(pool.pending_callbacks(), 0);
}

#[test_log::test(tokio::test)]
async fn test_duplicate_reply_fires_once_but_emits_twice() {
    let runtime = |_: &str| -> ProgramResult {
        Ok(Box::new(|msg: Envelope, out: &Outbox| {
            out.reply(&msg, json!("first"));
            out.reply(&msg, json!("second"));
        }))
    };
    let mut pool = started(WorkerPool::new(PoolConfig::new(1), runtime), &[]).await;

    let calls: Calls = Arc::default();
    pool.submit_with_callback(json!(null), record(&calls, "cb"))
        .unwrap();

    assert_eq!(next(&mut pool).await.data(), Some(&json!("first")));
    assert_eq!(next(&mut pool).await.data(), Some(&json!("second")));
    assert_eq!(*calls.lock().unwrap(), vec![("cb", json!("first"))]);
}

#[test_log::test(tokio::test)]
async fn test_unmatched_replies_still_emit_unwrapped_payload() {
    let runtime = |_: &str| -> ProgramResult {
        Ok(Box::new(|msg: Envelope, out: &Outbox| {
            out.post(json!({"runId": 999, "data": {"stray": msg.data}}));
            out.post(json!({"data": "plain"}));
            out.post(json!({"runId": "bogus", "data": "dropped"}));
            out.post(json!(["not", "an", "envelope"]));
            out.post(json!({"data": "last"}));
        }))
    };
    let mut pool = started(WorkerPool::new(PoolConfig::new(1), runtime), &[]).await;

    let calls: Calls = Arc::default();
    pool.submit_with_callback(json!(1), record(&calls, "cb"))
        .unwrap();

    assert_eq!(next(&mut pool).await.data(), Some(&json!({"stray": 1})));
    assert_eq!(next(&mut pool).await.data(), Some(&json!("plain")));
    assert_eq!(next(&mut pool).await.data(), Some(&json!("last")));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(pool.pending_callbacks(), 1);
}

#[test_log::test(tokio::test)]
async fn test_run_ids_strictly_increase() {
    let mut pool = started(WorkerPool::new(PoolConfig::new(3), echo_runtime), &[]).await;
    let mut last = 0;
    for i in 0..20 {
        if i % 3 == 0 {
            pool.submit(json!(i)).unwrap();
            continue;
        }
        let run_id = pool.submit_with_callback(json!(i), |_| {}).unwrap().run_id.get();
        assert!(run_id > last);
        last = run_id;
    }
}

// ============================================
// Event sink
// ============================================

#[test_log::test(tokio::test)]
async fn test_passive_listener_sees_ready_and_messages() {
    let mut pool = WorkerPool::new(PoolConfig::new(2), echo_runtime);
    let mut listener = pool.subscribe();

    pool.initialize(&[]).await.unwrap();
    assert_eq!(
        listener.recv().await.unwrap(),
        PoolEvent::Ready { thread_count: 2 }
    );

    pool.submit(json!("hello")).unwrap();
    let pulled = next(&mut pool).await;
    assert!(pulled.is_ready());
    let pulled = next(&mut pool).await;

    let heard = listener.recv().await.unwrap();
    assert_eq!(heard, pulled);
    assert_eq!(heard.data(), Some(&json!("hello")));
}

#[test_log::test(tokio::test)]
async fn test_listener_alone_does_not_receive_messages() {
    let mut pool = WorkerPool::new(PoolConfig::new(1), echo_runtime);
    let mut listener = pool.subscribe();
    pool.initialize(&[]).await.unwrap();
    assert!(listener.recv().await.unwrap().is_ready());

    pool.submit(json!("unpulled")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(listener.try_recv().is_err());

    assert!(next(&mut pool).await.is_ready());
    let pulled = next(&mut pool).await;
    assert_eq!(listener.recv().await.unwrap(), pulled);
}

// ============================================
// Lifecycle
// ============================================

#[test_log::test(tokio::test)]
async fn test_teardown_then_submit_fails() {
    let mut pool = started(WorkerPool::new(PoolConfig::new(2), echo_runtime), &[]).await;
    let calls: Calls = Arc::default();
    pool.submit_with_callback(json!(1), record(&calls, "cb"))
        .unwrap();

    pool.teardown();
    pool.teardown();

    assert_eq!(pool.status(), PoolStatus::Terminated);
    assert!(matches!(pool.submit(json!(2)), Err(PoolError::PoolNotReady)));
    assert!(pool.next_event().await.is_none());
    assert!(calls.lock().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_teardown_discards_queued_work() {
    let gate = Gate::default();
    let executed = Arc::new(Mutex::new(0usize));

    let (runtime_gate, runtime_count) = (gate.clone(), Arc::clone(&executed));
    let runtime = move |_: &str| -> ProgramResult {
        let gate = runtime_gate.clone();
        let count = Arc::clone(&runtime_count);
        Ok(Box::new(move |_msg: Envelope, _out: &Outbox| {
            gate.wait();
            *count.lock().unwrap() += 1;
        }))
    };
    let mut pool = started(WorkerPool::new(PoolConfig::new(1), runtime), &[]).await;

    for i in 0..10 {
        pool.submit(json!(i)).unwrap();
    }
    pool.teardown();
    gate.open();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let ran = *executed.lock().unwrap();
    assert!(ran <= 1, "{ran} messages ran after teardown");
}

#[test_log::test(tokio::test)]
async fn test_reinitialize_after_teardown() {
    let mut pool = started(WorkerPool::new(PoolConfig::new(2), echo_runtime), &[]).await;
    pool.submit(json!("a")).unwrap();
    pool.teardown();

    let mut pool = started(pool, &[]).await;
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.submit(json!("b")).unwrap(), 0);
    assert_eq!(next(&mut pool).await.data(), Some(&json!("b")));
}

#[test_log::test(tokio::test)]
async fn test_dead_executor_keeps_its_turn() {
    let runtime = |_: &str| -> ProgramResult {
        Ok(Box::new(|msg: Envelope, out: &Outbox| {
            if msg.data == json!("crash") {
                panic!("executor crashed");
            }
            out.reply(&msg, msg.data.clone());
        }))
    };
    let mut pool = started(WorkerPool::new(PoolConfig::new(2), runtime), &[]).await;

    assert_eq!(pool.submit(json!("crash")).unwrap(), 0);
    for _ in 0..200 {
        if pool.executors()[0].is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(pool.executors()[0].is_finished());
    assert_eq!(pool.executors()[0].state(), rotor::ExecutorState::Faulted);
    assert_eq!(pool.executors()[1].state(), rotor::ExecutorState::Ready);

    let calls: Calls = Arc::default();
    assert_eq!(pool.submit(json!("a")).unwrap(), 1);
    let lost = pool
        .submit_with_callback(json!("b"), record(&calls, "lost"))
        .unwrap();
    assert_eq!(lost.slot, 0);
    assert_eq!(pool.submit(json!("c")).unwrap(), 1);

    assert_eq!(next(&mut pool).await.data(), Some(&json!("a")));
    assert_eq!(next(&mut pool).await.data(), Some(&json!("c")));
    assert!(pool.try_next_event().is_none());
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(pool.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_every_executor_runs_the_same_concatenation() {
    let runtime = |source: &str| -> ProgramResult {
        let source = source.to_string();
        Ok(Box::new(move |msg: Envelope, out: &Outbox| {
            out.reply(&msg, json!(source));
        }))
    };
    let scripts = [
        WorkerScript::inline("let a = 1;"),
        WorkerScript::inline("let b = 2;"),
    ];
    let mut pool = started(WorkerPool::new(PoolConfig::new(3), runtime), &scripts).await;

    for i in 0..3 {
        pool.submit(json!(i)).unwrap();
    }
    for _ in 0..3 {
        assert_eq!(
            next(&mut pool).await.data(),
            Some(&json!("let a = 1;let b = 2;"))
        );
    }
}
