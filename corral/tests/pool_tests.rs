// Integration tests for corral::thread::ThreadPool

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use corral::thread::{IdlePolicy, PoolError, ThreadPool, ThreadPoolConfig};
use corral::{NamedWork, PoolEvent, PoolStatistics};
use tracing_subscriber::registry::Registry;

use common::{count_events, wait_until, FlakySpawner, Gate, RecordingMonitor};

const PATIENCE: Duration = Duration::from_secs(10);

#[test]
fn test_every_item_runs_exactly_once() {
    let pool = ThreadPool::bounded(2, 8, Duration::from_secs(1)).unwrap();
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..500).map(|_| AtomicUsize::new(0)).collect());

    for i in 0..500 {
        let runs = runs.clone();
        pool.execute(move || {
            runs[i].fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    assert!(wait_until(PATIENCE, || pool.processed_count() == 500));
    assert!(runs.iter().all(|r| r.load(Ordering::SeqCst) == 1));
    assert_eq!(pool.snapshot().total_work_items_added, 500);
    pool.shutdown();
}

#[test]
fn test_single_worker_preserves_submission_order() {
    let pool = ThreadPool::bounded(1, 1, Duration::from_secs(1)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let order = order.clone();
        pool.execute(move || order.lock().unwrap().push(i)).unwrap();
    }

    assert!(wait_until(PATIENCE, || pool.processed_count() == 50));
    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
    pool.shutdown();
}

#[test]
fn test_growth_never_exceeds_max() {
    let pool = ThreadPool::bounded(1, 3, Duration::from_secs(1)).unwrap();
    let gate = Gate::new();

    for _ in 0..10 {
        let gate = gate.clone();
        pool.execute(move || gate.wait()).unwrap();
        assert!(pool.current_thread_count() <= 3);
    }

    let saturated = wait_until(PATIENCE, || pool.busy_thread_count() == 3);
    let current = pool.current_thread_count();
    gate.open();

    assert!(saturated);
    assert_eq!(current, 3);
    assert!(wait_until(PATIENCE, || pool.processed_count() == 10));
    assert!(pool.current_thread_count() <= 3);
    pool.shutdown();
}

#[test]
fn test_minimum_threads_started_eagerly() {
    let pool = ThreadPool::bounded(3, 5, Duration::from_secs(1)).unwrap();
    assert_eq!(pool.current_thread_count(), 3);
    assert_eq!(pool.min_threads(), 3);
    assert_eq!(pool.max_threads(), Some(5));
    assert!(wait_until(PATIENCE, || pool.available_thread_count() == 3));
    assert_eq!(pool.busy_thread_count(), 0);
    pool.shutdown();
}

#[test]
fn test_average_before_any_work() {
    let pool = ThreadPool::bounded(0, 2, Duration::from_secs(1)).unwrap();
    assert_eq!(pool.average_completion_time_millis(), 0);
    assert_eq!(pool.processed_count(), 0);

    let stats: &dyn PoolStatistics = &pool;
    assert_eq!(stats.average_completion_time_millis(), 0);
    assert_eq!(stats.busy_thread_count(), 0);
    pool.shutdown();
}

#[test]
fn test_shutdown_joins_every_worker() {
    let monitor = RecordingMonitor::new();
    let config = ThreadPoolConfig::bounded(2, 6, Duration::from_secs(30)).with_name("draining");
    let pool = ThreadPool::with_monitor(config, monitor.clone()).unwrap();

    for _ in 0..12 {
        pool.execute(|| thread::sleep(Duration::from_millis(20))).unwrap();
    }
    assert!(wait_until(PATIENCE, || pool.processed_count() == 12));

    // Idle workers are parked for 30s; shutdown must not wait that out.
    let started = Instant::now();
    pool.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(pool.current_thread_count(), 0);
    assert_eq!(pool.available_thread_count(), 0);
    assert!(pool.is_shutdown());

    let events = monitor.take();
    let spawned = count_events(&events, |e| matches!(e, PoolEvent::WorkerStarted { .. }));
    let exited = count_events(&events, |e| matches!(e, PoolEvent::WorkerExited { .. }));
    assert!(spawned >= 2);
    assert_eq!(spawned, exited);
    assert_eq!(count_events(&events, |e| *e == PoolEvent::ShutdownComplete), 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let monitor = RecordingMonitor::new();
    let pool = ThreadPool::with_monitor(
        ThreadPoolConfig::bounded(1, 2, Duration::from_secs(1)),
        monitor.clone(),
    )
    .unwrap();

    pool.shutdown();
    pool.shutdown();
    drop(pool);

    let events = monitor.take();
    assert_eq!(count_events(&events, |e| *e == PoolEvent::ShutdownComplete), 1);
}

#[test]
fn test_bounded_scenario_six_long_items() {
    let pool = ThreadPool::bounded(2, 4, Duration::from_millis(2000)).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..6 {
        let done = done.clone();
        let work = NamedWork::new(format!("long-{}", i), move || {
            thread::sleep(Duration::from_millis(500));
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        pool.submit(work).unwrap();
    }

    let mut max_current = 0;
    let mut max_busy = 0;
    let drained = wait_until(PATIENCE, || {
        let snapshot = pool.snapshot();
        max_current = max_current.max(snapshot.current_threads);
        max_busy = max_busy.max(snapshot.busy_threads);
        snapshot.processed_count == 6 && snapshot.busy_threads == 0
    });

    assert!(drained);
    assert_eq!(done.load(Ordering::SeqCst), 6);
    assert!(max_current <= 4);
    assert!(max_busy >= 2 && max_busy <= 4);
    assert!(pool.average_completion_time_millis() > 0);

    let started = Instant::now();
    pool.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pool.current_thread_count(), 0);
}

#[test]
fn test_failing_and_panicking_work_keeps_worker_alive() {
    let monitor = RecordingMonitor::new();
    let pool = ThreadPool::with_monitor(
        ThreadPoolConfig::bounded(1, 1, Duration::from_secs(1)).with_name("faulty"),
        monitor.clone(),
    )
    .unwrap();

    pool.submit(|| -> anyhow::Result<()> { Err(anyhow!("disk full")) }).unwrap();
    pool.execute(|| panic!("index out of range")).unwrap();
    pool.execute(|| {}).unwrap();

    assert!(wait_until(PATIENCE, || pool.processed_count() == 3));
    assert_eq!(pool.failed_count(), 2);
    assert_eq!(pool.current_thread_count(), 1);

    // Joining the worker guarantees every event has been pushed.
    pool.shutdown();
    let events = monitor.take();
    let failures: Vec<String> = events
        .iter()
        .filter_map(|(e, _)| match e {
            PoolEvent::WorkFailed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            "Work failed: disk full".to_string(),
            "Work panicked: index out of range".to_string()
        ]
    );
    assert_eq!(count_events(&events, |e| matches!(e, PoolEvent::WorkCompleted { .. })), 1);
    // Only the one worker ever started: nothing was respawned after the panic.
    assert_eq!(count_events(&events, |e| matches!(e, PoolEvent::WorkerStarted { .. })), 1);
}

#[test]
fn test_failed_creation_leaves_phantom_threads() {
    let monitor = RecordingMonitor::new();
    let spawner = FlakySpawner::always_failing();
    let pool = ThreadPool::with_spawner(
        ThreadPoolConfig::bounded(0, 4, Duration::from_secs(1)).with_name("starved"),
        spawner.clone(),
        Some(monitor.clone()),
    )
    .unwrap();

    for _ in 0..6 {
        pool.execute(|| {}).unwrap();
    }

    // Each failed attempt still counts one thread, until max stops new attempts.
    assert_eq!(spawner.calls(), 4);
    assert_eq!(pool.current_thread_count(), 4);
    assert_eq!(pool.available_thread_count(), 0);
    assert_eq!(pool.busy_thread_count(), 4);
    assert_eq!(pool.pending_count(), 6);

    let events = monitor.take();
    assert_eq!(
        count_events(&events, |e| matches!(e, PoolEvent::WorkerCreationFailed { .. })),
        4
    );

    pool.shutdown();
    assert_eq!(pool.current_thread_count(), 4);
    assert_eq!(pool.pending_count(), 0);
}

#[test]
fn test_phantom_from_min_threads_failure() {
    let spawner = FlakySpawner::always_failing();
    let pool = ThreadPool::with_spawner(
        ThreadPoolConfig::bounded(2, 2, Duration::from_secs(1)),
        spawner.clone(),
        None,
    )
    .unwrap();

    assert_eq!(spawner.calls(), 2);
    assert_eq!(pool.current_thread_count(), 2);
    pool.shutdown();
}

#[test]
fn test_pool_recovers_after_transient_creation_failure() {
    let spawner = FlakySpawner::failing_first(1);
    let pool = ThreadPool::with_spawner(
        ThreadPoolConfig::bounded(0, 2, Duration::from_secs(1)),
        spawner.clone(),
        None,
    )
    .unwrap();

    pool.execute(|| {}).unwrap();
    assert_eq!(pool.current_thread_count(), 1);
    pool.execute(|| {}).unwrap();

    assert_eq!(spawner.calls(), 2);
    assert!(wait_until(PATIENCE, || pool.processed_count() == 2));
    assert_eq!(pool.current_thread_count(), 2);

    pool.shutdown();
    // The real worker released its slot; the phantom one never will.
    assert_eq!(pool.current_thread_count(), 1);
}

#[test]
fn test_retire_policy_shrinks_to_min() {
    let monitor = RecordingMonitor::new();
    let config = ThreadPoolConfig::bounded(1, 4, Duration::from_millis(100))
        .with_name("elastic")
        .with_idle_policy(IdlePolicy::Retire);
    let pool = ThreadPool::with_monitor(config, monitor.clone()).unwrap();

    for _ in 0..8 {
        pool.execute(|| thread::sleep(Duration::from_millis(100))).unwrap();
    }
    assert!(wait_until(PATIENCE, || pool.processed_count() == 8));

    assert!(wait_until(PATIENCE, || pool.current_thread_count() == 1));
    thread::sleep(Duration::from_millis(400));
    assert_eq!(pool.current_thread_count(), 1);

    pool.shutdown();
    assert_eq!(pool.current_thread_count(), 0);

    let events = monitor.take();
    let retired = count_events(&events, |e| {
        matches!(e, PoolEvent::WorkerExited { retired: true, .. })
    });
    let closed = count_events(&events, |e| {
        matches!(e, PoolEvent::WorkerExited { retired: false, .. })
    });
    assert!(retired >= 1);
    assert_eq!(closed, 1);
}

#[test]
fn test_keep_alive_policy_never_shrinks() {
    let pool = ThreadPool::bounded(1, 4, Duration::from_millis(100)).unwrap();
    assert_eq!(pool.idle_policy(), IdlePolicy::KeepAlive);

    for _ in 0..8 {
        pool.execute(|| thread::sleep(Duration::from_millis(100))).unwrap();
    }
    assert!(wait_until(PATIENCE, || pool.processed_count() == 8));

    let grown = pool.current_thread_count();
    assert!(grown > 1);
    thread::sleep(Duration::from_millis(500));
    assert_eq!(pool.current_thread_count(), grown);
    pool.shutdown();
}

#[test]
fn test_bounded_queue_rejects_when_full() {
    let config = ThreadPoolConfig::bounded(1, 1, Duration::from_secs(1)).with_max_pending(2);
    let pool = ThreadPool::new(config).unwrap();
    let gate = Gate::new();

    let blocker = gate.clone();
    pool.execute(move || blocker.wait()).unwrap();
    let picked_up = wait_until(PATIENCE, || pool.busy_thread_count() == 1 && pool.pending_count() == 0);

    pool.execute(|| {}).unwrap();
    pool.execute(|| {}).unwrap();
    let rejected = pool.execute(|| {});
    gate.open();

    assert!(picked_up);
    assert_eq!(rejected, Err(PoolError::QueueFull { capacity: 2 }));
    assert!(wait_until(PATIENCE, || pool.processed_count() == 3));
    pool.shutdown();
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let pool = ThreadPool::bounded(1, 2, Duration::from_secs(1)).unwrap();
    pool.shutdown();

    assert_eq!(pool.execute(|| {}), Err(PoolError::ShutDown));
    assert_eq!(pool.submit(|| -> anyhow::Result<()> { Ok(()) }).unwrap_err().to_string(), "Thread pool is shut down");
    assert_eq!(pool.snapshot().total_work_items_added, 0);
}

#[test]
fn test_invalid_bounds_rejected_at_construction() {
    assert!(matches!(
        ThreadPool::bounded(4, 2, Duration::from_secs(1)),
        Err(PoolError::InvalidConfig(_))
    ));
    assert!(matches!(
        ThreadPool::bounded(0, 0, Duration::from_secs(1)),
        Err(PoolError::InvalidConfig(_))
    ));
}

#[test]
fn test_workers_are_named_after_pool() {
    let pool = ThreadPool::new(ThreadPoolConfig::fixed(1).with_name("named")).unwrap();
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    pool.execute(move || {
        *slot.lock().unwrap() = thread::current().name().map(str::to_string);
    })
    .unwrap();

    assert!(wait_until(PATIENCE, || pool.processed_count() == 1));
    let name = seen.lock().unwrap().clone().unwrap();
    assert!(name.starts_with("p: named; w: "), "unexpected thread name {}", name);
    pool.shutdown();
}

#[test]
fn test_workers_log_through_dispatcher_captured_at_construction() {
    let dispatch = tracing::Dispatch::new(tracing_subscriber::registry());
    let pool = tracing::dispatcher::with_default(&dispatch, || {
        ThreadPool::bounded(0, 1, Duration::from_secs(1)).unwrap()
    });

    // Submitted from a thread with no subscriber of its own.
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    pool.execute(move || {
        let is_registry = tracing::dispatcher::get_default(|d| d.is::<Registry>());
        *slot.lock().unwrap() = Some(is_registry);
    })
    .unwrap();

    assert!(wait_until(PATIENCE, || pool.processed_count() == 1));
    assert_eq!(*seen.lock().unwrap(), Some(true));
    pool.shutdown();
}

#[test]
fn test_unbounded_pool_grows_on_demand() {
    let pool = ThreadPool::unbounded();
    let gate = Gate::new();

    for _ in 0..6 {
        let gate = gate.clone();
        pool.execute(move || gate.wait()).unwrap();
    }
    let all_busy = wait_until(PATIENCE, || pool.busy_thread_count() == 6);
    gate.open();

    assert!(all_busy);
    assert!(wait_until(PATIENCE, || pool.processed_count() == 6));
    pool.shutdown();
    assert_eq!(pool.current_thread_count(), 0);
}

#[test]
fn test_sequential_work_reuses_idle_worker() {
    let pool = ThreadPool::bounded(1, 4, Duration::from_secs(1)).unwrap();
    assert!(wait_until(PATIENCE, || pool.available_thread_count() == 1));

    for i in 0..20u64 {
        pool.execute(|| thread::sleep(Duration::from_millis(2))).unwrap();
        assert!(wait_until(PATIENCE, || {
            pool.processed_count() == i + 1 && pool.available_thread_count() == 1
        }));
    }

    // Every item found the minimum worker idle, so the pool never grew.
    assert_eq!(pool.current_thread_count(), 1);
    pool.shutdown();
}

#[test]
fn test_huge_idle_timeout_still_runs_work() {
    let pool = ThreadPool::bounded(0, 2, Duration::MAX).unwrap();
    pool.execute(|| {}).unwrap();
    assert!(wait_until(PATIENCE, || pool.processed_count() == 1));

    let started = Instant::now();
    pool.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pool.current_thread_count(), 0);
}
