// Shared helpers for the corral integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use corral::thread::{OsThreadSpawner, WorkerBody, WorkerSpawner};
use corral::{PoolEvent, PoolMonitor, PoolSnapshot};
use crossbeam_queue::SegQueue;

/// Polls `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Monitor that records every pushed event.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: SegQueue<(PoolEvent, PoolSnapshot)>,
}

impl RecordingMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drains everything recorded so far.
    pub fn take(&self) -> Vec<(PoolEvent, PoolSnapshot)> {
        let mut out = Vec::new();
        while let Some(entry) = self.events.pop() {
            out.push(entry);
        }
        out
    }
}

impl PoolMonitor for RecordingMonitor {
    fn on_event(&self, _pool: &str, event: &PoolEvent, snapshot: &PoolSnapshot) {
        self.events.push((event.clone(), *snapshot));
    }
}

pub fn count_events(events: &[(PoolEvent, PoolSnapshot)], pred: impl Fn(&PoolEvent) -> bool) -> usize {
    events.iter().filter(|(e, _)| pred(e)).count()
}

/// Spawner whose first `failures` calls fail like an exhausted OS would.
#[derive(Debug)]
pub struct FlakySpawner {
    failures: AtomicUsize,
    calls: AtomicUsize,
    inner: OsThreadSpawner,
}

impl FlakySpawner {
    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            inner: OsThreadSpawner::new(),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for FlakySpawner {
    fn spawn(&self, name: String, body: WorkerBody) -> io::Result<JoinHandle<()>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"));
        }
        self.inner.spawn(name, body)
    }
}

/// A latch work items block on until the test opens it.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}
