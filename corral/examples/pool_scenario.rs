// Runs six slow items through a bounded pool and prints its statistics as it
// grows and drains.
//
//     cargo run --example pool_scenario

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use corral::logging;
use corral::thread::{LoggingMonitor, ThreadPool, ThreadPoolConfig};
use corral::NamedWork;

fn main() -> anyhow::Result<()> {
    logging::init_development();

    let config = ThreadPoolConfig::bounded(2, 4, Duration::from_millis(2000)).with_name("scenario");
    let pool = ThreadPool::with_monitor(config, Arc::new(LoggingMonitor::with_snapshots()))?;

    for i in 0..6 {
        pool.submit(NamedWork::new(format!("report-{}", i), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        }))?;
    }

    let started = Instant::now();
    loop {
        let snapshot = pool.snapshot();
        println!("{}", serde_json::to_string(&snapshot)?);
        if snapshot.processed_count == 6 && snapshot.busy_threads == 0 {
            break;
        }
        anyhow::ensure!(started.elapsed() < Duration::from_secs(30), "pool did not drain");
        thread::sleep(Duration::from_millis(100));
    }

    pool.shutdown();
    println!("threads after shutdown: {}", pool.current_thread_count());
    Ok(())
}
