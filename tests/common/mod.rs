//! Common test utilities shared across integration tests.

use std::sync::Once;
use std::time::Duration;
use taskloom::{SchedulerConfig, SchedulerHandle, TaskScheduler};
use tokio::task::JoinHandle;

static TRACING: Once = Once::new();

/// Install a tracing subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Start a scheduler with a fixed pool size.
pub fn start_scheduler(workers: usize) -> (SchedulerHandle, JoinHandle<()>) {
    init_tracing();
    let config = SchedulerConfig::default()
        .with_worker_threads(workers)
        .with_shutdown_timeout(Duration::from_secs(5));
    TaskScheduler::new(config).start()
}

/// Wait until the scheduler registry is empty, polling every 10ms.
///
/// # Panics
///
/// Panics if tasks are still registered when the timeout is reached.
pub async fn wait_for_idle(handle: &SchedulerHandle, timeout: Duration) {
    let start = tokio::time::Instant::now();
    loop {
        let progress = handle.progress().await.unwrap();
        if progress.active_tasks == 0 {
            return;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for scheduler to go idle, {} task(s) still registered",
                progress.active_tasks
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Shut the scheduler down and wait for its loop to exit.
pub async fn stop(handle: SchedulerHandle, join: JoinHandle<()>) {
    handle.shutdown().await.unwrap();
    join.await.unwrap();
}
