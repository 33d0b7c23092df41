//! Composite task integration tests.
//!
//! Tests that verify composites submitted through the scheduler, with each
//! execution strategy driving children on the shared pool.

use std::sync::Arc;
use std::time::Duration;
use taskloom::testing::{FailingTask, IntervalLog, RecordingHandler, SleepTask};
use taskloom::{
    CompositeTask, ConfigLoader, Event, ResourceConstrained, RunAll, Sequential, TaskHandle,
    TaskScheduler, TaskState,
};

use crate::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_all_with_failed_child_finishes_with_message() {
    let (handle, join) = common::start_scheduler(4);

    let children = vec![
        SleepTask::task("a", Duration::from_millis(10)),
        FailingTask::task("b", "boom"),
        SleepTask::task("c", Duration::from_millis(10)),
    ];
    let composite = CompositeTask::new(&handle, RunAll::new(children.clone())).into_task("batch");
    handle
        .submit(TaskHandle::new(Arc::clone(&composite)), "batch")
        .await
        .unwrap();

    handle.wait("batch").await.unwrap();
    assert_eq!(composite.state(), TaskState::Finished);
    assert!(composite.last_message().contains("boom"));
    assert_eq!(children[0].state(), TaskState::Finished);
    assert_eq!(children[1].state(), TaskState::Failed);
    assert_eq!(children[2].state(), TaskState::Finished);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_composite_preserves_order() {
    let (handle, join) = common::start_scheduler(4);
    let log = IntervalLog::new();

    let names = ["read", "filter", "write"];
    let children = names
        .iter()
        .map(|name| log.sleep_task(*name, Duration::from_millis(15)))
        .collect();
    let composite = CompositeTask::new(&handle, Sequential::new(children)).into_task("pipeline");
    handle
        .submit(TaskHandle::new(Arc::clone(&composite)), "pipeline")
        .await
        .unwrap();

    handle.wait("pipeline").await.unwrap();
    assert_eq!(composite.state(), TaskState::Finished);
    let order: Vec<String> = log.intervals().into_iter().map(|i| i.name).collect();
    assert_eq!(order, names);
    assert_eq!(log.max_overlap(), 1);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resource_constrained_respects_cap_and_conflicts() {
    let (handle, join) = common::start_scheduler(6);
    let log = IntervalLog::new();

    let strategy = ResourceConstrained::new()
        .with_max_concurrency(2)
        .with_task(log.sleep_task("r0", Duration::from_millis(40)), [0])
        .with_task(log.sleep_task("r0-again", Duration::from_millis(40)), [0])
        .with_task(log.sleep_task("r1", Duration::from_millis(40)), [1])
        .with_task(log.sleep_task("r2", Duration::from_millis(40)), [2]);
    let composite = CompositeTask::new(&handle, strategy).into_task("constrained");
    handle
        .submit(TaskHandle::new(Arc::clone(&composite)), "constrained")
        .await
        .unwrap();

    handle.wait("constrained").await.unwrap();
    assert_eq!(composite.state(), TaskState::Finished);
    assert_eq!(log.intervals().len(), 4);
    assert!(log.max_overlap() <= 2);
    assert!(!log.overlapped("r0", "r0-again"));

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_composite_progress_counts_children() {
    common::init_tracing();
    let scheduler = TaskScheduler::new(ConfigLoader::parse("worker_threads: 4").unwrap());
    let recorder = RecordingHandler::new();
    scheduler.event_bus().register(recorder.clone()).await;
    let (handle, join) = scheduler.start();

    let children = vec![
        SleepTask::task("a", Duration::from_millis(5)),
        SleepTask::task("b", Duration::from_millis(5)),
    ];
    let composite = CompositeTask::new(&handle, RunAll::new(children)).into_task("pair");
    handle
        .submit(TaskHandle::new(composite), "pair")
        .await
        .unwrap();
    handle.wait("pair").await.unwrap();

    let last_progress = recorder
        .events()
        .await
        .into_iter()
        .filter_map(|event| match event {
            Event::TaskProgress {
                steps_made,
                steps_total,
                ..
            } => Some((steps_made, steps_total)),
            _ => None,
        })
        .last();
    assert_eq!(last_progress, Some((2, 2)));

    common::stop(handle, join).await;
}
