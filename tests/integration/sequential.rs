//! Sequential tag integration tests.
//!
//! Tests that verify tasks sharing a tag never overlap and start in
//! submission order, while untagged and differently tagged tasks run
//! concurrently.

use std::sync::Arc;
use std::time::Duration;
use taskloom::testing::{FailingTask, IntervalLog};
use taskloom::{SequentialTag, TaskHandle, TaskState};

use crate::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_tag_runs_fifo_without_overlap() {
    let (handle, join) = common::start_scheduler(4);
    let log = IntervalLog::new();

    let names = ["load", "segment", "mesh", "export"];
    for name in names {
        let task = log.sleep_task(name, Duration::from_millis(25));
        handle
            .submit(TaskHandle::new(task).with_sequential_tag(1), name)
            .await
            .unwrap();
    }
    common::wait_for_idle(&handle, Duration::from_secs(5)).await;

    let order: Vec<String> = log.intervals().into_iter().map(|i| i.name).collect();
    assert_eq!(order, names);
    assert_eq!(log.max_overlap(), 1);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_untagged_tasks_overlap_tagged_ones() {
    let (handle, join) = common::start_scheduler(4);
    let log = IntervalLog::new();

    let tagged = log.sleep_task("tagged", Duration::from_millis(80));
    let free = log.sleep_task("free", Duration::from_millis(80));
    handle
        .submit(TaskHandle::new(tagged).with_sequential_tag(5), "tagged")
        .await
        .unwrap();
    handle
        .submit(TaskHandle::new(free).with_sequential_tag(SequentialTag::NONE), "free")
        .await
        .unwrap();
    common::wait_for_idle(&handle, Duration::from_secs(5)).await;

    assert!(log.overlapped("tagged", "free"));

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_releases_tag() {
    let (handle, join) = common::start_scheduler(4);
    let log = IntervalLog::new();

    let failing = FailingTask::task("broken", "bad header");
    let next = log.sleep_task("next", Duration::from_millis(5));
    handle
        .submit(
            TaskHandle::new(Arc::clone(&failing)).with_sequential_tag(2),
            "broken",
        )
        .await
        .unwrap();
    handle
        .submit(
            TaskHandle::new(Arc::clone(&next)).with_sequential_tag(2),
            "next",
        )
        .await
        .unwrap();

    handle.wait("broken").await.unwrap();
    handle.wait("next").await.unwrap();
    assert_eq!(failing.state(), TaskState::Failed);
    assert_eq!(next.state(), TaskState::Finished);
    assert_eq!(log.intervals().len(), 1);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queued_task_reports_idle_until_dispatched() {
    let (handle, join) = common::start_scheduler(4);
    let log = IntervalLog::new();

    let head = log.sleep_task("head", Duration::from_millis(100));
    let tail = log.sleep_task("tail", Duration::from_millis(5));
    handle
        .submit(TaskHandle::new(head).with_sequential_tag(9), "head")
        .await
        .unwrap();
    handle
        .submit(
            TaskHandle::new(Arc::clone(&tail)).with_sequential_tag(9),
            "tail",
        )
        .await
        .unwrap();

    assert_eq!(handle.state("tail").await.unwrap(), TaskState::Idle);
    let queued = handle.find("tail").await.unwrap().unwrap();
    assert_eq!(queued.sequential_tag(), SequentialTag::new(9));

    handle.wait("tail").await.unwrap();
    assert_eq!(tail.state(), TaskState::Finished);
    assert!(!log.overlapped("head", "tail"));

    common::stop(handle, join).await;
}
