//! Cancellation and shutdown integration tests.
//!
//! Tests that verify cancellation reaches running tasks, queued tasks and
//! composite children, and that shutdown drains the registry.

use std::sync::Arc;
use std::time::Duration;
use taskloom::testing::{CooperativeTask, SleepTask};
use taskloom::{CompositeTask, Sequential, TaskHandle, TaskState};

use crate::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_sequential_composite_cancels_children() {
    let (handle, join) = common::start_scheduler(4);

    let children = vec![
        CooperativeTask::task("first", Duration::from_secs(10)),
        CooperativeTask::task("second", Duration::from_secs(10)),
    ];
    let composite =
        CompositeTask::new(&handle, Sequential::new(children.clone())).into_task("long");
    handle
        .submit(TaskHandle::new(Arc::clone(&composite)), "long")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(children[0].state(), TaskState::Running);

    assert!(handle.cancel("long").await.unwrap());
    handle.wait("long").await.unwrap();
    assert_eq!(composite.state(), TaskState::Cancelled);
    assert_eq!(children[0].state(), TaskState::Cancelled);
    assert_eq!(children[1].state(), TaskState::Cancelled);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_before_dispatch_never_runs() {
    let (handle, join) = common::start_scheduler(4);

    let task = SleepTask::task("skipped", Duration::from_millis(10));
    task.cancel();
    assert_eq!(task.state(), TaskState::Cancelling);

    handle
        .submit(TaskHandle::new(Arc::clone(&task)), "skipped")
        .await
        .unwrap();
    handle.wait("skipped").await.unwrap();
    assert_eq!(task.state(), TaskState::Cancelled);
    assert_eq!(handle.state("skipped").await.unwrap(), TaskState::Finished);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_after_finish_is_noop() {
    let (handle, join) = common::start_scheduler(4);

    let task = SleepTask::task("quick", Duration::from_millis(1));
    handle
        .submit(TaskHandle::new(Arc::clone(&task)), "quick")
        .await
        .unwrap();
    handle.wait("quick").await.unwrap();

    assert!(!handle.cancel("quick").await.unwrap());
    task.cancel();
    assert_eq!(task.state(), TaskState::Finished);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_cancels_everything() {
    let (handle, join) = common::start_scheduler(2);

    let tasks: Vec<_> = (0..4)
        .map(|i| CooperativeTask::task(format!("spin-{}", i), Duration::from_secs(10)))
        .collect();
    for (i, task) in tasks.iter().enumerate() {
        handle
            .submit(TaskHandle::new(Arc::clone(task)), format!("spin-{}", i))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    common::stop(handle, join).await;

    for task in &tasks {
        assert_eq!(task.state(), TaskState::Cancelled);
    }
}
