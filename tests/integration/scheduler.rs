//! Scheduler registry integration tests.
//!
//! Tests that verify submission, lookup, progress aggregation and event
//! delivery through the public scheduler handle.

use std::sync::Arc;
use std::time::Duration;
use taskloom::testing::{FailingTask, PanickingTask, RecordingHandler, SleepTask};
use taskloom::{
    ConfigLoader, Event, ResultTask, SchedulerError, Task, TaskHandle, TaskOutcome, TaskScheduler,
    TaskState, TaskUid,
};

use crate::common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_independent_tasks_finish() {
    let (handle, join) = common::start_scheduler(4);

    for uid in ["one", "two", "three"] {
        let task = SleepTask::task(uid, Duration::from_millis(20));
        handle.submit(TaskHandle::new(task), uid).await.unwrap();
    }
    assert_eq!(handle.all_handles().await.unwrap().len(), 3);

    common::wait_for_idle(&handle, Duration::from_secs(5)).await;

    for uid in ["one", "two", "three"] {
        assert_eq!(handle.state(uid).await.unwrap(), TaskState::Finished);
        assert!(handle.find(uid).await.unwrap().is_none());
    }
    assert!(handle.all_handles().await.unwrap().is_empty());

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_uid_keeps_first_task() {
    let (handle, join) = common::start_scheduler(4);

    let first = SleepTask::task("first", Duration::from_millis(100));
    handle
        .submit(TaskHandle::new(Arc::clone(&first)), "segmentation")
        .await
        .unwrap();

    let second = SleepTask::task("second", Duration::from_millis(1));
    let err = handle
        .submit(TaskHandle::new(Arc::clone(&second)), "segmentation")
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateTask(_)));

    handle.wait("segmentation").await.unwrap();
    assert_eq!(first.state(), TaskState::Finished);
    assert_eq!(second.state(), TaskState::Idle);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generated_uids_are_unique() {
    let (handle, join) = common::start_scheduler(4);

    let mut submitted = Vec::new();
    for i in 0..5 {
        let uid = TaskUid::generate();
        let task = SleepTask::task(format!("gen-{}", i), Duration::from_millis(5));
        handle
            .submit(TaskHandle::new(Arc::clone(&task)), uid.clone())
            .await
            .unwrap();
        submitted.push((uid, task));
    }
    for (uid, task) in submitted {
        handle.wait(uid).await.unwrap();
        assert_eq!(task.state(), TaskState::Finished);
    }

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_result_task_through_scheduler() {
    let (handle, join) = common::start_scheduler(2);

    let lengths = ResultTask::from_fn("centerline_length", |ctx, slot| async move {
        ctx.add_steps(3);
        let total: f64 = [1.5, 2.0, 0.5].iter().sum();
        ctx.complete_steps(3);
        slot.set(total);
        Ok(TaskOutcome::finished("measured"))
    });
    handle
        .submit(TaskHandle::new(Arc::clone(lengths.task())), "length")
        .await
        .unwrap();

    handle.wait("length").await.unwrap();
    assert_eq!(lengths.task().state(), TaskState::Finished);
    assert_eq!(lengths.result(), Some(&4.0));
    assert_eq!(lengths.task().last_message(), "measured");

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_task_is_reported_as_failure() {
    common::init_tracing();
    let scheduler = TaskScheduler::new(ConfigLoader::parse("worker_threads: 2").unwrap());
    let recorder = RecordingHandler::new();
    scheduler.event_bus().register(recorder.clone()).await;
    let (handle, join) = scheduler.start();

    let task = PanickingTask::task("explode", "invalid mesh");
    handle
        .submit(
            TaskHandle::new(Arc::clone(&task)).with_description("Meshing"),
            "explode",
        )
        .await
        .unwrap();
    handle.wait("explode").await.unwrap();
    assert_eq!(task.state(), TaskState::Failed);

    let reported = recorder.reported_failures().await;
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("invalid mesh"));

    let events = recorder.events().await;
    assert!(events.iter().any(|event| matches!(
        event,
        Event::TaskFailureReported { description, .. } if description == "Meshing"
    )));

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_aggregates_across_tasks() {
    common::init_tracing();
    let config = ConfigLoader::parse("worker_threads: 4\nreset_progress_when_idle: false").unwrap();
    let (handle, join) = TaskScheduler::new(config).start();

    for (uid, steps) in [("a", 2u64), ("b", 5u64)] {
        let task = Task::from_fn(uid, move |ctx| async move {
            ctx.add_steps(steps);
            for _ in 0..steps {
                ctx.complete_steps(1);
            }
            Ok(TaskOutcome::finished(""))
        });
        handle.submit(TaskHandle::new(task), uid).await.unwrap();
    }
    let failing = FailingTask::task("c", "no input");
    handle
        .submit(TaskHandle::new(failing).with_silent_failure(true), "c")
        .await
        .unwrap();

    common::wait_for_idle(&handle, Duration::from_secs(5)).await;

    let progress = handle.progress().await.unwrap();
    assert_eq!(progress.steps_total, 7);
    assert_eq!(progress.steps_made, 7);
    assert_eq!(progress.active_tasks, 0);
    assert_eq!(progress.fraction(), 1.0);

    common::stop(handle, join).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_events_carry_handle_counters() {
    common::init_tracing();
    let scheduler = TaskScheduler::new(ConfigLoader::parse("worker_threads: 2").unwrap());
    let recorder = RecordingHandler::new();
    scheduler.event_bus().register(recorder.clone()).await;
    let (handle, join) = scheduler.start();

    let task = Task::from_fn("steps", |ctx| async move {
        ctx.add_steps(2);
        ctx.complete_steps(1);
        ctx.complete_steps(1);
        Ok(TaskOutcome::finished(""))
    });
    handle.submit(TaskHandle::new(task), "steps").await.unwrap();
    handle.wait("steps").await.unwrap();

    let progress: Vec<(u64, u64)> = recorder
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
        .collect();
    assert_eq!(progress, vec![(0, 2), (1, 2), (2, 2)]);

    common::stop(handle, join).await;
}
