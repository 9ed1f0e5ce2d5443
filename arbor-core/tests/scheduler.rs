//! Integration Tests for the Flush Drivers
//!
//! These tests run the tokio driver on a `LocalSet`, where a queued flush
//! runs as soon as the synchronous frame that requested it yields, and
//! check that the driver degrades to host flushing without one.

use std::cell::Cell;
use std::rc::Rc;

use arbor_core::host::MemoryHost;
use arbor_core::renderer::create_renderer;
use arbor_core::scheduler::{self, Job};
use arbor_core::{Component, Error, FlushDriver, Record, RuntimeConfig, SchedulerConfig, VNode, Value};

fn use_tokio_driver() {
    scheduler::configure(SchedulerConfig {
        driver: FlushDriver::TokioLocal,
        ..SchedulerConfig::default()
    });
}

/// Test that a tokio flush applies a state change after one tick.
#[tokio::test]
async fn tokio_driver_flushes_after_yield() {
    use_tokio_driver();

    scheduler::run_local(async {
        let view = Component::builder("View")
            .data(|_| Value::Object(Record::from_iter([("n", 0)])))
            .render(|ctx| VNode::text(ctx.get("n").to_string()))
            .build();

        let renderer = create_renderer(MemoryHost::new());
        let root = renderer.with_host_mut(|host| host.create_root("root"));
        let app = VNode::component(&view).build();
        renderer.render(app.clone(), root);

        let instance = app.component_instance().unwrap();
        instance.state().set("n", 1);
        instance.state().set("n", 2);
        assert!(scheduler::is_flush_pending());
        assert_eq!(renderer.with_host(|host| host.text_content(root)), "0");

        scheduler::next_tick().await;
        assert_eq!(renderer.with_host(|host| host.text_content(root)), "2");
        assert_eq!(instance.render_count(), 2);
        assert!(!scheduler::is_flush_pending());
    })
    .await;
}

/// Test that only one flush is requested per batch.
#[tokio::test]
async fn one_flush_per_batch() {
    use_tokio_driver();
    let local = tokio::task::LocalSet::new();

    local
        .run_until(scheduler::within_local_set(async {
            let runs = Rc::new(Cell::new(0));
            let jobs: Vec<Job> = (0..3)
                .map(|_| {
                    let runs = runs.clone();
                    Job::new(move || runs.set(runs.get() + 1))
                })
                .collect();

            for job in &jobs {
                scheduler::queue_job(job);
            }
            assert_eq!(scheduler::pending_job_count(), 3);

            tokio::task::yield_now().await;
            assert_eq!(runs.get(), 3);
            assert!(!scheduler::has_pending_jobs());
        }))
        .await;
}

/// Test that queueing on a runtime without a `LocalSet` does not panic and
/// leaves the jobs for an explicit flush.
#[tokio::test]
async fn tokio_driver_without_local_set_waits_for_host() {
    use_tokio_driver();
    let runs = Rc::new(Cell::new(0));
    let job = Job::new({
        let runs = runs.clone();
        move || runs.set(runs.get() + 1)
    });

    scheduler::queue_job(&job);
    tokio::task::yield_now().await;
    assert_eq!(runs.get(), 0);
    assert!(!scheduler::is_flush_pending());

    assert_eq!(scheduler::run_until_idle().unwrap(), 1);
    assert_eq!(runs.get(), 1);
}

/// Test that a job that keeps requeueing itself hits the cycle limit.
#[test]
fn run_until_idle_reports_runaway_queues() {
    let config = RuntimeConfig::from_json(r#"{ "scheduler": { "max_flush_cycles": 5 } }"#).unwrap();
    config.install();

    let runs = Rc::new(Cell::new(0));
    let job = Rc::new(Cell::new(None::<Job>));
    let looping = Job::new({
        let (runs, job) = (runs.clone(), job.clone());
        move || {
            runs.set(runs.get() + 1);
            if let Some(me) = job.take() {
                scheduler::queue_job(&me);
                job.set(Some(me));
            }
        }
    });
    job.set(Some(looping.clone()));

    scheduler::queue_job(&looping);
    let result = scheduler::run_until_idle();
    assert!(matches!(result, Err(Error::FlushLimitExceeded(5))));
    assert_eq!(runs.get(), 5);

    job.set(None);
    scheduler::flush_jobs();
}
