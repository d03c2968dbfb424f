//! Progressive pipeline integration tests.
//!
//! Uses the instrumented SpyModel to observe how many model evaluations
//! each stage performed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use envelope_core::testing::{SpyEvaluator, SpyModel};
use envelope_core::{
    AeroEvaluator, AeroModel, AeroState, AxisBounds, EnvelopeConfig, EvaluationError, GridSampler,
    PointCache, Resolution, SampleError,
};
use envelope_runtime::{
    EnvelopeSession, PipelineError, PipelineStatus, PublishedEnvelope, ResolutionPipeline,
};
use tokio_util::sync::CancellationToken;

fn config(resolutions: Vec<Resolution>) -> EnvelopeConfig {
    EnvelopeConfig {
        speed: AxisBounds::new(50.0, 250.0),
        altitude: AxisBounds::new(0.0, 8_000.0),
        resolutions,
        ..EnvelopeConfig::default()
    }
}

fn coarse_then_fine() -> Vec<Resolution> {
    vec![Resolution::new(2, 2), Resolution::new(4, 4)]
}

fn pipeline<M: AeroModel + 'static>(model: Arc<M>, resolutions: Vec<Resolution>) -> ResolutionPipeline<M> {
    let sampler = GridSampler::new(Arc::new(PointCache::default()));
    ResolutionPipeline::new(model, sampler, config(resolutions))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_levels_publish_in_order_before_next_sampling() {
    let model = Arc::new(SpyModel::default());
    let pipeline = pipeline(Arc::clone(&model), coarse_then_fine());
    let events: Arc<Mutex<Vec<(usize, Resolution, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let spy = {
        let events = Arc::clone(&events);
        let model = Arc::clone(&model);
        move |envelope: Arc<PublishedEnvelope>| {
            events
                .lock()
                .unwrap()
                .push((envelope.level, envelope.resolution, model.evaluations()));
        }
    };

    let report = pipeline.run(&spy, CancellationToken::new()).await.unwrap();
    assert_eq!(report.levels_published, 2);

    let events = events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, 0);
    assert_eq!(events[0].1, Resolution::new(2, 2));
    // Only the 3x3 coarse cells had been evaluated at the first publish.
    assert_eq!(events[0].2, 9);
    assert_eq!(events[1].0, 1);
    assert_eq!(events[1].1, Resolution::new(4, 4));
    // The fine grid reuses the 9 coarse keys.
    assert_eq!(events[1].2, 25);
    assert_eq!(pipeline.status(), PipelineStatus::Completed { levels: 2 });
    assert_eq!(model.live_evaluators(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_between_publishes_skips_fine_level() {
    let model = Arc::new(SpyModel::default());
    let pipeline = pipeline(Arc::clone(&model), coarse_then_fine());
    let cancel = CancellationToken::new();
    let published = Arc::new(Mutex::new(Vec::new()));

    let spy = {
        let cancel = cancel.clone();
        let published = Arc::clone(&published);
        move |envelope: Arc<PublishedEnvelope>| {
            published.lock().unwrap().push(envelope.level);
            cancel.cancel();
        }
    };

    let result = pipeline.run(&spy, cancel).await;
    assert!(matches!(result, Err(PipelineError::Cancelled { level: 1 })));
    assert_eq!(*published.lock().unwrap(), vec![0]);
    assert_eq!(model.evaluations(), 9);
    assert_eq!(pipeline.status(), PipelineStatus::Cancelled { level: 1 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pre_cancelled_run_publishes_nothing() {
    let model = Arc::new(SpyModel::default());
    let pipeline = pipeline(Arc::clone(&model), coarse_then_fine());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let spy = |_: Arc<PublishedEnvelope>| panic!("nothing may be published");

    let result = pipeline.run(&spy, cancel).await;
    assert!(matches!(result, Err(PipelineError::Cancelled { level: 0 })));
    assert_eq!(model.evaluations(), 0);
}

/// Fails only on the rows the fine grid adds (2000 m and 6000 m).
#[derive(Default)]
struct FineRowFault {
    inner: SpyModel,
}

struct FineRowEvaluator {
    inner: SpyEvaluator,
}

impl AeroEvaluator for FineRowEvaluator {
    fn evaluate(&mut self, altitude_m: f64, speed_mps: f64) -> Result<AeroState, EvaluationError> {
        if (altitude_m - 2_000.0).abs() < 1.0 || (altitude_m - 6_000.0).abs() < 1.0 {
            return Err(EvaluationError::new(speed_mps, altitude_m, "solver diverged"));
        }
        self.inner.evaluate(altitude_m, speed_mps)
    }
}

impl AeroModel for FineRowFault {
    type Evaluator = FineRowEvaluator;

    fn mass_kg(&self) -> f64 {
        self.inner.mass_kg
    }

    fn reference_area_m2(&self) -> f64 {
        self.inner.reference_area_m2
    }

    fn clone_for_thread(&self) -> FineRowEvaluator {
        FineRowEvaluator {
            inner: self.inner.clone_for_thread(),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_level_keeps_earlier_publication() {
    let model = Arc::new(FineRowFault::default());
    let pipeline = pipeline(model, coarse_then_fine());
    let published = Arc::new(Mutex::new(Vec::new()));
    let spy = {
        let published = Arc::clone(&published);
        move |envelope: Arc<PublishedEnvelope>| published.lock().unwrap().push(envelope)
    };

    let result = pipeline.run(&spy, CancellationToken::new()).await;
    match result {
        Err(PipelineError::Sampling {
            level: 1,
            source: SampleError::Faults { count, .. },
            ..
        }) => assert_eq!(count, 10),
        other => panic!("expected level 1 sampling failure, got {:?}", other.map(|_| ())),
    }

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].level, 0);
    assert_eq!(published[0].grid.points().len(), 9);
    assert!(matches!(pipeline.status(), PipelineStatus::Failed { level: 1, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_schedule_is_rejected() {
    let pipeline = pipeline(Arc::new(SpyModel::default()), Vec::new());
    let result = pipeline
        .run(&|_: Arc<PublishedEnvelope>| {}, CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PipelineError::EmptySchedule)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_rerun_uses_warm_cache() {
    let model = SpyModel::default();
    let counter = model.clone();
    let session = EnvelopeSession::new(model, config(coarse_then_fine()));

    session.refine().await.unwrap();
    let after_first = counter.evaluations();
    assert_eq!(after_first, 25);
    let latest = session.latest().unwrap();
    assert_eq!(latest.level, 1);

    session.refine().await.unwrap();
    assert_eq!(counter.evaluations(), after_first);

    let log = session.publications();
    let levels: Vec<usize> = log.iter().map(|record| record.level).collect();
    assert_eq!(levels, vec![0, 1, 0, 1]);
    assert!(log[2].generation > log[1].generation);
    assert_eq!(session.cache_stats().entries, 25);
    assert_eq!(*session.subscribe().borrow(), PipelineStatus::Completed { levels: 2 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacing_vehicle_clears_cache_and_latest() {
    let session = EnvelopeSession::new(SpyModel::default(), config(coarse_then_fine()));
    session.refine().await.unwrap();
    assert!(session.latest().is_some());
    assert!(!session.cache().is_empty());

    let heavier = SpyModel::default().with_mass(14_000.0);
    let counter = heavier.clone();
    session.replace_model(heavier);
    assert!(session.latest().is_none());
    assert!(session.cache().is_empty());

    session.refine().await.unwrap();
    assert_eq!(counter.evaluations(), 25);
    assert_eq!(session.latest().unwrap().grid.points()[0].mass_kg, 14_000.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacing_vehicle_mid_pass_never_reuses_old_points() {
    let slow = SpyModel::default().with_delay(Duration::from_millis(50));
    let session = Arc::new(EnvelopeSession::new(slow, config(vec![Resolution::new(8, 8)])));

    let mut status = session.subscribe();
    let old_run = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.refine().await })
    };
    status
        .wait_for(|status| matches!(status, PipelineStatus::Sampling { .. }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let heavier = SpyModel::default().with_mass(14_000.0);
    let counter = heavier.clone();
    session.replace_model(heavier);
    let result = old_run.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());

    session.refine().await.unwrap();
    let latest = session.latest().unwrap();
    assert_eq!(latest.grid.points().len(), 81);
    assert!(latest.grid.points().iter().all(|point| point.mass_kg == 14_000.0));
    // Every fine cell was evaluated by the new vehicle; none came from the old pass.
    assert_eq!(counter.evaluations(), 81);
    assert_eq!(session.cache_stats().entries, 81);
}

#[test]
fn test_status_serializes_with_stage_tag() {
    let status = PipelineStatus::Sampling {
        level: 1,
        resolution: Resolution::new(4, 4),
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["stage"], "sampling");
    assert_eq!(json["level"], 1);
    assert_eq!(json["resolution"]["speed_segments"], 4);
    assert!(!status.is_terminal());
    assert!(PipelineStatus::Cancelled { level: 0 }.is_terminal());
}
