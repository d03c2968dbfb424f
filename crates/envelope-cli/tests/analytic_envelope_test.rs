//! End-to-end refinement of the demonstration aircraft.

use std::sync::{Arc, Mutex};

use envelope_cli::{LevelReport, Preset};
use envelope_core::{
    AeroModel, EnvelopeConfig, EnvelopeField, GridSampler, PointCache, Resolution,
    TraceOutcome,
};
use envelope_runtime::{PublishedEnvelope, ResolutionPipeline};
use tokio_util::sync::CancellationToken;

fn trainer_config() -> EnvelopeConfig {
    let mut config = EnvelopeConfig {
        resolutions: vec![Resolution::new(4, 4), Resolution::new(8, 8)],
        ..EnvelopeConfig::default()
    };
    Preset::Trainer.scenario().configure(&mut config);
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trainer_envelope_refines_and_reports() {
    let config = trainer_config();
    let aircraft = Arc::new(Preset::Trainer.scenario().aircraft);
    let sampler = GridSampler::new(Arc::new(PointCache::new(config.quantization)));
    let pipeline = ResolutionPipeline::new(Arc::clone(&aircraft), sampler, config);

    let reports: Arc<Mutex<Vec<LevelReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let reports = Arc::clone(&reports);
        move |envelope: Arc<PublishedEnvelope>| {
            let report = LevelReport::new(&envelope, true, &[EnvelopeField::ExcessSpecificPower]);
            reports.lock().unwrap().push(report);
        }
    };

    let outcome = pipeline.run(&sink, CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.levels_published, 2);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    let fine = &reports[1];
    assert_eq!(fine.cells, 81);
    assert_eq!(fine.fields[0].values.len(), 81);
    assert!(fine.summary.sustainable_cells > 0);
    assert!(fine.summary.max_energy.is_some());
    assert_eq!(fine.summary.ceilings.len(), 9);

    assert!(fine.ascent_error.is_none(), "{:?}", fine.ascent_error);
    assert!(fine.target.is_some());
    assert_eq!(fine.paths.len(), 2);
    for path in &fine.paths {
        assert_eq!(path.outcome, TraceOutcome::ReachedTarget, "{:?}", path.objective);
        assert!(path.total_time_s > 0.0);
    }
    assert_eq!(reports[0].paths.len(), 2);
    assert!(reports[0].paths.iter().all(|path| path.outcome == TraceOutcome::ReachedTarget));

    let encoded = serde_json::to_string(fine).unwrap();
    assert!(encoded.contains("\"excess_specific_power\""));
    assert_eq!(aircraft.mass_kg(), 2_500.0);
}
