//! JSON view of a published level.

use chrono::{DateTime, Utc};
use serde::Serialize;

use envelope_core::{
    AscentPathPoint, CacheStats, EnvelopeField, EnvelopeSummary, FlightCondition, Objective,
    Resolution, TraceOutcome,
};
use envelope_runtime::PublishedEnvelope;

#[derive(Debug, Clone, Serialize)]
pub struct PathReport {
    pub objective: Objective,
    pub outcome: TraceOutcome,
    pub iterations: usize,
    pub total_cost: f64,
    pub total_time_s: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<AscentPathPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    pub field: EnvelopeField,
    /// Row-major by speed column, then altitude
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelReport {
    pub level: usize,
    pub resolution: Resolution,
    pub cells: usize,
    pub elapsed_ms: u64,
    pub published_at: DateTime<Utc>,
    pub cache: CacheStats,
    pub summary: EnvelopeSummary,
    pub target: Option<FlightCondition>,
    pub start: Option<FlightCondition>,
    pub paths: Vec<PathReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascent_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldReport>,
}

impl LevelReport {
    /// Build a report; path points and field dumps are only included on
    /// request since they dominate the output size.
    pub fn new(envelope: &PublishedEnvelope, with_points: bool, fields: &[EnvelopeField]) -> Self {
        let paths = envelope
            .ascent
            .as_ref()
            .map(|solution| {
                Objective::ALL
                    .iter()
                    .map(|&objective| {
                        let path = solution.path(objective);
                        PathReport {
                            objective,
                            outcome: path.outcome,
                            iterations: path.iterations,
                            total_cost: path.total_cost(),
                            total_time_s: path.total_time_s(),
                            points: if with_points {
                                path.points.clone()
                            } else {
                                Vec::new()
                            },
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            level: envelope.level,
            resolution: envelope.resolution,
            cells: envelope.grid.points().len(),
            elapsed_ms: envelope.elapsed_ms,
            published_at: envelope.published_at,
            cache: envelope.cache,
            summary: envelope.summary.clone(),
            target: envelope.ascent.as_ref().map(|solution| solution.target),
            start: envelope.ascent.as_ref().map(|solution| solution.start),
            paths,
            ascent_error: envelope.ascent_error.clone(),
            fields: fields
                .iter()
                .map(|&field| FieldReport {
                    field,
                    values: envelope.grid.field(field),
                })
                .collect(),
        }
    }
}

/// Parse a field name such as `excess_specific_power` or `excess-specific-power`.
pub fn parse_field(name: &str) -> Option<EnvelopeField> {
    let normalized = name.trim().replace('-', "_").to_ascii_lowercase();
    EnvelopeField::ALL.into_iter().find(|field| {
        serde_json::to_value(field)
            .ok()
            .and_then(|value| value.as_str().map(|s| s == normalized))
            .unwrap_or(false)
    })
}
