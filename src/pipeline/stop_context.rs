use super::direction::ResolvedFix;
use super::preprocess::PreparedFix;
use super::{PipelineError, PipelineResult, RawFix};
use crate::geometry::GeometryIndex;

/// A fix placed between its previous and next stop, with the along-shape
/// distance left to the next stop.
#[derive(Debug, Clone)]
pub struct ContextFix {
    pub resolved: ResolvedFix,
    pub prev_stop: String,
    pub next_stop: String,
    pub prev_stop_seq: i64,
    pub next_stop_seq: i64,
    pub next_stop_km: f64,
}

impl ContextFix {
    pub fn raw(&self) -> &RawFix {
        &self.resolved.adhering.prepared.raw
    }

    pub fn prepared(&self) -> &PreparedFix {
        &self.resolved.adhering.prepared
    }
}

/// Assign each fix its surrounding stops from the corridor's pair index,
/// restricted to the fix's resolved trip.
pub fn resolve_stop_context(
    geometry: &GeometryIndex,
    corridor_id: &str,
    batch: Vec<ResolvedFix>,
) -> PipelineResult<Vec<ContextFix>> {
    let index = geometry.pair_index(corridor_id)?;

    batch
        .into_iter()
        .map(|resolved| {
            let position = resolved.adhering.position();
            let record = index
                .nearest_for_trip(&resolved.trip_id, position)
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "no next/prev rows for trip {}",
                        resolved.trip_id
                    ))
                })?;

            let next_stop_km = geometry.along_shape_km(
                &resolved.trip_id,
                &record.prev_stop,
                &record.next_stop,
                position,
            )?;

            Ok(ContextFix {
                prev_stop: record.prev_stop.clone(),
                next_stop: record.next_stop.clone(),
                prev_stop_seq: record.prev_stop_seq,
                next_stop_seq: record.next_stop_seq,
                next_stop_km,
                resolved,
            })
        })
        .collect()
}
