use geo::Point;

use super::preprocess::PreparedFix;
use super::{PipelineError, PipelineResult};
use crate::geometry::distance::{ground_distance_m, project_onto_line};
use crate::geometry::{GeometryError, GeometryIndex};

/// A fix with its ground distance to the corridor polyline.
#[derive(Debug, Clone)]
pub struct AdheringFix {
    pub prepared: PreparedFix,
    pub distance_route_m: f64,
    pub on_route: bool,
}

impl AdheringFix {
    pub fn position(&self) -> Point<f64> {
        Point::new(self.prepared.raw.longitude, self.prepared.raw.latitude)
    }
}

/// Distance of every fix to the union polyline of its corridor's directional
/// shapes. A fix within `threshold_m` is on-route.
pub fn route_adherence(
    geometry: &GeometryIndex,
    corridor_id: &str,
    batch: Vec<PreparedFix>,
    threshold_m: f64,
) -> PipelineResult<Vec<AdheringFix>> {
    let corridor = geometry.corridor(corridor_id)?;

    batch
        .into_iter()
        .map(|prepared| {
            let position = Point::new(prepared.raw.longitude, prepared.raw.latitude);
            let nearest = project_onto_line(&corridor.polyline, position).ok_or_else(|| {
                PipelineError::Geometry(GeometryError::Projection(corridor_id.to_string()))
            })?;
            let distance_route_m = ground_distance_m(position, nearest);
            Ok(AdheringFix {
                prepared,
                on_route: distance_route_m <= threshold_m,
                distance_route_m,
            })
        })
        .collect()
}
