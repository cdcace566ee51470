use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use geo::{LineString, Point};
use itertools::Itertools;

use super::adherence::AdheringFix;
use super::{PipelineError, PipelineResult};
use crate::config::Config;
use crate::geometry::distance::{ground_distance_m, project_onto_line};
use crate::geometry::pair_index::VertexTree;
use crate::geometry::{GeometryError, GeometryIndex, TripShape};

/// How a fix's directional shape was chosen. The tags are stable and
/// meaningful: tests and operators reason about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// First fix, both shapes about equally near: nearest wins.
    NearestFirst = 1,
    /// First fix, a single shape or one clearly nearer.
    ClearFirst = 2,
    /// Vehicle has barely moved: keep the previous commitment.
    Skip = 3,
    /// Both fixes project to the very start of the primary shape.
    TripOneOrigin = 4,
    /// Both fixes project to the very end of the primary shape, which is
    /// where the return shape begins.
    TripTwoOrigin = 5,
    /// Whichever fix passed the earlier vertex decides the direction.
    PassedFirst = 6,
    /// Corridor has a single directional shape.
    SingleShape = 7,
}

impl Method {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A fix with its committed directional shape. `method` is None when a
/// static vendor override decided the trip.
#[derive(Debug, Clone)]
pub struct ResolvedFix {
    pub adhering: AdheringFix,
    pub trip_id: String,
    pub method: Option<Method>,
}

/// Resolve the directional shape for every fix of one vehicle.
///
/// A vendor trip id with a static override short-circuits the voter.
/// Otherwise each fix is classified by the first applicable method and the
/// mode of the last K non-skip choices is committed.
pub fn resolve_directions(
    geometry: &GeometryIndex,
    corridor_id: &str,
    overrides: &HashMap<String, String>,
    batch: Vec<AdheringFix>,
    config: &Config,
) -> PipelineResult<Vec<ResolvedFix>> {
    let first = batch.first().ok_or(PipelineError::DirectionUnresolved)?;

    if overrides.contains_key(&first.prepared.raw.trip_id) {
        return batch
            .into_iter()
            .map(|adhering| {
                let trip_id = overrides
                    .get(&adhering.prepared.raw.trip_id)
                    .ok_or(PipelineError::DirectionUnresolved)?
                    .clone();
                Ok(ResolvedFix {
                    adhering,
                    trip_id,
                    method: None,
                })
            })
            .collect();
    }

    let (trip_one, trip_two) = geometry.corridor_shapes(corridor_id)?;
    let trip_one_vertices = VertexTree::build(&trip_one.points);

    let mut window: VecDeque<String> = VecDeque::with_capacity(config.vote_window);
    let mut previous: Option<Point<f64>> = None;
    let mut resolved: Vec<ResolvedFix> = Vec::with_capacity(batch.len());

    for adhering in batch {
        let current = adhering.position();
        let (choice, method) = choose(
            current,
            previous,
            trip_one,
            trip_two,
            &trip_one_vertices,
            config,
        )?;

        let committed = match choice {
            None => resolved
                .last()
                .map(|fix| fix.trip_id.clone())
                .ok_or(PipelineError::DirectionUnresolved)?,
            Some(chosen) => {
                previous = Some(current);
                if window.len() == config.vote_window {
                    window.pop_front();
                }
                window.push_back(chosen.clone());
                if window.len() == 1 {
                    chosen
                } else {
                    most_common(&window).ok_or(PipelineError::DirectionUnresolved)?
                }
            }
        };

        resolved.push(ResolvedFix {
            adhering,
            trip_id: committed,
            method: Some(method),
        });
    }

    if resolved.is_empty() {
        return Err(PipelineError::DirectionUnresolved);
    }
    Ok(resolved)
}

fn choose(
    current: Point<f64>,
    previous: Option<Point<f64>>,
    trip_one: &TripShape,
    trip_two: Option<&TripShape>,
    trip_one_vertices: &VertexTree,
    config: &Config,
) -> PipelineResult<(Option<String>, Method)> {
    let previous = match previous {
        None => {
            // First fix: decide by plain proximity.
            return match trip_two {
                Some(trip_two) => {
                    let d1 = nearest_distance_m(current, &trip_one.line, &trip_one.id)?;
                    let d2 = nearest_distance_m(current, &trip_two.line, &trip_two.id)?;
                    let nearer = if d1 < d2 { trip_one } else { trip_two };
                    let method = if (d1 - d2).abs() <= config.tie_threshold_m {
                        Method::NearestFirst
                    } else {
                        Method::ClearFirst
                    };
                    Ok((Some(nearer.id.clone()), method))
                }
                None => Ok((Some(trip_one.id.clone()), Method::ClearFirst)),
            };
        }
        Some(previous) => previous,
    };

    if ground_distance_m(previous, current) <= config.skip_threshold_m {
        return Ok((None, Method::Skip));
    }

    let Some(trip_two) = trip_two else {
        return Ok((Some(trip_one.id.clone()), Method::SingleShape));
    };

    let order = first_passed(previous, current, trip_one, trip_one_vertices)?;
    if order.start_index <= 1 {
        Ok((Some(trip_one.id.clone()), Method::TripOneOrigin))
    } else if order.end_index <= 1 {
        Ok((Some(trip_two.id.clone()), Method::TripTwoOrigin))
    } else if order.previous_first {
        Ok((Some(trip_one.id.clone()), Method::PassedFirst))
    } else {
        Ok((Some(trip_two.id.clone()), Method::PassedFirst))
    }
}

struct PassOrder {
    previous_first: bool,
    /// Smaller of the two projected vertex indices.
    start_index: usize,
    /// Smaller of the two distances from the end of the shape.
    end_index: usize,
}

/// Project both fixes onto the primary shape and order them by the vertex
/// they pass. Ties are broken by distance to the vertex preceding the shared
/// projection.
fn first_passed(
    previous: Point<f64>,
    current: Point<f64>,
    trip: &TripShape,
    vertices: &VertexTree,
) -> PipelineResult<PassOrder> {
    let projection_error = || PipelineError::Geometry(GeometryError::Projection(trip.id.clone()));

    let projected_previous = project_onto_line(&trip.line, previous).ok_or_else(projection_error)?;
    let projected_current = project_onto_line(&trip.line, current).ok_or_else(projection_error)?;

    let index_previous = vertices.nearest(projected_previous).ok_or_else(projection_error)?;
    let index_current = vertices.nearest(projected_current).ok_or_else(projection_error)?;

    let n = trip.points.len();
    let previous_first = match index_previous.cmp(&index_current) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => {
            let anchor = trip.points[index_previous.checked_sub(1).unwrap_or(n - 1)];
            ground_distance_m(anchor, previous) < ground_distance_m(anchor, current)
        }
    };

    Ok(PassOrder {
        previous_first,
        start_index: index_previous.min(index_current),
        end_index: (n - index_previous).min(n - index_current),
    })
}

fn nearest_distance_m(
    point: Point<f64>,
    line: &LineString<f64>,
    trip_id: &str,
) -> PipelineResult<f64> {
    let nearest = project_onto_line(line, point)
        .ok_or_else(|| PipelineError::Geometry(GeometryError::Projection(trip_id.to_string())))?;
    Ok(ground_distance_m(point, nearest))
}

/// Mode of the window, ties broken by earliest occurrence.
fn most_common(window: &VecDeque<String>) -> Option<String> {
    let counts = window.iter().counts();
    let best = counts.values().copied().max()?;
    window.iter().find(|trip| counts[*trip] == best).cloned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipeline::preprocess::preprocess;
    use crate::pipeline::adherence::route_adherence;
    use crate::test_utils;

    fn resolve(fixes: Vec<crate::pipeline::RawFix>) -> PipelineResult<Vec<ResolvedFix>> {
        let geometry = test_utils::geometry();
        let config = test_utils::config();
        let batch = route_adherence(
            &geometry,
            "4B",
            preprocess(fixes).unwrap(),
            config.on_route_threshold_m,
        )
        .unwrap();
        resolve_directions(&geometry, "4B", &config.trip_overrides, batch, &config)
    }

    fn methods(resolved: &[ResolvedFix]) -> Vec<u8> {
        resolved
            .iter()
            .map(|fix| fix.method.map(Method::tag).unwrap_or(0))
            .collect()
    }

    #[test]
    fn test_override_bypasses_voter() {
        let mut fixes = vec![
            test_utils::fix_at(0.02, 0.0, 0, false),
            test_utils::fix_at(0.03, 0.0, 10, true),
        ];
        for fix in &mut fixes {
            fix.trip_id = "4.B001".to_string();
        }
        let resolved = resolve(fixes).unwrap();
        assert!(resolved.iter().all(|f| f.trip_id == "4B-R01_shp"));
        assert!(resolved.iter().all(|f| f.method.is_none()));
    }

    #[test]
    fn test_moving_outbound_commits_outbound() {
        let fixes = vec![
            test_utils::fix_at(0.02, 0.0, 0, false),
            test_utils::fix_at(0.021, 0.0, 10, false),
            test_utils::fix_at(0.022, 0.0, 20, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert!(resolved.iter().all(|f| f.trip_id == "4B-R01_shp"));
        assert_eq!(methods(&resolved), vec![2, 6, 6]);
    }

    #[test]
    fn test_moving_return_commits_return() {
        let fixes = vec![
            test_utils::fix_at(0.04, 0.001, 0, false),
            test_utils::fix_at(0.03, 0.001, 10, false),
            test_utils::fix_at(0.02, 0.001, 20, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert!(resolved.iter().all(|f| f.trip_id == "4B-R02_shp"));
        assert_eq!(methods(&resolved), vec![2, 6, 6]);
    }

    #[test]
    fn test_static_vehicle_skips_and_keeps_commitment() {
        let mut fixes = vec![test_utils::fix_at(0.02, 0.00045, 0, false)];
        for i in 1..12 {
            fixes.push(test_utils::fix_at(0.02, 0.00045, i * 10, i == 11));
        }
        let resolved = resolve(fixes).unwrap();

        assert_eq!(resolved[0].method, Some(Method::NearestFirst));
        assert!(resolved[1..]
            .iter()
            .all(|f| f.method == Some(Method::Skip)));
        assert!(resolved.iter().all(|f| f.trip_id == "4B-R01_shp"));
    }

    #[test]
    fn test_small_displacement_commits_previous_trip() {
        // 0.00004 degrees of longitude is under five metres.
        let fixes = vec![
            test_utils::fix_at(0.02, 0.00045, 0, false),
            test_utils::fix_at(0.02004, 0.00045, 10, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert_eq!(resolved[1].method, Some(Method::Skip));
        assert_eq!(resolved[1].trip_id, resolved[0].trip_id);
    }

    #[test]
    fn test_origin_of_primary_shape_wins() {
        let fixes = vec![
            test_utils::fix_at(0.0, 0.00045, 0, false),
            test_utils::fix_at(0.0005, 0.00045, 10, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert_eq!(
            methods(&resolved),
            vec![Method::NearestFirst.tag(), Method::TripOneOrigin.tag()]
        );
        assert_eq!(resolved[1].trip_id, "4B-R01_shp");
    }

    #[test]
    fn test_end_of_primary_shape_switches_to_return() {
        let fixes = vec![
            test_utils::fix_at(0.05, 0.00045, 0, false),
            test_utils::fix_at(0.0495, 0.00045, 10, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert_eq!(resolved[1].method, Some(Method::TripTwoOrigin));
        // Window holds one vote per shape; the earliest wins the tie.
        assert_eq!(resolved[1].trip_id, resolved[0].trip_id);
    }

    #[test]
    fn test_window_mode_smooths_single_flip() {
        // Four clean outbound votes, then a jump to the end of the shape
        // that votes for the return trip; the window mode keeps outbound.
        let fixes = vec![
            test_utils::fix_at(0.02, 0.0, 0, false),
            test_utils::fix_at(0.021, 0.0, 10, false),
            test_utils::fix_at(0.022, 0.0, 20, false),
            test_utils::fix_at(0.023, 0.0, 30, false),
            test_utils::fix_at(0.0495, 0.00045, 40, true),
        ];
        let resolved = resolve(fixes).unwrap();
        assert_eq!(resolved[4].method, Some(Method::TripTwoOrigin));
        assert!(resolved.iter().all(|f| f.trip_id == "4B-R01_shp"));
    }
}
