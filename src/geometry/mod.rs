pub mod distance;
pub mod pair_index;

use std::collections::HashMap;

use geo::{LineString, Point};

use crate::schedule::Schedule;
use distance::{ground_distance_km, project_onto_line};
use pair_index::{PairRecord, StopPairIndex, VertexTree};

#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("Unknown corridor: {0}")]
    UnknownCorridor(String),

    #[error("Unknown trip shape: {0}")]
    UnknownTrip(String),

    #[error("Stop {stop} is not on trip {trip}")]
    UnknownStop { trip: String, stop: String },

    #[error("Degenerate shape {id}: {reason}")]
    DegenerateShape { id: String, reason: String },

    #[error("Stop {from} does not precede {to} on trip {trip}")]
    InvalidSpan {
        trip: String,
        from: String,
        to: String,
    },

    #[error("Projection failed on {0}")]
    Projection(String),
}

pub type GeometryResult<T> = Result<T, GeometryError>;

/// One directional shape of a corridor, with its stop boundaries and the
/// along-shape distance from each stop to the next.
pub struct TripShape {
    pub id: String,
    pub points: Vec<Point<f64>>,
    pub line: LineString<f64>,
    /// Stops in travel order, each with the shape vertex it sits on.
    pub stop_sequence: Vec<(String, usize)>,
    pub pair: Option<String>,
    cum_next_km: HashMap<String, f64>,
}

impl TripShape {
    fn build(
        id: &str,
        shape: &[[f64; 2]],
        status: &[String],
        pair: Option<String>,
    ) -> GeometryResult<TripShape> {
        let degenerate = |reason: &str| GeometryError::DegenerateShape {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if shape.len() < 2 {
            return Err(degenerate("fewer than two vertices"));
        }
        if shape.len() != status.len() {
            return Err(degenerate("status column does not align with shape"));
        }

        let points: Vec<Point<f64>> = shape.iter().map(|c| Point::new(c[1], c[0])).collect();
        for segment in points.windows(2) {
            if ground_distance_km(segment[0], segment[1]) == 0.0 {
                return Err(degenerate("zero-length segment"));
            }
        }

        let stop_sequence: Vec<(String, usize)> = status
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_str() != ".")
            .map(|(vertex, s)| (s.clone(), vertex))
            .collect();
        if stop_sequence.len() < 2 {
            return Err(degenerate("fewer than two stops"));
        }
        for i in 0..stop_sequence.len() {
            for j in (i + 1)..stop_sequence.len() {
                if stop_sequence[i].0 == stop_sequence[j].0 {
                    return Err(degenerate("duplicate stop in sequence"));
                }
            }
        }

        let mut cum_next_km = HashMap::new();
        for window in stop_sequence.windows(2) {
            let (ref from_stop, from_vertex) = window[0];
            let (_, to_vertex) = window[1];
            let km: f64 = points[from_vertex..to_vertex]
                .iter()
                .zip(&points[from_vertex + 1..=to_vertex])
                .map(|(a, b)| ground_distance_km(*a, *b))
                .sum();
            if !km.is_finite() || km <= 0.0 {
                return Err(degenerate("non-positive stop spacing"));
            }
            cum_next_km.insert(from_stop.clone(), km);
        }

        let line = LineString::from(points.clone());

        Ok(TripShape {
            id: id.to_string(),
            points,
            line,
            stop_sequence,
            pair,
            cum_next_km,
        })
    }

    pub fn vertex_of(&self, stop_id: &str) -> GeometryResult<usize> {
        self.stop_sequence
            .iter()
            .find(|(id, _)| id == stop_id)
            .map(|(_, vertex)| *vertex)
            .ok_or_else(|| GeometryError::UnknownStop {
                trip: self.id.clone(),
                stop: stop_id.to_string(),
            })
    }

    pub fn stop_position(&self, stop_id: &str) -> GeometryResult<usize> {
        self.stop_sequence
            .iter()
            .position(|(id, _)| id == stop_id)
            .ok_or_else(|| GeometryError::UnknownStop {
                trip: self.id.clone(),
                stop: stop_id.to_string(),
            })
    }

    /// Along-shape distance from `stop_id` to the next stop on this trip.
    pub fn next_stop_cum_km(&self, stop_id: &str) -> GeometryResult<f64> {
        self.cum_next_km
            .get(stop_id)
            .copied()
            .ok_or_else(|| GeometryError::UnknownStop {
                trip: self.id.clone(),
                stop: stop_id.to_string(),
            })
    }
}

/// A corridor and the union polyline of its directional shapes.
pub struct Corridor {
    pub id: String,
    pub polyline: LineString<f64>,
    /// Directional trip ids in schedule order.
    pub trips: Vec<String>,
}

/// All static geometry, built once at startup and shared read-only.
pub struct GeometryIndex {
    corridors: HashMap<String, Corridor>,
    trips: HashMap<String, TripShape>,
    pair_indexes: HashMap<String, StopPairIndex>,
}

impl GeometryIndex {
    pub fn build(schedule: &Schedule) -> GeometryResult<GeometryIndex> {
        let mut trips = HashMap::new();
        let mut corridor_trips: HashMap<String, Vec<String>> = HashMap::new();

        for trip_row in &schedule.trips {
            let shape_id = &trip_row.shape_id;
            if trips.contains_key(shape_id) {
                continue;
            }
            let entry = schedule
                .trip_map
                .get(shape_id)
                .ok_or_else(|| GeometryError::UnknownTrip(shape_id.clone()))?;
            let shape =
                TripShape::build(shape_id, &entry.shape, &entry.status, entry.pair.clone())?;
            trips.insert(shape_id.clone(), shape);
            corridor_trips
                .entry(trip_row.route_id.clone())
                .or_default()
                .push(shape_id.clone());
        }

        for trip in trips.values() {
            if let Some(pair) = &trip.pair {
                if !trips.contains_key(pair) {
                    return Err(GeometryError::UnknownTrip(pair.clone()));
                }
            }
        }

        let mut corridors = HashMap::new();
        for (corridor_id, trip_ids) in corridor_trips {
            if trip_ids.len() > 2 {
                return Err(GeometryError::DegenerateShape {
                    id: corridor_id,
                    reason: "more than two directional shapes".to_string(),
                });
            }
            if trip_ids.len() == 2 {
                let first = &trips[&trip_ids[0]];
                let second = &trips[&trip_ids[1]];
                if first.pair.as_deref() != Some(second.id.as_str())
                    || second.pair.as_deref() != Some(first.id.as_str())
                {
                    return Err(GeometryError::DegenerateShape {
                        id: corridor_id,
                        reason: "directional shapes are not mutually paired".to_string(),
                    });
                }
            }

            let mut union = Vec::new();
            for trip_id in &trip_ids {
                union.extend(trips[trip_id].points.iter().copied());
            }
            corridors.insert(
                corridor_id.clone(),
                Corridor {
                    id: corridor_id,
                    polyline: LineString::from(union),
                    trips: trip_ids,
                },
            );
        }

        let mut records: HashMap<String, Vec<PairRecord>> = HashMap::new();
        for row in &schedule.next_prev {
            if !corridors.contains_key(&row.koridor) {
                continue;
            }
            if !trips.contains_key(&row.trip) {
                return Err(GeometryError::UnknownTrip(row.trip.clone()));
            }
            records.entry(row.koridor.clone()).or_default().push(PairRecord {
                trip_id: row.trip.clone(),
                position: Point::new(row.lon, row.lat),
                next_stop: row.next_stop.clone(),
                prev_stop: row.prev_stop.clone(),
                next_stop_seq: row.next_stop_seq,
                prev_stop_seq: row.prev_stop_seq,
            });
        }

        let mut pair_indexes = HashMap::new();
        for (corridor_id, corridor) in &corridors {
            let rows = records.remove(corridor_id).unwrap_or_default();
            let expected: usize = corridor
                .trips
                .iter()
                .map(|trip_id| trips[trip_id].points.len())
                .sum();
            if rows.len() != expected {
                return Err(GeometryError::DegenerateShape {
                    id: corridor_id.clone(),
                    reason: format!(
                        "next/prev table has {} rows, shapes have {} vertices",
                        rows.len(),
                        expected
                    ),
                });
            }
            pair_indexes.insert(corridor_id.clone(), StopPairIndex::build(&corridor.id, rows)?);
        }

        Ok(GeometryIndex {
            corridors,
            trips,
            pair_indexes,
        })
    }

    pub fn corridor(&self, corridor_id: &str) -> GeometryResult<&Corridor> {
        self.corridors
            .get(corridor_id)
            .ok_or_else(|| GeometryError::UnknownCorridor(corridor_id.to_string()))
    }

    pub fn trip(&self, trip_id: &str) -> GeometryResult<&TripShape> {
        self.trips
            .get(trip_id)
            .ok_or_else(|| GeometryError::UnknownTrip(trip_id.to_string()))
    }

    /// The corridor's directional shapes, primary first.
    pub fn corridor_shapes(&self, corridor_id: &str) -> GeometryResult<(&TripShape, Option<&TripShape>)> {
        let corridor = self.corridor(corridor_id)?;
        let mut ids = corridor.trips.iter();
        let first = ids
            .next()
            .ok_or_else(|| GeometryError::UnknownCorridor(corridor_id.to_string()))?;
        let second = ids.next();
        Ok((
            self.trip(first)?,
            second.map(|id| self.trip(id)).transpose()?,
        ))
    }

    pub fn pair_index(&self, corridor_id: &str) -> GeometryResult<&StopPairIndex> {
        self.pair_indexes
            .get(corridor_id)
            .ok_or_else(|| GeometryError::UnknownCorridor(corridor_id.to_string()))
    }

    /// Along-shape distance in km from `anchor` (lying between `from_stop`
    /// and `to_stop`) through to `to_stop`.
    ///
    /// The anchor is conceptually inserted after the nearer of the two shape
    /// vertices neighbouring its projection; the shape itself is never
    /// modified.
    pub fn along_shape_km(
        &self,
        trip_id: &str,
        from_stop: &str,
        to_stop: &str,
        anchor: Point<f64>,
    ) -> GeometryResult<f64> {
        let trip = self.trip(trip_id)?;
        let l = trip.vertex_of(from_stop)?;
        let r = trip.vertex_of(to_stop)?;
        if l >= r {
            return Err(GeometryError::InvalidSpan {
                trip: trip_id.to_string(),
                from: from_stop.to_string(),
                to: to_stop.to_string(),
            });
        }

        let segment = &trip.points[l..=r];
        let segment_line = LineString::from(segment.to_vec());
        let projected = project_onto_line(&segment_line, anchor)
            .ok_or_else(|| GeometryError::Projection(trip_id.to_string()))?;

        let insert_after = VertexTree::build(segment)
            .two_nearest(projected)
            .map(|(smaller, _)| l + smaller)
            .ok_or_else(|| GeometryError::Projection(trip_id.to_string()))?;

        let mut total = ground_distance_km(anchor, trip.points[insert_after + 1]);
        for i in (insert_after + 1)..r {
            total += ground_distance_km(trip.points[i], trip.points[i + 1]);
        }
        Ok(total)
    }
}
