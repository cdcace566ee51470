use geo::Point;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use super::GeometryError;

/// One row of the precomputed next/prev table: for a single shape vertex of
/// one directional trip, the stops immediately behind and ahead of it.
#[derive(Debug, Clone)]
pub struct PairRecord {
    pub trip_id: String,
    pub position: Point<f64>,
    pub next_stop: String,
    pub prev_stop: String,
    pub next_stop_seq: i64,
    pub prev_stop_seq: i64,
}

impl RTreeObject for PairRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.x(), self.position.y()])
    }
}

impl PointDistance for PairRecord {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position.x() - point[0];
        let dy = self.position.y() - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index over every shape vertex of one corridor, across all of its
/// directional trips.
pub struct StopPairIndex {
    tree: RTree<PairRecord>,
}

impl StopPairIndex {
    pub fn build(corridor_id: &str, records: Vec<PairRecord>) -> Result<Self, GeometryError> {
        if records.is_empty() {
            return Err(GeometryError::DegenerateShape {
                id: corridor_id.to_string(),
                reason: "no next/prev rows".to_string(),
            });
        }
        Ok(StopPairIndex {
            tree: RTree::bulk_load(records),
        })
    }

    /// Nearest row to `position` among the rows of `trip_id`.
    pub fn nearest_for_trip(&self, trip_id: &str, position: Point<f64>) -> Option<&PairRecord> {
        self.tree
            .nearest_neighbor_iter(&[position.x(), position.y()])
            .find(|record| record.trip_id == trip_id)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for Vertex {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for Vertex {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Small throwaway index over the vertices of one polyline, for
/// nearest-vertex queries against projected points.
pub struct VertexTree {
    tree: RTree<Vertex>,
}

impl VertexTree {
    pub fn build(points: &[Point<f64>]) -> VertexTree {
        let vertices = points
            .iter()
            .enumerate()
            .map(|(index, p)| Vertex {
                index,
                position: [p.x(), p.y()],
            })
            .collect();
        VertexTree {
            tree: RTree::bulk_load(vertices),
        }
    }

    pub fn nearest(&self, p: Point<f64>) -> Option<usize> {
        self.tree
            .nearest_neighbor(&[p.x(), p.y()])
            .map(|vertex| vertex.index)
    }

    /// The two vertices nearest to `p`, as (smaller index, larger index).
    pub fn two_nearest(&self, p: Point<f64>) -> Option<(usize, usize)> {
        let mut iter = self.tree.nearest_neighbor_iter(&[p.x(), p.y()]);
        let first = iter.next()?.index;
        let second = iter.next()?.index;
        Some((first.min(second), first.max(second)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(trip: &str, x: f64, y: f64, prev: &str, next: &str) -> PairRecord {
        PairRecord {
            trip_id: trip.to_string(),
            position: Point::new(x, y),
            next_stop: next.to_string(),
            prev_stop: prev.to_string(),
            next_stop_seq: 1,
            prev_stop_seq: 0,
        }
    }

    #[test]
    fn test_nearest_is_restricted_to_trip() {
        let index = StopPairIndex::build(
            "4B",
            vec![
                record("out", 0.0, 0.0, "a", "b"),
                record("back", 0.001, 0.0, "x", "y"),
                record("out", 0.01, 0.0, "b", "c"),
            ],
        )
        .unwrap();

        // The "back" row is closest, but only "out" rows may answer.
        let found = index
            .nearest_for_trip("out", Point::new(0.002, 0.0))
            .unwrap();
        assert_eq!(found.next_stop, "b");
    }

    #[test]
    fn test_empty_index_is_rejected() {
        assert!(StopPairIndex::build("4B", vec![]).is_err());
    }

    #[test]
    fn test_two_nearest_orders_by_index() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(0.01, 0.0),
            Point::new(0.02, 0.0),
        ];
        let tree = VertexTree::build(&points);
        // Closer to vertex 1, with vertex 2 second; returned smaller first.
        assert_eq!(tree.two_nearest(Point::new(0.014, 0.0)), Some((1, 2)));
        assert_eq!(tree.nearest(Point::new(0.001, 0.0)), Some(0));
    }
}
