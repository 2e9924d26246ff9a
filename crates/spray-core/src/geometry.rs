//! Planar polygon capability used by the compliance clipper.
//!
//! Boolean operations and buffering are delegated to the `geo` crate. All
//! operations run in a local tangent plane (meters); conversion helpers move
//! [lon, lat] rings in and out of that plane.

use geo::{Area, BooleanOps, Buffer, Centroid, Coord, LineString, MultiPolygon, Polygon};
use thiserror::Error;

use crate::spatial::LocalFrame;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("ring has {0} distinct vertices, need at least 3")]
    TooFewVertices(usize),
    #[error("ring contains a non-finite coordinate")]
    NonFinite,
    #[error("polygon has no exterior ring")]
    MissingExterior,
}

/// `{union, intersect, difference, buffer}` over planar multipolygons.
pub trait PlanarOps {
    fn union(&self, polygons: &[MultiPolygon<f64>]) -> MultiPolygon<f64>;
    fn intersect(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn difference(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
    fn buffer(&self, polygon: &MultiPolygon<f64>, meters: f64) -> MultiPolygon<f64>;
}

/// [`PlanarOps`] backed by `geo`'s boolean ops and buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPlanarOps;

impl PlanarOps for GeoPlanarOps {
    fn union(&self, polygons: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
        polygons
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, next| {
                if acc.0.is_empty() {
                    next.clone()
                } else {
                    acc.union(next)
                }
            })
    }

    fn intersect(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() || b.0.is_empty() {
            return MultiPolygon::new(Vec::new());
        }
        a.intersection(b)
    }

    fn difference(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() || b.0.is_empty() {
            return a.clone();
        }
        a.difference(b)
    }

    fn buffer(&self, polygon: &MultiPolygon<f64>, meters: f64) -> MultiPolygon<f64> {
        if !meters.is_finite() || meters <= 0.0 || polygon.0.is_empty() {
            return polygon.clone();
        }
        Buffer::buffer(polygon, meters)
    }
}

fn to_local_ring(ring: &[[f64; 2]], frame: &LocalFrame) -> Result<LineString<f64>, GeometryError> {
    if ring.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|p| {
            let (x, y) = frame.to_local(p[1], p[0]);
            Coord { x, y }
        })
        .collect();
    coords.dedup_by(|a, b| (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return Err(GeometryError::TooFewVertices(coords.len()));
    }
    Ok(LineString::new(coords))
}

/// Build a local-plane polygon from [lon, lat] rings (exterior first).
pub fn polygon_from_rings(rings: &[Vec<[f64; 2]>], frame: &LocalFrame) -> Result<Polygon<f64>, GeometryError> {
    let (exterior, holes) = rings.split_first().ok_or(GeometryError::MissingExterior)?;
    let exterior = to_local_ring(exterior, frame)?;
    let interiors = holes
        .iter()
        .filter_map(|hole| to_local_ring(hole, frame).ok())
        .collect();
    Ok(Polygon::new(exterior, interiors))
}

fn ring_to_lon_lat(ring: &LineString<f64>, frame: &LocalFrame) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = ring
        .coords()
        .map(|c| {
            let (lat, lon) = frame.to_geographic(c.x, c.y);
            [lon, lat]
        })
        .collect();
    if let (Some(first), Some(last)) = (out.first().copied(), out.last().copied()) {
        if first != last {
            out.push(first);
        }
    }
    out
}

/// Exterior ring and holes of a local-plane polygon as closed [lon, lat] rings.
pub fn polygon_to_rings(polygon: &Polygon<f64>, frame: &LocalFrame) -> (Vec<[f64; 2]>, Vec<Vec<[f64; 2]>>) {
    let exterior = ring_to_lon_lat(polygon.exterior(), frame);
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| ring_to_lon_lat(ring, frame))
        .collect();
    (exterior, interiors)
}

pub fn area_m2(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area()
}

/// Centroid of a local-plane polygon as (lat, lon).
pub fn centroid_lat_lon(polygon: &Polygon<f64>, frame: &LocalFrame) -> Option<(f64, f64)> {
    polygon.centroid().map(|p| frame.to_geographic(p.x(), p.y()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )])
    }

    #[test]
    fn boolean_ops_conserve_area() {
        let ops = GeoPlanarOps;
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);

        assert!((area_m2(&ops.union(&[a.clone(), b.clone()])) - 150.0).abs() < 1e-6);
        assert!((area_m2(&ops.intersect(&a, &b)) - 50.0).abs() < 1e-6);
        assert!((area_m2(&ops.difference(&a, &b)) - 50.0).abs() < 1e-6);
    }

    #[test]
    fn difference_with_empty_is_identity() {
        let ops = GeoPlanarOps;
        let a = square(0.0, 0.0, 10.0);
        let empty = MultiPolygon::new(Vec::new());
        assert_eq!(ops.difference(&a, &empty), a);
        assert!(ops.intersect(&a, &empty).0.is_empty());
    }

    #[test]
    fn buffer_grows_the_footprint() {
        let ops = GeoPlanarOps;
        let a = square(0.0, 0.0, 10.0);
        let grown = ops.buffer(&a, 5.0);
        // 10x10 square grown by 5m: 100 + 4*50 + pi*25
        let expected = 100.0 + 200.0 + std::f64::consts::PI * 25.0;
        assert!((area_m2(&grown) - expected).abs() / expected < 0.02);
        assert_eq!(ops.buffer(&a, 0.0), a);
    }

    #[test]
    fn rings_round_trip_through_the_local_plane() {
        let frame = LocalFrame::new(-27.47, 153.02);
        let ring = vec![
            [153.0200, -27.4700],
            [153.0210, -27.4700],
            [153.0210, -27.4690],
            [153.0200, -27.4690],
            [153.0200, -27.4700],
        ];
        let polygon = polygon_from_rings(&[ring.clone()], &frame).unwrap();
        let (exterior, holes) = polygon_to_rings(&polygon, &frame);
        assert!(holes.is_empty());
        assert_eq!(exterior.len(), ring.len());
        for (a, b) in exterior.iter().zip(ring.iter()) {
            assert!((a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        let frame = LocalFrame::new(0.0, 0.0);
        let ring = vec![[0.0, 0.0], [0.001, 0.0], [0.0, 0.0]];
        assert_eq!(
            polygon_from_rings(&[ring], &frame),
            Err(GeometryError::TooFewVertices(2))
        );
        assert_eq!(
            polygon_from_rings(&[], &frame),
            Err(GeometryError::MissingExterior)
        );
    }
}
