//! Per-mission visit ordering: nearest-neighbor baseline refined by 2-opt.

use crate::config::SprayPlanConfig;
use crate::models::{MissionDraft, ZoneDraft};
use crate::packing::MissionPack;
use crate::spatial::haversine_distance;

/// A reversal must shorten the route by more than this to be accepted.
const MIN_IMPROVEMENT_M: f64 = 0.1;
const MAX_TWO_OPT_PASSES: usize = 8;

/// Launch point as (lat, lon).
///
/// Explicit configured start, else the project center, else the centroid of
/// the highest-priority zone.
pub fn resolve_start(
    config: &SprayPlanConfig,
    project_center: Option<(f64, f64)>,
    zones: &[ZoneDraft],
) -> Option<(f64, f64)> {
    if let Some(start) = config.start {
        return Some((start.lat, start.lon));
    }
    if project_center.is_some() {
        return project_center;
    }
    zones
        .iter()
        .min_by_key(|zone| zone.sequence)
        .map(|zone| (zone.centroid_lat, zone.centroid_lon))
}

struct RouteContext {
    start: (f64, f64),
    stops: Vec<(f64, f64)>,
    return_to_start: bool,
}

impl RouteContext {
    fn leg(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        haversine_distance(a.0, a.1, b.0, b.1)
    }

    /// Point at a position in the visit order; `None` is the start.
    fn point(&self, order: &[usize], position: Option<usize>) -> (f64, f64) {
        match position {
            Some(p) => self.stops[order[p]],
            None => self.start,
        }
    }

    fn total(&self, order: &[usize]) -> f64 {
        let mut distance = 0.0;
        let mut current = self.start;
        for &stop in order {
            distance += self.leg(current, self.stops[stop]);
            current = self.stops[stop];
        }
        if self.return_to_start && !order.is_empty() {
            distance += self.leg(current, self.start);
        }
        distance
    }

    fn nearest_neighbor(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..self.stops.len()).collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut current = self.start;
        while !remaining.is_empty() {
            let (pos, _) = remaining
                .iter()
                .enumerate()
                .map(|(pos, &stop)| (pos, self.leg(current, self.stops[stop])))
                .fold((0, f64::INFINITY), |best, next| if next.1 < best.1 { next } else { best });
            let stop = remaining.remove(pos);
            current = self.stops[stop];
            order.push(stop);
        }
        order
    }

    /// Length change from reversing `order[i..=k]`.
    fn reversal_delta(&self, order: &[usize], i: usize, k: usize) -> f64 {
        let before = self.point(order, i.checked_sub(1));
        let first = self.point(order, Some(i));
        let last = self.point(order, Some(k));
        let after = if k + 1 < order.len() {
            Some(self.point(order, Some(k + 1)))
        } else if self.return_to_start {
            Some(self.start)
        } else {
            None
        };

        let mut delta = self.leg(before, last) - self.leg(before, first);
        if let Some(after) = after {
            delta += self.leg(first, after) - self.leg(last, after);
        }
        delta
    }

    fn two_opt(&self, mut order: Vec<usize>) -> Vec<usize> {
        let n = order.len();
        if n < 2 {
            return order;
        }
        for _ in 0..MAX_TWO_OPT_PASSES {
            let mut improved = false;
            for i in 0..n - 1 {
                for k in i + 1..n {
                    if self.reversal_delta(&order, i, k) < -MIN_IMPROVEMENT_M {
                        order[i..=k].reverse();
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        order
    }

    fn coordinates(&self, order: &[usize]) -> Vec<[f64; 2]> {
        let mut coords = Vec::with_capacity(order.len() + 2);
        coords.push([self.start.1, self.start.0]);
        coords.extend(order.iter().map(|&stop| [self.stops[stop].1, self.stops[stop].0]));
        if self.return_to_start && !order.is_empty() {
            coords.push([self.start.1, self.start.0]);
        }
        coords
    }
}

/// Order one packed mission and compute its route, distances and duration.
pub fn optimize_route(
    sequence: u32,
    pack: &MissionPack,
    zones: &[ZoneDraft],
    start: (f64, f64),
    config: &SprayPlanConfig,
) -> MissionDraft {
    let context = RouteContext {
        start,
        stops: pack
            .zone_indexes
            .iter()
            .map(|&idx| (zones[idx].centroid_lat, zones[idx].centroid_lon))
            .collect(),
        return_to_start: config.return_to_start,
    };

    let baseline = context.nearest_neighbor();
    let baseline_distance_m = context.total(&baseline);
    let mut order = context.two_opt(baseline.clone());
    let mut optimized_distance_m = context.total(&order);
    if optimized_distance_m > baseline_distance_m {
        order = baseline;
        optimized_distance_m = baseline_distance_m;
    }

    let route_coordinates = context.coordinates(&order);

    let transit_min = optimized_distance_m / (config.cruise_speed_mps * 60.0);
    let spray_min = pack.total_area_ha / config.spray_rate_ha_per_min;

    MissionDraft {
        sequence,
        name: format!("Mission {sequence}"),
        ordered_zone_indexes: order.iter().map(|&stop| pack.zone_indexes[stop]).collect(),
        total_area_ha: pack.total_area_ha,
        total_chemical_liters: pack.total_chemical_liters,
        route_coordinates,
        baseline_distance_m,
        optimized_distance_m,
        estimated_duration_min: transit_min + spray_min,
        exceeds_capacity: pack.exceeds_capacity,
        refills_required: pack.refills_required,
    }
}

/// Route every packed mission from a shared start, numbering them from 1.
pub fn build_missions(
    packs: &[MissionPack],
    zones: &[ZoneDraft],
    start: (f64, f64),
    config: &SprayPlanConfig,
) -> Vec<MissionDraft> {
    packs
        .iter()
        .enumerate()
        .map(|(idx, pack)| optimize_route(idx as u32 + 1, pack, zones, start, config))
        .collect()
}
