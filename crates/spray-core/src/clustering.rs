//! Zone clustering: groups same-species source points into treatment zones.
//!
//! Per species, points are projected into a local tangent plane, bucketed into
//! a uniform grid whose cell size is the zone radius, and 8-connected
//! non-empty cells are flood-filled into clusters. Each surviving cluster gets
//! a convex-hull footprint, an area, and a dose recommendation.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::SprayPlanConfig;
use crate::models::{priority_score, resequence_by_priority, DoseSource, SourcePoint, ZoneDraft};
use crate::spatial::LocalFrame;

const MIN_FALLBACK_HALF_SIZE_M: f64 = 4.0;
const SQ_M_PER_HA: f64 = 10_000.0;

/// Species → recommended liters per hectare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoseReference {
    entries: HashMap<String, f64>,
}

impl DoseReference {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .filter(|(_, dose)| dose.is_finite() && *dose > 0.0)
            .map(|(species, dose)| (species.as_ref().trim().to_lowercase(), dose))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, species: &str) -> Option<f64> {
        self.entries.get(&species.trim().to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    /// Zones sorted by descending priority, sequence starting at 1
    pub zones: Vec<ZoneDraft>,
    /// Clusters dropped for having fewer than the minimum detections
    pub skipped_clusters: usize,
}

/// Cluster source points into zones, independently per species.
///
/// Deterministic for a given point set regardless of input order.
pub fn cluster_zones(
    points: &[SourcePoint],
    config: &SprayPlanConfig,
    doses: &DoseReference,
) -> ClusterOutcome {
    let mut by_species: BTreeMap<String, Vec<&SourcePoint>> = BTreeMap::new();
    for point in points {
        by_species
            .entry(point.species.trim().to_lowercase())
            .or_default()
            .push(point);
    }

    let mut outcome = ClusterOutcome::default();
    for (species_key, mut members) in by_species {
        members.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then_with(|| a.lat.total_cmp(&b.lat))
                .then_with(|| a.lon.total_cmp(&b.lon))
        });
        let display_name = members
            .iter()
            .map(|point| point.species.trim())
            .min()
            .unwrap_or(species_key.as_str())
            .to_string();

        let Some(frame) = LocalFrame::centered_on(members.iter().map(|p| (p.lat, p.lon))) else {
            continue;
        };
        let local: Vec<(f64, f64)> = members
            .iter()
            .map(|point| frame.to_local(point.lat, point.lon))
            .collect();

        for cluster in grid_clusters(&local, config.zone_radius_m) {
            if (cluster.len() as u32) < config.min_detections_per_zone {
                outcome.skipped_clusters += 1;
                continue;
            }
            let zone = build_zone(&display_name, &members, &local, &cluster, &frame, config, doses);
            outcome.zones.push(zone);
        }
    }

    resequence_by_priority(&mut outcome.zones);
    tracing::debug!(
        zones = outcome.zones.len(),
        skipped = outcome.skipped_clusters,
        "Clustered source points"
    );
    outcome
}

/// Single-linkage clusters over an occupancy grid, as sorted point indexes.
fn grid_clusters(local: &[(f64, f64)], cell_size_m: f64) -> Vec<Vec<usize>> {
    let cell = cell_size_m.max(1.0);
    let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
    for (idx, (x, y)) in local.iter().enumerate() {
        let key = ((x / cell).floor() as i64, (y / cell).floor() as i64);
        cells.entry(key).or_default().push(idx);
    }

    let mut visited: HashSet<(i64, i64)> = HashSet::new();
    let mut clusters = Vec::new();
    for &start in cells.keys() {
        if !visited.insert(start) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if let Some(indexes) = cells.get(&current) {
                members.extend_from_slice(indexes);
            }
            for dx in -1..=1 {
                for dy in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let neighbor = (current.0 + dx, current.1 + dy);
                    if cells.contains_key(&neighbor) && visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        members.sort_unstable();
        clusters.push(members);
    }
    clusters
}

fn build_zone(
    species: &str,
    members: &[&SourcePoint],
    local: &[(f64, f64)],
    cluster: &[usize],
    frame: &LocalFrame,
    config: &SprayPlanConfig,
    doses: &DoseReference,
) -> ZoneDraft {
    let count = cluster.len();
    let cluster_local: Vec<(f64, f64)> = cluster.iter().map(|&idx| local[idx]).collect();

    let mut hull = convex_hull(&cluster_local);
    if hull.len() < 3 {
        let (cx, cy) = mean_xy(&cluster_local);
        let half = MIN_FALLBACK_HALF_SIZE_M.max(config.zone_radius_m / 2.0);
        hull = vec![
            (cx - half, cy - half),
            (cx + half, cy - half),
            (cx + half, cy + half),
            (cx - half, cy + half),
        ];
    }
    let area_ha = shoelace_area_m2(&hull) / SQ_M_PER_HA;

    let mut polygon_ring: Vec<[f64; 2]> = hull
        .iter()
        .map(|&(x, y)| {
            let (lat, lon) = frame.to_geographic(x, y);
            [lon, lat]
        })
        .collect();
    if let Some(first) = polygon_ring.first().copied() {
        polygon_ring.push(first);
    }

    let (sum_lat, sum_lon, sum_conf) = cluster.iter().fold((0.0, 0.0, 0.0), |acc, &idx| {
        let point = members[idx];
        (acc.0 + point.lat, acc.1 + point.lon, acc.2 + point.confidence)
    });
    let n = count as f64;
    let average_confidence = sum_conf / n;

    let (dose_liters_per_ha, dose_source) = match doses.lookup(species) {
        Some(dose) => (dose, DoseSource::ReferenceTable),
        None => (config.default_dose_per_ha, DoseSource::FallbackDefault),
    };

    ZoneDraft {
        sequence: 0,
        species: species.to_string(),
        member_point_ids: cluster
            .iter()
            .map(|&idx| members[idx].source_id.clone())
            .collect(),
        detection_count: count as u32,
        average_confidence,
        centroid_lat: sum_lat / n,
        centroid_lon: sum_lon / n,
        polygon_ring,
        interior_rings: Vec::new(),
        area_hectares: area_ha,
        dose_liters_per_ha,
        dose_source,
        recommended_liters: area_ha * dose_liters_per_ha,
        priority_score: priority_score(count as u32, average_confidence),
    }
}

fn mean_xy(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    (sx / n, sy / n)
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Monotone-chain convex hull, counter-clockwise, without the closing vertex.
///
/// Returns fewer than 3 points for degenerate (coincident or collinear) input.
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
    sorted.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9);
    if sorted.len() < 3 {
        return sorted;
    }

    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(sorted.len());
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::with_capacity(sorted.len());
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Unsigned polygon area in square meters for an open or closed ring.
pub fn shoelace_area_m2(ring: &[(f64, f64)]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..ring.len() {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % ring.len()];
        twice_area += x1 * y2 - x2 * y1;
    }
    (twice_area / 2.0).abs()
}
