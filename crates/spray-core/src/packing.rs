//! Greedy mission packing under area, tank and zone-count limits.

use crate::config::SprayPlanConfig;
use crate::models::ZoneDraft;
use crate::spatial::haversine_distance;

/// Slack on the capacity comparisons so accumulated float error never
/// rejects a zone that fits exactly.
const CAPACITY_EPSILON: f64 = 1e-9;

/// A group of zones assigned to one sortie, in packing order.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionPack {
    pub zone_indexes: Vec<usize>,
    pub total_area_ha: f64,
    pub total_chemical_liters: f64,
    /// The seed zone alone breaks the area or tank limit
    pub exceeds_capacity: bool,
    pub refills_required: u32,
}

impl MissionPack {
    fn seeded(index: usize, zone: &ZoneDraft, config: &SprayPlanConfig) -> Self {
        let over_area = zone.area_hectares > config.max_area_ha_per_mission + CAPACITY_EPSILON;
        let over_tank = zone.recommended_liters > config.max_tank_liters + CAPACITY_EPSILON;
        let refills_required = if over_tank {
            ((zone.recommended_liters / config.max_tank_liters).ceil() as u32).saturating_sub(1)
        } else {
            0
        };
        Self {
            zone_indexes: vec![index],
            total_area_ha: zone.area_hectares,
            total_chemical_liters: zone.recommended_liters,
            exceeds_capacity: over_area || over_tank,
            refills_required,
        }
    }

    fn fits(&self, zone: &ZoneDraft, config: &SprayPlanConfig) -> bool {
        !self.exceeds_capacity
            && self.zone_indexes.len() < config.max_zones_per_mission as usize
            && self.total_area_ha + zone.area_hectares <= config.max_area_ha_per_mission + CAPACITY_EPSILON
            && self.total_chemical_liters + zone.recommended_liters <= config.max_tank_liters + CAPACITY_EPSILON
    }

    fn push(&mut self, index: usize, zone: &ZoneDraft) {
        self.zone_indexes.push(index);
        self.total_area_ha += zone.area_hectares;
        self.total_chemical_liters += zone.recommended_liters;
    }
}

fn centroid_distance(a: &ZoneDraft, b: &ZoneDraft) -> f64 {
    haversine_distance(a.centroid_lat, a.centroid_lon, b.centroid_lat, b.centroid_lon)
}

/// Highest priority first; equal priorities fall back to the lower sequence.
fn next_seed(zones: &[ZoneDraft], assigned: &[bool]) -> Option<usize> {
    zones
        .iter()
        .enumerate()
        .filter(|(idx, _)| !assigned[*idx])
        .min_by(|(_, a), (_, b)| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| a.sequence.cmp(&b.sequence))
        })
        .map(|(idx, _)| idx)
}

/// Pack zones into missions.
///
/// Each pass seeds a mission with the highest-priority unassigned zone and
/// then keeps adding the unassigned zone nearest to the last one added that
/// still fits every limit. Every pass assigns at least its seed, so the
/// result never has more missions than zones.
pub fn pack_missions(zones: &[ZoneDraft], config: &SprayPlanConfig) -> Vec<MissionPack> {
    let mut assigned = vec![false; zones.len()];
    let mut missions = Vec::new();

    while let Some(seed) = next_seed(zones, &assigned) {
        assigned[seed] = true;
        let mut mission = MissionPack::seeded(seed, &zones[seed], config);
        if mission.exceeds_capacity {
            tracing::warn!(
                zone = zones[seed].sequence,
                area_ha = zones[seed].area_hectares,
                liters = zones[seed].recommended_liters,
                "Zone exceeds a single-mission limit"
            );
        }
        let mut endpoint = seed;

        loop {
            let candidate = zones
                .iter()
                .enumerate()
                .filter(|(idx, zone)| !assigned[*idx] && mission.fits(zone, config))
                .map(|(idx, zone)| (idx, centroid_distance(&zones[endpoint], zone)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

            let Some((idx, _)) = candidate else {
                break;
            };
            assigned[idx] = true;
            mission.push(idx, &zones[idx]);
            endpoint = idx;
        }

        missions.push(mission);
    }

    tracing::debug!(zones = zones.len(), missions = missions.len(), "Missions packed");
    missions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoseSource;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn zone(sequence: u32, lat: f64, lon: f64, area: f64, liters: f64, priority: f64) -> ZoneDraft {
        ZoneDraft {
            sequence,
            species: "Lantana".to_string(),
            member_point_ids: vec![format!("p{sequence}")],
            detection_count: 3,
            average_confidence: 0.8,
            centroid_lat: lat,
            centroid_lon: lon,
            polygon_ring: Vec::new(),
            interior_rings: Vec::new(),
            area_hectares: area,
            dose_liters_per_ha: liters / area,
            dose_source: DoseSource::FallbackDefault,
            recommended_liters: liters,
            priority_score: priority,
        }
    }

    #[test]
    fn tank_sized_for_two_zones_splits_the_third() {
        let zones = vec![
            zone(1, -27.4700, 153.0200, 0.5, 3.0, 9.0),
            zone(2, -27.4705, 153.0205, 0.5, 3.0, 8.0),
            zone(3, -27.4710, 153.0210, 0.5, 3.0, 7.0),
        ];
        let config = SprayPlanConfig {
            max_tank_liters: 6.0,
            ..SprayPlanConfig::default()
        };

        let missions = pack_missions(&zones, &config);
        assert_eq!(missions.len(), 2);
        assert_eq!(missions[0].zone_indexes, vec![0, 1]);
        assert_eq!(missions[1].zone_indexes, vec![2]);
        assert!((missions[0].total_chemical_liters - 6.0).abs() < 1e-9);
    }

    #[test]
    fn picks_nearest_fitting_zone_from_the_endpoint() {
        let zones = vec![
            zone(1, -27.4700, 153.0200, 0.1, 0.2, 9.0),
            zone(2, -27.4800, 153.0300, 0.1, 0.2, 8.0),
            zone(3, -27.4701, 153.0201, 0.1, 0.2, 1.0),
        ];
        let missions = pack_missions(&zones, &SprayPlanConfig::default());
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].zone_indexes, vec![0, 2, 1]);
    }

    #[test]
    fn zone_count_cap_closes_the_mission() {
        let zones: Vec<ZoneDraft> = (0..5)
            .map(|i| zone(i + 1, -27.47 + i as f64 * 1e-4, 153.02, 0.1, 0.2, 10.0 - i as f64))
            .collect();
        let config = SprayPlanConfig {
            max_zones_per_mission: 2,
            ..SprayPlanConfig::default()
        };
        let missions = pack_missions(&zones, &config);
        let sizes: Vec<usize> = missions.iter().map(|m| m.zone_indexes.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn oversized_zone_gets_its_own_flagged_mission() {
        let zones = vec![
            zone(1, -27.4700, 153.0200, 1.0, 75.0, 9.0),
            zone(2, -27.4701, 153.0201, 0.1, 0.2, 1.0),
        ];
        let missions = pack_missions(&zones, &SprayPlanConfig::default());
        assert_eq!(missions.len(), 2);
        assert!(missions[0].exceeds_capacity);
        assert_eq!(missions[0].refills_required, 2);
        assert_eq!(missions[0].zone_indexes, vec![0]);
        assert!(!missions[1].exceeds_capacity);
    }

    #[test]
    fn random_zone_sets_respect_limits_and_assign_everything_once() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let count = rng.random_range(1..40);
            let zones: Vec<ZoneDraft> = (0..count)
                .map(|i| {
                    zone(
                        i + 1,
                        -27.47 + rng.random_range(-0.01..0.01),
                        153.02 + rng.random_range(-0.01..0.01),
                        rng.random_range(0.01..1.5),
                        rng.random_range(0.1..8.0),
                        rng.random_range(1.0..20.0),
                    )
                })
                .collect();
            let config = SprayPlanConfig {
                max_zones_per_mission: rng.random_range(1..6),
                max_area_ha_per_mission: 2.0,
                max_tank_liters: 10.0,
                ..SprayPlanConfig::default()
            };

            let missions = pack_missions(&zones, &config);
            assert!(missions.len() <= zones.len());
            let mut seen: Vec<usize> = missions.iter().flat_map(|m| m.zone_indexes.clone()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..zones.len()).collect::<Vec<_>>());
            for mission in missions.iter().filter(|m| !m.exceeds_capacity) {
                assert!(mission.total_area_ha <= config.max_area_ha_per_mission + 1e-6);
                assert!(mission.total_chemical_liters <= config.max_tank_liters + 1e-6);
                assert!(mission.zone_indexes.len() <= config.max_zones_per_mission as usize);
            }
        }
    }
}
