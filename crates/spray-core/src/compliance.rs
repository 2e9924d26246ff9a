//! Compliance clipping of treatment zones against allowed and exclusion layers.
//!
//! Zones are intersected with the union of allowed areas (when any exist) and
//! then have the union of buffered exclusion areas subtracted. Zones may be
//! dropped, shrunk, or split into several fragments.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::geometry::{area_m2, centroid_lat_lon, polygon_from_rings, polygon_to_rings, PlanarOps};
use crate::models::{resequence_by_priority, ComplianceLayer, LayerKind, ZoneDraft};
use crate::spatial::LocalFrame;

/// Fragments smaller than this are treated as slivers and discarded.
const MIN_FRAGMENT_AREA_M2: f64 = 1.0;
const SQ_M_PER_HA: f64 = 10_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub enabled: bool,
    pub allowed_layers: usize,
    pub exclusion_layers: usize,
    /// Layer polygons skipped because their geometry was unusable
    pub invalid_polygons: usize,
    pub original_zone_count: usize,
    pub resulting_zone_count: usize,
    pub fully_excluded_zones: usize,
    /// Zones that split into more than one fragment
    pub split_zones: usize,
    /// Extra zones created by splitting
    pub split_zones_created: usize,
    /// Zones that survived as a single, smaller polygon
    pub clipped_zones: usize,
    pub original_area_ha: f64,
    pub resulting_area_ha: f64,
    pub excluded_area_ha: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub zones: Vec<ZoneDraft>,
    pub report: ComplianceReport,
}

struct LayerUnions {
    allowed: Option<MultiPolygon<f64>>,
    exclusion: Option<MultiPolygon<f64>>,
}

/// Clip zones against active compliance layers.
///
/// With the feature disabled or no layers supplied the zones pass through
/// unchanged and the report carries `enabled: false`.
pub fn clip_zones<O: PlanarOps>(
    zones: Vec<ZoneDraft>,
    layers: &[ComplianceLayer],
    enabled: bool,
    ops: &O,
) -> ClipOutcome {
    let original_area_ha: f64 = zones.iter().map(|zone| zone.area_hectares).sum();
    let mut report = ComplianceReport {
        enabled: enabled && !layers.is_empty(),
        allowed_layers: layers.iter().filter(|l| l.kind == LayerKind::Allowed).count(),
        exclusion_layers: layers.iter().filter(|l| l.kind == LayerKind::Exclusion).count(),
        original_zone_count: zones.len(),
        resulting_zone_count: zones.len(),
        original_area_ha,
        resulting_area_ha: original_area_ha,
        ..Default::default()
    };

    if !report.enabled {
        if !enabled {
            report.notes.push("Compliance clipping disabled for this plan".to_string());
        } else {
            report.notes.push("No active compliance layers".to_string());
        }
        return ClipOutcome { zones, report };
    }

    let Some(frame) = LocalFrame::centered_on(zones.iter().map(|z| (z.centroid_lat, z.centroid_lon))) else {
        return ClipOutcome { zones, report };
    };

    let unions = build_unions(layers, &frame, ops, &mut report);
    if unions.allowed.is_none() && unions.exclusion.is_none() {
        report.notes.push("Compliance layers had no usable geometry".to_string());
        return ClipOutcome { zones, report };
    }

    let mut survivors: Vec<ZoneDraft> = Vec::with_capacity(zones.len());
    let mut excluded_area_ha = 0.0;

    for zone in zones {
        let mut rings = Vec::with_capacity(1 + zone.interior_rings.len());
        rings.push(zone.polygon_ring.clone());
        rings.extend(zone.interior_rings.iter().cloned());
        let footprint = match polygon_from_rings(&rings, &frame) {
            Ok(polygon) => MultiPolygon::new(vec![polygon]),
            Err(err) => {
                tracing::warn!(zone = zone.sequence, "Zone footprint unusable, kept as-is: {}", err);
                report
                    .notes
                    .push(format!("Zone {} kept unclipped: {}", zone.sequence, err));
                survivors.push(zone);
                continue;
            }
        };
        let zone_m2 = area_m2(&footprint);

        let mut clipped = match &unions.allowed {
            Some(allowed) => ops.intersect(&footprint, allowed),
            None => footprint.clone(),
        };
        if let Some(exclusion) = &unions.exclusion {
            clipped = ops.difference(&clipped, exclusion);
        }

        let mut fragments: Vec<(geo::Polygon<f64>, f64)> = clipped
            .0
            .into_iter()
            .map(|polygon| {
                let area = area_m2(&MultiPolygon::new(vec![polygon.clone()]));
                (polygon, area)
            })
            .filter(|(_, area)| *area >= MIN_FRAGMENT_AREA_M2)
            .collect();
        fragments.sort_by(|a, b| b.1.total_cmp(&a.1));

        let kept_m2: f64 = fragments.iter().map(|(_, area)| area).sum();
        if fragments.is_empty() || zone_m2 <= 0.0 {
            report.fully_excluded_zones += 1;
            excluded_area_ha += zone.area_hectares;
            continue;
        }

        let unchanged = fragments.len() == 1 && (zone_m2 - kept_m2).abs() <= zone_m2 * 1e-6 + 0.01;
        if unchanged {
            survivors.push(zone);
            continue;
        }

        let kept_ratio = (kept_m2 / zone_m2).min(1.0);
        excluded_area_ha += zone.area_hectares * (1.0 - kept_ratio);
        if fragments.len() > 1 {
            report.split_zones += 1;
            report.split_zones_created += fragments.len() - 1;
        } else {
            report.clipped_zones += 1;
        }

        for (polygon, fragment_m2) in &fragments {
            survivors.push(fragment_zone(&zone, polygon, *fragment_m2 / zone_m2, &frame));
        }
    }

    resequence_by_priority(&mut survivors);
    report.resulting_zone_count = survivors.len();
    report.resulting_area_ha = survivors.iter().map(|zone| zone.area_hectares).sum();
    report.excluded_area_ha = excluded_area_ha;
    tracing::debug!(
        original = report.original_zone_count,
        resulting = report.resulting_zone_count,
        excluded_ha = report.excluded_area_ha,
        "Compliance clipping complete"
    );

    ClipOutcome {
        zones: survivors,
        report,
    }
}

fn build_unions<O: PlanarOps>(
    layers: &[ComplianceLayer],
    frame: &LocalFrame,
    ops: &O,
    report: &mut ComplianceReport,
) -> LayerUnions {
    let mut allowed = Vec::new();
    let mut exclusion = Vec::new();

    for layer in layers {
        let mut polygons = Vec::new();
        for rings in layer.geometry.polygons() {
            match polygon_from_rings(rings, frame) {
                Ok(polygon) => polygons.push(polygon),
                Err(err) => {
                    report.invalid_polygons += 1;
                    report
                        .notes
                        .push(format!("Layer '{}' polygon skipped: {}", layer.name, err));
                }
            }
        }
        if polygons.is_empty() {
            continue;
        }
        let geometry = MultiPolygon::new(polygons);
        match layer.kind {
            LayerKind::Allowed => allowed.push(geometry),
            LayerKind::Exclusion => exclusion.push(ops.buffer(&geometry, layer.buffer_meters)),
        }
    }

    LayerUnions {
        allowed: (!allowed.is_empty()).then(|| ops.union(&allowed)),
        exclusion: (!exclusion.is_empty()).then(|| ops.union(&exclusion)),
    }
}

fn fragment_zone(
    parent: &ZoneDraft,
    polygon: &geo::Polygon<f64>,
    ratio: f64,
    frame: &LocalFrame,
) -> ZoneDraft {
    let (polygon_ring, interior_rings) = polygon_to_rings(polygon, frame);
    let (centroid_lat, centroid_lon) =
        centroid_lat_lon(polygon, frame).unwrap_or((parent.centroid_lat, parent.centroid_lon));
    let area_hectares = parent.area_hectares * ratio;
    let detection_count = ((parent.detection_count as f64 * ratio).round() as u32).max(1);

    ZoneDraft {
        sequence: parent.sequence,
        species: parent.species.clone(),
        member_point_ids: parent.member_point_ids.clone(),
        detection_count,
        average_confidence: parent.average_confidence,
        centroid_lat,
        centroid_lon,
        polygon_ring,
        interior_rings,
        area_hectares,
        dose_liters_per_ha: parent.dose_liters_per_ha,
        dose_source: parent.dose_source,
        recommended_liters: area_hectares * parent.dose_liters_per_ha,
        priority_score: parent.priority_score * ratio,
    }
}

/// Area of a closed [lon, lat] ring in hectares, using a frame at its mean.
pub fn ring_area_ha(ring: &[[f64; 2]]) -> f64 {
    let Some(frame) = LocalFrame::centered_on(ring.iter().map(|p| (p[1], p[0]))) else {
        return 0.0;
    };
    match polygon_from_rings(&[ring.to_vec()], &frame) {
        Ok(polygon) => area_m2(&MultiPolygon::new(vec![polygon])) / SQ_M_PER_HA,
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoPlanarOps;
    use crate::models::{priority_score, DoseSource, LayerGeometry};

    const LAT: f64 = -27.47;
    const LON: f64 = 153.02;

    fn frame() -> LocalFrame {
        LocalFrame::new(LAT, LON)
    }

    /// Axis-aligned rectangle in local meters, as a closed [lon, lat] ring.
    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<[f64; 2]> {
        let f = frame();
        [(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]
            .iter()
            .map(|&(x, y)| {
                let (lat, lon) = f.to_geographic(x, y);
                [lon, lat]
            })
            .collect()
    }

    fn zone(x0: f64, y0: f64, x1: f64, y1: f64, count: u32) -> ZoneDraft {
        let ring = rect(x0, y0, x1, y1);
        let area = ring_area_ha(&ring);
        let (lat, lon) = frame().to_geographic((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        ZoneDraft {
            sequence: 1,
            species: "Lantana".to_string(),
            member_point_ids: vec!["p1".to_string()],
            detection_count: count,
            average_confidence: 0.8,
            centroid_lat: lat,
            centroid_lon: lon,
            polygon_ring: ring,
            interior_rings: Vec::new(),
            area_hectares: area,
            dose_liters_per_ha: 2.0,
            dose_source: DoseSource::FallbackDefault,
            recommended_liters: area * 2.0,
            priority_score: priority_score(count, 0.8),
        }
    }

    fn layer(kind: LayerKind, ring: Vec<[f64; 2]>, buffer_meters: f64) -> ComplianceLayer {
        ComplianceLayer {
            id: format!("{}-layer", kind.as_str()),
            name: format!("{} layer", kind.as_str()),
            kind,
            buffer_meters,
            geometry: LayerGeometry::Polygon(vec![ring]),
        }
    }

    #[test]
    fn disabled_or_empty_layers_pass_zones_through() {
        let zones = vec![zone(-20.0, -20.0, 20.0, 20.0, 10)];
        let outcome = clip_zones(zones.clone(), &[], true, &GeoPlanarOps);
        assert!(!outcome.report.enabled);
        assert_eq!(outcome.zones, zones);

        let layers = [layer(LayerKind::Exclusion, rect(-5.0, -5.0, 5.0, 5.0), 0.0)];
        let outcome = clip_zones(zones.clone(), &layers, false, &GeoPlanarOps);
        assert!(!outcome.report.enabled);
        assert_eq!(outcome.zones, zones);
    }

    #[test]
    fn allowed_western_half_keeps_one_smaller_fragment() {
        let original = zone(-20.0, -20.0, 20.0, 20.0, 10);
        let layers = [layer(LayerKind::Allowed, rect(-100.0, -100.0, 0.0, 100.0), 0.0)];
        let outcome = clip_zones(vec![original.clone()], &layers, true, &GeoPlanarOps);

        assert!(outcome.report.enabled);
        assert_eq!(outcome.zones.len(), 1);
        assert_eq!(outcome.report.fully_excluded_zones, 0);
        let fragment = &outcome.zones[0];
        assert!(fragment.area_hectares < original.area_hectares);
        assert!((fragment.area_hectares - original.area_hectares / 2.0).abs() < 1e-4);
        assert!(fragment.centroid_lon < original.centroid_lon);
        assert_eq!(fragment.detection_count, 5);
        assert!((fragment.recommended_liters - fragment.area_hectares * 2.0).abs() < 1e-9);
    }

    #[test]
    fn exclusion_strip_splits_zone_and_conserves_area() {
        let original = zone(-30.0, -10.0, 30.0, 10.0, 9);
        let layers = [layer(LayerKind::Exclusion, rect(-2.0, -50.0, 2.0, 50.0), 3.0)];
        let outcome = clip_zones(vec![original.clone()], &layers, true, &GeoPlanarOps);

        assert_eq!(outcome.zones.len(), 2);
        assert_eq!(outcome.report.split_zones, 1);
        assert_eq!(outcome.report.split_zones_created, 1);
        let resulting: f64 = outcome.zones.iter().map(|z| z.area_hectares).sum();
        assert!((resulting + outcome.report.excluded_area_ha - original.area_hectares).abs() < 1e-9);
        // buffered strip is ~10m wide out of 60m
        assert!(outcome.report.excluded_area_ha > original.area_hectares * 0.14);
        for fragment in &outcome.zones {
            assert!(fragment.detection_count >= 1);
            assert!(fragment.priority_score < original.priority_score);
        }
        let sequences: Vec<u32> = outcome.zones.iter().map(|z| z.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn fully_covered_zone_is_dropped_with_its_area() {
        let covered = zone(-10.0, -10.0, 10.0, 10.0, 4);
        let clear = zone(200.0, 200.0, 220.0, 220.0, 4);
        let layers = [layer(LayerKind::Exclusion, rect(-50.0, -50.0, 50.0, 50.0), 0.0)];
        let outcome = clip_zones(vec![covered.clone(), clear.clone()], &layers, true, &GeoPlanarOps);

        assert_eq!(outcome.report.fully_excluded_zones, 1);
        assert_eq!(outcome.zones.len(), 1);
        assert!((outcome.report.excluded_area_ha - covered.area_hectares).abs() < 1e-9);
        assert_eq!(outcome.zones[0].polygon_ring, clear.polygon_ring);
    }

    #[test]
    fn interior_exclusion_leaves_a_hole() {
        let original = zone(-30.0, -30.0, 30.0, 30.0, 20);
        let layers = [layer(LayerKind::Exclusion, rect(-5.0, -5.0, 5.0, 5.0), 0.0)];
        let outcome = clip_zones(vec![original.clone()], &layers, true, &GeoPlanarOps);

        assert_eq!(outcome.zones.len(), 1);
        assert_eq!(outcome.report.clipped_zones, 1);
        let fragment = &outcome.zones[0];
        assert_eq!(fragment.interior_rings.len(), 1);
        let expected = original.area_hectares * (3600.0 - 100.0) / 3600.0;
        assert!((fragment.area_hectares - expected).abs() < 1e-4);
    }

    #[test]
    fn degenerate_layer_polygons_are_reported() {
        let original = zone(-10.0, -10.0, 10.0, 10.0, 4);
        let bad = ComplianceLayer {
            id: "bad".into(),
            name: "bad".into(),
            kind: LayerKind::Exclusion,
            buffer_meters: 0.0,
            geometry: LayerGeometry::Polygon(vec![vec![[LON, LAT], [LON, LAT]]]),
        };
        let outcome = clip_zones(vec![original.clone()], &[bad], true, &GeoPlanarOps);
        assert_eq!(outcome.report.invalid_polygons, 1);
        assert_eq!(outcome.zones, vec![original]);
    }
}
