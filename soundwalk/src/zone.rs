//! Zones: circular geofences carrying a stem-gain profile.

use crate::error::{Result, SoundWalkError};
use crate::geo::{CircularRegion, GeoPoint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A named circular geofence with the stems it asks for.
///
/// Serialises with the field names used by existing `zones.json` files
/// (`radius`, `audioFile`, `colorIndex`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "radius")]
    pub radius_meters: f64,
    /// Single-file zones from before stem profiles existed.
    #[serde(
        rename = "audioFile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_audio_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_index: Option<u32>,
    /// Stem id -> gain in `[0, 1]`
    #[serde(default)]
    pub stems: BTreeMap<String, f64>,
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            latitude,
            longitude,
            radius_meters,
            legacy_audio_file: None,
            color_index: None,
            stems: BTreeMap::new(),
        }
    }

    pub fn with_stem(mut self, stem_id: impl Into<String>, gain: f64) -> Self {
        self.stems.insert(stem_id.into(), gain);
        self
    }

    pub fn with_legacy_audio_file(mut self, filename: impl Into<String>) -> Self {
        self.legacy_audio_file = Some(filename.into());
        self
    }

    pub fn with_color_index(mut self, index: u32) -> Self {
        self.color_index = Some(index);
        self
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Radius actually enforced by the monitor: never below `min_radius`.
    pub fn effective_radius(&self, min_radius: f64) -> f64 {
        self.radius_meters.max(min_radius)
    }

    pub fn region(&self, min_radius: f64) -> CircularRegion {
        CircularRegion::new(self.center(), self.effective_radius(min_radius))
    }

    /// Every stem this zone asks for, with gains clamped to `[0, 1]`.
    ///
    /// A legacy single-file zone contributes its file as a stem (id = base
    /// name) at full gain.
    pub fn stem_requests(&self) -> impl Iterator<Item = (String, f32)> + '_ {
        let legacy = self
            .legacy_audio_file
            .as_deref()
            .map(|file| (stem_id_for_file(file), 1.0));

        self.stems
            .iter()
            .map(|(stem_id, gain)| (stem_id.clone(), clamp_gain(*gain)))
            .chain(legacy)
    }
}

/// Stem id for an audio file: its base name without extension.
pub fn stem_id_for_file(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

fn clamp_gain(gain: f64) -> f32 {
    if gain.is_nan() {
        return 0.0;
    }
    gain.clamp(0.0, 1.0) as f32
}

/// Rejects catalogs with duplicate zone ids.
pub fn validate_catalog(zones: &[Zone]) -> Result<()> {
    let mut seen = HashSet::new();
    for zone in zones {
        if !seen.insert(zone.id.as_str()) {
            return Err(SoundWalkError::Configuration(format!(
                "duplicate zone id '{}'",
                zone.id
            )));
        }
    }
    Ok(())
}

/// Insert or replace `zone` in `catalog`, returning the new catalog.
///
/// The first zone matching by id or by title is replaced in place. A new
/// zone without a color gets the next free color index.
pub fn upsert_zone(catalog: &[Zone], mut zone: Zone) -> Vec<Zone> {
    let mut next = catalog.to_vec();

    if let Some(existing) = next
        .iter_mut()
        .find(|z| z.id == zone.id || z.title == zone.title)
    {
        if zone.color_index.is_none() {
            zone.color_index = existing.color_index;
        }
        *existing = zone;
        return next;
    }

    if zone.color_index.is_none() {
        zone.color_index = Some(
            catalog
                .iter()
                .filter_map(|z| z.color_index)
                .max()
                .map_or(0, |max| max + 1),
        );
    }
    next.push(zone);
    next
}

/// Built-in zones used when no catalog can be loaded.
pub fn seed_zones() -> Vec<Zone> {
    vec![
        Zone::new("a", "Zone A", 51.474753, -0.057528, 200.0)
            .with_color_index(0)
            .with_stem("drums", 1.0)
            .with_stem("pads", 0.6),
        Zone::new("b", "Zone B", 51.500, -0.120000, 150.0)
            .with_color_index(1)
            .with_stem("bass", 1.0)
            .with_stem("vox", 0.8),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_radius_is_clamped() {
        let zone = Zone::new("z", "Z", 0.0, 0.0, 10.0);
        assert_eq!(zone.effective_radius(50.0), 50.0);
        let zone = Zone::new("z", "Z", 0.0, 0.0, 80.0);
        assert_eq!(zone.effective_radius(50.0), 80.0);
    }

    #[test]
    fn test_stem_requests_include_legacy_file() {
        let zone = Zone::new("z", "Z", 0.0, 0.0, 100.0)
            .with_stem("pads", 1.7)
            .with_legacy_audio_file("birds.m4a");
        let requests: Vec<_> = zone.stem_requests().collect();
        assert_eq!(
            requests,
            vec![("pads".to_string(), 1.0), ("birds".to_string(), 1.0)]
        );
    }

    #[test]
    fn test_stem_id_for_file() {
        assert_eq!(stem_id_for_file("drums.wav"), "drums");
        assert_eq!(stem_id_for_file("field.rec.mp3"), "field.rec");
        assert_eq!(stem_id_for_file("noext"), "noext");
    }

    #[test]
    fn test_upsert_replaces_by_title() {
        let catalog = seed_zones();
        let edited = Zone::new("a2", "Zone A", 51.0, 0.0, 75.0);
        let next = upsert_zone(&catalog, edited);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].id, "a2");
        assert_eq!(next[0].color_index, Some(0));
    }

    #[test]
    fn test_upsert_appends_with_next_color() {
        let catalog = seed_zones();
        let next = upsert_zone(&catalog, Zone::new("c", "Zone C", 51.0, 0.0, 75.0));
        assert_eq!(next.len(), 3);
        assert_eq!(next[2].color_index, Some(2));

        let first = upsert_zone(&[], Zone::new("c", "Zone C", 51.0, 0.0, 75.0));
        assert_eq!(first[0].color_index, Some(0));
    }

    #[test]
    fn test_validate_catalog_rejects_duplicates() {
        let mut zones = seed_zones();
        assert!(validate_catalog(&zones).is_ok());
        zones.push(Zone::new("a", "Other", 0.0, 0.0, 60.0));
        assert!(validate_catalog(&zones).is_err());
    }

    #[test]
    fn test_json_field_names() {
        let json = r#"[{"id":"x","title":"X","latitude":1.0,"longitude":2.0,"radius":30.0,"audioFile":"rain.wav","colorIndex":4}]"#;
        let zones: Vec<Zone> = serde_json::from_str(json).unwrap();
        assert_eq!(zones[0].radius_meters, 30.0);
        assert_eq!(zones[0].legacy_audio_file.as_deref(), Some("rain.wav"));
        assert_eq!(zones[0].color_index, Some(4));
        assert!(zones[0].stems.is_empty());
    }
}
