use super::TransportDesc;
use crate::error::{Result, SoundWalkError};
use serde::Deserialize;

/// What happens to a stem that no active zone requests any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilentStemPolicy {
    /// Ramp the stem to 0.
    #[default]
    Mute,
    /// Freeze the stem at whatever gain it currently has.
    Hold,
}

/// Region monitoring limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorDesc {
    /// Maximum number of simultaneously monitored regions (platform cap)
    pub max_monitored_regions: usize,
    /// Radii below this are clamped up (platform minimum)
    pub min_radius_meters: f64,
    /// Rebuild the monitored set once the user has moved this far from the
    /// point it was selected at. `None` only rebuilds on re-arm.
    pub reselect_after_meters: Option<f64>,
}

impl Default for MonitorDesc {
    fn default() -> Self {
        Self {
            max_monitored_regions: 20,
            min_radius_meters: 50.0,
            reselect_after_meters: None,
        }
    }
}

/// Gain ramp defaults used by the mixer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MixDesc {
    pub fade_seconds: f64,
    pub quantize_bars: u32,
    pub silent_stems: SilentStemPolicy,
}

impl Default for MixDesc {
    fn default() -> Self {
        Self {
            fade_seconds: 1.2,
            quantize_bars: 1,
            silent_stems: SilentStemPolicy::Mute,
        }
    }
}

/// Top-level configuration for a [`SoundWalk`](crate::router::SoundWalk).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoundWalkDesc {
    pub transport: TransportDesc,
    pub monitor: MonitorDesc,
    pub mix: MixDesc,
}

impl Default for SoundWalkDesc {
    fn default() -> Self {
        Self {
            transport: TransportDesc::default().tempo(98.0, 4),
            monitor: MonitorDesc::default(),
            mix: MixDesc::default(),
        }
    }
}

impl SoundWalkDesc {
    /// Parse a JSON configuration; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let desc: Self = serde_json::from_str(json)
            .map_err(|e| SoundWalkError::Configuration(format!("invalid configuration: {}", e)))?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        if self.monitor.max_monitored_regions == 0 {
            return Err(SoundWalkError::Configuration(
                "max_monitored_regions must be greater than 0".into(),
            ));
        }
        if !(self.monitor.min_radius_meters >= 0.0) {
            return Err(SoundWalkError::Configuration(
                "min_radius_meters must be non-negative".into(),
            ));
        }
        if !(self.mix.fade_seconds.is_finite() && self.mix.fade_seconds >= 0.0) {
            return Err(SoundWalkError::Configuration(
                "fade_seconds must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
