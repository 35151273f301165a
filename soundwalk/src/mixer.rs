// Mixer module - maps active zones to per-stem target gains
// and pushes the differences to a stem output

use crate::config::{MixDesc, SilentStemPolicy};
use crate::error::Result;
use crate::monitor::ActiveZoneSet;
use crate::zone::Zone;
use std::collections::{BTreeMap, BTreeSet};

/// The seam between the mixer and whatever plays the stems.
pub trait StemOutput {
    /// Registered stems with the gain last requested for each.
    fn stem_targets(&self) -> BTreeMap<String, f32>;

    fn set_gain(&mut self, stem_id: &str, target: f32, fade_seconds: f64, quantize_bars: u32) -> Result<()>;

    /// Freeze a stem at its current gain, cancelling any ramp.
    fn hold_gain(&mut self, stem_id: &str) -> Result<()>;

    fn start_all(&mut self) -> Result<()>;
}

/// A gain request issued to the output.
#[derive(Debug, Clone, PartialEq)]
pub enum GainChange {
    Ramp { stem_id: String, target: f32 },
    Hold { stem_id: String },
}

impl GainChange {
    pub fn stem_id(&self) -> &str {
        match self {
            Self::Ramp { stem_id, .. } | Self::Hold { stem_id } => stem_id,
        }
    }
}

/// Per-stem target gains for the active zones.
///
/// Each stem gets the loudest gain any active zone asks for, so overlapping
/// zones never cancel each other. Zones missing from the catalog are skipped.
pub fn target_gains(active: &ActiveZoneSet, catalog: &[Zone]) -> BTreeMap<String, f32> {
    let mut targets: BTreeMap<String, f32> = BTreeMap::new();
    for zone in catalog.iter().filter(|z| active.contains(&z.id)) {
        for (stem_id, gain) in zone.stem_requests() {
            let entry = targets.entry(stem_id).or_insert(0.0);
            *entry = entry.max(gain);
        }
    }
    targets
}

pub struct StemMixer {
    desc: MixDesc,
    /// Stems some active zone asked for at the last recompute.
    requested: BTreeSet<String>,
}

impl StemMixer {
    pub fn new(desc: MixDesc) -> Self {
        Self {
            desc,
            requested: BTreeSet::new(),
        }
    }

    pub fn desc(&self) -> &MixDesc {
        &self.desc
    }

    /// Recompute targets and issue a change for every stem whose target moved.
    ///
    /// Returns the changes actually accepted by `output`. A failure on one
    /// stem is logged and does not stop the others.
    pub fn apply(
        &mut self,
        active: &ActiveZoneSet,
        catalog: &[Zone],
        output: &mut dyn StemOutput,
    ) -> Vec<GainChange> {
        let targets = target_gains(active, catalog);
        let registered = output.stem_targets();
        let mut changes = Vec::new();

        let unregistered: Vec<&str> = targets
            .keys()
            .filter(|id| !registered.contains_key(*id))
            .map(String::as_str)
            .collect();
        if !unregistered.is_empty() {
            log::debug!("Requested stems without audio: {:?}", unregistered);
        }

        for (stem_id, current) in &registered {
            let change = match (targets.get(stem_id), self.desc.silent_stems) {
                (Some(target), _) => (target != current).then(|| GainChange::Ramp {
                    stem_id: stem_id.clone(),
                    target: *target,
                }),
                (None, SilentStemPolicy::Mute) => (*current != 0.0).then(|| GainChange::Ramp {
                    stem_id: stem_id.clone(),
                    target: 0.0,
                }),
                (None, SilentStemPolicy::Hold) => {
                    self.requested.contains(stem_id).then(|| GainChange::Hold {
                        stem_id: stem_id.clone(),
                    })
                }
            };

            let Some(change) = change else {
                continue;
            };

            let result = match &change {
                GainChange::Ramp { stem_id, target } => output.set_gain(
                    stem_id,
                    *target,
                    self.desc.fade_seconds,
                    self.desc.quantize_bars,
                ),
                GainChange::Hold { stem_id } => output.hold_gain(stem_id),
            };
            match result {
                Ok(()) => changes.push(change),
                Err(e) => log::warn!("Gain change for stem '{}' failed: {}", stem_id, e),
            }
        }

        self.requested = targets.into_keys().collect();
        changes
    }
}
