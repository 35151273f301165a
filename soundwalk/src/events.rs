//! Event types for SoundWalk

use crate::location::AuthorizationStatus;

/// Direction of a zone boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Enter,
    Exit,
}

/// An Enter or Exit for one zone, as emitted by the proximity monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneEvent {
    pub zone_id: String,
    pub transition: Transition,
}

impl ZoneEvent {
    pub fn enter(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            transition: Transition::Enter,
        }
    }

    pub fn exit(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            transition: Transition::Exit,
        }
    }

    pub fn is_enter(&self) -> bool {
        self.transition == Transition::Enter
    }
}

impl std::fmt::Display for ZoneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transition {
            Transition::Enter => write!(f, "ENTER {}", self.zone_id),
            Transition::Exit => write!(f, "EXIT  {}", self.zone_id),
        }
    }
}

/// Events reported by the render side of the transport.
///
/// Frames are absolute positions on the transport's sample clock.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StemStarted {
        stem_id: String,
        frame: u64,
    },
    StemLooped {
        stem_id: String,
        loop_count: u32,
        frame: u64,
    },
    RampStarted {
        stem_id: String,
        from: f32,
        to: f32,
        frame: u64,
    },
    RampCompleted {
        stem_id: String,
        gain: f32,
        frame: u64,
    },
    /// A pending or in-flight ramp was cancelled by a newer one.
    RampSuperseded {
        stem_id: String,
        frame: u64,
    },
    AllStopped,
}

impl TransportEvent {
    pub fn stem_id(&self) -> Option<&str> {
        match self {
            Self::StemStarted { stem_id, .. }
            | Self::StemLooped { stem_id, .. }
            | Self::RampStarted { stem_id, .. }
            | Self::RampCompleted { stem_id, .. }
            | Self::RampSuperseded { stem_id, .. } => Some(stem_id),
            Self::AllStopped => None,
        }
    }

    pub fn is_ramp_event(&self) -> bool {
        matches!(
            self,
            Self::RampStarted { .. } | Self::RampCompleted { .. } | Self::RampSuperseded { .. }
        )
    }
}

/// Notifications for the UI / editor layer.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    ZoneEntered { zone_id: String, title: String },
    ZoneExited { zone_id: String, title: String },
    ActiveZonesChanged { active: Vec<String> },
    MixChanged { stem_id: String, target: f32 },
    CatalogChanged { zone_count: usize },
    AuthorizationChanged(AuthorizationStatus),
}
