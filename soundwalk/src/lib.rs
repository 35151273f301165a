//! # SoundWalk
//!
//! Location-driven adaptive soundscapes. Walking into a geofenced zone fades
//! in the audio stems that zone asks for; walking out fades them away again.
//! All stems loop in permanent phase lock, and every fade starts on a bar
//! line.
//!
//! ## Quick Start
//!
//! ```no_run
//! use soundwalk::*;
//! use soundwalk::audio_data::AudioLibrary;
//! use soundwalk::location::{AuthorizationStatus, ReplayLocationProvider};
//! use soundwalk::store::JsonZoneStore;
//! use std::time::Duration;
//!
//! let desc = SoundWalkDesc::default();
//!
//! // Every audio file in the library becomes a silent, looping stem
//! let library = AudioLibrary::new(Some("user_audio".into()), Some("bundle_audio".into()));
//! let mut transport = AudioTransport::new(desc.transport.clone())?;
//! transport.register_library(&library);
//!
//! // A simulated walk from zone A towards zone B
//! let (location_tx, location_rx) = crossbeam_channel::unbounded();
//! let zones = zone::seed_zones();
//! let route = ReplayLocationProvider::walk(zones[0].center(), zones[1].center(), 60);
//! let provider = ReplayLocationProvider::new(
//!     location_tx,
//!     route,
//!     Duration::from_secs(1),
//!     AuthorizationStatus::WhenInUse,
//! );
//!
//! let mut walk = SoundWalk::new(
//!     desc,
//!     Box::new(JsonZoneStore::in_dir(".")),
//!     transport,
//!     Box::new(provider),
//! )?;
//! let events = walk.subscribe();
//! walk.start_audio()?;
//!
//! let (command_tx, command_rx) = crossbeam_channel::unbounded();
//! std::thread::spawn(move || {
//!     for event in events {
//!         println!("{:?}", event);
//!     }
//! });
//! # drop(command_tx);
//! let walk = walk.run(location_rx, command_rx);
//! # Ok::<(), SoundWalkError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`ProximityMonitor`]**: keeps the nearest zones armed under a hard cap
//!   and turns fixes into edge-triggered Enter/Exit events
//! - **[`StemMixer`]**: active zones to per-stem target gains (loudest wins)
//! - **[`AudioTransport`]**: sample-clock transport looping every stem from one
//!   shared `T0`, with bar-quantized, superseding gain ramps
//! - **[`SoundWalk`]**: the single control loop wiring the above to a
//!   [`LocationProvider`](location::LocationProvider) and a
//!   [`ZoneStore`](store::ZoneStore)
//!
//! ## Threading
//!
//! 1. **Control thread**: runs [`SoundWalk::run`]; owns the catalog, the
//!    monitor, the mixer and the transport's control side
//! 2. **Location thread**: whatever the provider uses; only sends
//!    [`LocationEvent`](location::LocationEvent)s
//! 3. **Audio callback**: renders blocks, applies queued commands, and reports
//!    loop and ramp events through a bounded channel

pub mod audio_data;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod location;
pub mod mixer;
pub mod monitor;
pub mod router;
pub mod store;
pub mod transport;
pub mod zone;

pub use config::{MixDesc, MonitorDesc, OutputMode, SilentStemPolicy, SoundWalkDesc, TransportDesc};
pub use engine::{AudioEngine, AudioFillCallback};
pub use error::{Result, SoundWalkError};
pub use events::{Transition, TransportEvent, WalkEvent, ZoneEvent};
pub use geo::{CircularRegion, GeoPoint, LocationFix};
pub use mixer::{StemMixer, StemOutput};
pub use monitor::{ActiveZoneSet, ProximityMonitor};
pub use router::{SoundWalk, WalkCommand};
pub use transport::{AudioTransport, PlayState};
pub use zone::Zone;
