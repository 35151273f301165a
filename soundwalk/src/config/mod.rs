//! Configuration descriptors.

mod transport_desc;
mod walk_desc;

pub use transport_desc::{OutputMode, TransportDesc};
pub use walk_desc::{MixDesc, MonitorDesc, SilentStemPolicy, SoundWalkDesc};
