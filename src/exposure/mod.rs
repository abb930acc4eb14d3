//! Exposure descriptors
//!
//! Translates a validated configuration plus a little probed host state into
//! the ordered directives the runtime receives when the container starts.

mod builder;
mod directive;
mod probe;

pub use builder::{
    ExposureBuilder, CONTAINER_DBUS_SOCKET, CONTAINER_PULSE_DIR, CONTAINER_X_SOCKET,
};
pub use directive::{ExposureDescriptor, ExposureDirective};
pub use probe::{parse_interfaces, resolve_link, HostProbe, NetworkInterface, SystemProbe};
