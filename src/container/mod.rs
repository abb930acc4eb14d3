//! Container configuration and the bind catalog
//!
//! A container is identified by its name. Its configuration describes:
//! - Identity (name, root filesystem, user inside the container)
//! - Capability toggles (gui, private gui, mesa, sound, webcam, dbus)
//! - Network mode and named binds

mod binds;
mod config;

pub use binds::{expand_home, BindCatalog, BindMode, BindSpec};
pub use config::{
    default_display_server, validate_name, ContainerConfig, ContainerSettings, NetworkMode,
};
