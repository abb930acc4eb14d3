//! Container configuration to exposure descriptor
//!
//! Most features are best effort: a missing theme directory or device node
//! is skipped. Sound and dbus are hard requirements because binding a socket
//! that is not there would give a silently broken passthrough.

use std::path::{Path, PathBuf};

use crate::container::{expand_home, ContainerConfig, NetworkMode};
use crate::context::InvocationContext;
use crate::display::X11_SOCKET_DIR;
use crate::error::{AppContainerError, Result};

use super::directive::{ExposureDescriptor, ExposureDirective};
use super::probe::HostProbe;

/// X socket slot inside the container; `DISPLAY=unix/:0` points here
pub const CONTAINER_X_SOCKET: &str = "/tmp/.X11-unix/X0";
/// Where the host pulse directory appears inside the container
pub const CONTAINER_PULSE_DIR: &str = "/run/user/host/pulse";
/// Where the host session bus appears inside the container
pub const CONTAINER_DBUS_SOCKET: &str = "/run/user/host/dbus";

const THEME_DIRS: &[&str] = &["/usr/share/themes", "~/.themes"];
const MESA_DEVICES: &[&str] = &["dri", "shm", "nvidia0", "nvidiactl", "nvidia-modeset"];
const V4L_DIR: &str = "/dev/v4l";
const V4L_BY_ID_DIR: &str = "/dev/v4l/by-id";
const DBUS_PATH_PREFIX: &str = "unix:path=";

/// Builds the descriptor for one start transition
pub struct ExposureBuilder<'a> {
    config: &'a ContainerConfig,
    ctx: &'a InvocationContext,
    probe: &'a dyn HostProbe,
    private_display: Option<u32>,
}

impl<'a> ExposureBuilder<'a> {
    pub fn new(
        config: &'a ContainerConfig,
        ctx: &'a InvocationContext,
        probe: &'a dyn HostProbe,
    ) -> Self {
        Self { config, ctx, probe, private_display: None }
    }

    /// Display number allocated by the display broker for private gui
    pub fn private_display(mut self, display: Option<u32>) -> Self {
        self.private_display = display;
        self
    }

    pub fn build(&self) -> Result<ExposureDescriptor> {
        let mut descriptor = ExposureDescriptor::new();

        self.add_binds(&mut descriptor);
        if self.config.gui {
            self.add_gui(&mut descriptor)?;
        }
        if self.config.mesa {
            self.add_mesa(&mut descriptor);
        }
        if self.config.sound {
            self.add_sound(&mut descriptor)?;
        }
        self.add_network(&mut descriptor)?;
        if self.config.webcam {
            self.add_webcam(&mut descriptor)?;
        }
        if self.config.dbus {
            self.add_dbus(&mut descriptor)?;
        }

        tracing::debug!(
            container = %self.config.name,
            directives = descriptor.len(),
            "built exposure descriptor"
        );
        Ok(descriptor)
    }

    fn add_binds(&self, descriptor: &mut ExposureDescriptor) {
        for bind in &self.config.binds {
            let path = bind.resolve(&self.config.user);
            descriptor.push(if bind.is_read_only() {
                ExposureDirective::bind_ro(path)
            } else {
                ExposureDirective::bind(path)
            });
        }
    }

    fn add_gui(&self, descriptor: &mut ExposureDescriptor) -> Result<()> {
        let display = if self.config.gui_private {
            self.private_display
                .ok_or_else(|| {
                    AppContainerError::Config(
                        "gui-private needs an allocated private display".to_string(),
                    )
                })?
                .to_string()
        } else {
            self.ctx.display_number()
        };

        let socket = Path::new(X11_SOCKET_DIR).join(format!("X{}", display));
        descriptor.push(ExposureDirective::bind_to(socket, CONTAINER_X_SOCKET));

        for dir in THEME_DIRS {
            let path = expand_home(dir, &self.config.user);
            if self.probe.exists(&path) {
                descriptor.push(ExposureDirective::bind_ro(path));
            } else {
                tracing::debug!(path = %path.display(), "theme directory absent, skipping");
            }
        }
        Ok(())
    }

    fn add_mesa(&self, descriptor: &mut ExposureDescriptor) {
        for name in MESA_DEVICES {
            let device = Path::new("/dev").join(name);
            if self.probe.exists(&device) {
                descriptor.push(ExposureDirective::Device(device));
            }
        }
    }

    fn add_sound(&self, descriptor: &mut ExposureDescriptor) -> Result<()> {
        let pulse = PathBuf::from(format!("/run/user/{}/pulse", self.ctx.uid));
        if !self.probe.exists(&pulse) {
            return Err(AppContainerError::Precondition(format!(
                "sound requested but the audio session directory {} does not exist",
                pulse.display()
            )));
        }
        descriptor.push(ExposureDirective::bind_to(pulse, CONTAINER_PULSE_DIR));
        Ok(())
    }

    fn add_network(&self, descriptor: &mut ExposureDescriptor) -> Result<()> {
        match self.config.network {
            NetworkMode::Shared => {}
            NetworkMode::Isolated => descriptor.push(ExposureDirective::PrivateNetwork),
            NetworkMode::Nat => descriptor.push(ExposureDirective::NetworkVeth),
            NetworkMode::Bridged => {
                for netif in self.probe.network_interfaces()? {
                    if netif.can_bridge() {
                        descriptor.push(ExposureDirective::NetworkMacvlan(netif.ifname));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_webcam(&self, descriptor: &mut ExposureDescriptor) -> Result<()> {
        if !self.probe.exists(Path::new(V4L_DIR)) {
            tracing::debug!("no video devices, skipping webcam");
            return Ok(());
        }
        descriptor.push(ExposureDirective::bind(V4L_DIR));
        // The runtime needs the concrete device nodes, not the stable-id links
        for device in self.probe.device_links(Path::new(V4L_BY_ID_DIR))? {
            descriptor.push(ExposureDirective::bind(device));
        }
        Ok(())
    }

    fn add_dbus(&self, descriptor: &mut ExposureDescriptor) -> Result<()> {
        let address = self.ctx.dbus_address.as_deref().ok_or_else(|| {
            AppContainerError::Precondition(
                "dbus requested but DBUS_SESSION_BUS_ADDRESS is not set".to_string(),
            )
        })?;
        let path = address
            .strip_prefix(DBUS_PATH_PREFIX)
            .map(|rest| rest.split(',').next().unwrap_or(rest))
            .filter(|path| path.starts_with('/'))
            .ok_or_else(|| {
                AppContainerError::Precondition(format!(
                    "dbus session address '{}' is not a unix:path= address",
                    address
                ))
            })?;
        descriptor.push(ExposureDirective::bind_to(path, CONTAINER_DBUS_SOCKET));
        Ok(())
    }
}
