//! Runtime gateway
//!
//! The narrow boundary to the virtualization runtime: query, start, stop,
//! and run commands inside a container. [`NspawnGateway`] drives
//! systemd-nspawn, machinectl and systemd-run.

mod command;
mod nspawn;

use std::path::Path;

pub use command::{exit_code, shell_join, CommandRunner};
pub use nspawn::NspawnGateway;

use crate::container::ContainerConfig;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::exposure::{
    ExposureDescriptor, CONTAINER_DBUS_SOCKET, CONTAINER_PULSE_DIR,
};

/// A runtime instance that has been asked to start
pub trait StartHandle {
    /// Exit code if the runtime process has already exited
    fn try_exit_code(&mut self) -> Result<Option<i32>>;
}

/// A command to run inside a running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub machine: String,
    /// User to run as; `None` runs as root
    pub user: Option<String>,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Pipe stdio instead of allocating a pty
    pub pipe: bool,
}

impl ExecRequest {
    /// A session command run as the configured user with passthrough env
    pub fn session(config: &ContainerConfig, ctx: &InvocationContext, command: Vec<String>) -> Self {
        let mut env = Vec::new();
        if config.gui {
            env.push(("DISPLAY".to_string(), "unix/:0".to_string()));
        }
        if config.sound {
            env.push((
                "PULSE_SERVER".to_string(),
                format!("unix:{}/native", CONTAINER_PULSE_DIR),
            ));
        }
        if config.dbus {
            env.push((
                "DBUS_SESSION_BUS_ADDRESS".to_string(),
                format!("unix:path={}", CONTAINER_DBUS_SOCKET),
            ));
        }
        if let Some(term) = &ctx.term {
            env.push(("TERM".to_string(), term.clone()));
        }

        Self {
            machine: config.name.clone(),
            user: Some(config.user.clone()),
            command,
            env,
            pipe: config.gui,
        }
    }

    /// A maintenance command run as root with only `TERM` passed through
    pub fn maintenance(
        config: &ContainerConfig,
        ctx: &InvocationContext,
        command: Vec<String>,
    ) -> Self {
        Self {
            machine: config.name.clone(),
            user: None,
            command,
            env: ctx
                .term
                .iter()
                .map(|term| ("TERM".to_string(), term.clone()))
                .collect(),
            pipe: config.gui,
        }
    }
}

/// Operations the session coordinator needs from the runtime
pub trait RuntimeGateway {
    fn is_running(&self, name: &str) -> Result<bool>;

    /// Known to the runtime in any state, including shutting down
    fn is_present(&self, name: &str) -> Result<bool>;

    /// Ask the runtime to start; does not wait for it to be running
    fn start(
        &self,
        name: &str,
        root: &Path,
        descriptor: &ExposureDescriptor,
    ) -> Result<Box<dyn StartHandle>>;

    /// Ask the container to stop; stopping a stopped container is not an
    /// error. Returns before shutdown has finished, callers wait on
    /// `is_present`.
    fn stop(&self, name: &str) -> Result<()>;

    /// Run a command inside and wait for its exit code
    fn exec_inside(&self, request: &ExecRequest) -> Result<i32>;

    /// Run a command inside without waiting for it
    fn spawn_inside(&self, request: &ExecRequest) -> Result<()>;
}
