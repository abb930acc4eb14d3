//! Container configuration
//!
//! A [`ContainerSettings`] is what sits on disk. It becomes a
//! [`ContainerConfig`] only after validation, so code downstream never has to
//! re-check toggle combinations or bind names.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::binds::{BindCatalog, BindSpec};
use crate::error::{AppContainerError, Result};

/// Networking given to the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Share the host's network namespace
    #[default]
    #[serde(alias = "on")]
    Shared,
    /// Loopback only
    #[serde(alias = "off", alias = "none")]
    Isolated,
    /// Private network behind the host with outbound access
    Nat,
    /// Own addresses on every host interface that is up
    #[serde(alias = "separate")]
    Bridged,
}

impl FromStr for NetworkMode {
    type Err = AppContainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" | "on" => Ok(NetworkMode::Shared),
            "isolated" | "off" | "none" => Ok(NetworkMode::Isolated),
            "nat" => Ok(NetworkMode::Nat),
            "bridged" | "separate" => Ok(NetworkMode::Bridged),
            other => Err(AppContainerError::InvalidNetwork(format!("Unknown '{}'", other))),
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkMode::Shared => "shared",
            NetworkMode::Isolated => "isolated",
            NetworkMode::Nat => "nat",
            NetworkMode::Bridged => "bridged",
        };
        f.write_str(s)
    }
}

/// Default private display server; `{display}` and `{title}` are substituted
pub fn default_display_server() -> Vec<String> {
    [
        "Xephyr",
        "-resizeable",
        "-title",
        "{title}",
        "-no-host-grab",
        "-host-cursor",
        ":{display}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_window_manager() -> Option<String> {
    Some("matchbox-window-manager".to_string())
}

fn default_sudo() -> String {
    "sudo".to_string()
}

/// Container settings as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSettings {
    pub name: String,
    /// Root filesystem of the container
    pub root: PathBuf,
    /// User the commands run as inside the container
    pub user: String,
    /// Program prepended to the command line unless `++cmd` is given
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub gui: bool,
    #[serde(default)]
    pub gui_private: bool,
    #[serde(default = "default_window_manager")]
    pub gui_private_window_manager: Option<String>,
    #[serde(default = "default_display_server")]
    pub gui_private_server: Vec<String>,
    #[serde(default)]
    pub mesa: bool,
    #[serde(default)]
    pub sound: bool,
    #[serde(default)]
    pub webcam: bool,
    #[serde(default)]
    pub dbus: bool,
    #[serde(default)]
    pub network: NetworkMode,
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default = "default_sudo")]
    pub sudo: String,
    #[serde(default)]
    pub runtime_extra_args: Vec<String>,
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
}

impl ContainerSettings {
    /// Minimal settings: no capabilities, shared networking
    pub fn new(name: &str, root: impl Into<PathBuf>, user: &str) -> Self {
        Self {
            name: name.to_string(),
            root: root.into(),
            user: user.to_string(),
            run: None,
            gui: false,
            gui_private: false,
            gui_private_window_manager: default_window_manager(),
            gui_private_server: default_display_server(),
            mesa: false,
            sound: false,
            webcam: false,
            dbus: false,
            network: NetworkMode::Shared,
            binds: Vec::new(),
            sudo: default_sudo(),
            runtime_extra_args: Vec::new(),
            script_dir: None,
        }
    }

    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Validated, immutable configuration for one invocation
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub root: PathBuf,
    pub user: String,
    pub run: Option<String>,
    pub gui: bool,
    pub gui_private: bool,
    pub gui_private_window_manager: Option<String>,
    pub gui_private_server: Vec<String>,
    pub mesa: bool,
    pub sound: bool,
    pub webcam: bool,
    pub dbus: bool,
    pub network: NetworkMode,
    pub binds: Vec<BindSpec>,
    pub sudo: String,
    pub runtime_extra_args: Vec<String>,
    pub script_dir: Option<PathBuf>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_.-]+$").expect("valid regex"))
}

/// Check a container name is usable as a machine name and file name
pub fn validate_name(name: &str) -> Result<()> {
    if !name_pattern().is_match(name)
        || name.starts_with('.')
        || name.ends_with('.')
        || name.contains("..")
    {
        return Err(AppContainerError::Config(format!(
            "Invalid container name '{}': use letters, '_', '.' and '-' only",
            name
        )));
    }
    Ok(())
}

impl ContainerConfig {
    /// Validate settings against the bind catalog
    pub fn from_settings(settings: ContainerSettings, catalog: &BindCatalog) -> Result<Self> {
        validate_name(&settings.name)?;

        if !settings.root.is_absolute() {
            return Err(AppContainerError::Config(format!(
                "Container root '{}' must be an absolute path",
                settings.root.display()
            )));
        }

        if settings.user.trim().is_empty() {
            return Err(AppContainerError::Config("User cannot be empty".to_string()));
        }

        let gui = settings.gui || settings.gui_private || settings.mesa;

        if settings.gui_private && settings.network == NetworkMode::Shared {
            return Err(AppContainerError::Config(
                "gui-private requires a network setting other than shared".to_string(),
            ));
        }

        if settings.gui_private && settings.gui_private_server.is_empty() {
            return Err(AppContainerError::Config(
                "gui-private requires a display server command".to_string(),
            ));
        }

        let binds = settings
            .binds
            .iter()
            .map(|name| {
                catalog
                    .get(name.trim())
                    .cloned()
                    .ok_or_else(|| AppContainerError::UnknownBind {
                        name: name.clone(),
                        known: catalog.describe(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: settings.name,
            root: settings.root,
            user: settings.user,
            run: settings.run.filter(|r| !r.is_empty()),
            gui,
            gui_private: settings.gui_private,
            gui_private_window_manager: settings
                .gui_private_window_manager
                .filter(|wm| !wm.is_empty()),
            gui_private_server: settings.gui_private_server,
            mesa: settings.mesa,
            sound: settings.sound,
            webcam: settings.webcam,
            dbus: settings.dbus,
            network: settings.network,
            binds,
            sudo: settings.sudo,
            runtime_extra_args: settings.runtime_extra_args,
            script_dir: settings.script_dir,
        })
    }
}
