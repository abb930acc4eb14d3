//! Read-only host probes used while building a descriptor

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppContainerError, Result};
use crate::runtime::CommandRunner;

/// A host network interface as reported by `ip -j link show`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub ifname: String,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Present when the interface belongs to another network namespace
    #[serde(default)]
    pub link_netnsid: Option<i64>,
}

impl NetworkInterface {
    /// Up, not loopback, not already attached to another namespace
    pub fn can_bridge(&self) -> bool {
        self.flags.iter().any(|f| f == "UP")
            && !self.flags.iter().any(|f| f == "LOOPBACK")
            && self.link_netnsid.is_none()
    }
}

/// Parse the JSON emitted by `ip -o -j link show`
pub fn parse_interfaces(json: &[u8]) -> Result<Vec<NetworkInterface>> {
    Ok(serde_json::from_slice(json)?)
}

/// Host state the descriptor builder is allowed to look at
pub trait HostProbe {
    fn exists(&self, path: &Path) -> bool;

    /// Concrete targets of every symbolic link in `dir`, ordered by link name
    fn device_links(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>>;
}

/// Probes the real host
#[derive(Debug, Clone)]
pub struct SystemProbe {
    runner: CommandRunner,
}

impl SystemProbe {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

impl HostProbe for SystemProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn device_links(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut links = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_symlink() {
                continue;
            }
            let target = fs::read_link(entry.path())?;
            links.push((entry.file_name(), resolve_link(dir, &target)));
        }
        links.sort();
        Ok(links.into_iter().map(|(_, target)| target).collect())
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let argv: Vec<String> = ["ip", "-o", "-j", "link", "show"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = self.runner.output(&argv, false)?;
        if !output.status.success() {
            return Err(AppContainerError::Precondition(format!(
                "Listing network interfaces failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_interfaces(&output.stdout)
    }
}

/// Turn a link target into an absolute path without touching the filesystem
pub fn resolve_link(dir: &Path, target: &Path) -> PathBuf {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        dir.join(target)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ip_json() {
        let json = br#"[
            {"ifindex":1,"ifname":"lo","flags":["LOOPBACK","UP","LOWER_UP"],"mtu":65536},
            {"ifindex":2,"ifname":"eth0","flags":["BROADCAST","MULTICAST","UP","LOWER_UP"]},
            {"ifindex":3,"ifname":"wlan0","flags":["BROADCAST","MULTICAST"]},
            {"ifindex":4,"ifname":"veth1","flags":["BROADCAST","UP"],"link_netnsid":0}
        ]"#;
        let interfaces = parse_interfaces(json).unwrap();
        let bridged: Vec<_> = interfaces
            .iter()
            .filter(|i| i.can_bridge())
            .map(|i| i.ifname.as_str())
            .collect();
        assert_eq!(bridged, vec!["eth0"]);
    }

    #[test]
    fn test_resolve_relative_link() {
        let resolved = resolve_link(Path::new("/dev/v4l/by-id"), Path::new("../../video0"));
        assert_eq!(resolved, PathBuf::from("/dev/video0"));
        let resolved = resolve_link(Path::new("/dev/v4l/by-id"), Path::new("/dev/video2"));
        assert_eq!(resolved, PathBuf::from("/dev/video2"));
    }

    #[test]
    fn test_device_links_sorted_and_symlinks_only() {
        let temp_dir = TempDir::new().unwrap();
        let by_id = temp_dir.path().join("by-id");
        fs::create_dir(&by_id).unwrap();
        symlink("../video2", by_id.join("usb-b-cam")).unwrap();
        symlink("../video0", by_id.join("usb-a-cam")).unwrap();
        fs::write(by_id.join("plain-file"), b"").unwrap();

        let probe = SystemProbe::new(CommandRunner::default());
        let links = probe.device_links(&by_id).unwrap();
        assert_eq!(
            links,
            vec![temp_dir.path().join("video0"), temp_dir.path().join("video2")]
        );
    }

    #[test]
    fn test_device_links_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let probe = SystemProbe::new(CommandRunner::default());
        assert!(probe.device_links(&temp_dir.path().join("nope")).unwrap().is_empty());
    }
}
