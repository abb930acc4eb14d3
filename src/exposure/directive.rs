//! Exposure directives and the descriptor that collects them

use std::fmt;
use std::path::PathBuf;

/// One host resource granted to the container at start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposureDirective {
    /// Bind a host path, optionally at a different path inside
    Bind {
        source: PathBuf,
        target: Option<PathBuf>,
        read_only: bool,
    },
    /// Bind a device node at the same path
    Device(PathBuf),
    /// No networking except loopback
    PrivateNetwork,
    /// Virtual ethernet link to the host, NATed
    NetworkVeth,
    /// Own MAC address on a host interface
    NetworkMacvlan(String),
}

impl ExposureDirective {
    pub fn bind(source: impl Into<PathBuf>) -> Self {
        ExposureDirective::Bind { source: source.into(), target: None, read_only: false }
    }

    pub fn bind_ro(source: impl Into<PathBuf>) -> Self {
        ExposureDirective::Bind { source: source.into(), target: None, read_only: true }
    }

    pub fn bind_to(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        ExposureDirective::Bind {
            source: source.into(),
            target: Some(target.into()),
            read_only: false,
        }
    }

    /// Render as a systemd-nspawn argument
    pub fn to_arg(&self) -> String {
        match self {
            ExposureDirective::Bind { source, target, read_only } => {
                let flag = if *read_only { "--bind-ro" } else { "--bind" };
                match target {
                    Some(target) => {
                        format!("{}={}:{}", flag, source.display(), target.display())
                    }
                    None => format!("{}={}", flag, source.display()),
                }
            }
            ExposureDirective::Device(path) => format!("--bind={}", path.display()),
            ExposureDirective::PrivateNetwork => "--private-network".to_string(),
            ExposureDirective::NetworkVeth => "--network-veth".to_string(),
            ExposureDirective::NetworkMacvlan(ifname) => format!("--network-macvlan={}", ifname),
        }
    }
}

impl fmt::Display for ExposureDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

/// Ordered directives handed verbatim to the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposureDescriptor {
    directives: Vec<ExposureDirective>,
}

impl ExposureDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: ExposureDirective) {
        self.directives.push(directive);
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn to_args(&self) -> Vec<String> {
        self.directives.iter().map(ExposureDirective::to_arg).collect()
    }
}
