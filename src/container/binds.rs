//! Named bind catalog
//!
//! Binds are referred to by name in the container configuration. The catalog
//! is static data built once and passed explicitly to whoever needs it.

use std::path::PathBuf;

/// Whether a bind is exposed writable or read-only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    ReadWrite,
    ReadOnly,
}

/// A named resource exposure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Host path; a leading `~` is the container user's home
    pub path: &'static str,
    pub mode: BindMode,
}

impl BindSpec {
    const fn rw(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self { name, description, path, mode: BindMode::ReadWrite }
    }

    const fn ro(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self { name, description, path, mode: BindMode::ReadOnly }
    }

    /// Resolve the path against the home directory of `user`.
    ///
    /// The home directory is that of the user inside the container, which is
    /// why this happens when the descriptor is built and not when the
    /// configuration is loaded.
    pub fn resolve(&self, user: &str) -> PathBuf {
        expand_home(self.path, user)
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == BindMode::ReadOnly
    }
}

/// Replace a leading `~` with `/home/<user>`
pub fn expand_home(path: &str, user: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => PathBuf::from(format!("/home/{}{}", user, rest)),
        None => PathBuf::from(path),
    }
}

const BUILTIN_BINDS: &[BindSpec] = &[
    BindSpec::rw("downloads", "Downloads folder", "~/Downloads"),
    BindSpec::rw("cache", "~/.cache", "~/.cache"),
    BindSpec::rw("steam", "steam library", "~/.local/share/Steam"),
    BindSpec::ro("gitconfig", "git config", "~/.gitconfig"),
    BindSpec::rw("documents", "documents", "~/Documents"),
    BindSpec::rw(
        "inputs",
        "input devices direct access (keyboards, mice, joysticks etc)",
        "/dev/input",
    ),
];

/// Lookup table of the binds a configuration may name
#[derive(Debug, Clone)]
pub struct BindCatalog {
    binds: &'static [BindSpec],
}

impl BindCatalog {
    /// The catalog shipped with the binary
    pub fn builtin() -> Self {
        Self { binds: BUILTIN_BINDS }
    }

    pub fn get(&self, name: &str) -> Option<&BindSpec> {
        self.binds.iter().find(|b| b.name == name)
    }

    /// One-line help text listing every bind, for unknown-bind errors
    pub fn describe(&self) -> String {
        self.binds
            .iter()
            .map(|b| format!("'{}': {}", b.name, b.description))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for BindCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
