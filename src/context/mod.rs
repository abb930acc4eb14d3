//! Invocation context
//!
//! Everything this invocation learns from its own process environment is
//! captured once here, so the rest of the crate can be driven by explicit
//! values in tests.

use std::path::PathBuf;

/// Fallback uid when running as root without a privilege wrapper
const FALLBACK_UID: u32 = 1000;

/// Snapshot of the invoking process's environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// The human user behind this invocation (not root when escalated)
    pub uid: u32,
    /// Whether this process itself runs as root
    pub is_root: bool,
    /// `$DISPLAY`
    pub display: Option<String>,
    /// `$DBUS_SESSION_BUS_ADDRESS`
    pub dbus_address: Option<String>,
    /// `$TERM`
    pub term: Option<String>,
    /// `$HOME`
    pub home: Option<PathBuf>,
}

impl InvocationContext {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        // SAFETY: getuid has no preconditions and cannot fail.
        #[allow(unsafe_code)]
        let real_uid = unsafe { libc::getuid() };

        Self {
            uid: resolve_uid(real_uid, |name| std::env::var(name).ok()),
            is_root: real_uid == 0,
            display: non_empty_var("DISPLAY"),
            dbus_address: non_empty_var("DBUS_SESSION_BUS_ADDRESS"),
            term: non_empty_var("TERM"),
            home: std::env::var_os("HOME").map(PathBuf::from),
        }
    }

    /// Per-user runtime directory for this tool's state
    pub fn runtime_dir(&self) -> PathBuf {
        PathBuf::from(format!("/run/user/{}/app-container", self.uid))
    }

    /// Host display number from `$DISPLAY`, assuming `:0` when unset
    ///
    /// `:1.0` and `localhost:1` both give `1`.
    pub fn display_number(&self) -> String {
        let display = self.display.as_deref().unwrap_or(":0");
        let after_colon = display.rsplit_once(':').map(|(_, n)| n).unwrap_or(display);
        after_colon.split('.').next().unwrap_or("0").to_string()
    }
}

/// Work out the invoking user's uid.
///
/// Root invocations through pkexec or sudo report the original user via
/// `PKEXEC_UID` / `SUDO_UID`.
pub fn resolve_uid<F>(real_uid: u32, var: F) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    if real_uid != 0 {
        return real_uid;
    }
    ["PKEXEC_UID", "SUDO_UID"]
        .iter()
        .find_map(|name| var(name).and_then(|v| v.trim().parse().ok()))
        .unwrap_or(FALLBACK_UID)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
impl InvocationContext {
    /// Unprivileged context with no display or bus
    pub fn for_tests(uid: u32) -> Self {
        Self {
            uid,
            is_root: false,
            display: None,
            dbus_address: None,
            term: None,
            home: None,
        }
    }
}
