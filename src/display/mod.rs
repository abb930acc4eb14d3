//! Private virtual displays
//!
//! With private gui the container gets its own nested X server instead of
//! the host display. The broker picks a free display number, starts the
//! server, and publishes a symbolic link `app-<container>` -> `X<n>` in the
//! X socket directory so later invocations can find it again.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::context::InvocationContext;
use crate::error::{AppContainerError, Result};
use crate::runtime::{exit_code, shell_join, CommandRunner};

/// Host directory holding X server sockets
pub const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";
/// Directory holding X server lock files (`.X<n>-lock`)
pub const X11_LOCK_DIR: &str = "/tmp";
/// First display number used for private displays
pub const PRIVATE_DISPLAY_BASE: u32 = 10;
/// Size of the range the starting candidate is hashed into
pub const PRIVATE_DISPLAY_SPAN: u32 = 89;

const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One allocated private display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisplaySlot {
    pub display: u32,
    /// Symbolic link naming this container's display
    pub link: PathBuf,
    /// Process id of the display server
    pub pid: u32,
}

/// Starting candidate for a container's display number
pub fn candidate_display(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    let last = digest[digest.len() - 1] as u32;
    PRIVATE_DISPLAY_BASE + last % PRIVATE_DISPLAY_SPAN
}

/// First display number at or above the candidate that is not occupied
pub fn choose_display<F>(name: &str, occupied: F) -> u32
where
    F: Fn(u32) -> bool,
{
    let mut display = candidate_display(name);
    while occupied(display) {
        display += 1;
    }
    display
}

/// Allocates, publishes and tears down private displays
#[derive(Debug, Clone)]
pub struct DisplayBroker {
    socket_dir: PathBuf,
    lock_dir: PathBuf,
    runner: CommandRunner,
    poll_interval: Duration,
}

impl DisplayBroker {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            socket_dir: PathBuf::from(X11_SOCKET_DIR),
            lock_dir: PathBuf::from(X11_LOCK_DIR),
            runner,
            poll_interval: ENDPOINT_POLL_INTERVAL,
        }
    }

    /// Use different socket and lock directories
    pub fn with_dirs(
        mut self,
        socket_dir: impl Into<PathBuf>,
        lock_dir: impl Into<PathBuf>,
    ) -> Self {
        self.socket_dir = socket_dir.into();
        self.lock_dir = lock_dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Path of the symbolic link for a container
    pub fn link_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(format!("app-{}", name))
    }

    fn socket_path(&self, display: u32) -> PathBuf {
        self.socket_dir.join(format!("X{}", display))
    }

    fn lock_file(&self, display: u32) -> PathBuf {
        self.lock_dir.join(format!(".X{}-lock", display))
    }

    /// Start a display server for `name` and publish its number.
    ///
    /// `server` is the argv template; `{display}` and `{title}` are replaced.
    /// `user` is who the server runs as when this process is root.
    pub fn start(
        &self,
        name: &str,
        user: &str,
        server: &[String],
        ctx: &InvocationContext,
    ) -> Result<VirtualDisplaySlot> {
        let link = self.link_path(name);
        remove_if_present(&link)?;

        let number = choose_display(name, |n| self.socket_path(n).exists());
        let title = format!("{} (container)", name);
        let mut argv: Vec<String> = server
            .iter()
            .map(|arg| {
                arg.replace("{display}", &number.to_string())
                    .replace("{title}", &title)
            })
            .collect();

        if ctx.is_root {
            if ctx.display.is_none() {
                // pkexec drops $DISPLAY
                argv.splice(0..0, ["env".to_string(), "DISPLAY=:0".to_string()]);
            }
            // never run the display server as root
            argv.splice(0..0, ["sudo".to_string(), "-u".to_string(), user.to_string()]);
        }

        tracing::info!(container = %name, display = number, "starting private display");
        let mut server_process = self
            .runner
            .spawn_detached(&argv, false, Stdio::null())?;
        let socket = self.socket_path(number);

        loop {
            if let Some(status) = server_process.try_wait()? {
                return Err(AppContainerError::DisplayServer {
                    command: shell_join(&argv),
                    code: Some(exit_code(&status)),
                });
            }
            if socket.exists() {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        symlink(format!("X{}", number), &link)?;
        if ctx.is_root {
            std::os::unix::fs::lchown(&link, Some(ctx.uid), None)?;
        }

        Ok(VirtualDisplaySlot {
            display: number,
            link,
            pid: server_process.id(),
        })
    }

    /// Display number currently published for `name`, if any
    pub fn lookup(&self, name: &str) -> Option<u32> {
        let target = fs::read_link(self.link_path(name)).ok()?;
        target.to_str()?.strip_prefix('X')?.parse().ok()
    }

    /// Tear down the private display for `name`.
    ///
    /// The link goes first so no new session can pick up a dying display.
    /// Safe to call when nothing is allocated.
    pub fn teardown(&self, name: &str) -> Result<()> {
        let published = self.lookup(name);
        remove_if_present(&self.link_path(name))?;

        let Some(number) = published else {
            tracing::debug!(container = %name, "no private display to tear down");
            return Ok(());
        };

        let content = match fs::read_to_string(self.lock_file(number)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let pid: i32 = content.trim().parse().map_err(|_| {
            AppContainerError::DisplayServer {
                command: format!("lock file for display {}", number),
                code: None,
            }
        })?;
        if pid <= 0 {
            return Ok(());
        }

        tracing::info!(container = %name, display = number, pid, "stopping private display");
        terminate(pid)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Send SIGTERM; a process that is already gone is fine
fn terminate(pid: i32) -> Result<()> {
    // SAFETY: kill is a standard POSIX call; pid was checked to be positive
    // so this never signals a process group.
    #[allow(unsafe_code)]
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err.into())
}
