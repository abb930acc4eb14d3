//! External command invocation
//!
//! Every process this tool launches goes through [`CommandRunner`], which
//! adds the privilege prefix when needed and echoes the command line when
//! `++show` was given.

use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Output, Stdio};

use crate::context::InvocationContext;
use crate::error::{AppContainerError, Result};

/// Builds and launches external commands
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Echo each command line to stderr before running it
    show: bool,
    /// Prefix for privileged commands, `None` when already root
    sudo: Option<String>,
}

impl CommandRunner {
    pub fn new(show: bool, sudo: Option<String>) -> Self {
        Self { show, sudo }
    }

    /// Runner for this invocation: no privilege prefix when running as root
    pub fn for_context(show: bool, sudo: &str, ctx: &InvocationContext) -> Self {
        let sudo = (!ctx.is_root && !sudo.is_empty()).then(|| sudo.to_string());
        Self::new(show, sudo)
    }

    pub fn show(&self) -> bool {
        self.show
    }

    /// Final argv after applying the privilege prefix
    pub fn argv(&self, argv: &[String], privileged: bool) -> Vec<String> {
        let mut full = Vec::with_capacity(argv.len() + 1);
        if privileged {
            if let Some(sudo) = &self.sudo {
                full.push(sudo.clone());
            }
        }
        full.extend(argv.iter().cloned());
        full
    }

    fn command(&self, argv: &[String], privileged: bool) -> Result<(Command, String)> {
        let argv = self.argv(argv, privileged);
        let line = shell_join(&argv);
        let (program, args) = argv.split_first().ok_or_else(|| AppContainerError::Command {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        if self.show {
            eprintln!(">>> {}", line);
        }
        tracing::debug!(command = %line, "running");

        let mut command = Command::new(program);
        command.args(args);
        Ok((command, line))
    }

    /// Run to completion with inherited stdio
    pub fn status(&self, argv: &[String], privileged: bool) -> Result<ExitStatus> {
        let (mut command, line) = self.command(argv, privileged)?;
        command
            .status()
            .map_err(|source| AppContainerError::Command { command: line, source })
    }

    /// Run to completion capturing stdout and stderr
    pub fn output(&self, argv: &[String], privileged: bool) -> Result<Output> {
        let (mut command, line) = self.command(argv, privileged)?;
        command
            .output()
            .map_err(|source| AppContainerError::Command { command: line, source })
    }

    /// Start without waiting
    pub fn spawn(&self, argv: &[String], privileged: bool, stdout: Stdio) -> Result<Child> {
        let (mut command, line) = self.command(argv, privileged)?;
        command
            .stdout(stdout)
            .spawn()
            .map_err(|source| AppContainerError::Command { command: line, source })
    }

    /// Start without waiting, in a process group of its own.
    ///
    /// Long-lived servers must outlive a Ctrl-C aimed at the invocation
    /// that happened to start them; the terminal only signals the
    /// foreground group.
    pub fn spawn_detached(
        &self,
        argv: &[String],
        privileged: bool,
        stdout: Stdio,
    ) -> Result<Child> {
        let (mut command, line) = self.command(argv, privileged)?;
        command
            .process_group(0)
            .stdout(stdout)
            .spawn()
            .map_err(|source| AppContainerError::Command { command: line, source })
    }
}

/// Exit code of a finished process; signals map to 128 + signal
pub fn exit_code(status: &ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}

fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quote a command line for display
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sudo_prefix_only_when_privileged() {
        let runner = CommandRunner::new(false, Some("sudo".to_string()));
        assert_eq!(runner.argv(&args(&["machinectl", "stop", "x"]), true)[0], "sudo");
        assert_eq!(runner.argv(&args(&["ip", "link"]), false)[0], "ip");
    }

    #[test]
    fn test_root_context_has_no_prefix() {
        let mut ctx = InvocationContext::for_tests(1000);
        ctx.is_root = true;
        let runner = CommandRunner::for_context(false, "sudo", &ctx);
        assert_eq!(runner.argv(&args(&["true"]), true), args(&["true"]));
    }

    #[test]
    fn test_shell_join_quotes() {
        let line = shell_join(&args(&["echo", "hi there", "it's", "--bind=/a:/b", ""]));
        assert_eq!(line, r#"echo 'hi there' 'it'\''s' --bind=/a:/b ''"#);
    }

    #[test]
    fn test_status_and_exit_code() {
        let runner = CommandRunner::default();
        let status = runner.status(&args(&["sh", "-c", "exit 3"]), false).unwrap();
        assert_eq!(exit_code(&status), 3);
    }

    #[test]
    fn test_missing_program_is_command_error() {
        let runner = CommandRunner::default();
        let err = runner
            .status(&args(&["definitely-not-a-real-program-4711"]), false)
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Command { .. }));
    }

    /// Process group id from `/proc/<pid>/stat`
    fn process_group_of(pid: &str) -> i32 {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap();
        let fields: Vec<&str> = stat.rsplit(')').next().unwrap().split_whitespace().collect();
        fields[2].parse().unwrap()
    }

    #[test]
    fn test_detached_spawn_leaves_foreground_group() {
        let runner = CommandRunner::default();
        let own_group = process_group_of("self");

        let mut detached = runner
            .spawn_detached(&args(&["sleep", "5"]), false, Stdio::null())
            .unwrap();
        let detached_group = process_group_of(&detached.id().to_string());
        assert_eq!(detached_group, detached.id() as i32);
        assert_ne!(detached_group, own_group);

        let mut attached = runner.spawn(&args(&["sleep", "5"]), false, Stdio::null()).unwrap();
        assert_eq!(process_group_of(&attached.id().to_string()), own_group);

        detached.kill().unwrap();
        attached.kill().unwrap();
        detached.wait().unwrap();
        attached.wait().unwrap();
    }

    #[test]
    fn test_empty_command_rejected() {
        let runner = CommandRunner::default();
        assert!(runner.status(&[], false).is_err());
    }
}
