//! systemd-nspawn runtime gateway

use std::path::Path;
use std::process::{Child, Stdio};

use super::command::{exit_code, CommandRunner};
use super::{ExecRequest, RuntimeGateway, StartHandle};
use crate::error::Result;
use crate::exposure::ExposureDescriptor;

/// Runtime gateway backed by systemd-nspawn and machinectl
#[derive(Debug, Clone)]
pub struct NspawnGateway {
    runner: CommandRunner,
    /// Appended verbatim to every start command
    extra_args: Vec<String>,
}

impl NspawnGateway {
    pub fn new(runner: CommandRunner, extra_args: Vec<String>) -> Self {
        Self { runner, extra_args }
    }

    /// Full systemd-nspawn command line for a start
    pub fn start_argv(&self, root: &Path, descriptor: &ExposureDescriptor) -> Vec<String> {
        let mut argv = vec![
            "systemd-nspawn".to_string(),
            "-q".to_string(),
            "-b".to_string(),
            "-D".to_string(),
            root.display().to_string(),
            "--notify-ready=yes".to_string(),
            "--console=passive".to_string(),
        ];
        argv.extend(descriptor.to_args());
        argv.extend(self.extra_args.iter().cloned());
        argv
    }

    /// Full systemd-run command line for a command inside
    pub fn exec_argv(request: &ExecRequest) -> Vec<String> {
        let mut argv = vec![
            "systemd-run".to_string(),
            "-M".to_string(),
            request.machine.clone(),
            "-q".to_string(),
            if request.pipe { "--pipe" } else { "--pty" }.to_string(),
            "--wait".to_string(),
            "--collect".to_string(),
            "--send-sighup".to_string(),
        ];
        // systemd-run cannot start units as a non-root user inside the
        // machine, so hop through sudo in there
        if let Some(user) = &request.user {
            argv.extend(["/usr/bin/sudo".to_string(), "-u".to_string(), user.clone()]);
        }
        argv.push("/usr/bin/env".to_string());
        argv.extend(request.env.iter().map(|(k, v)| format!("{}={}", k, v)));
        argv.extend(request.command.iter().cloned());
        argv
    }

    /// Machine state as machinectl reports it, `None` once it is gone
    fn machine_state(&self, name: &str) -> Result<Option<String>> {
        let argv: Vec<String> = ["machinectl", "show", "--property", "State", "--value", name]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = self.runner.output(&argv, false)?;
        Ok(parse_state(output.status.success(), &output.stdout))
    }
}

fn parse_state(known: bool, stdout: &[u8]) -> Option<String> {
    if !known {
        return None;
    }
    Some(String::from_utf8_lossy(stdout).trim().to_string())
}

struct ChildHandle(Child);

impl StartHandle for ChildHandle {
    fn try_exit_code(&mut self) -> Result<Option<i32>> {
        Ok(self.0.try_wait()?.map(|status| exit_code(&status)))
    }
}

impl RuntimeGateway for NspawnGateway {
    fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.machine_state(name)?.as_deref() == Some("running"))
    }

    fn is_present(&self, name: &str) -> Result<bool> {
        Ok(self.machine_state(name)?.is_some())
    }

    fn start(
        &self,
        name: &str,
        root: &Path,
        descriptor: &ExposureDescriptor,
    ) -> Result<Box<dyn StartHandle>> {
        tracing::info!(container = %name, root = %root.display(), "starting container");
        let child = self
            .runner
            .spawn_detached(&self.start_argv(root, descriptor), true, Stdio::null())?;
        Ok(Box::new(ChildHandle(child)))
    }

    fn stop(&self, name: &str) -> Result<()> {
        tracing::info!(container = %name, "stopping container");
        let argv = vec!["machinectl".to_string(), "stop".to_string(), name.to_string()];
        let status = self.runner.status(&argv, true)?;
        if !status.success() {
            tracing::warn!(container = %name, code = exit_code(&status), "machinectl stop failed");
        }
        Ok(())
    }

    fn exec_inside(&self, request: &ExecRequest) -> Result<i32> {
        let status = self.runner.status(&Self::exec_argv(request), true)?;
        Ok(exit_code(&status))
    }

    fn spawn_inside(&self, request: &ExecRequest) -> Result<()> {
        self.runner
            .spawn_detached(&Self::exec_argv(request), true, Stdio::inherit())?;
        Ok(())
    }
}
