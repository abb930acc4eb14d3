//! Session coordinator
//!
//! Each invocation is its own process with no daemon to ask, so the only
//! shared state is the session lock. An invocation holds a shared claim
//! while it uses the container; on the way out it tries to upgrade to
//! exclusive, and only the invocation that succeeds stops the container.
//!
//! Binds, networking and gui are fixed when the container starts. Sessions
//! joining a running container get whatever it was started with.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::lock::{SessionLock, SharedClaim};
use crate::container::ContainerConfig;
use crate::context::InvocationContext;
use crate::display::DisplayBroker;
use crate::error::{AppContainerError, Result, INTERRUPTED_EXIT_CODE};
use crate::exposure::{ExposureBuilder, ExposureDescriptor, HostProbe};
use crate::maintenance;
use crate::runtime::{CommandRunner, ExecRequest, RuntimeGateway};

const START_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Matches systemd's default stop timeout for the machine scope
const STOP_TIMEOUT: Duration = Duration::from_secs(90);

/// What one invocation asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDirective {
    /// Run a command inside, starting the container if needed
    Run(Vec<String>),
    /// Make sure the container is running, then leave it running
    StartOnly,
    /// Stop the container regardless of other sessions
    StopOnly,
    /// Refresh and upgrade packages with host networking
    AptUpdate,
    /// Run `AptUpdate` for every marked control script
    AptUpdateAll,
}

/// Drives one invocation against a container shared with sibling invocations
pub struct SessionCoordinator<'a> {
    config: &'a ContainerConfig,
    ctx: &'a InvocationContext,
    gateway: &'a dyn RuntimeGateway,
    probe: &'a dyn HostProbe,
    display: &'a DisplayBroker,
    lock: SessionLock,
    runner: CommandRunner,
    interrupted: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<'a> SessionCoordinator<'a> {
    pub fn new(
        config: &'a ContainerConfig,
        ctx: &'a InvocationContext,
        gateway: &'a dyn RuntimeGateway,
        probe: &'a dyn HostProbe,
        display: &'a DisplayBroker,
    ) -> Self {
        Self {
            config,
            ctx,
            gateway,
            probe,
            display,
            lock: SessionLock::new(&ctx.runtime_dir(), &config.name),
            runner: CommandRunner::default(),
            interrupted: Arc::new(AtomicBool::new(false)),
            poll_interval: START_POLL_INTERVAL,
        }
    }

    /// Keep the lock files somewhere other than the runtime directory
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock = SessionLock::new(&dir.into(), &self.config.name);
        self
    }

    /// Flag set by the interrupt handler
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runner used to re-invoke control scripts
    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Carry out `directive` and return the exit code for this process
    pub fn run(&self, directive: &SessionDirective) -> Result<i32> {
        match directive {
            SessionDirective::Run(command) => self.run_command(command),
            SessionDirective::StartOnly => {
                let _claim = self.acquire_shared()?;
                self.ensure_running()?;
                Ok(0)
            }
            SessionDirective::StopOnly => {
                let claim = self.acquire_shared()?;
                self.finish(claim, true);
                Ok(0)
            }
            SessionDirective::AptUpdate => self.maintenance_update(),
            SessionDirective::AptUpdateAll => self.update_all(),
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn lock_poll(&self) -> Duration {
        self.poll_interval.min(LOCK_POLL_INTERVAL)
    }

    fn acquire_shared(&self) -> Result<SharedClaim> {
        self.lock.acquire_shared(self.lock_poll(), &self.interrupted)
    }

    fn run_command(&self, command: &[String]) -> Result<i32> {
        let claim = self.acquire_shared()?;

        let outcome = self.ensure_running().and_then(|()| {
            let request = ExecRequest::session(self.config, self.ctx, command.to_vec());
            let result = self.gateway.exec_inside(&request);
            if self.is_interrupted() {
                tracing::info!(container = %self.config.name, "interrupted");
                return Ok(INTERRUPTED_EXIT_CODE);
            }
            result
        });

        self.finish(claim, false);
        outcome
    }

    /// Start the container unless it is already running.
    ///
    /// The startup guard makes concurrent sessions queue here, so only the
    /// first one to arrive starts the container.
    fn ensure_running(&self) -> Result<()> {
        let _guard = self.lock.startup_guard(self.lock_poll(), &self.interrupted)?;
        let name = &self.config.name;

        if self.gateway.is_running(name)? {
            tracing::debug!(container = %name, "already running, joining");
            return Ok(());
        }
        if self.gateway.is_present(name)? {
            tracing::info!(container = %name, "waiting for previous instance to shut down");
            self.wait_gone()?;
        }

        let slot = if self.config.gui_private {
            Some(self.display.start(
                name,
                &self.config.user,
                &self.config.gui_private_server,
                self.ctx,
            )?)
        } else {
            None
        };
        if let Some(slot) = &slot {
            tracing::debug!(
                container = %name,
                link = %slot.link.display(),
                pid = slot.pid,
                "private display published"
            );
        }

        let started = ExposureBuilder::new(self.config, self.ctx, self.probe)
            .private_display(slot.as_ref().map(|s| s.display))
            .build()
            .and_then(|descriptor| self.boot(&descriptor));

        if let Err(e) = started {
            if slot.is_some() {
                if let Err(teardown) = self.display.teardown(name) {
                    tracing::warn!(container = %name, error = %teardown, "private display teardown failed");
                }
            }
            return Err(e);
        }

        if self.config.gui_private {
            if let Some(wm) = &self.config.gui_private_window_manager {
                let request = ExecRequest::session(self.config, self.ctx, vec![wm.clone()]);
                if let Err(e) = self.gateway.spawn_inside(&request) {
                    tracing::warn!(container = %name, error = %e, "window manager did not start");
                }
            }
        }
        Ok(())
    }

    /// Ask the runtime to start and wait until it reports running
    fn boot(&self, descriptor: &ExposureDescriptor) -> Result<()> {
        let name = &self.config.name;
        let mut handle = self.gateway.start(name, &self.config.root, descriptor)?;

        loop {
            thread::sleep(self.poll_interval);
            if self.is_interrupted() {
                tracing::warn!(container = %name, "interrupted while starting, stopping");
                if let Err(e) = self.stop_and_wait() {
                    tracing::warn!(container = %name, error = %e, "stop after interrupt failed");
                }
                return Err(AppContainerError::Interrupted);
            }
            if let Some(code) = handle.try_exit_code()? {
                return Err(AppContainerError::Provisioning {
                    name: name.clone(),
                    code: Some(code),
                });
            }
            if self.gateway.is_running(name)? {
                tracing::info!(container = %name, "container running");
                return Ok(());
            }
        }
    }

    /// Release this session; the last one out stops the container
    fn finish(&self, claim: SharedClaim, force: bool) {
        let name = &self.config.name;
        let exclusive = match claim.try_upgrade() {
            Ok(exclusive) => exclusive,
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "session claim upgrade failed");
                None
            }
        };

        if exclusive.is_none() && !force {
            tracing::debug!(container = %name, "other sessions active, leaving running");
            return;
        }

        if let Err(e) = self.shutdown() {
            tracing::warn!(container = %name, error = %e, "shutdown failed");
        }
        // exclusive claim is held until the container is gone
        drop(exclusive);
    }

    fn shutdown(&self) -> Result<()> {
        let name = &self.config.name;
        if self.config.gui_private {
            if let Err(e) = self.display.teardown(name) {
                tracing::warn!(container = %name, error = %e, "private display teardown failed");
            }
        }
        self.stop_and_wait()
    }

    /// Stop the container and wait until the runtime has let go of it
    fn stop_and_wait(&self) -> Result<()> {
        self.gateway.stop(&self.config.name)?;
        self.wait_gone()
    }

    /// Wait while the runtime still knows the container, in any state
    fn wait_gone(&self) -> Result<()> {
        let name = &self.config.name;
        let deadline = Instant::now() + STOP_TIMEOUT;
        while self.gateway.is_present(name)? {
            if Instant::now() >= deadline {
                tracing::warn!(container = %name, "container still shutting down, giving up waiting");
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    /// Start with host networking and nothing else, update packages, stop
    fn maintenance_update(&self) -> Result<i32> {
        let name = &self.config.name;
        let _exclusive = self
            .lock
            .try_exclusive()?
            .ok_or_else(|| AppContainerError::Busy(name.clone()))?;

        if self.gateway.is_running(name)? {
            return Err(AppContainerError::AlreadyRunning(name.clone()));
        }
        self.wait_gone()?;

        {
            let _guard = self.lock.startup_guard(self.lock_poll(), &self.interrupted)?;
            self.boot(&ExposureDescriptor::new())?;
        }

        let mut code = 0;
        for step in [["apt", "update"], ["apt", "upgrade"]] {
            let command = step.iter().map(|s| s.to_string()).collect();
            let request = ExecRequest::maintenance(self.config, self.ctx, command);
            match self.gateway.exec_inside(&request) {
                Ok(step_code) if code == 0 => code = step_code,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(container = %name, error = %e, "maintenance step failed");
                    if code == 0 {
                        code = e.exit_code();
                    }
                }
            }
            if self.is_interrupted() {
                code = INTERRUPTED_EXIT_CODE;
                break;
            }
        }

        self.stop_and_wait()?;
        Ok(code)
    }

    fn update_all(&self) -> Result<i32> {
        let dir = self
            .config
            .script_dir
            .clone()
            .or_else(|| self.ctx.home.as_ref().map(|home| home.join(".local/bin")))
            .ok_or_else(|| {
                AppContainerError::Config("No script_dir configured and $HOME is unset".to_string())
            })?;
        maintenance::update_all(&dir, &self.runner)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BindCatalog, ContainerSettings, NetworkMode};
    use crate::exposure::NetworkInterface;
    use crate::runtime::StartHandle;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorded {
        running: bool,
        starts: Vec<Vec<String>>,
        stops: usize,
        execs: Vec<ExecRequest>,
        spawned: Vec<ExecRequest>,
        /// Presence checks left before a stopped machine disappears
        closing: usize,
        started_while_closing: bool,
    }

    struct FakeGateway {
        state: Mutex<Recorded>,
        exec_code: i32,
        /// Exit code the runtime process dies with instead of starting
        start_failure: Option<i32>,
        interrupt_on_exec: Option<Arc<AtomicBool>>,
        /// How long `stop` leaves the machine shutting down after returning
        shutdown_polls: usize,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                state: Mutex::new(Recorded::default()),
                exec_code: 0,
                start_failure: None,
                interrupt_on_exec: None,
                shutdown_polls: 0,
            }
        }
    }

    struct FakeHandle(Option<i32>);

    impl StartHandle for FakeHandle {
        fn try_exit_code(&mut self) -> Result<Option<i32>> {
            Ok(self.0)
        }
    }

    impl RuntimeGateway for FakeGateway {
        fn is_running(&self, _name: &str) -> Result<bool> {
            Ok(self.state.lock().unwrap().running)
        }

        fn is_present(&self, _name: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            if state.running {
                return Ok(true);
            }
            if state.closing > 0 {
                state.closing -= 1;
                return Ok(true);
            }
            Ok(false)
        }

        fn start(
            &self,
            _name: &str,
            _root: &Path,
            descriptor: &ExposureDescriptor,
        ) -> Result<Box<dyn StartHandle>> {
            let mut state = self.state.lock().unwrap();
            state.starts.push(descriptor.to_args());
            if state.closing > 0 {
                state.started_while_closing = true;
            }
            if self.start_failure.is_none() {
                state.running = true;
            }
            Ok(Box::new(FakeHandle(self.start_failure)))
        }

        fn stop(&self, _name: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.running {
                state.closing = self.shutdown_polls;
            }
            state.running = false;
            state.stops += 1;
            Ok(())
        }

        fn exec_inside(&self, request: &ExecRequest) -> Result<i32> {
            self.state.lock().unwrap().execs.push(request.clone());
            if let Some(flag) = &self.interrupt_on_exec {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(self.exec_code)
        }

        fn spawn_inside(&self, request: &ExecRequest) -> Result<()> {
            self.state.lock().unwrap().spawned.push(request.clone());
            Ok(())
        }
    }

    struct NoProbe;

    impl HostProbe for NoProbe {
        fn exists(&self, _path: &Path) -> bool {
            false
        }

        fn device_links(&self, _dir: &Path) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }

        fn network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
            Ok(Vec::new())
        }
    }

    fn config(edit: impl FnOnce(&mut ContainerSettings)) -> ContainerConfig {
        let mut settings = ContainerSettings::new("editor", "/var/lib/machines/editor", "alice");
        edit(&mut settings);
        ContainerConfig::from_settings(settings, &BindCatalog::builtin()).unwrap()
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Harness {
        temp_dir: TempDir,
        ctx: InvocationContext,
        display: DisplayBroker,
    }

    impl Harness {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let display = DisplayBroker::new(CommandRunner::default())
                .with_dirs(temp_dir.path(), temp_dir.path())
                .with_poll_interval(Duration::from_millis(10));
            Self {
                temp_dir,
                ctx: InvocationContext::for_tests(1000),
                display,
            }
        }

        fn coordinator<'a>(
            &'a self,
            config: &'a ContainerConfig,
            gateway: &'a FakeGateway,
        ) -> SessionCoordinator<'a> {
            SessionCoordinator::new(config, &self.ctx, gateway, &NoProbe, &self.display)
                .with_lock_dir(self.temp_dir.path().join("locks"))
                .with_poll_interval(Duration::from_millis(1))
        }
    }

    #[test]
    fn test_sole_session_starts_runs_and_stops() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();

        let code = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["echo", "hi"])))
            .unwrap();

        assert_eq!(code, 0);
        let state = gateway.state.lock().unwrap();
        assert_eq!(state.starts, vec![Vec::<String>::new()]);
        assert_eq!(state.execs[0].command, words(&["echo", "hi"]));
        assert_eq!(state.stops, 1);
        assert!(!state.running);
    }

    #[test]
    fn test_last_session_waits_until_machine_is_gone() {
        let harness = Harness::new();
        let config = config(|_| {});
        let mut gateway = FakeGateway::new();
        gateway.shutdown_polls = 5;

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap();

        let state = gateway.state.lock().unwrap();
        assert_eq!(state.stops, 1);
        assert_eq!(state.closing, 0);
        drop(state);
        // claim is free again only after the machine went away
        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        assert!(lock.try_exclusive().unwrap().is_some());
    }

    #[test]
    fn test_start_waits_for_previous_instance_to_shut_down() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        gateway.state.lock().unwrap().closing = 3;

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::StartOnly)
            .unwrap();

        let state = gateway.state.lock().unwrap();
        assert_eq!(state.starts.len(), 1);
        assert!(!state.started_while_closing);
    }

    #[test]
    fn test_interrupt_while_waiting_for_startup_guard() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        let _starter = lock.try_startup_guard().unwrap().unwrap();

        let err = harness
            .coordinator(&config, &gateway)
            .with_interrupt_flag(Arc::new(AtomicBool::new(true)))
            .run(&SessionDirective::StartOnly)
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Interrupted));
        assert_eq!(err.exit_code(), 2);
        assert!(gateway.state.lock().unwrap().starts.is_empty());
    }

    #[test]
    fn test_interrupt_while_waiting_for_shutdown_to_finish() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        let _stopping = lock.try_exclusive().unwrap().unwrap();

        let err = harness
            .coordinator(&config, &gateway)
            .with_interrupt_flag(Arc::new(AtomicBool::new(true)))
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Interrupted));
        let state = gateway.state.lock().unwrap();
        assert!(state.execs.is_empty());
        assert_eq!(state.stops, 0);
    }

    #[test]
    fn test_exit_code_propagates() {
        let harness = Harness::new();
        let config = config(|_| {});
        let mut gateway = FakeGateway::new();
        gateway.exec_code = 42;
        let code = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["false"])))
            .unwrap();
        assert_eq!(code, 42);
    }

    #[test]
    fn test_joining_running_container_does_not_restart() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        gateway.state.lock().unwrap().running = true;

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap();

        let state = gateway.state.lock().unwrap();
        assert!(state.starts.is_empty());
        assert_eq!(state.stops, 1);
    }

    #[test]
    fn test_other_session_keeps_container_running() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        let sibling = lock.try_acquire_shared().unwrap().unwrap();

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap();
        assert_eq!(gateway.state.lock().unwrap().stops, 0);
        assert!(gateway.state.lock().unwrap().running);
        drop(sibling);
    }

    #[test]
    fn test_start_only_leaves_running() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        let code = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::StartOnly)
            .unwrap();
        assert_eq!(code, 0);
        let state = gateway.state.lock().unwrap();
        assert_eq!(state.starts.len(), 1);
        assert!(state.execs.is_empty());
        assert_eq!(state.stops, 0);
    }

    #[test]
    fn test_stop_only_forces_shutdown() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        gateway.state.lock().unwrap().running = true;
        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        let _sibling = lock.try_acquire_shared().unwrap().unwrap();

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::StopOnly)
            .unwrap();
        let state = gateway.state.lock().unwrap();
        assert!(state.starts.is_empty());
        assert_eq!(state.stops, 1);
    }

    #[test]
    fn test_interrupt_maps_to_exit_code_two_and_still_stops() {
        let harness = Harness::new();
        let config = config(|_| {});
        let flag = Arc::new(AtomicBool::new(false));
        let mut gateway = FakeGateway::new();
        gateway.exec_code = 130;
        gateway.interrupt_on_exec = Some(flag.clone());

        let code = harness
            .coordinator(&config, &gateway)
            .with_interrupt_flag(flag)
            .run(&SessionDirective::Run(words(&["sleep", "100"])))
            .unwrap();
        assert_eq!(code, 2);
        assert_eq!(gateway.state.lock().unwrap().stops, 1);
    }

    #[test]
    fn test_runtime_exit_during_start_is_fatal() {
        let harness = Harness::new();
        let config = config(|_| {});
        let mut gateway = FakeGateway::new();
        gateway.start_failure = Some(1);

        let err = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Provisioning { code: Some(1), .. }));
        let state = gateway.state.lock().unwrap();
        assert_eq!(state.starts.len(), 1);
        assert!(state.execs.is_empty());
    }

    #[test]
    fn test_interrupt_during_start_stops() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        let flag = Arc::new(AtomicBool::new(true));

        let err = harness
            .coordinator(&config, &gateway)
            .with_interrupt_flag(flag)
            .run(&SessionDirective::StartOnly)
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Interrupted));
        assert!(gateway.state.lock().unwrap().stops >= 1);
    }

    #[test]
    fn test_precondition_failure_prevents_start() {
        let harness = Harness::new();
        let config = config(|s| s.sound = true);
        let gateway = FakeGateway::new();
        let err = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::Run(words(&["true"])))
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Precondition(_)));
        assert!(gateway.state.lock().unwrap().starts.is_empty());
    }

    #[test]
    fn test_private_gui_allocates_display_and_window_manager() {
        let harness = Harness::new();
        let script = format!(
            "touch {}/X{{display}} && exec sleep 30",
            harness.temp_dir.path().display()
        );
        let config = config(|s| {
            s.gui_private = true;
            s.network = NetworkMode::Nat;
            s.gui_private_server = words(&["sh", "-c", script.as_str()]);
        });
        let gateway = FakeGateway::new();

        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::StartOnly)
            .unwrap();

        let display = harness.display.lookup("editor").unwrap();
        let state = gateway.state.lock().unwrap();
        assert_eq!(
            state.starts[0],
            vec![
                format!("--bind=/tmp/.X11-unix/X{}:/tmp/.X11-unix/X0", display),
                "--network-veth".to_string(),
            ]
        );
        assert_eq!(state.spawned[0].command, words(&["matchbox-window-manager"]));
        drop(state);

        // no lock file was written by the fake server, so this only unpublishes
        harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::StopOnly)
            .unwrap();
        assert_eq!(harness.display.lookup("editor"), None);
    }

    #[test]
    fn test_maintenance_update_uses_host_network_and_root() {
        let harness = Harness::new();
        let config = config(|s| {
            s.network = NetworkMode::Isolated;
            s.binds = vec!["downloads".to_string()];
        });
        let gateway = FakeGateway::new();

        let code = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::AptUpdate)
            .unwrap();
        assert_eq!(code, 0);

        let state = gateway.state.lock().unwrap();
        assert_eq!(state.starts, vec![Vec::<String>::new()]);
        let commands: Vec<_> = state.execs.iter().map(|r| r.command.clone()).collect();
        assert_eq!(commands, vec![words(&["apt", "update"]), words(&["apt", "upgrade"])]);
        assert!(state.execs.iter().all(|r| r.user.is_none()));
        assert_eq!(state.stops, 1);
    }

    #[test]
    fn test_maintenance_refused_while_running_or_busy() {
        let harness = Harness::new();
        let config = config(|_| {});
        let gateway = FakeGateway::new();
        gateway.state.lock().unwrap().running = true;
        let err = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::AptUpdate)
            .unwrap_err();
        assert!(matches!(err, AppContainerError::AlreadyRunning(_)));

        let lock = SessionLock::new(&harness.temp_dir.path().join("locks"), "editor");
        let _sibling = lock.try_acquire_shared().unwrap().unwrap();
        let err = harness
            .coordinator(&config, &gateway)
            .run(&SessionDirective::AptUpdate)
            .unwrap_err();
        assert!(matches!(err, AppContainerError::Busy(_)));
    }
}
