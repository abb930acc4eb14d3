//! app-container - run applications in per-app systemd-nspawn containers
//!
//! Each invocation runs one command inside a named container, starting it
//! on demand with the host resources its configuration asks for. Concurrent
//! invocations against the same container share it; the last one out stops
//! it.
//!
//! # Example
//!
//! ```no_run
//! use app_container::{
//!     BindCatalog, ContainerConfig, ContainerSettings, DisplayBroker, InvocationContext,
//!     NspawnGateway, SessionCoordinator, SessionDirective, SystemProbe, CommandRunner,
//! };
//!
//! let settings = ContainerSettings::load("editor.json".as_ref()).unwrap();
//! let config = ContainerConfig::from_settings(settings, &BindCatalog::builtin()).unwrap();
//! let ctx = InvocationContext::from_env();
//! let runner = CommandRunner::for_context(false, &config.sudo, &ctx);
//! let gateway = NspawnGateway::new(runner.clone(), config.runtime_extra_args.clone());
//! let probe = SystemProbe::new(runner.clone());
//! let display = DisplayBroker::new(runner);
//!
//! let coordinator = SessionCoordinator::new(&config, &ctx, &gateway, &probe, &display);
//! let code = coordinator
//!     .run(&SessionDirective::Run(vec!["emacs".to_string()]))
//!     .unwrap();
//! std::process::exit(code);
//! ```

pub mod cli;
pub mod container;
pub mod context;
pub mod display;
pub mod error;
pub mod exposure;
pub mod maintenance;
pub mod runtime;
pub mod session;

pub use container::{BindCatalog, ContainerConfig, ContainerSettings, NetworkMode};
pub use context::InvocationContext;
pub use display::DisplayBroker;
pub use error::{AppContainerError, Result};
pub use exposure::{ExposureBuilder, ExposureDescriptor, SystemProbe};
pub use runtime::{CommandRunner, NspawnGateway, RuntimeGateway};
pub use session::{SessionCoordinator, SessionDirective, SessionLock};
