//! app-container CLI - run a command inside a per-app container

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use app_container::cli::{parse_tokens, Args};
use app_container::{
    AppContainerError, BindCatalog, CommandRunner, ContainerConfig, ContainerSettings,
    DisplayBroker, InvocationContext, NspawnGateway, SessionCoordinator, SystemProbe,
};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_ENV: &str = "APP_CONTAINER_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<AppContainerError>()
                .map_or(1, AppContainerError::exit_code);
            std::process::exit(code);
        }
    }
}

fn run(args: Args) -> anyhow::Result<i32> {
    let tokens = parse_tokens(&args.args)?;

    let mut settings = ContainerSettings::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(network) = tokens.network {
        settings.network = network;
    }
    let config = ContainerConfig::from_settings(settings, &BindCatalog::builtin())?;
    let directive = tokens.directive(config.run.as_deref())?;

    let ctx = InvocationContext::from_env();
    let runner = CommandRunner::for_context(tokens.show, &config.sudo, &ctx);
    let gateway = NspawnGateway::new(runner.clone(), config.runtime_extra_args.clone());
    let probe = SystemProbe::new(runner.clone());
    let display = DisplayBroker::new(runner.clone());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install interrupt handler")?;

    let coordinator = SessionCoordinator::new(&config, &ctx, &gateway, &probe, &display)
        .with_interrupt_flag(interrupted)
        .with_runner(runner);
    Ok(coordinator.run(&directive)?)
}
