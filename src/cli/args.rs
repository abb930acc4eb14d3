//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "app-container")]
#[command(author, version, about = "Run applications in per-app systemd-nspawn containers", long_about = None)]
pub struct Args {
    /// Container configuration file (JSON)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Control tokens (`++show`, `++start`, ...) followed by the command to run
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
