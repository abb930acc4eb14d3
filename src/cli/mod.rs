//! Command-line interface
//!
//! clap handles the configuration path; everything after it goes through
//! the `++` control-token parser so control scripts can forward their own
//! arguments untouched.

mod args;
mod tokens;

pub use args::Args;
pub use tokens::{parse_tokens, ControlTokens};
