//! `++` control tokens
//!
//! Tokens are only recognised at the front of the argument list. The first
//! argument that is not a token starts the command, so commands can take
//! arguments that happen to begin with `++`.

use crate::container::NetworkMode;
use crate::error::{AppContainerError, Result};
use crate::session::SessionDirective;

/// Control tokens found in front of the command
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ControlTokens {
    /// `++show`: echo external command lines
    pub show: bool,
    /// `++start`
    pub start_only: bool,
    /// `++stop`
    pub stop_only: bool,
    /// `++cmd`: run the arguments instead of the configured program
    pub override_cmd: bool,
    /// `++aptupdate`
    pub apt_update: bool,
    /// `++aptupdateall`
    pub apt_update_all: bool,
    /// `++network <mode>`
    pub network: Option<NetworkMode>,
    /// Everything after the last token
    pub command: Vec<String>,
}

/// Split `args` into control tokens and the command
pub fn parse_tokens(args: &[String]) -> Result<ControlTokens> {
    let mut tokens = ControlTokens::default();
    let mut rest = args.iter();

    while let Some(arg) = rest.as_slice().first() {
        match arg.as_str() {
            "++show" => tokens.show = true,
            "++start" => tokens.start_only = true,
            "++stop" => tokens.stop_only = true,
            "++cmd" => tokens.override_cmd = true,
            "++aptupdate" => tokens.apt_update = true,
            "++aptupdateall" => tokens.apt_update_all = true,
            "++network" => {
                rest.next();
                let value = rest
                    .as_slice()
                    .first()
                    .ok_or_else(|| AppContainerError::InvalidNetwork("(No value)".to_string()))?;
                tokens.network = Some(value.parse()?);
            }
            _ => break,
        }
        rest.next();
    }

    tokens.command = rest.cloned().collect();
    Ok(tokens)
}

impl ControlTokens {
    /// What this invocation should do, given the configured default program
    pub fn directive(&self, run: Option<&str>) -> Result<SessionDirective> {
        if self.apt_update_all {
            return Ok(SessionDirective::AptUpdateAll);
        }
        if self.apt_update {
            return Ok(SessionDirective::AptUpdate);
        }
        if self.stop_only {
            return Ok(SessionDirective::StopOnly);
        }
        if self.start_only {
            return Ok(SessionDirective::StartOnly);
        }

        let mut command = Vec::with_capacity(self.command.len() + 1);
        if !self.override_cmd {
            command.extend(run.map(str::to_string));
        }
        command.extend(self.command.iter().cloned());

        if command.is_empty() {
            return Err(AppContainerError::Config(
                "Specify a command to run inside the container".to_string(),
            ));
        }
        Ok(SessionDirective::Run(command))
    }
}
