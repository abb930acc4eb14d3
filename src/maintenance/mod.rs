//! Bulk package maintenance
//!
//! Control scripts opt in to bulk updates by carrying a marker line. Every
//! marked script is re-invoked with `++aptupdate`, all of them at once,
//! and the outcome of each is reported. Progress goes to stderr directly,
//! since the default log filter only shows warnings.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use crate::error::{AppContainerError, Result};
use crate::runtime::{exit_code, CommandRunner};

/// Line a control script carries to take part in bulk updates
pub const UPDATE_MARKER: &str = "# !MARKER FOR APP-CONTAINER UPDATE!";

/// How one script's update went
#[derive(Debug)]
pub struct UpdateOutcome {
    pub script: PathBuf,
    /// Exit code, or `None` if the script could not be launched or waited on
    pub code: Option<i32>,
    pub error: Option<String>,
}

impl UpdateOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Does this file content carry the update marker?
pub fn is_marked(content: &str) -> bool {
    content.lines().any(|line| line.starts_with(UPDATE_MARKER))
}

/// Regular files in `dir` carrying the marker, sorted by path
pub fn find_marked_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppContainerError::Config(format!("Cannot read script directory {}: {}", dir.display(), e))
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        // binaries live here too
        let content = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        if is_marked(&content) {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Update every marked script in `dir` concurrently
pub fn update_all(dir: &Path, runner: &CommandRunner) -> Result<Vec<UpdateOutcome>> {
    let scripts = find_marked_scripts(dir)?;
    if scripts.is_empty() {
        tracing::warn!(dir = %dir.display(), "no control scripts marked for update");
        return Ok(Vec::new());
    }

    let launched: Vec<(PathBuf, Result<Child>)> = scripts
        .into_iter()
        .map(|script| {
            let mut argv = vec![script.display().to_string(), "++aptupdate".to_string()];
            if runner.show() {
                argv.push("++show".to_string());
            }
            eprintln!("Update {}", script.display());
            let child = runner.spawn(&argv, false, Stdio::inherit());
            (script, child)
        })
        .collect();

    let outcomes: Vec<UpdateOutcome> = launched
        .into_iter()
        .map(|(script, child)| {
            let waited = child.and_then(|mut child| child.wait().map_err(Into::into));
            match waited {
                Ok(status) => UpdateOutcome {
                    script,
                    code: Some(exit_code(&status)),
                    error: None,
                },
                Err(e) => UpdateOutcome {
                    script,
                    code: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    for outcome in &outcomes {
        if outcome.success() {
            eprintln!("Updated {}", outcome.script.display());
        } else {
            tracing::warn!(
                script = %outcome.script.display(),
                code = ?outcome.code,
                error = outcome.error.as_deref().unwrap_or(""),
                "update failed"
            );
        }
    }
    Ok(outcomes)
}
