//! Spawns the real disk-encryption and filesystem binaries. This is the
//! glue between secs and the host shell.
//!
//! One child runs at a time, to completion. Tool steps are interactive
//! (`cryptsetup` prompts for passphrases on the controlling terminal), so
//! mutating commands inherit stdio and there is deliberately no timeout;
//! read-only probes discard all output and are judged by exit status alone.

use log::debug;
use secs_core::error::{SecsError, SecsResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// How a child's stdio is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdioMode {
    /// Share the terminal with the child (interactive prompts, tool output).
    Inherit,
    /// Discard everything (read-only probes).
    Quiet,
}

/// Wraps one external binary resolved at provider construction time.
#[derive(Debug, Clone)]
pub(crate) struct CommandRunner {
    binary: PathBuf,
}

impl CommandRunner {
    pub(crate) fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub(crate) fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run to completion and return the exit code (-1 when killed by a
    /// signal). Spawn failures are folded into a step error.
    pub(crate) fn run(&self, args: &[&str], mode: StdioMode) -> SecsResult<i32> {
        debug!("> {}", self.describe(args));

        let mut command = Command::new(&self.binary);
        command.args(args);
        if mode == StdioMode::Quiet {
            command.stdin(Stdio::null());
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }

        let status = command.status().map_err(|err| SecsError::Primitive {
            step: self.describe(args),
            detail: err.to_string(),
        })?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Run interactively and demand a zero exit.
    pub(crate) fn run_checked(&self, args: &[&str], step: &str) -> SecsResult<()> {
        let code = self.run(args, StdioMode::Inherit)?;
        if code != 0 {
            return Err(SecsError::Primitive {
                step: step.to_string(),
                detail: format!("`{}` exited with code {code}", self.describe(args)),
            });
        }
        Ok(())
    }

    /// The command line as it would be typed, for logs and error messages.
    pub(crate) fn describe(&self, args: &[&str]) -> String {
        let mut line = self.binary.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
