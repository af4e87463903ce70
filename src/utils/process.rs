// pgmanager/src/utils/process.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

/// An external program invocation: executable, arguments, extra environment
/// and an optional file fed to stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub stdin: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
        }
    }

    /// Builds a command from a configured command line such as
    /// `docker exec -i db pg_restore`. The first word is the executable.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| AppError::Config("command line cannot be empty".to_string()))?;
        let mut command = Self::new(program);
        command.args.extend(words.map(str::to_string));
        Ok(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdin_from(mut self, path: &Path) -> Self {
        self.stdin = Some(path.to_path_buf());
        self
    }

    /// Value following `flag` in the argument list, e.g. the path after `-f`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Program and arguments joined for log lines. Environment is left out
    /// since it carries the password.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turns a nonzero exit into [`AppError::ProcessExit`] carrying the
    /// captured output.
    pub fn into_checked(self, program: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let mut output = self.stderr.trim_end().to_string();
        if !self.stdout.trim().is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(self.stdout.trim_end());
        }
        Err(AppError::ProcessExit {
            program: program.to_string(),
            code: self.exit_code,
            output,
        })
    }
}

/// Runs external programs. A nonzero exit is reported through
/// [`ProcessOutput::exit_code`], never as an error.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput>;
}

/// Spawns real child processes. The child is killed if the returned future
/// is dropped, so wrapping a call in [`crate::utils::bounded`] enforces a
/// timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        let executable = which(&command.program).map_err(|e| AppError::ProcessSpawn {
            program: command.program.clone(),
            source: Box::new(e),
        })?;
        debug!(command = %command.display_line(), "spawning external process");

        let mut cmd = Command::new(&executable);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match &command.stdin {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(|e| AppError::ProcessSpawn {
            program: command.program.clone(),
            source: Box::new(e),
        })?;

        let output = child.wait_with_output().await?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
