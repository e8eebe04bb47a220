//! Centralized command execution with consistent error handling.
//!
//! Every external tool the pipeline touches goes through [`Cmd`]. The
//! command is described by the builder and executed by a [`CommandRunner`]:
//! [`SystemRunner`] spawns real processes, [`RecordingRunner`] records the
//! invocation and replays canned results (dry runs and tests).

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::BuildError;

/// How a command's output reaches the operator.
///
/// Only observability changes between the two modes; exit-code handling
/// and results are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture stdout/stderr; stderr is attached to failures.
    #[default]
    Captured,
    /// Inherit the terminal so progress is visible live.
    Streamed,
}

impl OutputMode {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Streamed
        } else {
            Self::Captured
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// Exit code, or -1 if terminated by signal.
    pub code: i32,
    /// Captured stdout (empty when streamed).
    pub stdout: String,
    /// Captured stderr (empty when streamed).
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
    output: OutputMode,
    /// Captured output is also written here.
    log_file: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            allow_fail: false,
            error_prefix: None,
            output: OutputMode::Captured,
            log_file: None,
        }
    }

    /// Run `script` through `sh -c` (pipelines, globbing, subshells).
    pub fn shell(script: impl AsRef<str>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    pub fn log_to(mut self, path: &Path) -> Self {
        self.log_file = Some(path.to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Render as a single shell line, quoting arguments that need it.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run on the host.
    pub fn run(self) -> Result<CommandResult> {
        self.run_with(&SystemRunner)
    }

    /// Run through `runner`, turning a non-zero exit into
    /// [`BuildError::ExternalTool`] unless [`Cmd::allow_fail`] was set.
    pub fn run_with(self, runner: &dyn CommandRunner) -> Result<CommandResult> {
        tracing::debug!(command = %self.command_line(), "running");
        let result = runner.execute(&self)?;

        if !self.allow_fail && !result.success() {
            let context = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            return Err(BuildError::ExternalTool {
                program: self.program,
                context,
                code: result.code,
                stderr: result.stderr,
            }
            .into());
        }

        Ok(result)
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Executes a described command.
///
/// Implementations report spawn failures as `Err`; a process that ran and
/// exited non-zero is an `Ok` result with the exit code set.
pub trait CommandRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Spawns real processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        match cmd.output {
            OutputMode::Captured => {
                let output = command.output().with_context(|| {
                    format!("Failed to execute '{}'. Is it installed?", cmd.program)
                })?;
                let result = CommandResult {
                    code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                if let Some(log) = &cmd.log_file {
                    write_log(log, &result)?;
                }
                Ok(result)
            }
            OutputMode::Streamed => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
                let status = command.status().with_context(|| {
                    format!("Failed to execute '{}'. Is it installed?", cmd.program)
                })?;
                Ok(CommandResult {
                    code: status.code().unwrap_or(-1),
                    ..CommandResult::default()
                })
            }
        }
    }
}

fn write_log(path: &Path, result: &CommandResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    fs::write(path, format!("{}{}", result.stdout, result.stderr))
        .with_context(|| format!("writing command log '{}'", path.display()))
}

type Effect = Box<dyn Fn(&Cmd) -> io::Result<()>>;

struct Response {
    program: String,
    arg_contains: Option<String>,
    result: CommandResult,
    effect: Option<Effect>,
}

/// Records every invocation instead of spawning it.
///
/// Unmatched commands succeed with empty output. Responses are matched by
/// program name (and optionally an argument substring), first match wins.
#[derive(Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<Cmd>>,
    responses: Vec<Response>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `program` with exit code 0 and `stdout`.
    pub fn respond(self, program: &str, stdout: &str) -> Self {
        self.push(program, None, 0, stdout, "", None)
    }

    /// Make `program` exit with `code` and `stderr`.
    pub fn fail(self, program: &str, code: i32, stderr: &str) -> Self {
        self.push(program, None, code, "", stderr, None)
    }

    /// Make `program` exit with `code` only when one of its arguments contains `needle`.
    pub fn fail_when(self, program: &str, needle: &str, code: i32, stderr: &str) -> Self {
        self.push(program, Some(needle), code, "", stderr, None)
    }

    /// Run `effect` when `program` is invoked, then succeed.
    pub fn on_run(
        self,
        program: &str,
        effect: impl Fn(&Cmd) -> io::Result<()> + 'static,
    ) -> Self {
        self.push(program, None, 0, "", "", Some(Box::new(effect)))
    }

    fn push(
        mut self,
        program: &str,
        arg_contains: Option<&str>,
        code: i32,
        stdout: &str,
        stderr: &str,
        effect: Option<Effect>,
    ) -> Self {
        self.responses.push(Response {
            program: program.to_string(),
            arg_contains: arg_contains.map(str::to_string),
            result: CommandResult {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            effect,
        });
        self
    }

    /// Command lines in invocation order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Cmd::command_line).collect()
    }

    /// Recorded invocations of `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Cmd> {
        self.calls
            .borrow()
            .iter()
            .filter(|cmd| cmd.program == program)
            .cloned()
            .collect()
    }

    pub fn invoked(&self, program: &str) -> bool {
        self.calls.borrow().iter().any(|cmd| cmd.program == program)
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        self.calls.borrow_mut().push(cmd.clone());

        let matched = self.responses.iter().find(|response| {
            response.program == cmd.program
                && response
                    .arg_contains
                    .as_deref()
                    .map_or(true, |needle| cmd.args.iter().any(|a| a.contains(needle)))
        });

        match matched {
            Some(response) => {
                if let Some(effect) = &response.effect {
                    effect(cmd).with_context(|| {
                        format!("simulating '{}'", cmd.command_line())
                    })?;
                }
                Ok(response.result.clone())
            }
            None => Ok(CommandResult::default()),
        }
    }
}

/// Check if a program exists in PATH.
pub fn exists(program: &str) -> bool {
    which::which(program).is_ok()
}
