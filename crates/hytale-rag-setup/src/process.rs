//! Subprocess execution.
//!
//! Every external command setup runs (installers, `ollama`, `npm`, the
//! service self-test) goes through [`ProcessRunner`], so provisioning logic
//! can be exercised with a scripted runner.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use hytale_rag_config::OsFamily;
use hytale_rag_config::platform::command_exists;

use crate::error::{Result, SetupError};

/// Node launchers that are `.cmd` shims on Windows and need `cmd /C`.
const WINDOWS_SHIMS: &[&str] = &["npm", "npx"];

/// A command line with optional working directory and environment overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with `code` and `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion with output captured.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;

    /// Run to completion with stdio inherited from this process.
    ///
    /// Used for long installs and downloads whose own progress output the
    /// user should see. Returns the exit code.
    async fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>>;

    /// Start a process that outlives this one, with null stdio.
    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()>;

    /// Whether `program` resolves on `PATH` right now.
    fn is_available(&self, program: &str) -> bool;
}

/// [`ProcessRunner`] backed by real subprocesses.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    os: OsFamily,
}

impl SystemRunner {
    pub fn new(os: OsFamily) -> Self {
        Self { os }
    }

    /// Program and arguments after applying the Windows shim rule.
    fn argv(&self, spec: &CommandSpec) -> (String, Vec<String>) {
        if self.os.is_windows() && WINDOWS_SHIMS.contains(&spec.program.as_str()) {
            let mut args = vec!["/C".to_string(), spec.program.clone()];
            args.extend(spec.args.iter().cloned());
            ("cmd".to_string(), args)
        } else {
            (spec.program.clone(), spec.args.clone())
        }
    }

    fn command(&self, spec: &CommandSpec) -> tokio::process::Command {
        let (program, args) = self.argv(spec);
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn spawn_error(spec: &CommandSpec, source: std::io::Error) -> SetupError {
        SetupError::Process {
            program: spec.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        tracing::debug!(command = %spec, "running");
        let output = self
            .command(spec)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Self::spawn_error(spec, e))?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.stderr.is_empty() {
            tracing::debug!(command = %spec, stderr = %result.stderr.trim(), "process stderr");
        }
        Ok(result)
    }

    async fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>> {
        tracing::debug!(command = %spec, "running attached");
        let status = self
            .command(spec)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Self::spawn_error(spec, e))?;
        Ok(status.code())
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()> {
        let (program, args) = self.argv(spec);
        let mut cmd = std::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn().map_err(|e| Self::spawn_error(spec, e))?;
        tracing::info!(command = %spec, pid = child.id(), "started detached process");
        Ok(())
    }

    fn is_available(&self, program: &str) -> bool {
        command_exists(self.os, program)
    }
}

/// Scripted runner for tests.
///
/// Records every invocation and answers through a responder closure.
#[cfg(test)]
pub struct MockRunner {
    available: std::sync::Mutex<std::collections::BTreeSet<String>>,
    responder: Box<dyn Fn(&CommandSpec) -> ProcessOutput + Send + Sync>,
    calls: std::sync::Mutex<Vec<CommandSpec>>,
    detached: std::sync::Mutex<Vec<CommandSpec>>,
}

#[cfg(test)]
impl MockRunner {
    /// Every command succeeds with empty output.
    pub fn new() -> Self {
        Self {
            available: Default::default(),
            responder: Box::new(|_| ProcessOutput::ok("")),
            calls: Default::default(),
            detached: Default::default(),
        }
    }

    pub fn with_available<I, S>(self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available
            .lock()
            .unwrap()
            .extend(programs.into_iter().map(Into::into));
        self
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&CommandSpec) -> ProcessOutput + Send + Sync + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn make_available(&self, program: &str) {
        self.available.lock().unwrap().insert(program.to_string());
    }

    /// Command lines run (captured or attached), in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn respond(&self, spec: &CommandSpec) -> ProcessOutput {
        self.calls.lock().unwrap().push(spec.clone());
        (self.responder)(spec)
    }
}

#[cfg(test)]
#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        Ok(self.respond(spec))
    }

    async fn run_attached(&self, spec: &CommandSpec) -> Result<Option<i32>> {
        Ok(self.respond(spec).code)
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<()> {
        self.detached.lock().unwrap().push(spec.clone());
        Ok(())
    }

    fn is_available(&self, program: &str) -> bool {
        self.available.lock().unwrap().contains(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("ollama").args(["pull", "nomic-embed-text"]);
        assert_eq!(spec.to_string(), "ollama pull nomic-embed-text");
        assert_eq!(
            CommandSpec::shell("curl x | sh").to_string(),
            "sh -c curl x | sh"
        );
    }

    #[test]
    fn test_windows_shim() {
        let runner = SystemRunner::new(OsFamily::Windows);
        let (program, args) = runner.argv(&CommandSpec::new("npm").arg("install"));
        assert_eq!(program, "cmd");
        assert_eq!(args, vec!["/C", "npm", "install"]);

        let (program, _) = runner.argv(&CommandSpec::new("ollama").arg("serve"));
        assert_eq!(program, "ollama");

        let (program, _) = SystemRunner::new(OsFamily::Linux).argv(&CommandSpec::new("npm"));
        assert_eq!(program, "npm");
    }

    #[test]
    fn test_output_combined() {
        let out = ProcessOutput {
            code: Some(1),
            stdout: "out".into(),
            stderr: "err".into(),
        };
        assert_eq!(out.combined(), "out\nerr");
        assert!(!out.success());
        assert_eq!(ProcessOutput::failed(2, "boom").combined(), "boom");
        assert!(ProcessOutput::ok("fine").success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemRunner::new(OsFamily::current());
        let out = runner
            .run(&CommandSpec::shell("echo hello; echo oops >&2; exit 3").env("X", "1"))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = SystemRunner::new(OsFamily::current());
        let out = runner
            .run(
                &CommandSpec::shell("printf '%s %s' \"$GREETING\" \"$(basename \"$PWD\")\"")
                    .cwd(dir.path())
                    .env("GREETING", "hi"),
            )
            .await
            .unwrap();
        let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(out.stdout, format!("hi {}", name));
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let runner = SystemRunner::new(OsFamily::current());
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-command-7f3a"))
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Process { .. }));
    }

    #[tokio::test]
    async fn test_mock_runner_records() {
        let runner = MockRunner::new()
            .with_available(["npm"])
            .with_responder(|spec| {
                if spec.program == "npm" {
                    ProcessOutput::ok("done")
                } else {
                    ProcessOutput::failed(1, "nope")
                }
            });
        assert!(runner.is_available("npm"));
        assert!(!runner.is_available("ollama"));
        assert!(runner.run(&CommandSpec::new("npm")).await.unwrap().success());
        assert_eq!(
            runner.run_attached(&CommandSpec::new("x")).await.unwrap(),
            Some(1)
        );
        runner.spawn_detached(&CommandSpec::new("ollama").arg("serve")).unwrap();
        assert_eq!(runner.calls(), vec!["npm", "x"]);
        assert_eq!(runner.detached(), vec!["ollama serve"]);
    }
}
