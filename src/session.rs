//! Building `polythene exec` invocations for embedding callers
//!
//! Test harnesses and build scripts usually drive polythene through a
//! launcher such as `uv run`. [`PolytheneSession`] assembles that argv,
//! applies the environment's isolation defaults and hands it to a
//! [`SandboxRunner`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backend::IsolationKind;
use crate::config::{absolute, default_store, ISOLATION_ENV, STORE_ENV};
use crate::error::{normalise_retcode, PolytheneError, Result};
use crate::process::{run_cmd, shell, RunOptions, ToolCommand};

/// Set by GitHub Actions runners, where bubblewrap is usually unusable
pub const CI_ENV: &str = "GITHUB_ACTIONS";

/// Executes a fully built argv and reports its exit code
pub trait SandboxRunner {
    fn run(&mut self, argv: &[String], timeout: Option<u64>) -> Result<i32>;
}

/// Runs the argv directly on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSandbox;

impl SandboxRunner for LocalSandbox {
    fn run(&mut self, argv: &[String], timeout: Option<u64>) -> Result<i32> {
        let cmd = ToolCommand::from_argv(argv)?;
        match run_cmd(cmd, &RunOptions::foreground().with_timeout(timeout)) {
            Ok(output) => Ok(output.status),
            Err(PolytheneError::CommandFailed { code, .. }) => Ok(normalise_retcode(code)),
            Err(e) => Err(e),
        }
    }
}

/// Command to run inside the rootfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Split with POSIX shell rules
    Line(String),
    /// Used as given
    Tokens(Vec<String>),
}

impl SessionCommand {
    fn into_tokens(self) -> Result<Vec<String>> {
        let tokens = match self {
            SessionCommand::Line(line) => shell::split(&line)?,
            SessionCommand::Tokens(tokens) => tokens,
        };
        if tokens.is_empty() {
            return Err(PolytheneError::EmptyCommand);
        }
        Ok(tokens)
    }
}

impl From<&str> for SessionCommand {
    fn from(line: &str) -> Self {
        SessionCommand::Line(line.to_string())
    }
}

impl From<String> for SessionCommand {
    fn from(line: String) -> Self {
        SessionCommand::Line(line)
    }
}

impl From<Vec<String>> for SessionCommand {
    fn from(tokens: Vec<String>) -> Self {
        SessionCommand::Tokens(tokens)
    }
}

impl From<&[&str]> for SessionCommand {
    fn from(tokens: &[&str]) -> Self {
        SessionCommand::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SessionCommand {
    fn from(tokens: [&str; N]) -> Self {
        SessionCommand::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// Builder for `polythene exec` invocations
#[derive(Debug)]
pub struct PolytheneSession<S: SandboxRunner> {
    sandbox: S,
    /// Set by [`PolytheneSession::with_store`]; otherwise resolved per call
    store: Option<PathBuf>,
    env: HashMap<String, String>,
    uv_command: String,
}

impl<S: SandboxRunner> PolytheneSession<S> {
    /// Session using a snapshot of the process environment
    pub fn new(sandbox: S) -> Self {
        Self {
            sandbox,
            store: None,
            env: std::env::vars().collect(),
            uv_command: "uv".to_string(),
        }
    }

    pub fn with_store(mut self, store: impl AsRef<Path>) -> Self {
        let store = store.as_ref();
        self.store = Some(absolute(store.to_path_buf()));
        self
    }

    /// Replace the environment consulted for store and isolation defaults
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_uv_command(mut self, uv_command: impl Into<String>) -> Self {
        self.uv_command = uv_command.into();
        self
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Run `command` inside the rootfs for `uuid` through the sandbox runner
    pub fn exec(
        &mut self,
        uuid: &str,
        command: impl Into<SessionCommand>,
        isolation: Option<IsolationKind>,
        timeout: Option<u64>,
    ) -> Result<i32> {
        let argv = self.build_exec_argv(uuid, command, isolation)?;
        self.sandbox.run(&argv, timeout)
    }

    /// Argv for `exec` without running it
    pub fn build_exec_argv(
        &self,
        uuid: &str,
        command: impl Into<SessionCommand>,
        isolation: Option<IsolationKind>,
    ) -> Result<Vec<String>> {
        let tokens = command.into().into_tokens()?;

        let mut argv = vec![
            self.uv_command.clone(),
            "run".to_string(),
            "polythene".to_string(),
            "exec".to_string(),
            uuid.to_string(),
            "--store".to_string(),
            self.resolved_store().to_string_lossy().into_owned(),
        ];

        let isolation = match isolation {
            Some(kind) => Some(kind),
            None => self.default_isolation()?,
        };
        if let Some(kind) = isolation {
            argv.push(format!("--isolation={}", kind));
        }

        argv.push("--".to_string());
        argv.extend(tokens);
        Ok(argv)
    }

    /// Explicit store, else `POLYTHENE_STORE`, else `$TMPDIR/polythene`
    fn resolved_store(&self) -> PathBuf {
        if let Some(store) = &self.store {
            return store.clone();
        }
        match self.env.get(STORE_ENV).filter(|v| !v.is_empty()) {
            Some(store) => absolute(PathBuf::from(store)),
            None => default_store(),
        }
    }

    /// `POLYTHENE_ISOLATION` if set, else `proot` on CI runners
    pub fn default_isolation(&self) -> Result<Option<IsolationKind>> {
        if let Some(explicit) = self.env.get(ISOLATION_ENV).filter(|v| !v.is_empty()) {
            return explicit.parse().map(Some);
        }
        if self.env.get(CI_ENV).map(String::as_str).is_some_and(is_truthy) {
            return Ok(Some(IsolationKind::Proot));
        }
        Ok(None)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Records every argv instead of running it
    #[derive(Default)]
    struct RecordingSandbox {
        calls: Vec<(Vec<String>, Option<u64>)>,
    }

    impl SandboxRunner for RecordingSandbox {
        fn run(&mut self, argv: &[String], timeout: Option<u64>) -> Result<i32> {
            self.calls.push((argv.to_vec(), timeout));
            Ok(0)
        }
    }

    fn session(tmp: &TempDir, env: &[(&str, &str)]) -> PolytheneSession<RecordingSandbox> {
        PolytheneSession::new(RecordingSandbox::default())
            .with_store(tmp.path())
            .with_env(
                env.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
    }

    #[test]
    fn test_exec_includes_store_and_command() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp, &[]);

        let code = session
            .exec("uuid-1", ["echo", "hello"], Some(IsolationKind::Bubblewrap), Some(5))
            .unwrap();
        assert_eq!(code, 0);

        let (argv, timeout) = session.sandbox().calls.last().unwrap();
        let store = tmp.path().to_string_lossy();
        assert_eq!(
            argv[..7],
            ["uv", "run", "polythene", "exec", "uuid-1", "--store", store.as_ref()]
        );
        assert!(argv.contains(&"--isolation=bubblewrap".to_string()));
        assert_eq!(argv[argv.len() - 3..], ["--", "echo", "hello"]);
        assert_eq!(*timeout, Some(5));
    }

    #[test]
    fn test_defaults_to_proot_on_github() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp, &[("GITHUB_ACTIONS", "true")]);

        session.exec("uuid-2", "echo hi", None, None).unwrap();

        let (argv, _) = session.sandbox().calls.last().unwrap();
        assert!(argv.contains(&"--isolation=proot".to_string()));
        assert_eq!(argv[argv.len() - 2..], ["echo", "hi"]);
    }

    #[test]
    fn test_isolation_env_overrides_ci_default() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(
            &tmp,
            &[("POLYTHENE_ISOLATION", "chroot"), ("GITHUB_ACTIONS", "1")],
        );

        session.exec("uuid-3", ["true"], None, None).unwrap();

        let (argv, _) = session.sandbox().calls.last().unwrap();
        assert!(argv.contains(&"--isolation=chroot".to_string()));
        assert!(!argv.contains(&"--isolation=proot".to_string()));
    }

    #[test]
    fn test_explicit_isolation_wins() {
        let tmp = TempDir::new().unwrap();
        let session = session(&tmp, &[("POLYTHENE_ISOLATION", "chroot")]);
        let argv = session
            .build_exec_argv("id", ["true"], Some(IsolationKind::Proot))
            .unwrap();
        assert!(argv.contains(&"--isolation=proot".to_string()));
    }

    #[test]
    fn test_no_isolation_flag_without_defaults() {
        let tmp = TempDir::new().unwrap();
        let session = session(&tmp, &[("GITHUB_ACTIONS", "false")]);
        let argv = session.build_exec_argv("id", ["true"], None).unwrap();
        assert!(!argv.iter().any(|a| a.starts_with("--isolation")));
    }

    #[test]
    fn test_store_from_environment() {
        let session = PolytheneSession::new(RecordingSandbox::default()).with_env(
            [("POLYTHENE_STORE".to_string(), "/srv/rootfs".to_string())].into(),
        );
        let argv = session.build_exec_argv("id", ["true"], None).unwrap();
        assert_eq!(argv[5..7], ["--store", "/srv/rootfs"]);
    }

    #[test]
    fn test_explicit_store_beats_environment() {
        let tmp = TempDir::new().unwrap();
        let session = session(&tmp, &[("POLYTHENE_STORE", "/srv/rootfs")]);
        let argv = session.build_exec_argv("id", ["true"], None).unwrap();
        assert_eq!(argv[6], tmp.path().to_string_lossy());
    }

    #[test]
    fn test_default_store_without_environment() {
        let session = PolytheneSession::new(RecordingSandbox::default())
            .with_env(HashMap::from([("POLYTHENE_STORE".to_string(), String::new())]));
        let argv = session.build_exec_argv("id", ["true"], None).unwrap();
        assert_eq!(argv[6], default_store().to_string_lossy());
    }

    #[test]
    fn test_unknown_isolation_env_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let session = session(&tmp, &[("POLYTHENE_ISOLATION", "docker")]);
        let err = session.build_exec_argv("id", ["true"], None).unwrap_err();
        assert!(matches!(err, PolytheneError::UnknownIsolation(name) if name == "docker"));
    }

    #[test]
    fn test_rejects_empty_command() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp, &[]);

        let err = session.exec("uuid-4", Vec::<String>::new(), None, None).unwrap_err();
        assert_eq!(err.to_string(), "Command must contain at least one token");

        let err = session.exec("uuid-4", "   ", None, None).unwrap_err();
        assert!(matches!(err, PolytheneError::EmptyCommand));
        assert!(session.sandbox().calls.is_empty());
    }

    #[test]
    fn test_custom_launcher() {
        let tmp = TempDir::new().unwrap();
        let session = session(&tmp, &[]).with_uv_command("/opt/uv/bin/uv");
        let argv = session
            .build_exec_argv("id", "sh -c 'echo done'", None)
            .unwrap();
        assert_eq!(argv[0], "/opt/uv/bin/uv");
        assert_eq!(argv[argv.len() - 3..], ["sh", "-c", "echo done"]);
    }

    #[test]
    fn test_local_sandbox_reports_exit_code() {
        let mut sandbox = LocalSandbox;
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 4".to_string()];
        assert_eq!(sandbox.run(&argv, None).unwrap(), 4);
    }
}
