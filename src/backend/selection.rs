//! Backend selection protocol
//!
//! Candidates are tried in order. A candidate is skipped when it needs root
//! and we are not root, when its binary is missing, or when its probe does
//! not pass. The first candidate whose probe passes runs the real command and
//! its exit code is final, zero or not: a failing command never moves on to
//! the next backend.

use std::path::PathBuf;

use super::{Backend, IsolationKind, Toolbox};
use crate::config::Config;
use crate::error::{PolytheneError, Result};
use crate::store::ensure_runtime_paths;

/// One `exec` call, consumed by [`select_and_run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Rootfs to enter
    pub root: PathBuf,
    /// Shell-quoted command line run through `/bin/sh -c`
    pub inner_cmd: String,
    pub timeout: Option<u64>,
    /// Backend to try before the regular priority order
    pub preferred: Option<IsolationKind>,
}

/// Final state of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A backend accepted the probe and ran the command
    Completed { backend: IsolationKind, code: i32 },
    /// Every candidate was skipped
    Exhausted,
}

/// Order `backends` for trying, moving `preferred` to the front.
///
/// The remaining backends keep their relative order.
pub fn candidate_order(
    backends: &[Backend],
    preferred: Option<IsolationKind>,
) -> Result<Vec<&Backend>> {
    let Some(preferred) = preferred else {
        return Ok(backends.iter().collect());
    };

    let first = backends
        .iter()
        .find(|b| b.kind == preferred)
        .ok_or_else(|| PolytheneError::UnknownIsolation(preferred.to_string()))?;

    let mut ordered = vec![first];
    ordered.extend(backends.iter().filter(|b| b.kind != preferred));
    Ok(ordered)
}

/// Run `request` through the first usable backend
pub fn select_and_run<T: Toolbox>(
    config: &Config,
    request: &ExecRequest,
    backends: &[Backend],
    toolbox: &T,
) -> Result<Selection> {
    for backend in candidate_order(backends, request.preferred)? {
        if backend.requires_root && !config.is_root {
            log::debug!("Skipping {}: requires root", backend.name());
            continue;
        }

        if backend.ensure_dirs {
            ensure_runtime_paths(&request.root)?;
        }

        let Some(tool) = toolbox.resolve(backend.binary) else {
            log::debug!("Skipping {}: {} not found", backend.name(), backend.binary);
            continue;
        };

        let caps = backend.detect_capabilities(toolbox, &tool, &request.root, request.timeout);
        let vectors = backend.arg_vectors(
            &request.root,
            &request.inner_cmd,
            &config.container_tmp,
            caps,
        );

        let outcome = toolbox.probe(&tool, &vectors.probe, request.timeout);
        if !outcome.is_usable() {
            log::debug!("Skipping {}: probe {}", backend.name(), outcome);
            continue;
        }

        log::info!("Executing via {}", backend.name());
        let code = toolbox.execute(&tool, &vectors.execute, request.timeout)?;
        return Ok(Selection::Completed {
            backend: backend.kind,
            code,
        });
    }

    Ok(Selection::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProbeOutcome, BACKENDS};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Probe(String, Vec<String>),
        Execute(String, Vec<String>),
    }

    /// Toolbox stub keyed by binary name
    #[derive(Default)]
    struct StubToolbox {
        installed: HashSet<&'static str>,
        /// Binaries whose final `/bin/sh -c true` probe fails
        rejecting: HashSet<&'static str>,
        exit_codes: HashMap<&'static str, i32>,
        calls: RefCell<Vec<Call>>,
    }

    impl StubToolbox {
        fn with(installed: &[&'static str]) -> Self {
            Self {
                installed: installed.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn rejecting(mut self, binary: &'static str) -> Self {
            self.rejecting.insert(binary);
            self
        }

        fn exiting(mut self, binary: &'static str, code: i32) -> Self {
            self.exit_codes.insert(binary, code);
            self
        }

        fn name_of(tool: &Path) -> String {
            tool.file_name().unwrap().to_string_lossy().into_owned()
        }

        fn executed(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    Call::Execute(name, _) => Some(name.clone()),
                    _ => None,
                })
                .collect()
        }

        fn probed(&self) -> Vec<String> {
            let mut names: Vec<String> = Vec::new();
            for call in self.calls.borrow().iter() {
                if let Call::Probe(name, _) = call {
                    if names.last() != Some(name) {
                        names.push(name.clone());
                    }
                }
            }
            names
        }
    }

    impl Toolbox for StubToolbox {
        fn resolve(&self, binary: &str) -> Option<PathBuf> {
            self.installed
                .contains(binary)
                .then(|| PathBuf::from("/stub/bin").join(binary))
        }

        fn probe(&self, tool: &Path, args: &[String], _timeout: Option<u64>) -> ProbeOutcome {
            let name = Self::name_of(tool);
            self.calls
                .borrow_mut()
                .push(Call::Probe(name.clone(), args.to_vec()));
            let is_shell_probe = args.ends_with(&["-c".to_string(), "true".to_string()]);
            if is_shell_probe && self.rejecting.contains(name.as_str()) {
                ProbeOutcome::Failed(1)
            } else {
                ProbeOutcome::Succeeded
            }
        }

        fn execute(&self, tool: &Path, args: &[String], _timeout: Option<u64>) -> Result<i32> {
            let name = Self::name_of(tool);
            self.calls
                .borrow_mut()
                .push(Call::Execute(name.clone(), args.to_vec()));
            Ok(self.exit_codes.get(name.as_str()).copied().unwrap_or(0))
        }
    }

    fn setup(is_root: bool) -> (TempDir, Config, ExecRequest) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("rootfs");
        std::fs::create_dir(&root).unwrap();
        let config = Config::default()
            .with_store(Some(tmp.path().to_path_buf()))
            .with_root(is_root);
        let request = ExecRequest {
            root,
            inner_cmd: "echo 'hello world'".to_string(),
            timeout: Some(15),
            preferred: None,
        };
        (tmp, config, request)
    }

    #[test]
    fn test_first_available_backend_wins() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["bwrap", "proot"]);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Bubblewrap,
                code: 0
            }
        );
        assert_eq!(toolbox.executed(), vec!["bwrap"]);
        assert!(!toolbox.probed().contains(&"proot".to_string()));
    }

    #[test]
    fn test_rejected_probe_falls_through() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["bwrap", "proot"])
            .rejecting("bwrap")
            .exiting("proot", 3);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Proot,
                code: 3
            }
        );
        assert_eq!(toolbox.executed(), vec!["proot"]);
    }

    #[test]
    fn test_missing_binary_is_skipped() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["proot"]);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Proot,
                code: 0
            }
        );
        assert_eq!(toolbox.probed(), vec!["proot"]);
    }

    #[test]
    fn test_failing_command_is_final() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["bwrap", "proot"]).exiting("bwrap", 7);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Bubblewrap,
                code: 7
            }
        );
        assert_eq!(toolbox.executed(), vec!["bwrap"]);
    }

    #[test]
    fn test_exhaustion_runs_nothing() {
        let (_tmp, config, request) = setup(true);
        let toolbox = StubToolbox::with(&["bwrap", "proot", "chroot"])
            .rejecting("bwrap")
            .rejecting("proot")
            .rejecting("chroot");

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(selection, Selection::Exhausted);
        assert!(toolbox.executed().is_empty());
    }

    #[test]
    fn test_chroot_needs_root() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["chroot"]);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(selection, Selection::Exhausted);
        assert!(toolbox.calls.borrow().is_empty());

        let (_tmp, root_config, request) = setup(true);
        let selection = select_and_run(&root_config, &request, &BACKENDS, &toolbox).unwrap();
        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Chroot,
                code: 0
            }
        );
    }

    #[test]
    fn test_preferred_backend_probed_first() {
        let (_tmp, config, mut request) = setup(false);
        request.preferred = Some(IsolationKind::Proot);
        let toolbox = StubToolbox::with(&["bwrap", "proot"]);

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Proot,
                code: 0
            }
        );
        assert_eq!(toolbox.probed(), vec!["proot"]);
    }

    #[test]
    fn test_declined_preference_keeps_original_order() {
        let (_tmp, config, mut request) = setup(true);
        request.preferred = Some(IsolationKind::Chroot);
        let toolbox = StubToolbox::with(&["bwrap", "proot", "chroot"])
            .rejecting("chroot")
            .rejecting("bwrap");

        let selection = select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert_eq!(toolbox.probed(), vec!["chroot", "bwrap", "proot"]);
        assert_eq!(
            selection,
            Selection::Completed {
                backend: IsolationKind::Proot,
                code: 0
            }
        );
    }

    #[test]
    fn test_candidate_order() {
        let names = |order: Vec<&Backend>| order.iter().map(|b| b.name()).collect::<Vec<_>>();

        assert_eq!(
            names(candidate_order(&BACKENDS, None).unwrap()),
            vec!["bubblewrap", "proot", "chroot"]
        );
        assert_eq!(
            names(candidate_order(&BACKENDS, Some(IsolationKind::Chroot)).unwrap()),
            vec!["chroot", "bubblewrap", "proot"]
        );
        assert!(matches!(
            candidate_order(&BACKENDS[..2], Some(IsolationKind::Chroot)),
            Err(PolytheneError::UnknownIsolation(_))
        ));
    }

    #[test]
    fn test_scratch_dirs_prepared() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["proot"]);

        select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        assert!(request.root.join("dev").is_dir());
        assert!(request.root.join("tmp").is_dir());
    }

    #[test]
    fn test_bwrap_probes_capabilities_before_shell_probe() {
        let (_tmp, config, request) = setup(false);
        let toolbox = StubToolbox::with(&["bwrap"]);

        select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();

        let calls = toolbox.calls.borrow();
        assert_eq!(calls.len(), 4);
        match (&calls[0], &calls[3]) {
            (Call::Probe(_, userns), Call::Execute(_, exec)) => {
                assert_eq!(userns[0], "--unshare-user");
                assert_eq!(exec[0], "--unshare-user");
                assert!(exec.contains(&"--proc".to_string()));
                assert_eq!(exec.last().unwrap(), "echo 'hello world'");
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[test]
    fn test_never_requests_login_shell() {
        let (_tmp, config, request) = setup(true);
        for kind in [IsolationKind::Bubblewrap, IsolationKind::Proot, IsolationKind::Chroot] {
            let toolbox = StubToolbox::with(&["bwrap", "proot", "chroot"]);
            let request = ExecRequest {
                preferred: Some(kind),
                ..request.clone()
            };
            select_and_run(&config, &request, &BACKENDS, &toolbox).unwrap();
            for call in toolbox.calls.borrow().iter() {
                let (Call::Probe(_, args) | Call::Execute(_, args)) = call;
                assert!(!args.iter().any(|a| a == "-lc"));
            }
        }
    }
}
