//! Runtime configuration, read once at process entry

use std::path::PathBuf;

/// Store root override
pub const STORE_ENV: &str = "POLYTHENE_STORE";
/// Any non-empty value other than `0` enables progress logs
pub const VERBOSE_ENV: &str = "POLYTHENE_VERBOSE";
/// Preferred isolation backend
pub const ISOLATION_ENV: &str = "POLYTHENE_ISOLATION";

/// Podman settings that keep it quiet under nested or sandboxed execution,
/// applied to engine commands unless the environment already sets them.
pub const ENGINE_ENV_DEFAULTS: [(&str, &str); 2] = [
    ("CONTAINERS_STORAGE_DRIVER", "vfs"),
    ("CONTAINERS_EVENTS_BACKEND", "file"),
];

/// Settings shared by the export and exec paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one rootfs per identifier
    pub store: PathBuf,
    /// Emit progress logs on stderr
    pub verbose: bool,
    /// Effective uid is 0
    pub is_root: bool,
    /// Path given a fresh tmpfs inside the bubblewrap sandbox
    pub container_tmp: PathBuf,
    /// Environment passed to every container engine invocation
    pub engine_env: Vec<(String, String)>,
}

impl Config {
    /// Build a configuration from the current process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = lookup(STORE_ENV)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_store);

        let verbose = lookup(VERBOSE_ENV).is_some_and(|v| !v.is_empty() && v != "0");

        let engine_env = ENGINE_ENV_DEFAULTS
            .iter()
            .map(|(key, default)| {
                let value = lookup(key)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| default.to_string());
                (key.to_string(), value)
            })
            .collect();

        Self {
            store: absolute(store),
            verbose,
            is_root: effective_uid_is_root(),
            container_tmp: std::env::temp_dir(),
            engine_env,
        }
    }

    /// Override the store, e.g. from `--store`
    pub fn with_store(mut self, store: Option<PathBuf>) -> Self {
        if let Some(store) = store {
            self.store = absolute(store);
        }
        self
    }

    /// Enable verbose logs; never turns them off once the environment asked for them
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose |= verbose;
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// `$TMPDIR/polythene`
pub fn default_store() -> PathBuf {
    std::env::temp_dir().join("polythene")
}

pub(crate) fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn effective_uid_is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
