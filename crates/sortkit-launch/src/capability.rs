//! Host capability probe.
//!
//! Optional runtime dependencies are probed once per process and cached.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable overriding the docker executable.
pub const DOCKER_PATH_ENV: &str = "SORTKIT_DOCKER_PATH";

/// Environment variable overriding the `sortkit` worker executable.
pub const WORKER_PATH_ENV: &str = "SORTKIT_WORKER_PATH";

/// Optional runtime dependencies found on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Docker executable, if found.
    pub docker: Option<PathBuf>,
    /// `sortkit` worker executable, if found.
    pub worker: Option<PathBuf>,
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

impl Capabilities {
    /// Probes the host.
    pub fn probe() -> Self {
        let caps = Self {
            docker: find_executable(DOCKER_PATH_ENV, "docker"),
            worker: find_executable(WORKER_PATH_ENV, "sortkit"),
        };
        tracing::debug!(docker = ?caps.docker, worker = ?caps.worker, "probed host capabilities");
        caps
    }

    /// Capabilities of this process, probed on first use.
    pub fn global() -> &'static Capabilities {
        CAPABILITIES.get_or_init(Capabilities::probe)
    }
}

/// Looks up an executable via an environment override, then PATH.
pub fn find_executable(env_var: &str, name: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(env_var) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    which::which(name).ok()
}
