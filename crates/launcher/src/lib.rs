//! On-demand launcher for local diffusion backends.
//!
//! [`BackendLauncher::ensure_running`] pings a health endpoint and, if
//! the backend is down, starts it with a detached shell script and polls
//! the endpoint at a fixed interval until it answers or the startup
//! deadline passes. The launcher never owns the spawned process: once
//! started, the backend outlives this service.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Default delay between health polls while a backend is starting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Log a progress line every this many failed startup polls.
const PROGRESS_LOG_EVERY: u32 = 10;

/// Answers "is the backend up right now?".
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Starts a backend process without waiting for it.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, script: &Path) -> std::io::Result<()>;
}

/// Health probe issuing `GET {url}` with a short timeout.
///
/// Any 2xx response counts as healthy.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(url = %self.url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Runs `bash <script>` detached, with stdio discarded and the script's
/// directory as working directory.
pub struct BashSpawner;

impl ProcessSpawner for BashSpawner {
    fn spawn(&self, script: &Path) -> std::io::Result<()> {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        if let Some(dir) = script.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        // New process group so terminal signals aimed at us skip the backend.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        tracing::info!(
            script = %script.display(),
            pid = child.id(),
            "Spawned backend start script",
        );
        Ok(())
    }
}

/// Static settings for one backend.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Human-readable backend name used in logs and errors.
    pub name: String,
    /// Start script passed to the spawner.
    pub script: PathBuf,
    /// How long to wait for the backend to become healthy after spawning.
    pub startup_timeout: Duration,
    /// Delay between health polls during startup.
    pub poll_interval: Duration,
}

impl LauncherConfig {
    pub fn new(name: impl Into<String>, script: PathBuf, startup_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            script,
            startup_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What [`BackendLauncher::ensure_running`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The first health check succeeded; nothing was spawned.
    AlreadyRunning,
    /// The start script was spawned and the backend came up.
    Started {
        /// Number of health polls after spawning.
        attempts: u32,
        /// Wall-clock time spent waiting.
        waited: Duration,
    },
}

/// Errors from launching a backend.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    /// The start script could not be spawned at all.
    #[error("Failed to start {name} with {script}: {source}")]
    Spawn {
        name: String,
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend did not answer its health check before the deadline.
    #[error("{name} failed to start within {} seconds", timeout.as_secs())]
    StartupTimeout { name: String, timeout: Duration },
}

/// Ensures a backend is reachable, launching it when needed.
pub struct BackendLauncher<P, S> {
    config: LauncherConfig,
    probe: P,
    spawner: S,
}

/// Launcher backed by an HTTP probe and a bash start script.
pub type HttpLauncher = BackendLauncher<HttpHealthProbe, BashSpawner>;

impl HttpLauncher {
    /// Build a launcher that probes `health_url` and starts the backend
    /// with `config.script`.
    pub fn http(
        config: LauncherConfig,
        client: reqwest::Client,
        health_url: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        BackendLauncher::new(
            config,
            HttpHealthProbe::new(client, health_url, probe_timeout),
            BashSpawner,
        )
    }
}

impl<P: HealthProbe, S: ProcessSpawner> BackendLauncher<P, S> {
    pub fn new(config: LauncherConfig, probe: P, spawner: S) -> Self {
        Self {
            config,
            probe,
            spawner,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Single health check, no launching.
    pub async fn probe(&self) -> bool {
        self.probe.check().await
    }

    /// Make sure the backend is up, spawning its start script if needed.
    pub async fn ensure_running(&self) -> Result<LaunchOutcome, LauncherError> {
        if self.probe.check().await {
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        let name = &self.config.name;
        tracing::info!(backend = %name, "Backend not running, starting");

        self.spawner
            .spawn(&self.config.script)
            .map_err(|source| LauncherError::Spawn {
                name: name.clone(),
                script: self.config.script.display().to_string(),
                source,
            })?;

        let start = Instant::now();
        let max_attempts = max_attempts(self.config.startup_timeout, self.config.poll_interval);

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            if self.probe.check().await {
                let waited = start.elapsed();
                tracing::info!(
                    backend = %name,
                    attempt,
                    waited_ms = waited.as_millis() as u64,
                    "Backend started",
                );
                return Ok(LaunchOutcome::Started {
                    attempts: attempt,
                    waited,
                });
            }

            if attempt % PROGRESS_LOG_EVERY == 1 {
                tracing::info!(backend = %name, attempt, "Waiting for backend");
            }
        }

        tracing::error!(
            backend = %name,
            timeout_secs = self.config.startup_timeout.as_secs(),
            "Backend failed to start",
        );
        Err(LauncherError::StartupTimeout {
            name: name.clone(),
            timeout: self.config.startup_timeout,
        })
    }
}

/// Number of startup polls that fit into `timeout`, at least one.
pub fn max_attempts(timeout: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let n = timeout.as_nanos().div_ceil(interval.as_nanos());
    u32::try_from(n).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    /// Healthy from the `healthy_from`-th check on (1-based); `0` never.
    struct ScriptedProbe {
        checks: AtomicU32,
        healthy_from: u32,
    }

    impl ScriptedProbe {
        fn new(healthy_from: u32) -> Self {
            Self {
                checks: AtomicU32::new(0),
                healthy_from,
            }
        }
    }

    impl HealthProbe for ScriptedProbe {
        async fn check(&self) -> bool {
            let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            self.healthy_from != 0 && n >= self.healthy_from
        }
    }

    #[derive(Default)]
    struct CountingSpawner {
        spawns: AtomicU32,
        fail: bool,
    }

    impl ProcessSpawner for CountingSpawner {
        fn spawn(&self, _script: &Path) -> std::io::Result<()> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no bash"))
            } else {
                Ok(())
            }
        }
    }

    fn config(timeout_ms: u64) -> LauncherConfig {
        LauncherConfig {
            name: "ComfyUI".into(),
            script: PathBuf::from("/opt/scripts/start_comfyui.sh"),
            startup_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn healthy_backend_is_not_spawned() {
        let launcher =
            BackendLauncher::new(config(50), ScriptedProbe::new(1), CountingSpawner::default());

        let outcome = launcher.ensure_running().await.unwrap();

        assert_eq!(outcome, LaunchOutcome::AlreadyRunning);
        assert_eq!(launcher.spawner.spawns.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.probe.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn down_backend_is_spawned_and_awaited() {
        let launcher =
            BackendLauncher::new(config(1_000), ScriptedProbe::new(4), CountingSpawner::default());

        let outcome = launcher.ensure_running().await.unwrap();

        assert_matches!(outcome, LaunchOutcome::Started { attempts: 3, .. });
        assert_eq!(launcher.spawner.spawns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn startup_deadline_is_an_error() {
        let launcher =
            BackendLauncher::new(config(5), ScriptedProbe::new(0), CountingSpawner::default());

        let err = launcher.ensure_running().await.unwrap_err();

        assert_matches!(err, LauncherError::StartupTimeout { ref name, .. } if name == "ComfyUI");
        // Initial check plus one per poll slot.
        assert_eq!(launcher.probe.checks.load(Ordering::SeqCst), 1 + 5);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let spawner = CountingSpawner {
            fail: true,
            ..Default::default()
        };
        let launcher = BackendLauncher::new(config(50), ScriptedProbe::new(0), spawner);

        let err = launcher.ensure_running().await.unwrap_err();
        assert_matches!(err, LauncherError::Spawn { .. });
        assert!(err.to_string().contains("start_comfyui.sh"));
    }

    #[test]
    fn attempts_cover_the_timeout() {
        assert_eq!(max_attempts(Duration::from_secs(45), Duration::from_secs(1)), 45);
        assert_eq!(max_attempts(Duration::from_millis(2500), Duration::from_secs(1)), 3);
        assert_eq!(max_attempts(Duration::ZERO, Duration::from_secs(1)), 1);
        assert_eq!(max_attempts(Duration::from_secs(1), Duration::ZERO), 1);
    }
}
