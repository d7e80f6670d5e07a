//! Health Monitor (§4.2): owns every subgraph's [`SubgraphState`] and drives the
//! available/unavailable/mocking state machine described in §3 and §4.2.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::subgraph_config::SubgraphConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Available,
    Unavailable,
    Mocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaSourceKind {
    ApolloRegistry,
    LocalIntrospection,
    Unknown,
}

fn derive_schema_source(cfg: &SubgraphConfig, url: &Option<String>) -> SchemaSourceKind {
    if cfg.schema_file.is_some() || cfg.use_local_schema {
        SchemaSourceKind::LocalIntrospection
    } else if url.is_some() {
        SchemaSourceKind::ApolloRegistry
    } else {
        SchemaSourceKind::Unknown
    }
}

#[derive(Debug, Clone)]
pub struct SubgraphState {
    pub status: Status,
    pub schema_source: SchemaSourceKind,
    pub is_healthy: bool,
    pub is_mocking: bool,
    pub consecutive_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub config: Arc<SubgraphConfig>,
}

impl SubgraphState {
    fn new(url: Option<String>, config: Arc<SubgraphConfig>) -> Self {
        let is_mocking = config.force_mock || url.is_none();
        Self {
            status: if is_mocking {
                Status::Mocking
            } else {
                Status::Unknown
            },
            schema_source: derive_schema_source(&config, &url),
            is_healthy: false,
            is_mocking,
            consecutive_failures: 0,
            last_health_check: None,
            url,
            config,
        }
    }

    /// Applies the probe-success transition (first row of the §4.2 table).
    fn apply_success(&mut self, at: DateTime<Utc>) {
        self.is_healthy = true;
        self.consecutive_failures = 0;
        self.is_mocking = self.config.force_mock;
        self.status = if self.is_mocking {
            Status::Mocking
        } else {
            Status::Available
        };
        self.last_health_check = Some(at);
    }

    /// Applies a probe-failure transition, with the tie-break order documented in §4.2:
    /// forceMock > disableMocking > retry-count logic > default passthrough intent.
    fn apply_failure(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.is_healthy = false;
        self.last_health_check = Some(at);

        if self.config.force_mock {
            self.is_mocking = true;
            self.status = Status::Mocking;
            return;
        }

        let crossed_threshold = self.consecutive_failures >= self.config.max_retries;
        if !self.config.disable_mocking && crossed_threshold {
            self.is_mocking = true;
            self.status = Status::Mocking;
        } else {
            self.is_mocking = false;
            self.status = Status::Unavailable;
        }
    }
}

struct ManagedState {
    state: RwLock<SubgraphState>,
    probe_task: Mutex<Option<AbortHandle>>,
}

/// Owns every subgraph's state and the one background probe task per non-`forceMock`
/// subgraph, matching the "single timer per name" discipline required by §5.
pub struct HealthMonitor {
    states: RwLock<HashMap<String, Arc<ManagedState>>>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

/// Default per-probe timeout (`SUBGRAPH_HEALTH_TIMEOUT_MS`, §6), used when the monitor
/// is constructed with [`HealthMonitor::new`] rather than [`HealthMonitor::with_timeout`].
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(probe_timeout: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
            probe_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a subgraph, replacing any prior registration atomically, and — unless
    /// `forceMock` or there is no URL to probe — spawns its periodic probe task.
    pub fn register(self: &Arc<Self>, name: String, url: Option<String>, config: SubgraphConfig) {
        self.unregister(&name);

        let config = Arc::new(config);
        let state = SubgraphState::new(url.clone(), config.clone());
        let managed = Arc::new(ManagedState {
            state: RwLock::new(state),
            probe_task: Mutex::new(None),
        });

        self.states
            .write()
            .unwrap()
            .insert(name.clone(), managed.clone());

        if !config.force_mock && url.is_some() {
            let interval = config.health_check_interval();
            let this = self.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                this.probe_loop(task_name, interval).await;
            });
            *managed.probe_task.lock().unwrap() = Some(handle.abort_handle());
        }

        info!(subgraph = %name, "registered subgraph with health monitor");
    }

    /// Removes a subgraph's state and aborts its probe task, if any.
    pub fn unregister(&self, name: &str) {
        if let Some(managed) = self.states.write().unwrap().remove(name)
            && let Some(handle) = managed.probe_task.lock().unwrap().take()
        {
            handle.abort();
        }
    }

    /// Re-reads the subgraph's current URL from state on every tick, so a re-registration
    /// that changes the URL takes effect without restarting the timer.
    async fn probe_loop(self: Arc<Self>, name: String, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.check_health(&name).await {
                warn!(subgraph = %name, %err, "health probe failed to run");
            }
        }
    }

    /// Performs one probe against the subgraph's URL and applies the resulting
    /// transition. Returns `not registered` if the name is unknown.
    pub async fn check_health(&self, name: &str) -> anyhow::Result<ProbeOutcome> {
        let managed = self
            .states
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("subgraph '{name}' is not registered"))?;

        let url = managed.state.read().unwrap().url.clone();

        let Some(url) = url else {
            let mut state = managed.state.write().unwrap();
            state.apply_failure(Utc::now());
            return Ok(ProbeOutcome::Unhealthy);
        };

        let outcome = self.probe_once(&url, self.probe_timeout).await;

        let mut state = managed.state.write().unwrap();
        let now = Utc::now();
        match outcome {
            ProbeOutcome::Healthy => state.apply_success(now),
            ProbeOutcome::Unhealthy => state.apply_failure(now),
        }
        debug!(subgraph = %name, ?outcome, "health probe completed");
        Ok(outcome)
    }

    async fn probe_once(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let request = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .header("x-apollo-operation-name", "TypenameQuery")
            .body(r#"{"query":"query { __typename }"}"#);

        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(resp)) if resp.status().is_success() => ProbeOutcome::Healthy,
            _ => ProbeOutcome::Unhealthy,
        }
    }

    /// Manual health override. Follows the same success/failure transition rules as a
    /// real probe (§4.2).
    pub fn set_health(&self, name: &str, healthy: bool) -> anyhow::Result<()> {
        let managed = self
            .states
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("subgraph '{name}' is not registered"))?;

        let mut state = managed.state.write().unwrap();
        let now = Utc::now();
        if healthy {
            state.apply_success(now);
        } else {
            state.apply_failure(now);
        }
        Ok(())
    }

    pub fn get_state(&self, name: &str) -> Option<SubgraphState> {
        self.states
            .read()
            .unwrap()
            .get(name)
            .map(|m| m.state.read().unwrap().clone())
    }

    pub fn get_all_states(&self) -> HashMap<String, SubgraphState> {
        self.states
            .read()
            .unwrap()
            .iter()
            .map(|(name, m)| (name.clone(), m.state.read().unwrap().clone()))
            .collect()
    }

    /// Resolves a subgraph name by matching a target URL against the registered
    /// subgraphs' URLs, used by the Request Router when the `x-subgraph-name` header
    /// names an unknown subgraph (§4.1 step 1).
    pub fn find_by_url(&self, url: &str) -> Option<String> {
        self.states
            .read()
            .unwrap()
            .iter()
            .find(|(_, m)| m.state.read().unwrap().url.as_deref() == Some(url))
            .map(|(name, _)| name.clone())
    }

    /// Cancels all probe timers and drops all state.
    pub fn shutdown(&self) {
        let mut states = self.states.write().unwrap();
        for (_, managed) in states.drain() {
            if let Some(handle) = managed.probe_task.lock().unwrap().take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new())
    }

    #[test]
    fn force_mock_starts_mocking_with_no_probe() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig {
                force_mock: true,
                ..Default::default()
            },
        );
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Mocking);
        assert!(state.is_mocking);
        assert!(!state.is_healthy);
    }

    #[test]
    fn success_then_failure_transitions() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig {
                max_retries: 2,
                ..Default::default()
            },
        );

        hm.set_health("products", true).unwrap();
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Available);
        assert!(state.is_healthy);
        assert_eq!(state.consecutive_failures, 0);

        hm.set_health("products", false).unwrap();
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Unavailable);
        assert_eq!(state.consecutive_failures, 1);

        hm.set_health("products", false).unwrap();
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Mocking);
        assert!(state.is_mocking);
        assert!(!state.is_healthy);
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn successful_probe_resets_failures_to_available() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig {
                max_retries: 1,
                ..Default::default()
            },
        );
        hm.set_health("products", false).unwrap();
        assert_eq!(hm.get_state("products").unwrap().status, Status::Mocking);

        hm.set_health("products", true).unwrap();
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Available);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.is_mocking);
    }

    #[test]
    fn disable_mocking_never_transitions_to_mocking() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig {
                disable_mocking: true,
                max_retries: 1,
                ..Default::default()
            },
        );
        for _ in 0..5 {
            hm.set_health("products", false).unwrap();
        }
        let state = hm.get_state("products").unwrap();
        assert_eq!(state.status, Status::Unavailable);
        assert!(!state.is_mocking);
    }

    #[test]
    fn no_url_starts_mocking() {
        let hm = monitor();
        hm.register("weird".into(), None, SubgraphConfig::default());
        let state = hm.get_state("weird").unwrap();
        assert!(state.is_mocking);
        assert_eq!(state.status, Status::Mocking);
    }

    #[test]
    fn unregister_removes_state() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig::default(),
        );
        hm.unregister("products");
        assert!(hm.get_state("products").is_none());
    }

    #[test]
    fn shutdown_clears_everything() {
        let hm = monitor();
        hm.register(
            "products".into(),
            Some("http://products:4001".into()),
            SubgraphConfig::default(),
        );
        hm.shutdown();
        assert!(hm.is_empty());
    }
}
