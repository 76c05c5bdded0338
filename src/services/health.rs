// src/services/health.rs

//! Provider health probes.
//!
//! Every probe runs in its own task with a deadline, so a hanging or
//! panicking probe only fails itself. The harness never returns an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::sources::SourcePool;

/// Keys the report uses for its own fields.
const RESERVED: [&str; 2] = ["ok", "errors"];

type Probe = Arc<dyn Fn() -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Named set of boolean probes.
#[derive(Clone)]
pub struct HealthHarness {
    probes: Vec<(String, Probe)>,
    timeout: Duration,
}

/// Outcome of one harness run.
///
/// Serializes as `{"<probe>": bool, ..., "ok": bool, "errors": {"<probe>": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    #[serde(flatten)]
    pub probes: BTreeMap<String, bool>,
    pub ok: bool,
    pub errors: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn passed(&self, name: &str) -> Option<bool> {
        self.probes.get(name).copied()
    }
}

impl HealthHarness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            timeout,
        }
    }

    /// Register a probe; names must be unique and not collide with report keys.
    pub fn register<F>(&mut self, name: impl Into<String>, probe: F) -> Result<()>
    where
        F: Fn() -> BoxFuture<'static, Result<bool>> + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED.contains(&name.as_str()) {
            return Err(AppError::validation(format!("Probe name '{name}' is reserved")));
        }
        if self.probes.iter().any(|(existing, _)| *existing == name) {
            return Err(AppError::validation(format!("Probe '{name}' is already registered")));
        }
        self.probes.push((name, Arc::new(probe)));
        Ok(())
    }

    /// Probe names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Register a detail probe (when the provider has a probe id) and a
    /// listing probe for every source in the pool.
    pub fn for_sources(pool: &SourcePool, config: &Config) -> Result<Self> {
        let mut harness = Self::new(Duration::from_secs(config.health.probe_timeout_secs));

        for source in pool.iter() {
            let kind = source.kind();

            match config.provider(kind).and_then(|p| p.probe_id) {
                Some(id) => {
                    let source = Arc::clone(source);
                    harness.register(kind.as_str(), move || {
                        let source = Arc::clone(&source);
                        async move { source.probe(id).await }.boxed()
                    })?;
                }
                None => log::debug!("No probe id for {}, skipping detail probe", kind),
            }

            let source = Arc::clone(source);
            harness.register(format!("{kind}.list"), move || {
                let source = Arc::clone(&source);
                async move { source.probe_listing().await }.boxed()
            })?;
        }
        Ok(harness)
    }

    /// Run every probe concurrently and collect the report.
    pub async fn run(&self) -> HealthReport {
        let handles = self.probes.iter().map(|(name, probe)| {
            let task = tokio::spawn(tokio::time::timeout(self.timeout, probe()));
            async move { (name.clone(), task.await) }
        });

        let mut report = HealthReport {
            ok: true,
            ..HealthReport::default()
        };
        for (name, joined) in future::join_all(handles).await {
            let (passed, note) = match joined {
                Ok(Ok(Ok(passed))) => (passed, None),
                Ok(Ok(Err(error))) => (false, Some(error.to_string())),
                Ok(Err(_)) => (false, Some(format!("timed out after {:?}", self.timeout))),
                Err(join_error) if join_error.is_panic() => (false, Some("probe panicked".into())),
                Err(join_error) => (false, Some(join_error.to_string())),
            };
            if !passed {
                log::warn!(
                    "Health probe {} failed: {}",
                    name,
                    note.as_deref().unwrap_or("returned false")
                );
            }
            if let Some(note) = note {
                report.errors.insert(name.clone(), note);
            }
            report.ok &= passed;
            report.probes.insert(name, passed);
        }
        report
    }
}
