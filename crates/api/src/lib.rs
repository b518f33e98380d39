//! Kubestate collection API façade (in-process).
//!
//! This crate defines the surface a metrics-collection host talks to: a catalog query,
//! the config policy, and the collect cycle that turns requested namespaces plus a pod
//! snapshot into metric values.

#![forbid(unsafe_code)]

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use kubestate_core::{
    CollectConfig, ConfigRule, MetricValue, NamespacePath, NamespaceShape, PodState, ResolveError, Resolver,
};

/// API errors suitable for transport to a host process.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum KubestateError {
    /// The pod snapshot could not be obtained; no values were produced.
    #[error("source: {0}")]
    Source(String),
}

pub type KubestateResult<T> = Result<T, KubestateError>;

/// A request that could not be serviced this cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejected {
    pub request: NamespacePath,
    pub reason: String,
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectReport {
    pub metrics: Vec<MetricValue>,
    pub rejected: Vec<Rejected>,
    /// Pods in the snapshot the cycle resolved against.
    pub pods: usize,
}

/// Supplies the pod snapshot for a cycle.
#[async_trait::async_trait]
pub trait PodSource: Send + Sync {
    async fn pods(&self, cfg: &CollectConfig) -> anyhow::Result<Vec<PodState>>;
}

/// Live source backed by the Kubernetes API.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubePodSource;

#[async_trait::async_trait]
impl PodSource for KubePodSource {
    async fn pods(&self, cfg: &CollectConfig) -> anyhow::Result<Vec<PodState>> {
        kubestate_kubehub::fetch_pods(cfg).await
    }
}

/// Fixed snapshot, for tests and offline resolution.
#[derive(Debug, Clone, Default)]
pub struct StaticPodSource {
    pub pods: Vec<PodState>,
}

impl StaticPodSource {
    pub fn new(pods: Vec<PodState>) -> Self {
        Self { pods }
    }
}

#[async_trait::async_trait]
impl PodSource for StaticPodSource {
    async fn pods(&self, _cfg: &CollectConfig) -> anyhow::Result<Vec<PodState>> {
        Ok(self.pods.clone())
    }
}

/// Host-facing API surface.
#[async_trait::async_trait]
pub trait KubestateApi: Send + Sync {
    /// Every metric shape this plugin can produce.
    fn metric_types(&self) -> Vec<NamespaceShape>;

    /// Declared collect-time configuration keys.
    fn config_policy(&self) -> Vec<ConfigRule>;

    /// Resolve the requested namespaces against a fresh pod snapshot.
    async fn collect(&self, requests: &[NamespacePath], cfg: &CollectConfig) -> KubestateResult<CollectReport>;
}

/// Resolve every request against every pod of an already-fetched snapshot.
///
/// Requests are planned once; a request that matches no shape is reported in
/// `rejected` and does not affect its siblings. All values share the timestamp `at`.
pub fn collect_snapshot(
    resolver: &Resolver<'_>,
    requests: &[NamespacePath],
    pods: &[PodState],
    at: DateTime<Utc>,
) -> CollectReport {
    let mut plans = Vec::with_capacity(requests.len());
    let mut rejected = Vec::new();
    for req in requests {
        match resolver.plan(req) {
            Ok(plan) => plans.push(plan),
            Err(ResolveError::UnsupportedNamespace { path, reason }) => {
                warn!(request = %path, reason = %reason, "unsupported namespace requested");
                metrics::counter!("kubestate_requests_rejected_total", 1u64);
                rejected.push(Rejected { request: path, reason: reason.to_string() });
            }
        }
    }

    let values: Vec<MetricValue> = pods
        .iter()
        .flat_map(|pod| plans.iter().flat_map(move |plan| plan.extract(pod, at)))
        .collect();
    metrics::counter!("kubestate_metrics_emitted_total", values.len() as u64);

    CollectReport { metrics: values, rejected, pods: pods.len() }
}

// ----------------- In-process implementation -----------------

/// In-process implementation over a pluggable pod source.
pub struct InProcApi<S = KubePodSource> {
    source: S,
    resolver: Resolver<'static>,
}

impl InProcApi<KubePodSource> {
    pub fn new() -> Self {
        Self::with_source(KubePodSource)
    }
}

impl Default for InProcApi<KubePodSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PodSource> InProcApi<S> {
    pub fn with_source(source: S) -> Self {
        Self { source, resolver: Resolver::builtin() }
    }
}

#[async_trait::async_trait]
impl<S: PodSource> KubestateApi for InProcApi<S> {
    fn metric_types(&self) -> Vec<NamespaceShape> {
        self.resolver.shapes().to_vec()
    }

    fn config_policy(&self) -> Vec<ConfigRule> {
        kubestate_core::config_policy()
    }

    async fn collect(&self, requests: &[NamespacePath], cfg: &CollectConfig) -> KubestateResult<CollectReport> {
        let t0 = Instant::now();
        info!(requests = requests.len(), incluster = cfg.incluster, "api: collect start");
        if requests.is_empty() {
            return Ok(CollectReport::default());
        }

        let pods = match self.source.pods(cfg).await {
            Ok(p) => p,
            Err(e) => {
                metrics::counter!("kubestate_collect_errors_total", 1u64);
                error!(error = ?e, "api: pod snapshot failed");
                return Err(KubestateError::Source(format!("{:#}", e)));
            }
        };

        let report = collect_snapshot(&self.resolver, requests, &pods, Utc::now());
        let took = t0.elapsed();
        metrics::histogram!("kubestate_collect_ms", took.as_secs_f64() * 1_000.0);
        info!(
            metrics = report.metrics.len(),
            rejected = report.rejected.len(),
            pods = report.pods,
            took_ms = %took.as_millis(),
            "api: collect ok"
        );
        Ok(report)
    }
}
