//! Kubestate kubehub – kube client wiring and pod snapshots

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use kubestate_core::{CollectConfig, Condition, ConditionType, ContainerState, PodPhase, PodState, RuntimePhase};
use tracing::{debug, info, warn};

/// Build a client for the configured credential mode.
///
/// In-cluster mode uses the service account mounted into the pod. Otherwise the kubeconfig
/// at `kubeconfigpath` is loaded, or the default one (`KUBECONFIG`, `~/.kube/config`).
pub async fn client_for(cfg: &CollectConfig) -> Result<Client> {
    let config = if cfg.incluster {
        Config::incluster().context("loading in-cluster config")?
    } else {
        let kubeconfig = match cfg.kubeconfigpath.as_deref() {
            Some(path) => Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path))?,
            None => Kubeconfig::read().context("reading default kubeconfig")?,
        };
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("building config from kubeconfig")?
    };
    debug!(incluster = cfg.incluster, cluster_url = %config.cluster_url, "kube config loaded");
    Client::try_from(config).context("creating kube client")
}

/// List pods across all namespaces.
pub async fn list_pods(client: Client) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::all(client);
    let list = api.list(&ListParams::default()).await.context("listing pods")?;
    Ok(list.items)
}

/// Fetch a snapshot of every pod the configured credentials can see.
/// Pods that cannot be converted are skipped with a warning.
pub async fn fetch_pods(cfg: &CollectConfig) -> Result<Vec<PodState>> {
    let t0 = Instant::now();
    let client = client_for(cfg).await?;
    let pods = list_pods(client).await?;
    let total = pods.len();
    let mut out = Vec::with_capacity(total);
    for p in &pods {
        match pod_state(p) {
            Ok(s) => out.push(s),
            Err(e) => warn!(error = %e, "skipping pod"),
        }
    }
    let took = t0.elapsed();
    metrics::histogram!("kubehub_list_pods_ms", took.as_secs_f64() * 1_000.0);
    info!(pods = out.len(), skipped = total - out.len(), took_ms = %took.as_millis(), "pod snapshot fetched");
    Ok(out)
}

/// Convert an API pod into the resolver's snapshot form.
pub fn pod_state(pod: &Pod) -> Result<PodState> {
    let name = pod.metadata.name.clone().ok_or_else(|| anyhow!("pod missing metadata.name"))?;
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let status = pod.status.as_ref();

    let phase = status.and_then(|s| s.phase.as_deref()).map(PodPhase::from_api).unwrap_or(PodPhase::Unknown);
    let conditions: Vec<Condition> = status
        .and_then(|s| s.conditions.as_ref())
        .map(|cs| {
            cs.iter()
                .map(|c| Condition { type_: ConditionType::from_api(&c.type_), satisfied: c.status == "True" })
                .collect()
        })
        .unwrap_or_default();
    let containers: Vec<ContainerState> = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|cs| cs.iter().map(container_state).collect())
        .unwrap_or_default();

    Ok(PodState { namespace, name, phase, conditions, containers })
}

fn container_state(cs: &ContainerStatus) -> ContainerState {
    // The API reports exactly one of the three; take the first present.
    let runtime = cs.state.as_ref().and_then(|st| {
        if st.waiting.is_some() {
            Some(RuntimePhase::Waiting)
        } else if st.running.is_some() {
            Some(RuntimePhase::Running)
        } else if st.terminated.is_some() {
            Some(RuntimePhase::Terminated)
        } else {
            None
        }
    });
    ContainerState {
        name: cs.name.clone(),
        restart_count: u32::try_from(cs.restart_count).unwrap_or(0),
        ready: cs.ready,
        runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(v: serde_json::Value) -> Pod {
        serde_json::from_value(v).expect("pod json")
    }

    #[test]
    fn converts_full_pod() {
        let p = pod(serde_json::json!({
            "metadata": { "name": "web-0", "namespace": "shop" },
            "status": {
                "phase": "Running",
                "conditions": [
                    { "type": "Ready", "status": "True" },
                    { "type": "PodScheduled", "status": "False" },
                    { "type": "DisruptionTarget", "status": "True" }
                ],
                "containerStatuses": [
                    {
                        "name": "app", "image": "app:1", "imageID": "", "ready": true, "restartCount": 3,
                        "state": { "running": { "startedAt": "2024-01-01T00:00:00Z" } }
                    },
                    {
                        "name": "sidecar", "image": "s:1", "imageID": "", "ready": false, "restartCount": 0,
                        "state": { "waiting": { "reason": "CrashLoopBackOff" } }
                    },
                    {
                        "name": "init-done", "image": "i:1", "imageID": "", "ready": false, "restartCount": 1,
                        "state": { "terminated": { "exitCode": 0 } }
                    }
                ]
            }
        }));
        let s = pod_state(&p).expect("ok");
        assert_eq!(s.namespace, "shop");
        assert_eq!(s.name, "web-0");
        assert_eq!(s.phase, PodPhase::Running);
        assert_eq!(
            s.conditions,
            vec![
                Condition { type_: ConditionType::Ready, satisfied: true },
                Condition { type_: ConditionType::PodScheduled, satisfied: false },
                Condition { type_: ConditionType::Other("DisruptionTarget".into()), satisfied: true },
            ]
        );
        let runtimes: Vec<_> = s.containers.iter().map(|c| (c.name.as_str(), c.runtime, c.restart_count, c.ready)).collect();
        assert_eq!(
            runtimes,
            vec![
                ("app", Some(RuntimePhase::Running), 3, true),
                ("sidecar", Some(RuntimePhase::Waiting), 0, false),
                ("init-done", Some(RuntimePhase::Terminated), 1, false),
            ]
        );
    }

    #[test]
    fn pending_pod_without_status_detail() {
        let p = pod(serde_json::json!({
            "metadata": { "name": "queued", "namespace": "default" },
            "status": { "phase": "Pending" }
        }));
        let s = pod_state(&p).expect("ok");
        assert_eq!(s.phase, PodPhase::Pending);
        assert!(s.conditions.is_empty());
        assert!(s.containers.is_empty());
    }

    #[test]
    fn missing_status_is_unknown_phase() {
        let p = pod(serde_json::json!({ "metadata": { "name": "bare" } }));
        let s = pod_state(&p).expect("ok");
        assert_eq!(s.phase, PodPhase::Unknown);
        assert_eq!(s.namespace, "");
    }

    #[test]
    fn container_without_state_has_no_runtime() {
        let p = pod(serde_json::json!({
            "metadata": { "name": "p", "namespace": "default" },
            "status": {
                "phase": "Pending",
                "containerStatuses": [ { "name": "c", "image": "c:1", "imageID": "", "ready": false, "restartCount": 0 } ]
            }
        }));
        let s = pod_state(&p).expect("ok");
        assert_eq!(s.containers[0].runtime, None);
    }

    #[test]
    fn missing_name_is_an_error() {
        let p = pod(serde_json::json!({ "metadata": { "namespace": "default" } }));
        assert!(pod_state(&p).is_err());
    }
}
