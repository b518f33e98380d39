use kubestate_api::{CollectConfig, InProcApi, KubestateApi, KubestateError, NamespacePath, PodSource, StaticPodSource};
use kubestate_core::{Condition, ConditionType, ContainerState, PodPhase, PodState, RuntimePhase, ShapeId};

struct FailingSource;

#[async_trait::async_trait]
impl PodSource for FailingSource {
    async fn pods(&self, _cfg: &CollectConfig) -> anyhow::Result<Vec<PodState>> {
        Err(anyhow::anyhow!("connection refused").context("listing pods"))
    }
}

fn path(s: &str) -> NamespacePath {
    NamespacePath::parse(s).expect("path")
}

fn cluster() -> Vec<PodState> {
    vec![
        PodState {
            namespace: "shop".into(),
            name: "web-0".into(),
            phase: PodPhase::Running,
            conditions: vec![
                Condition { type_: ConditionType::PodScheduled, satisfied: true },
                Condition { type_: ConditionType::Ready, satisfied: true },
            ],
            containers: vec![
                ContainerState { name: "app".into(), restart_count: 3, ready: true, runtime: Some(RuntimePhase::Running) },
                ContainerState { name: "proxy".into(), restart_count: 0, ready: true, runtime: Some(RuntimePhase::Running) },
            ],
        },
        PodState {
            namespace: "batch".into(),
            name: "job-x".into(),
            phase: PodPhase::Pending,
            conditions: vec![],
            containers: vec![],
        },
    ]
}

#[tokio::test]
async fn catalog_query_lists_all_shapes() {
    let api = InProcApi::with_source(StaticPodSource::default());
    let types = api.metric_types();
    assert_eq!(types.len(), 8);
    assert!(types.iter().any(|t| t.id == ShapeId::PodPhase));
    let keys: Vec<String> = api.config_policy().into_iter().map(|r| r.key).collect();
    assert_eq!(keys, vec!["incluster", "kubeconfigpath"]);
}

#[tokio::test]
async fn collect_expands_wildcards_across_pods() {
    let api = InProcApi::with_source(StaticPodSource::new(cluster()));
    let requests = vec![
        path("grafanalabs/kubestate/pod/*/*/status/phase/*/value"),
        path("grafanalabs/kubestate/pod/*/*/status/condition/ready"),
        path("grafanalabs/kubestate/pod/container/*/*/*/status/restarts"),
    ];
    let report = api.collect(&requests, &CollectConfig::default()).await.expect("collect");
    assert!(report.rejected.is_empty());
    assert_eq!(report.pods, 2);

    let rendered: Vec<(String, i64)> = report.metrics.iter().map(|m| (m.path.to_string(), m.value)).collect();
    assert_eq!(
        rendered,
        vec![
            ("/grafanalabs/kubestate/pod/shop/web-0/status/phase/Running/value".to_string(), 1),
            ("/grafanalabs/kubestate/pod/shop/web-0/status/condition/ready".to_string(), 1),
            ("/grafanalabs/kubestate/pod/container/shop/web-0/app/status/restarts".to_string(), 3),
            ("/grafanalabs/kubestate/pod/container/shop/web-0/proxy/status/restarts".to_string(), 0),
            ("/grafanalabs/kubestate/pod/batch/job-x/status/phase/Pending/value".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn collect_reports_unsupported_without_dropping_siblings() {
    let api = InProcApi::with_source(StaticPodSource::new(cluster()));
    let requests = vec![
        path("grafanalabs/kubestate/pod/container/*/*/*/status/oomkilled"),
        path("grafanalabs/kubestate/pod/*/*/status/condition/scheduled"),
    ];
    let report = api.collect(&requests, &CollectConfig::default()).await.expect("collect");
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].request, requests[0]);
    assert_eq!(report.metrics.len(), 1);
    assert_eq!(report.metrics[0].value, 1);
}

#[tokio::test]
async fn source_failure_yields_no_metrics() {
    let api = InProcApi::with_source(FailingSource);
    let requests = vec![path("grafanalabs/kubestate/pod/*/*/status/phase/*/value")];
    match api.collect(&requests, &CollectConfig::default()).await {
        Err(KubestateError::Source(msg)) => assert_eq!(msg, "listing pods: connection refused"),
        other => panic!("expected source error, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_request_list_skips_the_source() {
    let api = InProcApi::with_source(FailingSource);
    let report = api.collect(&[], &CollectConfig::default()).await.expect("empty ok");
    assert!(report.metrics.is_empty());
    assert_eq!(report.pods, 0);
}
