use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kubestate_api::{
    CollectConfig, CollectReport, InProcApi, KubestateApi, NamespacePath, PodSource, PodState, StaticPodSource,
};
use kubestate_core::{ConfigValue, Segment};
use tokio::signal;
use tracing::{error, info};

mod config;

#[derive(Parser, Debug)]
#[command(name = "kubestatectl", version, about = "Kubernetes pod health as namespaced metrics")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(clap::Args, Debug, Clone)]
struct ConfigArgs {
    /// YAML file with `incluster` / `kubeconfigpath`
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Use in-cluster service account credentials
    #[arg(long = "incluster", env = "KUBESTATE_INCLUSTER")]
    incluster: Option<bool>,
    /// Path to a kubeconfig (implies --incluster=false)
    #[arg(long = "kubeconfig", env = "KUBESTATE_KUBECONFIG")]
    kubeconfig: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every metric namespace shape
    Catalog,
    /// Show accepted configuration keys
    Policy,
    /// Collect metrics from the cluster
    Collect {
        /// Namespace paths, e.g. "/grafanalabs/kubestate/pod/*/*/status/phase/*/value"; all shapes when empty
        paths: Vec<String>,
        #[command(flatten)]
        cfg: ConfigArgs,
        /// Repeat the collection every N seconds until Ctrl-C
        #[arg(long = "every")]
        every: Option<u64>,
    },
    /// Resolve paths against a pod snapshot file (JSON array of pod states)
    Resolve {
        /// Snapshot file
        #[arg(long = "snapshot")]
        snapshot: PathBuf,
        /// Namespace paths; all shapes when empty
        paths: Vec<String>,
        /// Print rejected requests too
        #[arg(long = "show-rejected", action = ArgAction::SetTrue)]
        show_rejected: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("KUBESTATE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUBESTATE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KUBESTATE_METRICS_ADDR; expected host:port");
        }
    }
}

/// Parse requested paths; an empty list means every shape's wildcard template.
fn requests_from(paths: &[String], api: &dyn KubestateApi) -> Result<Vec<NamespacePath>> {
    if paths.is_empty() {
        return Ok(api.metric_types().iter().map(|s| s.template()).collect());
    }
    paths
        .iter()
        .map(|p| NamespacePath::parse(p).with_context(|| format!("invalid namespace path {:?}", p)))
        .collect()
}

fn print_report(report: &CollectReport, output: Output, show_rejected: bool) -> Result<()> {
    match output {
        Output::Human => {
            for m in &report.metrics {
                println!("{:<80} {:>6}  {}", m.path.to_string(), m.value, m.timestamp.to_rfc3339());
            }
            if show_rejected {
                for r in &report.rejected {
                    eprintln!("rejected {}: {}", r.request, r.reason);
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

async fn collect_once<S: PodSource>(api: &InProcApi<S>, requests: &[NamespacePath], cfg: &CollectConfig) -> Result<CollectReport> {
    api.collect(requests, cfg).await.context("collect failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog => {
            let api = InProcApi::new();
            let shapes = api.metric_types();
            match cli.output {
                Output::Human => {
                    for s in &shapes {
                        println!("{:<24} v{}  {}", s.id.as_str(), s.version, s);
                        for seg in &s.segments {
                            if let Segment::Dynamic { name, description } = seg {
                                println!("{:<28}[{}] {}", "", name, description);
                            }
                        }
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&shapes)?),
            }
        }
        Commands::Policy => {
            let rules = InProcApi::new().config_policy();
            match cli.output {
                Output::Human => {
                    for r in &rules {
                        let default = match &r.default {
                            Some(ConfigValue::Bool(b)) => b.to_string(),
                            Some(ConfigValue::String(s)) => s.clone(),
                            None => "-".to_string(),
                        };
                        println!("/{} {:<16} {:?} required={} default={}", r.prefix.join("/"), r.key, r.kind, r.required, default);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rules)?),
            }
        }
        Commands::Collect { paths, cfg, every } => {
            let overrides = config::Overrides { incluster: cfg.incluster, kubeconfig: cfg.kubeconfig.clone() };
            let collect_cfg = config::resolve(cfg.config.as_deref(), &overrides)?;
            let api = InProcApi::new();
            let requests = requests_from(&paths, &api)?;
            info!(requests = requests.len(), incluster = collect_cfg.incluster, "collect invoked");

            match every {
                None => {
                    let report = collect_once(&api, &requests, &collect_cfg).await?;
                    print_report(&report, cli.output, true)?;
                }
                Some(secs) => {
                    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                // A failed cycle is logged; the next tick retries.
                                match collect_once(&api, &requests, &collect_cfg).await {
                                    Ok(report) => print_report(&report, cli.output, true)?,
                                    Err(e) => error!(error = ?e, "collection cycle failed"),
                                }
                            }
                            _ = signal::ctrl_c() => {
                                info!("Ctrl-C received; stopping collection");
                                break;
                            }
                        }
                    }
                }
            }
        }
        Commands::Resolve { snapshot, paths, show_rejected } => {
            let text = std::fs::read_to_string(&snapshot).with_context(|| format!("reading snapshot {}", snapshot.display()))?;
            let pods: Vec<PodState> = serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", snapshot.display()))?;
            info!(pods = pods.len(), "resolve invoked");
            let api = InProcApi::with_source(StaticPodSource::new(pods));
            let requests = requests_from(&paths, &api)?;
            let report = collect_once(&api, &requests, &CollectConfig::default()).await?;
            print_report(&report, cli.output, show_rejected)?;
        }
    }

    Ok(())
}
