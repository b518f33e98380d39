//! Layered collect config: YAML file, then environment/flags.

use std::path::Path;

use anyhow::{Context, Result};
use kubestate_core::CollectConfig;

/// Overrides taken from the command line (clap also fills these from the environment).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub incluster: Option<bool>,
    pub kubeconfig: Option<String>,
}

pub fn load_file(path: &Path) -> Result<CollectConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Resolve the effective config. A kubeconfig given on the command line implies
/// out-of-cluster mode unless `incluster` is set explicitly.
pub fn resolve(file: Option<&Path>, ov: &Overrides) -> Result<CollectConfig> {
    let mut cfg = match file {
        Some(p) => load_file(p)?,
        None => CollectConfig::default(),
    };
    if let Some(k) = &ov.kubeconfig {
        cfg.kubeconfigpath = Some(k.clone());
        cfg.incluster = false;
    }
    if let Some(b) = ov.incluster {
        cfg.incluster = b;
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = resolve(None, &Overrides::default()).expect("ok");
        assert_eq!(cfg, CollectConfig::default());
    }

    #[test]
    fn file_then_flags() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(f, "incluster: false\nkubeconfigpath: /etc/kube/admin.conf").expect("write");

        let cfg = resolve(Some(f.path()), &Overrides::default()).expect("ok");
        assert!(!cfg.incluster);
        assert_eq!(cfg.kubeconfigpath.as_deref(), Some("/etc/kube/admin.conf"));

        let ov = Overrides { incluster: None, kubeconfig: Some("/home/me/.kube/dev".into()) };
        let cfg = resolve(Some(f.path()), &ov).expect("ok");
        assert_eq!(cfg.kubeconfigpath.as_deref(), Some("/home/me/.kube/dev"));

        let ov = Overrides { incluster: Some(true), kubeconfig: Some("/x".into()) };
        assert!(resolve(Some(f.path()), &ov).expect("ok").incluster);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(f, "incluster: true\nnamespace: default").expect("write");
        let err = resolve(Some(f.path()), &Overrides::default()).expect_err("unknown key");
        assert!(format!("{:#}", err).contains("parsing config"));
    }
}
