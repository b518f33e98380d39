//! Collect-time configuration: the declared policy and its typed form.

use serde::{Deserialize, Serialize};

use crate::catalog::{PLUGIN, VENDOR};

pub const KEY_INCLUSTER: &str = "incluster";
pub const KEY_KUBECONFIGPATH: &str = "kubeconfigpath";

/// A configuration value as supplied by the collection host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    String(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Bool,
    String,
}

/// One declared configuration key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigRule {
    /// Namespace prefix the rule applies to.
    pub prefix: Vec<String>,
    pub key: String,
    pub kind: ConfigKind,
    pub required: bool,
    pub default: Option<ConfigValue>,
}

/// Rules advertised to the host alongside the catalog.
pub fn config_policy() -> Vec<ConfigRule> {
    let prefix = vec![VENDOR.to_string(), PLUGIN.to_string()];
    vec![
        ConfigRule {
            prefix: prefix.clone(),
            key: KEY_INCLUSTER.to_string(),
            kind: ConfigKind::Bool,
            required: false,
            default: Some(ConfigValue::Bool(true)),
        },
        ConfigRule {
            prefix,
            key: KEY_KUBECONFIGPATH.to_string(),
            kind: ConfigKind::String,
            required: false,
            default: None,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("config key {key} expects a {expected:?} value")]
    InvalidValue { key: String, expected: ConfigKind },
}

/// Options forwarded to the cluster data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CollectConfig {
    /// Use the pod's service account instead of a kubeconfig.
    pub incluster: bool,
    /// Explicit kubeconfig; default locations are used when unset.
    pub kubeconfigpath: Option<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self { incluster: true, kubeconfigpath: None }
    }
}

impl CollectConfig {
    /// Build from host-supplied key/value pairs, applying policy defaults.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a ConfigValue)>,
    {
        let mut cfg = CollectConfig::default();
        for (key, value) in pairs {
            match (key, value) {
                (KEY_INCLUSTER, ConfigValue::Bool(b)) => cfg.incluster = *b,
                (KEY_INCLUSTER, _) => {
                    return Err(ConfigError::InvalidValue { key: key.to_string(), expected: ConfigKind::Bool })
                }
                (KEY_KUBECONFIGPATH, ConfigValue::String(s)) => {
                    cfg.kubeconfigpath = if s.is_empty() { None } else { Some(s.clone()) }
                }
                (KEY_KUBECONFIGPATH, _) => {
                    return Err(ConfigError::InvalidValue { key: key.to_string(), expected: ConfigKind::String })
                }
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_policy() {
        let cfg = CollectConfig::default();
        assert!(cfg.incluster);
        assert!(cfg.kubeconfigpath.is_none());

        let rule = config_policy().into_iter().find(|r| r.key == KEY_INCLUSTER).expect("rule");
        assert_eq!(rule.default, Some(ConfigValue::Bool(true)));
        assert_eq!(rule.prefix, vec!["grafanalabs", "kubestate"]);
    }

    #[test]
    fn from_pairs_applies_values() {
        let off = ConfigValue::Bool(false);
        let path = ConfigValue::String("/tmp/kubeconfig".into());
        let cfg = CollectConfig::from_pairs([(KEY_INCLUSTER, &off), (KEY_KUBECONFIGPATH, &path)]).expect("ok");
        assert!(!cfg.incluster);
        assert_eq!(cfg.kubeconfigpath.as_deref(), Some("/tmp/kubeconfig"));
    }

    #[test]
    fn from_pairs_rejects_bad_input() {
        let s = ConfigValue::String("yes".into());
        assert_eq!(
            CollectConfig::from_pairs([(KEY_INCLUSTER, &s)]),
            Err(ConfigError::InvalidValue { key: "incluster".into(), expected: ConfigKind::Bool })
        );
        let b = ConfigValue::Bool(true);
        assert_eq!(CollectConfig::from_pairs([("namespace", &b)]), Err(ConfigError::UnknownKey("namespace".into())));
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: CollectConfig = serde_json::from_value(serde_json::json!({ "kubeconfigpath": "/k" })).expect("json");
        assert!(cfg.incluster);
        assert_eq!(cfg.kubeconfigpath.as_deref(), Some("/k"));
        assert!(serde_json::from_value::<CollectConfig>(serde_json::json!({ "bogus": 1 })).is_err());
    }
}
