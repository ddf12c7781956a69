//! Server configuration from environment variables.

use gym_lifecycle::LifecycleConfig;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8002";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `GYM_LISTEN`
    pub listen: String,
    /// `GYM_AUDIT_LOG_PATH`: JSONL audit file. In-memory (or the SQLite table) when unset.
    pub audit_log_path: Option<PathBuf>,
    /// `GYM_SQLITE_PATH`: SQLite database; only honored with the `sqlite` feature.
    pub sqlite_path: Option<PathBuf>,
    /// `GYM_SEED_PATH`: JSON file with `plans` and `members`.
    pub seed_path: Option<PathBuf>,
    pub lifecycle: LifecycleConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            audit_log_path: None,
            sqlite_path: None,
            seed_path: None,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(listen) = get("GYM_LISTEN") {
            cfg.listen = listen;
        }
        cfg.audit_log_path = get("GYM_AUDIT_LOG_PATH").map(PathBuf::from);
        cfg.sqlite_path = get("GYM_SQLITE_PATH").map(PathBuf::from);
        cfg.seed_path = get("GYM_SEED_PATH").map(PathBuf::from);
        if let Some(raw) = get("GYM_ALLOW_REACTIVATION") {
            match parse_bool(&raw) {
                Some(v) => cfg.lifecycle.allow_reactivation = v,
                None => tracing::warn!(
                    value = %raw,
                    "GYM_ALLOW_REACTIVATION is not a boolean, keeping default"
                ),
            }
        }
        cfg
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> ApiConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = cfg_from(&[]);
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
        assert!(cfg.audit_log_path.is_none());
        assert!(cfg.seed_path.is_none());
        assert!(cfg.lifecycle.allow_reactivation);
    }

    #[test]
    fn reads_paths_and_flags() {
        let cfg = cfg_from(&[
            ("GYM_LISTEN", "127.0.0.1:9000"),
            ("GYM_AUDIT_LOG_PATH", "/var/log/gym/audit.jsonl"),
            ("GYM_SEED_PATH", "seed.json"),
            ("GYM_ALLOW_REACTIVATION", "off"),
        ]);
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(
            cfg.audit_log_path,
            Some(PathBuf::from("/var/log/gym/audit.jsonl"))
        );
        assert_eq!(cfg.seed_path, Some(PathBuf::from("seed.json")));
        assert!(!cfg.lifecycle.allow_reactivation);
    }

    #[test]
    fn blank_and_invalid_values_fall_back() {
        let cfg = cfg_from(&[("GYM_LISTEN", "  "), ("GYM_ALLOW_REACTIVATION", "maybe")]);
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
        assert!(cfg.lifecycle.allow_reactivation);
    }
}
