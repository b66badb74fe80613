use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::policy::IdempotencyMode;

pub const DEFAULT_CLASS: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitClassConfig {
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub burst_allowance: u64,
    pub allow_burst: bool,
}

impl Default for LimitClassConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_seconds: 60,
            burst_allowance: 90,
            allow_burst: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BanConfig {
    pub burst_limit: u64,
    pub detection_window_seconds: u64,
    pub ban_duration_seconds: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            burst_limit: 180,
            detection_window_seconds: 60,
            ban_duration_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub record_ttl_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub store_timeout_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            record_ttl_seconds: 24 * 60 * 60,
            cache_ttl_seconds: 60 * 60,
            store_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub method: String,
    pub prefix: String,
    pub limit_class: String,
    #[serde(default)]
    pub idempotency: IdempotencyMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub limits: HashMap<String, LimitClassConfig>,
    pub ban: BanConfig,
    pub idempotency: IdempotencyConfig,
    pub routes: Vec<RouteRule>,
    pub auth_route_prefixes: Vec<String>,
    pub fail_closed: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert(DEFAULT_CLASS.to_string(), LimitClassConfig::default());
        limits.insert(
            "write".to_string(),
            LimitClassConfig {
                requests_per_window: 30,
                window_seconds: 60,
                burst_allowance: 45,
                allow_burst: true,
            },
        );
        limits.insert(
            "auth".to_string(),
            LimitClassConfig {
                requests_per_window: 5,
                window_seconds: 60,
                burst_allowance: 5,
                allow_burst: false,
            },
        );
        Self {
            limits,
            ban: BanConfig::default(),
            idempotency: IdempotencyConfig::default(),
            routes: vec![
                RouteRule {
                    method: "POST".into(),
                    prefix: "/v1/projects".into(),
                    limit_class: "write".into(),
                    idempotency: IdempotencyMode::Required,
                },
                RouteRule {
                    method: "*".into(),
                    prefix: "/v1/auth".into(),
                    limit_class: "auth".into(),
                    idempotency: IdempotencyMode::Optional,
                },
            ],
            auth_route_prefixes: vec!["/v1/auth".into()],
            fail_closed: false,
        }
    }
}

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e)
    }
}

pub fn load_from_file(path: &Path) -> Result<GateConfig, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(yaml: &str) -> Result<GateConfig, LoadError> {
    let cfg: GateConfig = serde_yaml::from_str(yaml)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &GateConfig) -> Result<(), LoadError> {
    if !cfg.limits.contains_key(DEFAULT_CLASS) {
        return Err(LoadError::Validation(format!(
            "limits must define a \"{DEFAULT_CLASS}\" class"
        )));
    }
    for (name, class) in &cfg.limits {
        if class.requests_per_window == 0 {
            return Err(LoadError::Validation(format!(
                "limit class {name}: requests_per_window must be > 0"
            )));
        }
        if class.window_seconds == 0 {
            return Err(LoadError::Validation(format!(
                "limit class {name}: window_seconds must be > 0"
            )));
        }
        if class.allow_burst && class.burst_allowance < class.requests_per_window {
            return Err(LoadError::Validation(format!(
                "limit class {name}: burst_allowance must be >= requests_per_window when allow_burst is set"
            )));
        }
    }
    if cfg.ban.burst_limit == 0 {
        return Err(LoadError::Validation("ban.burst_limit must be > 0".into()));
    }
    if cfg.ban.detection_window_seconds == 0 {
        return Err(LoadError::Validation(
            "ban.detection_window_seconds must be > 0".into(),
        ));
    }
    if cfg.ban.ban_duration_seconds == 0 {
        return Err(LoadError::Validation(
            "ban.ban_duration_seconds must be > 0".into(),
        ));
    }
    if cfg.idempotency.record_ttl_seconds == 0 {
        return Err(LoadError::Validation(
            "idempotency.record_ttl_seconds must be > 0".into(),
        ));
    }
    if cfg.idempotency.store_timeout_ms == 0 {
        return Err(LoadError::Validation(
            "idempotency.store_timeout_ms must be > 0".into(),
        ));
    }
    for rule in &cfg.routes {
        if !rule.prefix.starts_with('/') {
            return Err(LoadError::Validation(format!(
                "route prefix {} must start with /",
                rule.prefix
            )));
        }
        if !cfg.limits.contains_key(&rule.limit_class) {
            return Err(LoadError::Validation(format!(
                "route {} references unknown limit class {}",
                rule.prefix, rule.limit_class
            )));
        }
    }
    for prefix in &cfg.auth_route_prefixes {
        if !prefix.starts_with('/') {
            return Err(LoadError::Validation(format!(
                "auth route prefix {prefix} must start with /"
            )));
        }
    }
    Ok(())
}
