use serde::Deserialize;

use crate::config::{RouteRule, DEFAULT_CLASS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyMode {
    Required,
    Optional,
}

impl Default for IdempotencyMode {
    fn default() -> Self {
        Self::Optional
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub limit_class: String,
    pub idempotency_mode: IdempotencyMode,
}

impl RoutePolicy {
    fn fallback() -> Self {
        Self {
            limit_class: DEFAULT_CLASS.to_string(),
            idempotency_mode: IdempotencyMode::Optional,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    method: Option<String>,
    prefix: String,
    policy: RoutePolicy,
}

/// Route-to-policy table, built once at startup. Longest prefix wins; a
/// method-specific rule beats a wildcard at the same prefix length. Paths
/// with no matching rule get the default class with optional idempotency.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<CompiledRule>,
}

impl PolicyTable {
    pub fn from_rules(rules: &[RouteRule]) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .iter()
            .map(|r| CompiledRule {
                method: match r.method.as_str() {
                    "*" => None,
                    m => Some(m.to_ascii_uppercase()),
                },
                prefix: r.prefix.clone(),
                policy: RoutePolicy {
                    limit_class: r.limit_class.clone(),
                    idempotency_mode: r.idempotency,
                },
            })
            .collect();
        compiled.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.method.is_none().cmp(&b.method.is_none()))
        });
        Self { rules: compiled }
    }

    pub fn resolve(&self, method: &str, path: &str) -> RoutePolicy {
        let method = method.to_ascii_uppercase();
        self.rules
            .iter()
            .find(|rule| {
                path.starts_with(&rule.prefix)
                    && rule.method.as_deref().map_or(true, |m| m == method)
            })
            .map(|rule| rule.policy.clone())
            .unwrap_or_else(RoutePolicy::fallback)
    }
}
