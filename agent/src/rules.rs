//! Filter rule types and the static default rule set (component H).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A condition's right-hand side: string, integer, or a sequence of
/// strings, matching the filter DSL's `value` polymorphism.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl FilterValue {
    /// Normalize to a list of strings for the prefix/suffix/contains/in
    /// family of operators. A malformed/empty literal yields an empty
    /// list, which the evaluator treats as "no match" for positive
    /// operators and "vacuous match" for negated ones.
    pub fn as_str_list(&self) -> Vec<String> {
        match self {
            FilterValue::Str(s) => vec![s.clone()],
            FilterValue::List(items) => items.clone(),
            FilterValue::Int(_) | FilterValue::Float(_) => Vec::new(),
        }
    }

    /// Integer-truncate an int or float literal for numeric `equals`
    /// comparisons: a rule literal may be written as either an integer or
    /// a float, and floats are truncated toward zero before comparing.
    pub fn as_truncated_int(&self) -> Option<i64> {
        match self {
            FilterValue::Int(n) => Some(*n),
            FilterValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Prefix,
    NotPrefix,
    Suffix,
    NotSuffix,
    Contains,
    NotContains,
    In,
    NotIn,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FilterRule {
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<FilterCondition>,
}

/// Load a filter-rule file; on success it fully replaces the defaults (no
/// merge). Unreadable or unparseable files abort startup.
pub fn load_filters(path: &Path) -> Result<Vec<FilterRule>> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read filter config {}", path.display()))?;
    let rules: Vec<FilterRule> = serde_json::from_str(&data).context("failed to parse filter config")?;
    Ok(rules)
}

/// Baseline noise-reduction rules: filter the host init process, common
/// host noise paths, runc-internal commands, and system K8s namespaces.
pub fn default_filters() -> Vec<FilterRule> {
    use FilterOperator::*;
    use FilterValue::*;

    vec![
        FilterRule {
            description: "Filter Host Init Process".to_string(),
            conditions: vec![
                FilterCondition {
                    field: "type".to_string(),
                    operator: Equals,
                    value: Str("host".to_string()),
                },
                FilterCondition {
                    field: "pid".to_string(),
                    operator: Equals,
                    value: Int(1),
                },
            ],
        },
        FilterRule {
            description: "Filter Host Noise Paths (Prefixes)".to_string(),
            conditions: vec![
                FilterCondition {
                    field: "type".to_string(),
                    operator: Equals,
                    value: Str("host".to_string()),
                },
                FilterCondition {
                    field: "filepath".to_string(),
                    operator: Prefix,
                    value: List(
                        ["/proc/", "/sys/", "/dev/", "/run/", "/tmp/", "/var/log/", "loop"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                },
            ],
        },
        FilterRule {
            description: "Filter Host Noise Paths (Exact)".to_string(),
            conditions: vec![
                FilterCondition {
                    field: "type".to_string(),
                    operator: Equals,
                    value: Str("host".to_string()),
                },
                FilterCondition {
                    field: "filepath".to_string(),
                    operator: In,
                    value: List(
                        ["/etc/ld.so.cache", "..", ".", "/", "devices", "virtual", "block"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                },
            ],
        },
        FilterRule {
            description: "Filter runc: commands".to_string(),
            conditions: vec![FilterCondition {
                field: "comm".to_string(),
                operator: Prefix,
                value: Str("runc:".to_string()),
            }],
        },
        FilterRule {
            description: "Filter System Namespaces".to_string(),
            conditions: vec![
                FilterCondition {
                    field: "type".to_string(),
                    operator: Equals,
                    value: Str("k8s".to_string()),
                },
                FilterCondition {
                    field: "namespace".to_string(),
                    operator: In,
                    value: List(
                        ["kube-system", "calico-system", "ingress-nginx", "microk8s", "local-path-storage"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_value_accepts_scalar_or_sequence_json() {
        let s: FilterValue = serde_json::from_str("\"kube-system\"").unwrap();
        assert_eq!(s, FilterValue::Str("kube-system".to_string()));

        let n: FilterValue = serde_json::from_str("1").unwrap();
        assert_eq!(n, FilterValue::Int(1));

        let l: FilterValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(l, FilterValue::List(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn load_filters_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(
            &path,
            r#"[{"description": "only rule", "conditions": [{"field": "type", "operator": "equals", "value": "k8s"}]}]"#,
        )
        .unwrap();
        let loaded = load_filters(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].description, "only rule");
    }

    #[test]
    fn load_filters_errors_on_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_filters(&path).is_err());
    }

    #[test]
    fn default_filters_include_system_namespace_rule() {
        let rules = default_filters();
        assert!(rules.iter().any(|r| r.description.contains("System Namespaces")));
    }
}
