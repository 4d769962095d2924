//! Node selection policy.
//!
//! The settings ConfigMap may carry a `nodeSelector` key holding a serialized
//! Kubernetes label selector. A node activates its access point iff it satisfies every
//! requirement of that selector; without the key every node activates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// ConfigMap key holding the selector.
pub const NODE_SELECTOR_KEY: &str = "nodeSelector";

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("valid regex"));
static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid regex")
});

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unable to parse nodeSelector: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("'{operator}' is not a valid selector operator (key '{key}')")]
    UnknownOperator { key: String, operator: String },
    #[error("operator {operator} on key '{key}' requires at least one value")]
    MissingValues { key: String, operator: Operator },
    #[error("operator {operator} on key '{key}' must not carry values")]
    UnexpectedValues { key: String, operator: Operator },
    #[error("invalid label key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid label value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    fn takes_values(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
        })
    }
}

/// One validated match requirement of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> Result<Self, PolicyError> {
        let key = key.into();
        validate_key(&key)?;
        let values: BTreeSet<String> = values.into_iter().collect();
        match (operator.takes_values(), values.is_empty()) {
            (true, true) => return Err(PolicyError::MissingValues { key, operator }),
            (false, false) => return Err(PolicyError::UnexpectedValues { key, operator }),
            _ => {}
        }
        if let Some(value) = values.iter().find(|value| !is_valid_value(value)) {
            return Err(PolicyError::InvalidValue {
                key,
                value: value.clone(),
            });
        }
        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// Conjunction of requirements. The empty selector matches every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn from_label_selector(selector: &LabelSelector) -> Result<Self, PolicyError> {
        let mut requirements = Vec::new();
        for (key, value) in selector.match_labels.iter().flatten() {
            requirements.push(Requirement::new(key.clone(), Operator::In, [value.clone()])?);
        }
        for expr in selector.match_expressions.iter().flatten() {
            let operator = match expr.operator.as_str() {
                "In" => Operator::In,
                "NotIn" => Operator::NotIn,
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => {
                    return Err(PolicyError::UnknownOperator {
                        key: expr.key.clone(),
                        operator: other.to_string(),
                    });
                }
            };
            let values = expr.values.clone().unwrap_or_default();
            requirements.push(Requirement::new(expr.key.clone(), operator, values)?);
        }
        requirements.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| req.matches(labels))
    }
}

impl FromStr for Selector {
    type Err = PolicyError;

    /// Parse a YAML (or JSON) `LabelSelector` document. A blank or `null` document is
    /// the empty selector.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Ok(Self::everything());
        }
        match serde_yaml::from_str::<Option<LabelSelector>>(raw)? {
            Some(selector) => Self::from_label_selector(&selector),
            None => Ok(Self::everything()),
        }
    }
}

/// Decide whether the node carrying `labels` should have its access point enabled.
pub fn resolve_activation(
    config: Option<&BTreeMap<String, String>>,
    labels: Option<&BTreeMap<String, String>>,
) -> Result<bool, PolicyError> {
    let Some(raw) = config.and_then(|data| data.get(NODE_SELECTOR_KEY)) else {
        debug!("{NODE_SELECTOR_KEY} key missing in settings, selecting node");
        return Ok(true);
    };
    let selector: Selector = raw.parse()?;
    let empty = BTreeMap::new();
    Ok(selector.matches(labels.unwrap_or(&empty)))
}

fn validate_key(key: &str) -> Result<(), PolicyError> {
    let invalid = |reason: &'static str| {
        Err(PolicyError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !DNS_SUBDOMAIN.is_match(prefix) {
            return invalid("prefix must be a DNS subdomain");
        }
    }
    if name.is_empty() {
        return invalid("name part must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("name part must be at most 63 characters");
    }
    if !QUALIFIED_NAME.is_match(name) {
        return invalid("name part must be alphanumeric with '-', '_' or '.' inside");
    }
    Ok(())
}

fn is_valid_value(value: &str) -> bool {
    value.is_empty() || (value.len() <= MAX_NAME_LEN && QUALIFIED_NAME.is_match(value))
}
