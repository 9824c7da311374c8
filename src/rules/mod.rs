//! Rule types shared with the decision server.
//!
//! # Responsibilities
//! - Define the action/duration vocabulary used by verdicts and by the
//!   configuration defaults
//! - Decode rule replies received from the server into validated rules
//! - Provide the synthetic fail-open rules used when no server verdict is
//!   available
//!
//! The full operator/predicate evaluation language lives in the rule engine;
//! this module only carries the subset a verdict needs to travel with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proto::{OperatorSpec, RuleSpec};

/// Name of the synthetic rule returned while the server is unreachable.
pub const DISCONNECTED_RULE_NAME: &str = "client-disconnected";

/// Name of the synthetic rule offered for failed exchanges.
pub const ERROR_RULE_NAME: &str = "client-error";

/// What to do with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Deny,
    Reject,
}

impl FromStr for Action {
    type Err = RuleDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Action::Allow),
            "deny" => Ok(Action::Deny),
            "reject" => Ok(Action::Reject),
            other => Err(RuleDecodeError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Allow => write!(f, "allow"),
            Action::Deny => write!(f, "deny"),
            Action::Reject => write!(f, "reject"),
        }
    }
}

/// How long a verdict stays in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleDuration {
    /// Applies to this connection only; the next attempt asks again.
    #[default]
    #[serde(rename = "once")]
    Once,
    #[serde(rename = "30s")]
    Seconds30,
    #[serde(rename = "5m")]
    Minutes5,
    #[serde(rename = "15m")]
    Minutes15,
    #[serde(rename = "30m")]
    Minutes30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "until restart")]
    UntilRestart,
    #[serde(rename = "always")]
    Always,
}

impl FromStr for RuleDuration {
    type Err = RuleDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(RuleDuration::Once),
            "30s" => Ok(RuleDuration::Seconds30),
            "5m" => Ok(RuleDuration::Minutes5),
            "15m" => Ok(RuleDuration::Minutes15),
            "30m" => Ok(RuleDuration::Minutes30),
            "1h" => Ok(RuleDuration::Hour1),
            "until restart" => Ok(RuleDuration::UntilRestart),
            "always" => Ok(RuleDuration::Always),
            other => Err(RuleDecodeError::UnknownDuration(other.to_string())),
        }
    }
}

impl fmt::Display for RuleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleDuration::Once => "once",
            RuleDuration::Seconds30 => "30s",
            RuleDuration::Minutes5 => "5m",
            RuleDuration::Minutes15 => "15m",
            RuleDuration::Minutes30 => "30m",
            RuleDuration::Hour1 => "1h",
            RuleDuration::UntilRestart => "until restart",
            RuleDuration::Always => "always",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised while turning a server reply into a rule.
#[derive(Debug, Error)]
pub enum RuleDecodeError {
    #[error("rule has no name")]
    MissingName,

    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("unknown duration {0:?}")]
    UnknownDuration(String),

    #[error("unknown operator kind {0:?}")]
    UnknownOperator(String),
}

/// Minimal predicate a rule matches connections with.
///
/// The rule engine evaluates these; here they only need to survive the trip
/// from the server intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Matches every connection. Used by the synthetic fallback rules.
    True,
    /// Compares one connection field against a fixed value.
    Simple { operand: String, data: String },
    /// Matches a connection field against a regular expression.
    Regexp { operand: String, data: String },
}

impl Operator {
    fn from_spec(spec: &OperatorSpec) -> Result<Self, RuleDecodeError> {
        match spec.kind.as_str() {
            "true" => Ok(Operator::True),
            "simple" => Ok(Operator::Simple {
                operand: spec.operand.clone(),
                data: spec.data.clone(),
            }),
            "regexp" => Ok(Operator::Regexp {
                operand: spec.operand.clone(),
                data: spec.data.clone(),
            }),
            other => Err(RuleDecodeError::UnknownOperator(other.to_string())),
        }
    }
}

/// A decision the daemon can act on: either received from the server or
/// synthesized locally when no server verdict is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub enabled: bool,
    pub action: Action,
    pub duration: RuleDuration,
    pub operator: Operator,
}

impl Rule {
    /// Synthetic verdict used while the session is down. Fail-open with a
    /// single-use duration so a later retry is not suppressed by a cached
    /// decision.
    pub fn client_disconnected() -> Self {
        Self::fallback(DISCONNECTED_RULE_NAME)
    }

    /// Synthetic verdict offered to callers that choose to fail open when an
    /// exchange with a live server went wrong.
    pub fn client_error() -> Self {
        Self::fallback(ERROR_RULE_NAME)
    }

    fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            action: Action::Allow,
            duration: RuleDuration::Once,
            operator: Operator::True,
        }
    }

    /// Whether this rule is one of the locally synthesized fallbacks.
    pub fn is_fallback(&self) -> bool {
        self.name == DISCONNECTED_RULE_NAME || self.name == ERROR_RULE_NAME
    }

    /// Decode and validate a rule reply received from the server.
    pub fn from_spec(spec: &RuleSpec) -> Result<Self, RuleDecodeError> {
        if spec.name.is_empty() {
            return Err(RuleDecodeError::MissingName);
        }
        Ok(Self {
            name: spec.name.clone(),
            enabled: spec.enabled,
            action: spec.action.parse()?,
            duration: spec.duration.parse()?,
            operator: Operator::from_spec(&spec.operator)?,
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} {}]", self.name, self.action, self.duration)
    }
}
