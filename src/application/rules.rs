use crate::domain::payment::PaymentRecord;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

pub type Predicate = Arc<dyn Fn(&PaymentRecord) -> bool + Send + Sync>;

/// Name of the rule every router starts with.
pub const FALLBACK_RULE: &str = "fallback";

/// A prioritized binding from a predicate to a processor id.
///
/// Higher `priority` is evaluated first; equal priorities keep insertion order.
#[derive(Clone)]
pub struct RoutingRule {
    pub name: String,
    pub target: String,
    pub priority: i32,
    pub condition: Predicate,
}

impl RoutingRule {
    pub fn new<F>(name: impl Into<String>, target: impl Into<String>, priority: i32, condition: F) -> Self
    where
        F: Fn(&PaymentRecord) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            target: target.into(),
            priority,
            condition: Arc::new(condition),
        }
    }

    /// Builds a rule whose predicate is described by data.
    pub fn from_condition(
        name: impl Into<String>,
        target: impl Into<String>,
        priority: i32,
        condition: RuleCondition,
    ) -> Self {
        Self::new(name, target, priority, move |payment| condition.matches(payment))
    }

    pub(crate) fn fallback(target: impl Into<String>) -> Self {
        Self::new(FALLBACK_RULE, target, i32::MIN, |_| true)
    }

    pub fn matches(&self, payment: &PaymentRecord) -> bool {
        (self.condition)(payment)
    }
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Serializable predicate over a payment, used to load routing policy from
/// configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Always,
    /// Amount in minor units is at least `amount`.
    MinAmount { amount: u64 },
    /// Amount in minor units is at most `amount`.
    MaxAmount { amount: u64 },
    Currency { code: String },
    MethodType { method: String },
    MetadataEquals { key: String, value: String },
    All { conditions: Vec<RuleCondition> },
    Any { conditions: Vec<RuleCondition> },
    Not { condition: Box<RuleCondition> },
}

impl RuleCondition {
    pub fn matches(&self, payment: &PaymentRecord) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::MinAmount { amount } => payment.amount().value() >= *amount,
            RuleCondition::MaxAmount { amount } => payment.amount().value() <= *amount,
            RuleCondition::Currency { code } => payment.currency().as_str().eq_ignore_ascii_case(code),
            RuleCondition::MethodType { method } => payment.payment_method().kind == *method,
            RuleCondition::MetadataEquals { key, value } => {
                payment.metadata().get(key).is_some_and(|v| v == value)
            }
            RuleCondition::All { conditions } => conditions.iter().all(|c| c.matches(payment)),
            RuleCondition::Any { conditions } => conditions.iter().any(|c| c.matches(payment)),
            RuleCondition::Not { condition } => !condition.matches(payment),
        }
    }
}
