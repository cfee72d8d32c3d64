use super::rules::RoutingRule;
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::ProcessorRef;
use crate::error::RouterError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// The processor chosen for a payment, together with its registry id.
#[derive(Clone)]
pub struct SelectedProcessor {
    pub id: String,
    pub processor: ProcessorRef,
}

impl fmt::Debug for SelectedProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedProcessor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

struct RouterState {
    processors: HashMap<String, ProcessorRef>,
    /// Every id ever registered. Ids are never handed out twice.
    retired: HashSet<String>,
    /// Descending priority, stable among equals. The fallback rule is always
    /// the last element.
    rules: Vec<RoutingRule>,
}

/// Maps payments to registered processors through an ordered rule set.
///
/// Registry and rules share a single `RwLock`: mutations take the write half,
/// route resolution takes the read half. The lock is never held while a
/// processor is being called.
pub struct ProcessorRouter {
    state: RwLock<RouterState>,
    default_processor: String,
}

impl ProcessorRouter {
    /// Creates a router whose fallback rule targets `default_processor`.
    pub fn new(default_processor: impl Into<String>) -> Self {
        let default_processor = default_processor.into();
        Self {
            state: RwLock::new(RouterState {
                processors: HashMap::new(),
                retired: HashSet::new(),
                rules: vec![RoutingRule::fallback(default_processor.clone())],
            }),
            default_processor,
        }
    }

    pub fn default_processor(&self) -> &str {
        &self.default_processor
    }

    #[instrument(skip(self, processor))]
    pub async fn register_processor(
        &self,
        id: &str,
        processor: ProcessorRef,
    ) -> Result<(), RouterError> {
        let mut state = self.state.write().await;
        if !state.retired.insert(id.to_string()) {
            return Err(RouterError::AlreadyRegistered(id.to_string()));
        }
        state.processors.insert(id.to_string(), processor);
        info!("processor registered");
        Ok(())
    }

    /// Removes a processor. Rules targeting it are skipped from now on; the id
    /// cannot be registered again. Payments it authorized can no longer be
    /// captured or refunded through this router.
    #[instrument(skip(self))]
    pub async fn deregister_processor(&self, id: &str) -> Option<ProcessorRef> {
        let removed = self.state.write().await.processors.remove(id);
        if removed.is_some() {
            warn!("processor deregistered");
        }
        removed
    }

    #[instrument(skip(self, rule), fields(rule = %rule.name, target = %rule.target, priority = rule.priority))]
    pub async fn add_routing_rule(&self, rule: RoutingRule) -> Result<(), RouterError> {
        let mut state = self.state.write().await;
        if !state.processors.contains_key(&rule.target) {
            return Err(RouterError::UnknownProcessor(rule.target));
        }

        let fallback = state.rules.len() - 1;
        let index = state.rules[..fallback].partition_point(|r| r.priority >= rule.priority);
        state.rules.insert(index, rule);
        debug!(position = index, "routing rule added");
        Ok(())
    }

    /// Returns the processor bound to the first matching rule whose target is
    /// still registered, falling back to the default processor.
    pub async fn select_processor(
        &self,
        payment: &PaymentRecord,
    ) -> Result<SelectedProcessor, RouterError> {
        let state = self.state.read().await;

        for rule in &state.rules {
            if !rule.matches(payment) {
                continue;
            }
            match state.processors.get(&rule.target) {
                Some(processor) => {
                    debug!(payment_id = %payment.id(), rule = %rule.name, processor = %rule.target, "route selected");
                    return Ok(SelectedProcessor {
                        id: rule.target.clone(),
                        processor: processor.clone(),
                    });
                }
                None => {
                    debug!(rule = %rule.name, processor = %rule.target, "rule target not registered, skipping");
                }
            }
        }

        state
            .processors
            .get(&self.default_processor)
            .map(|processor| SelectedProcessor {
                id: self.default_processor.clone(),
                processor: processor.clone(),
            })
            .ok_or(RouterError::NoProcessorAvailable)
    }

    /// The processor for a capture or refund of `payment`.
    ///
    /// An authorized payment stays with the processor that accepted it; rules
    /// added since then do not move it. Records that never reached a
    /// processor go through `select_processor`.
    pub async fn processor_for(
        &self,
        payment: &PaymentRecord,
    ) -> Result<SelectedProcessor, RouterError> {
        let Some(id) = payment.processor_id() else {
            return self.select_processor(payment).await;
        };

        self.state
            .read()
            .await
            .processors
            .get(id)
            .map(|processor| SelectedProcessor {
                id: id.to_string(),
                processor: processor.clone(),
            })
            .ok_or_else(|| RouterError::UnknownProcessor(id.to_string()))
    }

    /// Rule names and priorities in evaluation order.
    pub async fn evaluation_order(&self) -> Vec<(String, i32)> {
        self.state
            .read()
            .await
            .rules
            .iter()
            .map(|r| (r.name.clone(), r.priority))
            .collect()
    }

    pub async fn processor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.processors.keys().cloned().collect();
        ids.sort();
        ids
    }
}
