use crate::domain::money::Amount;
use crate::domain::payment::{PaymentId, PaymentRecord};
use crate::domain::ports::{Authorization, Processor, Settlement};
use crate::error::ProcessorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Whether the gateway captures funds during authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    #[default]
    Immediate,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Charge {
    external_id: String,
    authorized: u64,
    captured: u64,
    refunded: u64,
}

/// An in-process card gateway.
///
/// Keeps every charge in memory keyed by payment id, so repeated
/// authorizations of the same payment return the original charge instead of
/// creating a second one. It can be configured to decline amounts above a
/// limit or to fail the next call.
#[derive(Clone)]
pub struct SimulatedGateway {
    name: String,
    settlement: SettlementMode,
    decline_above: Option<u64>,
    charges: Arc<RwLock<HashMap<PaymentId, Charge>>>,
    fail_next: Arc<AtomicBool>,
}

impl SimulatedGateway {
    pub fn new(name: impl Into<String>, settlement: SettlementMode) -> Self {
        Self {
            name: name.into(),
            settlement,
            decline_above: None,
            charges: Arc::new(RwLock::new(HashMap::new())),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Declines any authorization whose amount exceeds `limit` minor units.
    pub fn with_decline_above(mut self, limit: u64) -> Self {
        self.decline_above = Some(limit);
        self
    }

    /// Makes the next call fail with `ProcessorError::Unavailable`.
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn charge_count(&self) -> usize {
        self.charges.read().await.len()
    }

    /// Captured minus refunded for `payment_id`, if the gateway knows it.
    pub async fn net_captured(&self, payment_id: &PaymentId) -> Option<u64> {
        self.charges
            .read()
            .await
            .get(payment_id)
            .map(|c| c.captured - c.refunded)
    }

    fn check_outage(&self) -> Result<(), ProcessorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(ProcessorError::Unavailable(format!(
                "{} is temporarily unavailable",
                self.name
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Processor for SimulatedGateway {
    async fn authorize(&self, payment: &PaymentRecord) -> Result<Authorization, ProcessorError> {
        self.check_outage()?;

        let settlement = match self.settlement {
            SettlementMode::Immediate => Settlement::Settled,
            SettlementMode::Deferred => Settlement::AuthorizedOnly,
        };

        let mut charges = self.charges.write().await;
        if let Some(existing) = charges.get(&payment.id()) {
            return Ok(Authorization {
                external_id: existing.external_id.clone(),
                settlement,
            });
        }

        let amount = payment.amount().value();
        if let Some(limit) = self.decline_above
            && amount > limit
        {
            return Err(ProcessorError::Declined(format!(
                "amount {} exceeds limit {}",
                amount, limit
            )));
        }
        if payment.payment_method().kind == "card"
            && !payment.payment_method().details.contains_key("number")
        {
            return Err(ProcessorError::InvalidRequest(
                "card number is required".to_string(),
            ));
        }

        let external_id = format!("{}_{}", self.name, Uuid::new_v4().simple());
        let captured = match settlement {
            Settlement::Settled => amount,
            Settlement::AuthorizedOnly => 0,
        };
        charges.insert(
            payment.id(),
            Charge {
                external_id: external_id.clone(),
                authorized: amount,
                captured,
                refunded: 0,
            },
        );
        debug!(gateway = %self.name, payment_id = %payment.id(), %external_id, "charge authorized");

        Ok(Authorization {
            external_id,
            settlement,
        })
    }

    async fn capture(&self, payment_id: &PaymentId, amount: Amount) -> Result<(), ProcessorError> {
        self.check_outage()?;

        let mut charges = self.charges.write().await;
        let charge = charges
            .get_mut(payment_id)
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("unknown payment {}", payment_id)))?;
        if charge.captured + amount.value() > charge.authorized {
            return Err(ProcessorError::InvalidRequest(format!(
                "capture of {} exceeds uncaptured amount {}",
                amount,
                charge.authorized - charge.captured
            )));
        }
        charge.captured += amount.value();
        Ok(())
    }

    async fn refund(&self, payment_id: &PaymentId, amount: Amount) -> Result<(), ProcessorError> {
        self.check_outage()?;

        let mut charges = self.charges.write().await;
        let charge = charges
            .get_mut(payment_id)
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("unknown payment {}", payment_id)))?;
        if charge.refunded + amount.value() > charge.captured {
            return Err(ProcessorError::InvalidRequest(format!(
                "refund of {} exceeds captured amount {}",
                amount,
                charge.captured - charge.refunded
            )));
        }
        charge.refunded += amount.value();
        Ok(())
    }
}
