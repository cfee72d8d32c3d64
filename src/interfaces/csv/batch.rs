use super::command_reader::{CommandType, PaymentCommand};
use crate::application::engine::PaymentEngine;
use crate::domain::payment::{PaymentFilter, PaymentId, PaymentRecord};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Metadata key under which a payment's batch reference is stored.
pub const REFERENCE_KEY: &str = "reference";

/// Applies command rows to an engine, resolving references to payment ids.
///
/// References of stored payments are loaded from their `reference` metadata
/// the first time a lookup is needed, so a batch can act on payments created
/// by a previous run against the same database. Afterwards the index is kept
/// current in memory and the repository is not scanned again.
pub struct BatchRunner<'e> {
    engine: &'e PaymentEngine,
    cancel: CancellationToken,
    references: HashMap<String, PaymentId>,
    loaded: bool,
}

impl<'e> BatchRunner<'e> {
    pub fn new(engine: &'e PaymentEngine, cancel: CancellationToken) -> Self {
        Self {
            engine,
            cancel,
            references: HashMap::new(),
            loaded: false,
        }
    }

    pub async fn apply(&mut self, command: PaymentCommand) -> Result<PaymentRecord> {
        match command.op {
            CommandType::Create => {
                if self.resolve(&command.reference).await?.is_some() {
                    return Err(PaymentError::Validation(format!(
                        "reference {:?} is already in use",
                        command.reference
                    )));
                }
                let request = command.to_new_payment()?;
                let result = self.engine.create_payment(request, &self.cancel).await;
                let id = match &result {
                    Ok(payment) => Some(payment.id()),
                    Err(PaymentError::AuthorizationFailed { id, .. }) => Some(*id),
                    Err(_) => None,
                };
                if let Some(id) = id {
                    self.references.insert(command.reference.clone(), id);
                }
                result
            }
            CommandType::Capture => {
                let id = self.require(&command.reference).await?;
                self.engine
                    .capture_payment(id, command.amount()?, &self.cancel)
                    .await
            }
            CommandType::Refund => {
                let id = self.require(&command.reference).await?;
                self.engine
                    .refund_payment(id, command.amount()?, &self.cancel)
                    .await
            }
        }
    }

    /// Every stored payment with its reference, oldest first.
    pub async fn results(&self) -> Result<Vec<(String, PaymentRecord)>> {
        let payments = self
            .engine
            .list_payments(&PaymentFilter::default(), &self.cancel)
            .await?;
        Ok(payments
            .into_iter()
            .map(|p| {
                let reference = p.metadata().get(REFERENCE_KEY).cloned().unwrap_or_default();
                (reference, p)
            })
            .collect())
    }

    async fn require(&mut self, reference: &str) -> Result<PaymentId> {
        self.resolve(reference).await?.ok_or_else(|| {
            PaymentError::Validation(format!("unknown payment reference {:?}", reference))
        })
    }

    async fn resolve(&mut self, reference: &str) -> Result<Option<PaymentId>> {
        if !self.loaded {
            self.load_references().await?;
        }
        Ok(self.references.get(reference).copied())
    }

    async fn load_references(&mut self) -> Result<()> {
        let stored = self
            .engine
            .list_payments(&PaymentFilter::default(), &self.cancel)
            .await?;
        for payment in stored {
            if let Some(reference) = payment.metadata().get(REFERENCE_KEY) {
                self.references
                    .entry(reference.clone())
                    .or_insert(payment.id());
            }
        }
        self.loaded = true;
        debug!(references = self.references.len(), "stored references loaded");
        Ok(())
    }
}
