use super::money::Amount;
use super::payment::{PaymentFilter, PaymentId, PaymentRecord};
use crate::error::{ProcessorError, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable store of record for payments.
///
/// `save` is an insert-or-update of the whole record keyed by id. A successful
/// return means the record survives a crash. Implementations must reject a
/// save whose `version` is not exactly one above the stored copy (absent
/// counts as version 0) with `StorageError::Conflict`.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn save(&self, payment: &PaymentRecord) -> Result<(), StorageError>;
    async fn get(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, StorageError>;
    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>, StorageError>;
}

pub type PaymentRepositoryBox = Box<dyn PaymentRepository>;

/// How far the processor got during authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Funds are held; a separate capture is required.
    AuthorizedOnly,
    /// Funds were captured as part of the authorization.
    Settled,
}

/// What a processor reports back after accepting an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub external_id: String,
    pub settlement: Settlement,
}

/// A backend able to move money on a real payment rail.
///
/// Processors own their network timeouts and retries. Any `Err` is final for
/// that call. They never mutate the record; results are returned to the
/// engine, which folds them in.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn authorize(&self, payment: &PaymentRecord) -> Result<Authorization, ProcessorError>;
    async fn capture(&self, payment_id: &PaymentId, amount: Amount) -> Result<(), ProcessorError>;
    async fn refund(&self, payment_id: &PaymentId, amount: Amount) -> Result<(), ProcessorError>;
}

pub type ProcessorRef = Arc<dyn Processor>;
