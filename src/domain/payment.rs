use super::money::{Amount, Currency};
use super::ports::{Authorization, Settlement};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a payment, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PaymentId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| PaymentError::Validation(format!("Invalid payment id {:?}: {}", s, e)))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Whether `next` is a legal forward step from `self`.
    ///
    /// `Pending -> Completed` covers processors that settle during
    /// authorization.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Authorized, Completed)
                | (Completed, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "authorized" => Ok(PaymentStatus::Authorized),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(PaymentError::Validation(format!(
                "Unknown payment status {:?}",
                other
            ))),
        }
    }
}

/// Lifecycle operations that move a payment between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOperation {
    Authorize,
    Capture,
    Refund,
}

impl PaymentOperation {
    /// The only status from which this operation may start.
    pub fn required_status(self) -> PaymentStatus {
        match self {
            PaymentOperation::Authorize => PaymentStatus::Pending,
            PaymentOperation::Capture => PaymentStatus::Authorized,
            PaymentOperation::Refund => PaymentStatus::Completed,
        }
    }
}

impl fmt::Display for PaymentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentOperation::Authorize => "authorize",
            PaymentOperation::Capture => "capture",
            PaymentOperation::Refund => "refund",
        })
    }
}

/// How the payer pays. `details` is opaque to the core and interpreted only by
/// processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl PaymentMethod {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn card(number: &str, exp_month: &str, exp_year: &str, cvc: &str) -> Self {
        Self::new("card")
            .with_detail("number", number)
            .with_detail("exp_month", exp_month)
            .with_detail("exp_year", exp_year)
            .with_detail("cvc", cvc)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// A validated request to create a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    amount: Amount,
    currency: Currency,
    payment_method: PaymentMethod,
    metadata: BTreeMap<String, String>,
}

impl NewPayment {
    pub fn new(amount: u64, currency: &str, payment_method: PaymentMethod) -> Result<Self> {
        let amount = Amount::new(amount)?;
        let currency = Currency::new(currency)?;
        if payment_method.kind.trim().is_empty() {
            return Err(PaymentError::Validation(
                "Payment method type is required".to_string(),
            ));
        }
        Ok(Self {
            amount,
            currency,
            payment_method,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }
}

/// The durable state of one charge attempt.
///
/// Only the engine moves a record forward; the mutating methods are
/// crate-private so amount, currency and id stay fixed after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    id: PaymentId,
    external_id: Option<String>,
    /// Router id of the processor that accepted the authorization.
    #[serde(default)]
    processor_id: Option<String>,
    amount: Amount,
    currency: Currency,
    status: PaymentStatus,
    payment_method: PaymentMethod,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    captured_amount: u64,
    refunded_amount: u64,
    /// Incremented on every persisted transition; repositories compare it
    /// against the stored copy before overwriting.
    version: u64,
}

impl PaymentRecord {
    /// Allocates an id and builds a `pending` record at version 1.
    pub fn new(request: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            external_id: None,
            processor_id: None,
            amount: request.amount,
            currency: request.currency,
            status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
            captured_amount: 0,
            refunded_amount: 0,
            version: 1,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn processor_id(&self) -> Option<&str> {
        self.processor_id.as_deref()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn captured_amount(&self) -> u64 {
        self.captured_amount
    }

    pub fn refunded_amount(&self) -> u64 {
        self.refunded_amount
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Amount still available for capture.
    pub fn remaining_authorized(&self) -> u64 {
        self.amount.value().saturating_sub(self.captured_amount)
    }

    /// Amount still available for refund.
    pub fn refundable(&self) -> u64 {
        self.captured_amount.saturating_sub(self.refunded_amount)
    }

    /// Fails with a state conflict unless the record is in the status
    /// `operation` starts from.
    pub fn ensure_ready_for(&self, operation: PaymentOperation) -> Result<()> {
        if self.status == operation.required_status() {
            Ok(())
        } else {
            Err(self.conflict(operation))
        }
    }

    fn conflict(&self, operation: PaymentOperation) -> PaymentError {
        PaymentError::StateConflict {
            id: self.id,
            operation,
            status: self.status,
        }
    }

    fn transition(&mut self, next: PaymentStatus, operation: PaymentOperation) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.conflict(operation));
        }
        self.status = next;
        Ok(())
    }

    /// Folds a successful authorization by `processor_id` into the record.
    pub(crate) fn apply_authorization(
        &mut self,
        processor_id: impl Into<String>,
        authorization: Authorization,
    ) -> Result<()> {
        match authorization.settlement {
            Settlement::Settled => {
                self.transition(PaymentStatus::Completed, PaymentOperation::Authorize)?;
                self.captured_amount = self.amount.value();
            }
            Settlement::AuthorizedOnly => {
                self.transition(PaymentStatus::Authorized, PaymentOperation::Authorize)?;
            }
        }
        self.external_id = Some(authorization.external_id);
        self.processor_id = Some(processor_id.into());
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self) -> Result<()> {
        self.transition(PaymentStatus::Failed, PaymentOperation::Authorize)
    }

    pub(crate) fn apply_capture(&mut self, amount: Amount) -> Result<()> {
        self.transition(PaymentStatus::Completed, PaymentOperation::Capture)?;
        self.captured_amount += amount.value();
        Ok(())
    }

    pub(crate) fn apply_refund(&mut self, amount: Amount) -> Result<()> {
        self.transition(PaymentStatus::Refunded, PaymentOperation::Refund)?;
        self.refunded_amount += amount.value();
        Ok(())
    }

    /// Stamps a new transition that is about to be saved.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

/// Criteria for `PaymentRepository::list`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub currency: Option<Currency>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    pub fn matches(&self, payment: &PaymentRecord) -> bool {
        self.status.is_none_or(|s| payment.status == s)
            && self.currency.as_ref().is_none_or(|c| &payment.currency == c)
            && self.created_from.is_none_or(|from| payment.created_at >= from)
            && self.created_to.is_none_or(|to| payment.created_at < to)
    }
}
