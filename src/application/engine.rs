use super::router::{ProcessorRouter, SelectedProcessor};
use crate::config::EngineConfig;
use crate::domain::money::Amount;
use crate::domain::payment::{
    NewPayment, PaymentFilter, PaymentId, PaymentOperation, PaymentRecord,
};
use crate::domain::ports::PaymentRepositoryBox;
use crate::error::{PaymentError, ProcessorError, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, field, info, instrument, warn};

/// Drives payments through authorize, capture and refund.
///
/// Every status change is saved before the operation reports success. The
/// engine holds no per-payment locks: concurrent writers to the same record
/// are arbitrated by the repository's version check, and the loser gets a
/// storage conflict.
pub struct PaymentEngine {
    repository: PaymentRepositoryBox,
    router: Arc<ProcessorRouter>,
    config: EngineConfig,
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine` with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `repository` - The store of record for payments.
    /// * `router` - Selects the processor for each payment.
    pub fn new(repository: PaymentRepositoryBox, router: Arc<ProcessorRouter>) -> Self {
        Self::with_config(repository, router, EngineConfig::default())
    }

    pub fn with_config(
        repository: PaymentRepositoryBox,
        router: Arc<ProcessorRouter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            router,
            config,
        }
    }

    pub fn router(&self) -> &Arc<ProcessorRouter> {
        &self.router
    }

    /// Creates a payment and authorizes it with the routed processor.
    ///
    /// Returns the record in `authorized` or `completed` status. If the
    /// processor rejects the authorization the record is moved to `failed`
    /// (best effort) and `PaymentError::AuthorizationFailed` is returned.
    #[instrument(
        skip_all,
        fields(payment_id = field::Empty, amount = request.amount().value(), currency = %request.currency())
    )]
    pub async fn create_payment(
        &self,
        request: NewPayment,
        cancel: &CancellationToken,
    ) -> Result<PaymentRecord> {
        let mut payment = PaymentRecord::new(request, Utc::now());
        Span::current().record("payment_id", field::display(payment.id()));

        self.save(&payment, cancel).await?;

        let selected = self.route(&payment).await?;
        let outcome = self
            .guarded(cancel, "processor", async {
                Ok::<_, PaymentError>(selected.processor.authorize(&payment).await)
            })
            .await?;

        let authorization = match outcome {
            Ok(authorization) => authorization,
            Err(source) => return Err(self.record_failure(payment, &selected, source, cancel).await),
        };

        payment.apply_authorization(selected.id.clone(), authorization)?;
        payment.advance(Utc::now());
        if let Err(e) = self.save(&payment, cancel).await {
            error!(processor = %selected.id, error = %e, "authorization accepted by processor but not persisted");
            return Err(e);
        }

        info!(processor = %selected.id, status = %payment.status(), "payment authorized");
        Ok(payment)
    }

    /// Captures `amount` of an authorized payment and completes it.
    #[instrument(skip(self, cancel))]
    pub async fn capture_payment(
        &self,
        id: PaymentId,
        amount: u64,
        cancel: &CancellationToken,
    ) -> Result<PaymentRecord> {
        let amount = Amount::new(amount)?;
        let mut payment = self.load(&id, cancel).await?;
        payment.ensure_ready_for(PaymentOperation::Capture)?;
        if amount.value() > payment.remaining_authorized() {
            return Err(PaymentError::AmountConflict {
                id,
                operation: PaymentOperation::Capture,
                requested: amount.value(),
                available: payment.remaining_authorized(),
            });
        }

        let selected = self.owner(&payment).await?;
        self.call_processor(
            cancel,
            id,
            PaymentOperation::Capture,
            selected.processor.capture(&id, amount),
        )
        .await?;

        payment.apply_capture(amount)?;
        payment.advance(Utc::now());
        if let Err(e) = self.save(&payment, cancel).await {
            error!(processor = %selected.id, error = %e, "capture accepted by processor but not persisted");
            return Err(e);
        }

        info!(processor = %selected.id, "payment captured");
        Ok(payment)
    }

    /// Refunds `amount` of a completed payment.
    ///
    /// Any accepted refund, partial or full, moves the payment to `refunded`;
    /// the refunded total is kept in `refunded_amount`.
    #[instrument(skip(self, cancel))]
    pub async fn refund_payment(
        &self,
        id: PaymentId,
        amount: u64,
        cancel: &CancellationToken,
    ) -> Result<PaymentRecord> {
        let amount = Amount::new(amount)?;
        let mut payment = self.load(&id, cancel).await?;
        payment.ensure_ready_for(PaymentOperation::Refund)?;
        if amount > payment.amount() {
            return Err(PaymentError::Validation(format!(
                "Refund amount {} exceeds original amount {}",
                amount,
                payment.amount()
            )));
        }
        if amount.value() > payment.refundable() {
            return Err(PaymentError::Validation(format!(
                "Refund amount {} exceeds captured amount {}",
                amount,
                payment.refundable()
            )));
        }

        let selected = self.owner(&payment).await?;
        self.call_processor(
            cancel,
            id,
            PaymentOperation::Refund,
            selected.processor.refund(&id, amount),
        )
        .await?;

        payment.apply_refund(amount)?;
        payment.advance(Utc::now());
        if let Err(e) = self.save(&payment, cancel).await {
            error!(processor = %selected.id, error = %e, "refund accepted by processor but not persisted");
            return Err(e);
        }

        if payment.refunded_amount() < payment.amount().value() {
            warn!(
                refunded = payment.refunded_amount(),
                amount = payment.amount().value(),
                "partial refund recorded as refunded"
            );
        }
        info!(processor = %selected.id, "payment refunded");
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        id: PaymentId,
        cancel: &CancellationToken,
    ) -> Result<PaymentRecord> {
        self.load(&id, cancel).await
    }

    pub async fn list_payments(
        &self,
        filter: &PaymentFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<PaymentRecord>> {
        self.guarded(cancel, "repository", async {
            self.repository.list(filter).await.map_err(PaymentError::from)
        })
        .await
    }

    /// Moves a rejected payment to `failed`. A save failure here is logged and
    /// reported through `failure_recorded`, never in place of the processor
    /// error.
    async fn record_failure(
        &self,
        mut payment: PaymentRecord,
        selected: &SelectedProcessor,
        source: ProcessorError,
        cancel: &CancellationToken,
    ) -> PaymentError {
        warn!(processor = %selected.id, error = %source, "authorization rejected");

        let failure_recorded = match payment.mark_failed() {
            Ok(()) => {
                payment.advance(Utc::now());
                match self.save(&payment, cancel).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, "could not persist failed status");
                        false
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "could not mark payment failed");
                false
            }
        };

        PaymentError::AuthorizationFailed {
            id: payment.id(),
            source,
            failure_recorded,
        }
    }

    async fn route(&self, payment: &PaymentRecord) -> Result<SelectedProcessor> {
        Ok(self.router.select_processor(payment).await?)
    }

    async fn owner(&self, payment: &PaymentRecord) -> Result<SelectedProcessor> {
        Ok(self.router.processor_for(payment).await?)
    }

    async fn load(&self, id: &PaymentId, cancel: &CancellationToken) -> Result<PaymentRecord> {
        self.guarded(cancel, "repository", async {
            self.repository.get(id).await.map_err(PaymentError::from)
        })
        .await?
        .ok_or(PaymentError::NotFound(*id))
    }

    async fn save(&self, payment: &PaymentRecord, cancel: &CancellationToken) -> Result<()> {
        self.guarded(cancel, "repository", async {
            self.repository.save(payment).await.map_err(PaymentError::from)
        })
        .await
    }

    async fn call_processor<F>(
        &self,
        cancel: &CancellationToken,
        id: PaymentId,
        operation: PaymentOperation,
        call: F,
    ) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), ProcessorError>>,
    {
        self.guarded(cancel, "processor", async { Ok::<_, PaymentError>(call.await) })
            .await?
            .map_err(|source| PaymentError::ProcessorRejected {
                id,
                operation,
                source,
            })
    }

    /// Runs one I/O call under the caller's cancellation token and the
    /// configured timeout.
    async fn guarded<T, F>(
        &self,
        cancel: &CancellationToken,
        boundary: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.config.io_timeout() {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(PaymentError::DeadlineExceeded(boundary)),
                },
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PaymentError::Cancelled(boundary)),
            result = bounded => result,
        }
    }
}
