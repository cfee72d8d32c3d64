#![allow(dead_code)]

use async_trait::async_trait;
use payflow::application::engine::PaymentEngine;
use payflow::application::router::ProcessorRouter;
use payflow::domain::money::Amount;
use payflow::domain::payment::{
    NewPayment, PaymentFilter, PaymentId, PaymentMethod, PaymentRecord,
};
use payflow::domain::ports::{Authorization, PaymentRepository, Processor, Settlement};
use payflow::error::{ProcessorError, StorageError};
use payflow::infrastructure::in_memory::InMemoryPaymentRepository;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A processor with scripted answers that counts every call.
pub struct StubProcessor {
    authorization: Mutex<Result<Authorization, ProcessorError>>,
    capture_result: Mutex<Result<(), ProcessorError>>,
    delay: Option<Duration>,
    authorize_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl StubProcessor {
    fn with_authorization(authorization: Result<Authorization, ProcessorError>) -> Self {
        Self {
            authorization: Mutex::new(authorization),
            capture_result: Mutex::new(Ok(())),
            delay: None,
            authorize_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        }
    }

    /// Authorizes without capturing.
    pub fn authorizing(external_id: &str) -> Self {
        Self::with_authorization(Ok(Authorization {
            external_id: external_id.to_string(),
            settlement: Settlement::AuthorizedOnly,
        }))
    }

    /// Authorizes and captures in one step.
    pub fn settling(external_id: &str) -> Self {
        Self::with_authorization(Ok(Authorization {
            external_id: external_id.to_string(),
            settlement: Settlement::Settled,
        }))
    }

    pub fn declining(reason: &str) -> Self {
        Self::with_authorization(Err(ProcessorError::Declined(reason.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_captures(&self, error: ProcessorError) {
        *self.capture_result.lock().unwrap() = Err(error);
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Processor for StubProcessor {
    async fn authorize(&self, _payment: &PaymentRecord) -> Result<Authorization, ProcessorError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.authorization.lock().unwrap().clone()
    }

    async fn capture(&self, _payment_id: &PaymentId, _amount: Amount) -> Result<(), ProcessorError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.capture_result.lock().unwrap().clone()
    }

    async fn refund(&self, _payment_id: &PaymentId, _amount: Amount) -> Result<(), ProcessorError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(())
    }
}

/// Wraps the in-memory repository and starts failing saves on demand.
#[derive(Clone, Default)]
pub struct FlakyRepository {
    inner: InMemoryPaymentRepository,
    saves: Arc<AtomicUsize>,
    /// Saves numbered at or above this fail. Zero disables.
    fail_from: Arc<AtomicUsize>,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`th save (1-based, counted from creation) and all later ones fail.
    pub fn fail_saves_from(&self, n: usize) {
        self.fail_from.store(n, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryPaymentRepository {
        &self.inner
    }
}

#[async_trait]
impl PaymentRepository for FlakyRepository {
    async fn save(&self, payment: &PaymentRecord) -> Result<(), StorageError> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_from = self.fail_from.load(Ordering::SeqCst);
        if fail_from != 0 && n >= fail_from {
            return Err(StorageError::Backend(Box::new(std::io::Error::other(format!(
                "save #{} refused",
                n
            )))));
        }
        self.inner.save(payment).await
    }

    async fn get(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, StorageError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>, StorageError> {
        self.inner.list(filter).await
    }
}

pub fn card_payment(amount: u64, currency: &str) -> NewPayment {
    NewPayment::new(
        amount,
        currency,
        PaymentMethod::card("4242424242424242", "12", "2030", "123"),
    )
    .unwrap()
}

/// An engine whose router has a single processor registered as the default.
pub async fn engine_with<R>(repository: R, processor: Arc<StubProcessor>) -> PaymentEngine
where
    R: PaymentRepository + 'static,
{
    let router = ProcessorRouter::new("stub");
    router.register_processor("stub", processor).await.unwrap();
    PaymentEngine::new(Box::new(repository), Arc::new(router))
}
