use crate::domain::payment::{PaymentFilter, PaymentId, PaymentRecord};
use crate::domain::ports::PaymentRepository;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory payment repository.
///
/// Uses `Arc<RwLock<HashMap<PaymentId, PaymentRecord>>>` to allow shared concurrent access.
/// The version check and the insert happen under one write guard, so
/// concurrent saves of the same id are linearizable.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, PaymentRecord>>>,
}

impl InMemoryPaymentRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Checks that `payment` is exactly one version ahead of what is stored.
pub(crate) fn check_version(
    payment: &PaymentRecord,
    stored: Option<u64>,
) -> Result<(), StorageError> {
    let found = stored.unwrap_or(0);
    let expected = payment.version().saturating_sub(1);
    if found == expected {
        Ok(())
    } else {
        Err(StorageError::Conflict {
            id: payment.id(),
            expected,
            found,
        })
    }
}

/// Sorts by creation time, then id, so listings are stable.
pub(crate) fn sort_listing(payments: &mut [PaymentRecord]) {
    payments.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn save(&self, payment: &PaymentRecord) -> Result<(), StorageError> {
        let mut payments = self.payments.write().await;
        check_version(payment, payments.get(&payment.id()).map(|p| p.version()))?;
        payments.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn get(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, StorageError> {
        let payments = self.payments.read().await;
        Ok(payments.get(id).cloned())
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>, StorageError> {
        let payments = self.payments.read().await;
        let mut matching: Vec<PaymentRecord> = payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        sort_listing(&mut matching);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Currency;
    use crate::domain::payment::{NewPayment, PaymentMethod, PaymentStatus};
    use chrono::{Duration, Utc};

    fn payment(currency: &str) -> PaymentRecord {
        let request = NewPayment::new(100, currency, PaymentMethod::new("card")).unwrap();
        PaymentRecord::new(request, Utc::now())
    }

    #[tokio::test]
    async fn test_in_memory_repository_round_trip() {
        let repo = InMemoryPaymentRepository::new();
        let record = payment("USD");

        repo.save(&record).await.unwrap();
        let retrieved = repo.get(&record.id()).await.unwrap().unwrap();
        assert_eq!(retrieved, record);

        assert!(repo.get(&PaymentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_save_is_a_conflict() {
        let repo = InMemoryPaymentRepository::new();
        let mut record = payment("USD");
        repo.save(&record).await.unwrap();

        let stale = record.clone();
        record.advance(Utc::now());
        repo.save(&record).await.unwrap();

        let err = repo.save(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 0,
                found: 2,
                ..
            }
        ));
        assert_eq!(repo.get(&record.id()).await.unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn test_skipped_version_is_a_conflict() {
        let repo = InMemoryPaymentRepository::new();
        let mut record = payment("USD");
        record.advance(Utc::now());
        assert!(matches!(
            repo.save(&record).await,
            Err(StorageError::Conflict { found: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let repo = InMemoryPaymentRepository::new();
        let usd = payment("USD");
        let eur = payment("EUR");
        repo.save(&usd).await.unwrap();
        repo.save(&eur).await.unwrap();

        let all = repo.list(&PaymentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at() <= all[1].created_at());

        let only_eur = repo
            .list(&PaymentFilter::default().with_currency(Currency::new("EUR").unwrap()))
            .await
            .unwrap();
        assert_eq!(only_eur, vec![eur]);

        let none = repo
            .list(&PaymentFilter::default().with_status(PaymentStatus::Refunded))
            .await
            .unwrap();
        assert!(none.is_empty());

        let future = Utc::now() + Duration::hours(1);
        let none = repo
            .list(&PaymentFilter::default().created_between(future, future + Duration::hours(1)))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
