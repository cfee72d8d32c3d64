use super::in_memory::{check_version, sort_listing};
use crate::domain::payment::{PaymentFilter, PaymentId, PaymentRecord};
use crate::domain::ports::PaymentRepository;
use crate::error::StorageError;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteOptions};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column Family for storing payment records.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent payment repository backed by RocksDB.
///
/// Records are stored as JSON under the 16 raw bytes of their id. Writes are
/// synced to the WAL before `save` returns. A process-local mutex spans the
/// version read and the put, which makes compare-and-set linearizable for a
/// single process holding the database.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBPaymentRepository {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBPaymentRepository {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "payments" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, StorageError> {
        let cf = self.payments_cf()?;
        match self.db.get_pinned_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn payments_cf(&self) -> Result<&ColumnFamily, StorageError> {
        self.db.cf_handle(CF_PAYMENTS).ok_or_else(|| {
            StorageError::Backend(Box::new(std::io::Error::other(
                "Payments column family not found",
            )))
        })
    }
}

#[async_trait]
impl PaymentRepository for RocksDBPaymentRepository {
    async fn save(&self, payment: &PaymentRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let stored = self.read(&payment.id())?.map(|p| p.version());
        check_version(payment, stored)?;

        let cf = self.payments_cf()?;
        let value = serde_json::to_vec(payment)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db
            .put_cf_opt(cf, payment.id().as_bytes(), value, &write_opts)?;

        debug!(payment_id = %payment.id(), version = payment.version(), "payment persisted");
        Ok(())
    }

    async fn get(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, StorageError> {
        self.read(id)
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>, StorageError> {
        let cf = self.payments_cf()?;

        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let payment: PaymentRecord = serde_json::from_slice(&value)?;
            if filter.matches(&payment) {
                payments.push(payment);
            }
        }

        sort_listing(&mut payments);
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{NewPayment, PaymentMethod, PaymentStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    fn payment() -> PaymentRecord {
        let request = NewPayment::new(2500, "EUR", PaymentMethod::new("sepa_debit")).unwrap();
        PaymentRecord::new(request, Utc::now())
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let repo = RocksDBPaymentRepository::open(dir.path()).expect("Failed to open RocksDB");
        assert!(repo.db.cf_handle(CF_PAYMENTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_round_trip_and_conflict() {
        let dir = tempdir().unwrap();
        let repo = RocksDBPaymentRepository::open(dir.path()).unwrap();

        let mut record = payment();
        repo.save(&record).await.unwrap();
        let stale = record.clone();

        record.advance(Utc::now());
        repo.save(&record).await.unwrap();
        assert_eq!(repo.get(&record.id()).await.unwrap().unwrap(), record);

        assert!(matches!(
            repo.save(&stale).await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(repo.get(&PaymentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_list_survives_reopen() {
        let dir = tempdir().unwrap();
        let record = payment();
        {
            let repo = RocksDBPaymentRepository::open(dir.path()).unwrap();
            repo.save(&record).await.unwrap();
        }

        let repo = RocksDBPaymentRepository::open(dir.path()).unwrap();
        let pending = repo
            .list(&PaymentFilter::default().with_status(PaymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending, vec![record]);
    }
}
