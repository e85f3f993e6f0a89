//! # Voucher Provisioning
//!
//! Opens and closes campaigns. A voucher is sellable once its row exists in
//! the database and its stock counter is loaded into the key-value store.

use std::sync::Arc;

use tracing::info;

use crate::config::SeckillConfig;
use crate::error::SeckillResult;
use seckill_cache::{AdmissionGate, CacheStore};
use seckill_core::Voucher;
use seckill_db::Database;

/// Campaign setup and teardown.
#[derive(Clone)]
pub struct VoucherService {
    db: Database,
    gate: AdmissionGate,
}

impl VoucherService {
    pub fn new(db: Database, store: Arc<dyn CacheStore>, config: &SeckillConfig) -> Self {
        VoucherService {
            db,
            gate: AdmissionGate::new(store, config.queue.stream.clone()),
        }
    }

    /// Persists `voucher` and loads its stock for admission.
    ///
    /// Re-adding an existing voucher replaces its stock in both stores.
    pub async fn add_seckill_voucher(&self, voucher: &Voucher) -> SeckillResult<()> {
        voucher.validate()?;

        self.db.vouchers().upsert(voucher).await?;
        self.gate.load_stock(voucher.id, voucher.stock).await?;

        info!(
            voucher_id = voucher.id,
            stock = voucher.stock,
            begin = %voucher.begin_time,
            end = %voucher.end_time,
            "Seckill voucher added"
        );
        Ok(())
    }

    /// Clears the cached stock counter and purchase records of a finished
    /// campaign. Persisted orders are kept.
    pub async fn reset_campaign(&self, voucher_id: i64) -> SeckillResult<()> {
        self.gate.clear(voucher_id).await?;
        info!(voucher_id, "Seckill campaign reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeckillError;
    use crate::service::VoucherOrderService;
    use chrono::{Duration, Utc};
    use seckill_cache::MemoryStore;
    use seckill_db::DbConfig;

    fn voucher(id: i64, stock: i64) -> Voucher {
        let begin = Utc::now();
        Voucher {
            id,
            stock,
            begin_time: begin,
            end_time: begin + Duration::hours(2),
        }
    }

    async fn service() -> (Arc<MemoryStore>, Database, VoucherService) {
        let store = Arc::new(MemoryStore::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = VoucherService::new(db.clone(), store.clone(), &SeckillConfig::default());
        (store, db, service)
    }

    #[tokio::test]
    async fn test_add_loads_both_stores() {
        let (store, db, service) = service().await;

        service.add_seckill_voucher(&voucher(1, 100)).await.unwrap();

        assert_eq!(db.vouchers().get_by_id(1).await.unwrap().unwrap().stock, 100);
        assert_eq!(
            store.get("seckill:stock:1").await.unwrap().as_deref(),
            Some("100")
        );
    }

    #[tokio::test]
    async fn test_invalid_voucher_is_not_stored() {
        let (store, db, service) = service().await;

        let err = service.add_seckill_voucher(&voucher(1, -1)).await.unwrap_err();

        assert!(matches!(err, SeckillError::Domain(_)));
        assert!(db.vouchers().get_by_id(1).await.unwrap().is_none());
        assert!(store.get("seckill:stock:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_cached_state_only() {
        let (store, db, service) = service().await;
        service.add_seckill_voucher(&voucher(1, 10)).await.unwrap();
        VoucherOrderService::new(store.clone(), &SeckillConfig::default())
            .seckill_voucher(1, 7)
            .await
            .unwrap();

        service.reset_campaign(1).await.unwrap();

        assert!(store.get("seckill:stock:1").await.unwrap().is_none());
        assert!(!store.is_member("seckill:order:1", "7").await.unwrap());
        assert!(db.vouchers().get_by_id(1).await.unwrap().is_some());
    }
}
