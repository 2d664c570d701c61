use std::fmt::Debug;

use log::*;
use merchant_common::Timestamp;

use crate::{
    db_types::ProductDetails,
    merchant_api::{
        config::EngineConfig,
        errors::MerchantError,
        inventory_objects::{LockRequest, NewProductRequest, ProductInfo},
        registry::InstanceRegistry,
    },
    traits::{InventoryManagement, ProductLock},
};

/// `InventoryApi` manages the products of each instance and the short-lived locks wallets hold on their stock.
pub struct InventoryApi<B> {
    db: B,
    registry: InstanceRegistry,
    config: EngineConfig,
}

impl<B> Debug for InventoryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InventoryApi")
    }
}

impl<B> InventoryApi<B> {
    pub fn new(db: B, registry: InstanceRegistry, config: EngineConfig) -> Self {
        Self { db, registry, config }
    }
}

impl<B> InventoryApi<B>
where B: InventoryManagement
{
    pub async fn create_product(
        &self,
        instance_id: &str,
        request: NewProductRequest,
    ) -> Result<ProductInfo, MerchantError> {
        self.registry.require(instance_id)?;
        if request.product_id.is_empty() {
            return Err(MerchantError::ParameterMissing("product_id".into()));
        }
        self.check_details(&request.details)?;
        let product = self.db.insert_product(instance_id, &request.product_id, request.details).await?;
        info!("🔒️ Product '{}' added to '{instance_id}'", product.product_id);
        Ok(ProductInfo::new(product, 0))
    }

    pub async fn product_info(&self, instance_id: &str, product_id: &str) -> Result<ProductInfo, MerchantError> {
        self.registry.require(instance_id)?;
        let (product, locked) = self
            .db
            .fetch_product(instance_id, product_id)
            .await?
            .ok_or_else(|| MerchantError::ProductNotFound(product_id.to_string()))?;
        Ok(ProductInfo::new(product, locked))
    }

    pub async fn list_product_ids(&self, instance_id: &str) -> Result<Vec<String>, MerchantError> {
        self.registry.require(instance_id)?;
        Ok(self.db.fetch_product_ids(instance_id).await?)
    }

    pub async fn update_product(
        &self,
        instance_id: &str,
        product_id: &str,
        details: ProductDetails,
    ) -> Result<ProductInfo, MerchantError> {
        self.registry.require(instance_id)?;
        self.check_details(&details)?;
        self.db.update_product(instance_id, product_id, details).await?;
        debug!("🔒️ Product '{product_id}' of '{instance_id}' updated");
        self.product_info(instance_id, product_id).await
    }

    pub async fn delete_product(&self, instance_id: &str, product_id: &str) -> Result<(), MerchantError> {
        self.registry.require(instance_id)?;
        self.db.delete_product(instance_id, product_id).await?;
        info!("🔒️ Product '{product_id}' removed from '{instance_id}'");
        Ok(())
    }

    /// Holds `quantity` units of a product for the wallet that chose `lock_uuid`. A quantity of zero releases the lock.
    pub async fn lock_product(
        &self,
        instance_id: &str,
        product_id: &str,
        request: LockRequest,
    ) -> Result<(), MerchantError> {
        self.registry.require(instance_id)?;
        if request.quantity < 0 {
            return Err(MerchantError::malformed("quantity", "must not be negative"));
        }
        if request.lock_uuid.is_empty() {
            return Err(MerchantError::ParameterMissing("lock_uuid".into()));
        }
        let lock = ProductLock {
            product_id: product_id.to_string(),
            lock_uuid: request.lock_uuid,
            quantity: request.quantity,
            duration: request.duration,
        };
        self.db.lock_product(instance_id, lock).await?;
        Ok(())
    }

    /// Drops every lock that has run out by `now`. Returns how many were removed.
    pub async fn expire_locks(&self, now: Timestamp) -> Result<u64, MerchantError> {
        let removed = self.db.expire_locks(now).await?;
        if removed > 0 {
            debug!("🔒️ {removed} expired inventory locks released");
        }
        Ok(removed)
    }

    fn check_details(&self, details: &ProductDetails) -> Result<(), MerchantError> {
        if details.price.currency() != self.config.currency {
            return Err(MerchantError::CurrencyMismatch {
                expected: self.config.currency.clone(),
                found: details.price.currency().to_string(),
            });
        }
        if details.total_stocked < -1 {
            return Err(MerchantError::malformed("total_stocked", "must be -1 (unlimited) or a stock count"));
        }
        if details.total_lost < 0 {
            return Err(MerchantError::malformed("total_lost", "must not be negative"));
        }
        Ok(())
    }
}
