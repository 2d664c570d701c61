use std::time::Duration;

use log::*;
use merchant_common::Timestamp;
use merchant_engine::{InventoryApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the inventory lock expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, locks whose expiry has passed are released: wallet locks at the end of their requested duration,
/// and the locks of unpaid orders once the pay deadline is over.
pub fn start_lock_expiry_worker(api: InventoryApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    // A zero period would make the interval panic.
    let interval = interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Inventory lock expiry worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running inventory lock expiry job");
            match api.expire_locks(Timestamp::now()).await {
                Ok(0) => {},
                Ok(n) => info!("🕰️ {n} expired inventory lock(s) released"),
                Err(e) => error!("🕰️ Error running inventory lock expiry job: {e}"),
            }
        }
    })
}
