use crate::cache::OrderCache;
use crate::db::OrderStore;

/// Rebuild the cache from the store before the read path goes live.
///
/// Runs once at startup. A store failure here is a degraded start, not a
/// fatal one: the service comes up with an empty cache and the warning
/// tells the operator why. Returns the number of orders loaded.
pub async fn warm_replay<S: OrderStore>(store: &S, cache: &OrderCache) -> usize {
    let orders = match store.load_orders().await {
        Ok(orders) => orders,
        Err(err) => {
            tracing::warn!(error = %err, "Warm replay failed, starting with an empty cache");
            return 0;
        }
    };

    let count = orders.len();
    for order in orders {
        cache.set(order);
    }

    tracing::info!(orders = count, "Cache initialized from store");
    count
}
