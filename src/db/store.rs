use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Persistence Layer - transactional order store
// ============================================================================
//
// Two operations back the whole pipeline: a transactional four-table write
// and a full read-back used by the startup warm replay. Both sides key the
// child rows on the header's generated id; order_uid stays a purely
// external identifier.
//
// Idempotency policy: the header insert uses ON CONFLICT (order_uid)
// DO NOTHING, so the first write for an order_uid wins. A republish of the
// same id - identical or not - reports SkippedDuplicate without touching
// any table.
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a successful `insert_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Header and all child rows were written.
    Inserted,
    /// The order_uid already existed; nothing was written.
    SkippedDuplicate,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist the order atomically, or report that its id was seen before.
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError>;

    /// Read back every persisted order with its delivery, payment and items.
    async fn load_orders(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
impl<S: OrderStore + ?Sized> OrderStore for std::sync::Arc<S> {
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        (**self).insert_order(order).await
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).load_orders().await
    }
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query(
            "INSERT INTO order_info (order_uid, track_number, entry, locale, \
             internal_signature, customer_id, delivery_service, shardkey, sm_id, \
             date_created, oof_shard) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (order_uid) DO NOTHING \
             RETURNING id",
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .fetch_optional(&mut *tx)
        .await?;

        let order_id: i64 = match header {
            Some(row) => row.try_get("id")?,
            None => {
                // Conflict on order_uid: first write wins, nothing to undo.
                tx.rollback().await?;
                return Ok(InsertOutcome::SkippedDuplicate);
            }
        };

        sqlx::query(
            "INSERT INTO delivery (order_id, d_name, phone, zip, city, address, region, email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order_id)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO payment (order_id, p_transaction, request_id, currency, provider, \
             amount, payment_dt, bank, delivery_cost, goods_total, custom_fee) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order_id)
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO items (order_id, chrt_id, track_number, price, rid, i_name, \
                 sale, i_size, total_price, nm_id, brand, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(order_id)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
        let header_rows = sqlx::query(
            "SELECT id, order_uid, track_number, entry, locale, internal_signature, \
             customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard \
             FROM order_info",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut headers = Vec::with_capacity(header_rows.len());
        for row in header_rows {
            let id: i64 = row.try_get("id")?;
            let order = Order {
                order_uid: row.try_get("order_uid")?,
                track_number: row.try_get("track_number")?,
                entry: row.try_get("entry")?,
                locale: row.try_get("locale")?,
                internal_signature: row.try_get("internal_signature")?,
                customer_id: row.try_get("customer_id")?,
                delivery_service: row.try_get("delivery_service")?,
                shardkey: row.try_get("shardkey")?,
                sm_id: row.try_get("sm_id")?,
                date_created: row.try_get("date_created")?,
                oof_shard: row.try_get("oof_shard")?,
                ..Order::default()
            };
            headers.push((id, order));
        }

        let delivery_rows = sqlx::query(
            "SELECT order_id, d_name, phone, zip, city, address, region, email FROM delivery",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries = Vec::with_capacity(delivery_rows.len());
        for row in delivery_rows {
            let order_id: i64 = row.try_get("order_id")?;
            let delivery = Delivery {
                name: row.try_get("d_name")?,
                phone: row.try_get("phone")?,
                zip: row.try_get("zip")?,
                city: row.try_get("city")?,
                address: row.try_get("address")?,
                region: row.try_get("region")?,
                email: row.try_get("email")?,
            };
            deliveries.push((order_id, delivery));
        }

        let payment_rows = sqlx::query(
            "SELECT order_id, p_transaction, request_id, currency, provider, amount, \
             payment_dt, bank, delivery_cost, goods_total, custom_fee FROM payment",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut payments = Vec::with_capacity(payment_rows.len());
        for row in payment_rows {
            let order_id: i64 = row.try_get("order_id")?;
            let payment = Payment {
                transaction: row.try_get("p_transaction")?,
                request_id: row.try_get("request_id")?,
                currency: row.try_get("currency")?,
                provider: row.try_get("provider")?,
                amount: row.try_get("amount")?,
                payment_dt: row.try_get("payment_dt")?,
                bank: row.try_get("bank")?,
                delivery_cost: row.try_get("delivery_cost")?,
                goods_total: row.try_get("goods_total")?,
                custom_fee: row.try_get("custom_fee")?,
            };
            payments.push((order_id, payment));
        }

        let item_rows = sqlx::query(
            "SELECT order_id, chrt_id, track_number, price, rid, i_name, sale, i_size, \
             total_price, nm_id, brand, status FROM items",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in item_rows {
            let order_id: i64 = row.try_get("order_id")?;
            let item = Item {
                chrt_id: row.try_get("chrt_id")?,
                track_number: row.try_get("track_number")?,
                price: row.try_get("price")?,
                rid: row.try_get("rid")?,
                name: row.try_get("i_name")?,
                sale: row.try_get("sale")?,
                size: row.try_get("i_size")?,
                total_price: row.try_get("total_price")?,
                nm_id: row.try_get("nm_id")?,
                brand: row.try_get("brand")?,
                status: row.try_get("status")?,
            };
            items.push((order_id, item));
        }

        Ok(assemble_orders(headers, deliveries, payments, items))
    }
}

/// Join child rows onto their headers by the internal header id.
///
/// Headers with no delivery or payment row keep default-valued nested
/// structs and no item rows means an empty items vector. Child rows whose
/// order_id matches no header are dropped.
fn assemble_orders(
    headers: Vec<(i64, Order)>,
    deliveries: Vec<(i64, Delivery)>,
    payments: Vec<(i64, Payment)>,
    items: Vec<(i64, Item)>,
) -> Vec<Order> {
    let mut orders: Vec<Order> = Vec::with_capacity(headers.len());
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(headers.len());

    for (id, order) in headers {
        index.insert(id, orders.len());
        orders.push(order);
    }

    for (order_id, delivery) in deliveries {
        if let Some(&i) = index.get(&order_id) {
            orders[i].delivery = delivery;
        }
    }

    for (order_id, payment) in payments {
        if let Some(&i) = index.get(&order_id) {
            orders[i].payment = payment;
        }
    }

    for (order_id, item) in items {
        if let Some(&i) = index.get(&order_id) {
            orders[i].items.push(item);
        }
    }

    orders
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{InsertOutcome, OrderStore, StoreError};
    use crate::models::Order;

    /// In-memory stand-in for the Postgres store. Mirrors the
    /// first-write-wins policy so pipeline tests can observe the
    /// store/cache divergence directly.
    #[derive(Default)]
    pub(crate) struct MockStore {
        orders: Mutex<Vec<Order>>,
        fail: AtomicBool,
        pub(crate) insert_calls: AtomicUsize,
    }

    impl MockStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn preloaded(orders: Vec<Order>) -> Self {
            Self {
                orders: Mutex::new(orders),
                ..Self::default()
            }
        }

        pub(crate) fn failing() -> Self {
            let store = Self::default();
            store.fail.store(true, Ordering::SeqCst);
            store
        }

        /// Direct read of what the store kept for an id, bypassing the cache.
        pub(crate) fn stored(&self, order_uid: &str) -> Option<Order> {
            self.orders
                .lock()
                .unwrap()
                .iter()
                .find(|order| order.order_uid == order_uid)
                .cloned()
        }
    }

    #[async_trait]
    impl OrderStore for MockStore {
        async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }

            let mut orders = self.orders.lock().unwrap();
            if orders.iter().any(|stored| stored.order_uid == order.order_uid) {
                return Ok(InsertOutcome::SkippedDuplicate);
            }
            orders.push(order.clone());
            Ok(InsertOutcome::Inserted)
        }

        async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(self.orders.lock().unwrap().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_order;

    fn header(id: i64, order_uid: &str) -> (i64, Order) {
        let mut order = sample_order(order_uid);
        order.delivery = Delivery::default();
        order.payment = Payment::default();
        order.items.clear();
        (id, order)
    }

    #[test]
    fn test_assemble_orders_joins_children_by_header_id() {
        let full = sample_order("A");
        let mut second_item = full.items[0].clone();
        second_item.chrt_id = 555;

        let orders = assemble_orders(
            vec![header(1, "A"), header(2, "B")],
            vec![(1, full.delivery.clone())],
            vec![(1, full.payment.clone())],
            vec![(1, full.items[0].clone()), (1, second_item.clone())],
        );

        assert_eq!(orders.len(), 2);

        let a = &orders[0];
        assert_eq!(a.order_uid, "A");
        assert_eq!(a.delivery, full.delivery);
        assert_eq!(a.payment, full.payment);
        assert_eq!(a.items, vec![full.items[0].clone(), second_item]);

        // B has no child rows: zero-valued nested structs, no items.
        let b = &orders[1];
        assert_eq!(b.order_uid, "B");
        assert_eq!(b.delivery, Delivery::default());
        assert_eq!(b.payment, Payment::default());
        assert!(b.items.is_empty());
    }

    #[test]
    fn test_assemble_orders_drops_orphan_child_rows() {
        let full = sample_order("A");

        let orders = assemble_orders(
            vec![header(1, "A")],
            vec![(99, full.delivery.clone())],
            vec![(99, full.payment.clone())],
            vec![(99, full.items[0].clone())],
        );

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].delivery, Delivery::default());
        assert_eq!(orders[0].payment, Payment::default());
        assert!(orders[0].items.is_empty());
    }

    #[test]
    fn test_assemble_orders_preserves_header_order() {
        let orders = assemble_orders(
            vec![header(3, "third"), header(1, "first"), header(2, "second")],
            vec![],
            vec![],
            vec![],
        );

        let uids: Vec<_> = orders.iter().map(|o| o.order_uid.as_str()).collect();
        assert_eq!(uids, vec!["third", "first", "second"]);
    }
}
