use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per order id. Entries are dropped once nobody holds or
/// waits on them.
#[derive(Default)]
pub struct OrderLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_id: Uuid) -> OrderGuard<'_> {
        let lock = self.locks.entry(order_id).or_default().clone();
        let guard = lock.lock_owned().await;

        OrderGuard {
            locks: self,
            order_id,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct OrderGuard<'a> {
    locks: &'a OrderLocks,
    order_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.order_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::OrderLocks;

    #[tokio::test]
    async fn second_acquire_waits_for_the_first() {
        let locks = Arc::new(OrderLocks::new());
        let order_id = Uuid::new_v4();

        let guard = locks.acquire(order_id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(order_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_orders_do_not_block_each_other() {
        let locks = OrderLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);
    }
}
