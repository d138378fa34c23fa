use std::sync::Arc;

use boxoffice_core::{Clock, OrderId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::Order;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountdownTick {
    Remaining { seconds: i64 },
    Expired,
}

/// Payment deadline of one order.
#[derive(Debug, Clone, Copy)]
pub struct OrderCountdown {
    order_id: OrderId,
    expires_at: DateTime<Utc>,
}

impl OrderCountdown {
    pub fn new(order_id: OrderId, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            order_id,
            expires_at: created_at + ttl,
        }
    }

    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            expires_at: order.expires_at,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn tick(&self, now: DateTime<Utc>) -> CountdownTick {
        if self.is_expired(now) {
            CountdownTick::Expired
        } else {
            CountdownTick::Remaining {
                seconds: self.remaining(now).num_seconds(),
            }
        }
    }

    /// Publish the remaining time every `period` until the deadline passes.
    pub fn watch(self, clock: Arc<dyn Clock>, period: std::time::Duration) -> CountdownHandle {
        let (tx, rx) = watch::channel(self.tick(clock.now()));

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let tick = self.tick(clock.now());
                tx.send_replace(tick);
                if tick == CountdownTick::Expired {
                    info!("Payment window for order {} expired", self.order_id);
                    break;
                }
            }
        });

        CountdownHandle { ticks: rx, task }
    }
}

/// Running countdown. Dropping it stops the timer.
pub struct CountdownHandle {
    ticks: watch::Receiver<CountdownTick>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn current(&self) -> CountdownTick {
        *self.ticks.borrow()
    }

    pub fn ticks(&self) -> watch::Receiver<CountdownTick> {
        self.ticks.clone()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
