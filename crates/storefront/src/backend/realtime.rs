//! Polling feed that turns row changes into [`ChangeEvent`]s.
//!
//! One feed task runs per [`Subscription`](super::Subscription) and is
//! aborted when the subscription is dropped. Fetch failures are logged and
//! the next tick tries again from the same point.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use oja_core::{Notification, NotificationId, Order, OrderId, Product, ProductId, UserId};

use super::rest::RestClient;
use super::{ChangeEvent, HostedStore, Topic};

/// How far back each poll reaches behind the newest row already seen.
///
/// Rows can become visible with a timestamp slightly older than one already
/// delivered (concurrent transactions, clock skew between writers).
const OVERLAP_SECS: i64 = 5;

pub(super) async fn feed(client: RestClient, topic: Topic, hub: broadcast::Sender<ChangeEvent>) {
    let mut ticker = tokio::time::interval(client.poll_every());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let start = Utc::now();
    let mut products = ProductDiff::default();
    let mut notifications = Cursor::new(start);
    let mut orders = Cursor::new(start);

    tracing::debug!(?topic, "Realtime feed started");
    loop {
        ticker.tick().await;
        let events = match topic {
            Topic::Products => poll_products(&client, &mut products).await,
            Topic::Account(user) => {
                let mut events = poll_notifications(&client, user, &mut notifications).await;
                events.extend(poll_orders(&client, Some(user), &mut orders).await);
                events
            }
            Topic::AllOrders => poll_orders(&client, None, &mut orders).await,
        };
        for event in events {
            // No receivers just means nobody is listening right now.
            let _ = hub.send(event);
        }
    }
}

async fn poll_products(client: &RestClient, diff: &mut ProductDiff) -> Vec<ChangeEvent> {
    match client.list_products().await {
        Ok(list) => diff
            .changed(list)
            .into_iter()
            .map(ChangeEvent::ProductUpdated)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Realtime product poll failed");
            Vec::new()
        }
    }
}

async fn poll_notifications(
    client: &RestClient,
    user: UserId,
    cursor: &mut Cursor<NotificationId>,
) -> Vec<ChangeEvent> {
    match client.notifications_since(user, cursor.query_from()).await {
        Ok(rows) => cursor
            .admit(rows, |n: &Notification| (n.id, n.created_at))
            .into_iter()
            .map(ChangeEvent::NotificationInserted)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, %user, "Realtime notification poll failed");
            Vec::new()
        }
    }
}

async fn poll_orders(
    client: &RestClient,
    user: Option<UserId>,
    cursor: &mut Cursor<OrderId>,
) -> Vec<ChangeEvent> {
    match client.orders_updated_since(user, cursor.query_from()).await {
        Ok(rows) => cursor
            .admit(rows, |o: &Order| (o.id, o.updated_at.unwrap_or(o.created_at)))
            .into_iter()
            .map(ChangeEvent::OrderUpdated)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, ?user, "Realtime order poll failed");
            Vec::new()
        }
    }
}

/// Product list as of the previous tick.
#[derive(Debug, Default)]
struct ProductDiff {
    seen: Option<HashMap<ProductId, Product>>,
}

impl ProductDiff {
    /// Products that are new or differ from the previous list.
    ///
    /// The first list only sets the baseline.
    fn changed(&mut self, current: Vec<Product>) -> Vec<Product> {
        let changed = self.seen.as_ref().map_or_else(Vec::new, |seen| {
            current
                .iter()
                .filter(|p| seen.get(&p.id) != Some(*p))
                .cloned()
                .collect()
        });
        self.seen = Some(current.into_iter().map(|p| (p.id.clone(), p)).collect());
        changed
    }
}

/// Read position in one timestamped stream.
///
/// Only advanced by rows that were actually fetched, so a failed poll leaves
/// it where it was. Rows already delivered inside the overlap window are
/// recognised by key and stamp and not delivered twice.
#[derive(Debug)]
struct Cursor<K> {
    newest: DateTime<Utc>,
    delivered: HashMap<K, DateTime<Utc>>,
}

impl<K: Eq + Hash + Copy> Cursor<K> {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            newest: start,
            delivered: HashMap::new(),
        }
    }

    /// Lower bound for the next query.
    fn query_from(&self) -> DateTime<Utc> {
        self.newest - TimeDelta::seconds(OVERLAP_SECS)
    }

    /// Keep the rows not delivered yet and move the cursor past them.
    fn admit<T>(&mut self, rows: Vec<T>, stamp: impl Fn(&T) -> (K, DateTime<Utc>)) -> Vec<T> {
        let mut fresh = Vec::new();
        for row in rows {
            let (key, at) = stamp(&row);
            if self.delivered.get(&key) == Some(&at) {
                continue;
            }
            self.delivered.insert(key, at);
            self.newest = self.newest.max(at);
            fresh.push(row);
        }
        let horizon = self.query_from();
        self.delivered.retain(|_, at| *at >= horizon);
        fresh
    }
}
