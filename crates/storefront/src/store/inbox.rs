//! Account-scoped data pushed to the buyer: order history and notifications.

use oja_core::{Notification, NotificationId, Order};

use super::StoreEvent;

/// Notifications for one account, keyed by id and kept newest first.
#[derive(Debug, Default, Clone)]
pub struct Inbox {
    notifications: Vec<Notification>,
}

impl Inbox {
    /// Add fetched rows, skipping ones already held.
    pub fn merge(&mut self, rows: Vec<Notification>) {
        for row in rows {
            self.insert(row);
        }
    }

    /// Add a notification. Returns `false` if one with the same id is held.
    pub fn insert(&mut self, notification: Notification) -> bool {
        if self.notifications.iter().any(|n| n.id == notification.id) {
            return false;
        }
        let at = self
            .notifications
            .iter()
            .position(|n| n.created_at < notification.created_at)
            .unwrap_or(self.notifications.len());
        self.notifications.insert(at, notification);
        true
    }

    /// Flip one notification to read. Returns `false` if it was unknown or
    /// already read.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        self.notifications
            .iter_mut()
            .find(|n| n.id == id && !n.is_read)
            .is_some_and(|n| {
                n.is_read = true;
                true
            })
    }

    /// Flip every held notification to read, returning how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut flipped = 0;
        for n in self.notifications.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            flipped += 1;
        }
        flipped
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }
}

/// Orders and notifications of the signed-in account.
#[derive(Debug, Default)]
pub(crate) struct AccountData {
    pub(crate) orders: Vec<Order>,
    pub(crate) inbox: Inbox,
}

impl AccountData {
    pub(crate) fn clear(&mut self) {
        self.orders.clear();
        self.inbox.clear();
    }

    /// Fold a pushed row into the held state.
    pub(crate) fn apply(&mut self, event: crate::backend::ChangeEvent) -> Option<StoreEvent> {
        use crate::backend::ChangeEvent;

        match event {
            ChangeEvent::NotificationInserted(notification) => self
                .inbox
                .insert(notification.clone())
                .then_some(StoreEvent::NotificationReceived(notification)),
            ChangeEvent::OrderUpdated(order) => {
                match self.orders.iter_mut().find(|o| o.id == order.id) {
                    Some(held) => held.clone_from(&order),
                    None => self.orders.insert(0, order.clone()),
                }
                Some(StoreEvent::OrderUpdated(order))
            }
            ChangeEvent::ProductUpdated(_) => None,
        }
    }
}
