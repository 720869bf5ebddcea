//! Subscription registry keyed by SID
//!
//! The registry is the only way an inbound notification is matched to the
//! ZonePlayer and service it belongs to. Mutating methods are crate-private:
//! the subscription manager and its renewal tasks are the sole writers, the
//! callback dispatcher and public callers only read.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::types::{ServiceTag, Subscription, SubscriptionState};

/// Thread-safe map from subscription ID to [`Subscription`].
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Arc<DashMap<String, Subscription>>,
    /// `(udn, tag)` pairs with a SUBSCRIBE in flight
    reserved: Arc<DashSet<(String, ServiceTag)>>,
    /// Woken whenever a SID is added
    inserted: Arc<Notify>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the subscription registered under `sid`.
    pub fn get(&self, sid: &str) -> Option<Subscription> {
        self.subscriptions.get(sid).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.subscriptions.contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Snapshot of every registered subscription.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Subscriptions held against one ZonePlayer.
    pub fn for_zone_player(&self, udn: &str) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.zone_player_udn == udn)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Claim `(udn, tag)` for a new SUBSCRIBE.
    ///
    /// Fails while another SUBSCRIBE for the pair is in flight or an active
    /// subscription already covers it. A successful claim must be handed
    /// back with [`release`](Self::release) once the request has finished.
    pub(crate) fn reserve(&self, udn: &str, tag: ServiceTag) -> bool {
        if !self.reserved.insert((udn.to_string(), tag)) {
            return false;
        }

        // Inserts happen before release, so a finished SUBSCRIBE is visible here
        let active = self
            .subscriptions
            .iter()
            .any(|entry| entry.zone_player_udn == udn && entry.service_tag == tag && entry.is_active());
        if active {
            self.release(udn, tag);
            return false;
        }
        true
    }

    pub(crate) fn release(&self, udn: &str, tag: ServiceTag) {
        self.reserved.remove(&(udn.to_string(), tag));
    }

    /// Register a subscription, replacing any lapsed one for the same
    /// ZonePlayer and service.
    pub(crate) fn insert(&self, subscription: Subscription) {
        self.subscriptions.retain(|_, existing| {
            !(existing.state == SubscriptionState::Lapsed
                && existing.zone_player_udn == subscription.zone_player_udn
                && existing.service_tag == subscription.service_tag)
        });
        self.subscriptions
            .insert(subscription.subscription_id.clone(), subscription);
        self.inserted.notify_waiters();
    }

    /// Resolves on the next insert or re-key.
    ///
    /// Registered as soon as it is created, so check the registry after
    /// calling this and before awaiting.
    pub(crate) fn inserted(&self) -> Notified<'_> {
        self.inserted.notified()
    }

    /// Record a successful renewal, moving the entry if the SID changed.
    ///
    /// Returns `false` if `sid` is no longer registered.
    pub(crate) fn renewed(&self, sid: &str, new_sid: &str, granted: Duration) -> bool {
        if sid == new_sid {
            return match self.subscriptions.get_mut(sid) {
                Some(mut entry) => {
                    entry.granted_timeout = granted;
                    entry.state = SubscriptionState::Active;
                    true
                }
                None => false,
            };
        }

        match self.subscriptions.remove(sid) {
            Some((_, mut subscription)) => {
                subscription.subscription_id = new_sid.to_string();
                subscription.granted_timeout = granted;
                subscription.state = SubscriptionState::Active;
                self.subscriptions.insert(new_sid.to_string(), subscription);
                self.inserted.notify_waiters();
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_lapsed(&self, sid: &str) {
        if let Some(mut entry) = self.subscriptions.get_mut(sid) {
            entry.state = SubscriptionState::Lapsed;
        }
    }

    pub(crate) fn remove(&self, sid: &str) -> Option<Subscription> {
        self.subscriptions.remove(sid).map(|(_, subscription)| subscription)
    }

    /// Remove and return every subscription.
    pub(crate) fn drain(&self) -> Vec<Subscription> {
        let sids: Vec<String> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        sids.iter().filter_map(|sid| self.remove(sid)).collect()
    }
}
