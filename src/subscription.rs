//! The per-connection subscription table
//!
//! Maps topic filters to callback registrations. Records are `Arc`-shared
//! so inbound dispatch can invoke callbacks after releasing the table lock;
//! a record removed mid-dispatch stays alive until the last in-flight
//! callback returns. Records remember the packet identifier of the
//! SUBSCRIBE that created them so a refused or timed-out SUBSCRIBE can
//! remove exactly what it provisionally added. Session-restored
//! subscriptions use packet identifier 0, which no SUBACK ever correlates
//! with.

use crate::topic_matching;
use crate::types::{SubscriptionCallback, SubscriptionInfo};
use crate::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Packet identifier marking a subscription restored from a previous
/// session rather than created by an in-flight SUBSCRIBE
pub(crate) const RESTORED_SESSION_ID: u16 = 0;

pub(crate) struct SubscriptionRecord {
    pub topic_filter: String,
    pub qos: QoS,
    /// Packet identifier of the SUBSCRIBE that created this record
    pub packet_id: u16,
    /// Position of the filter within that SUBSCRIBE's list
    pub order: usize,
    /// Set when the record is removed from the table; a record may outlive
    /// its removal while a dispatched callback still runs
    pub unsubscribed: AtomicBool,
    pub callback: SubscriptionCallback,
}

impl SubscriptionRecord {
    fn mark_unsubscribed(&self) {
        self.unsubscribed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("topic_filter", &self.topic_filter)
            .field("qos", &self.qos)
            .field("packet_id", &self.packet_id)
            .field("unsubscribed", &self.is_unsubscribed())
            .finish_non_exhaustive()
    }
}

/// Guarded list of subscription records
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: Mutex<Vec<Arc<SubscriptionRecord>>>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SubscriptionRecord>>> {
        self.entries.lock().expect("subscription mutex poisoned")
    }

    /// Adds records for every filter in `list`, correlated to `packet_id`.
    ///
    /// An existing record with the same filter is replaced; the broker
    /// treats a repeated SUBSCRIBE the same way.
    pub(crate) fn add_all(&self, packet_id: u16, list: &[SubscriptionInfo]) {
        let mut entries = self.entries();
        for (order, info) in list.iter().enumerate() {
            if let Some(pos) = entries
                .iter()
                .position(|r| r.topic_filter == info.topic_filter)
            {
                entries.remove(pos).mark_unsubscribed();
            }

            entries.push(Arc::new(SubscriptionRecord {
                topic_filter: info.topic_filter.clone(),
                qos: info.qos,
                packet_id,
                order,
                unsubscribed: AtomicBool::new(false),
                callback: Arc::clone(&info.callback),
            }));
        }
    }

    /// Removes every record whose filter appears in `list`
    pub(crate) fn remove_by_filters(&self, list: &[SubscriptionInfo]) {
        let mut entries = self.entries();
        entries.retain(|record| {
            let remove = list
                .iter()
                .any(|info| info.topic_filter == record.topic_filter);
            if remove {
                record.mark_unsubscribed();
            }
            !remove
        });
    }

    /// Removes records created by the SUBSCRIBE with `packet_id`
    ///
    /// With `order` set, only the record at that position in the SUBSCRIBE
    /// list is removed (a refused SUBACK return code); with `None`, all
    /// records of the packet are removed (timed-out or unscheduled
    /// SUBSCRIBE).
    pub(crate) fn remove_by_packet(&self, packet_id: u16, order: Option<usize>) {
        if packet_id == RESTORED_SESSION_ID {
            // Session-restored records are never correlated to a SUBACK.
            return;
        }

        let mut entries = self.entries();
        entries.retain(|record| {
            let remove =
                record.packet_id == packet_id && order.map_or(true, |o| record.order == o);
            if remove {
                record.mark_unsubscribed();
            }
            !remove
        });
    }

    /// Copies out the records matching `topic`
    ///
    /// The lock is released before the caller invokes any callback.
    pub(crate) fn matching(&self, topic: &str) -> Vec<Arc<SubscriptionRecord>> {
        self.entries()
            .iter()
            .filter(|record| {
                !record.is_unsubscribed() && topic_matching::matches(topic, &record.topic_filter)
            })
            .cloned()
            .collect()
    }

    /// Whether an active subscription exists for exactly `filter`
    pub(crate) fn is_subscribed(&self, filter: &str) -> bool {
        self.entries()
            .iter()
            .any(|record| !record.is_unsubscribed() && record.topic_filter == filter)
    }

    /// Number of active records
    pub(crate) fn count(&self) -> usize {
        self.entries().len()
    }

    /// Marks every record unsubscribed and empties the table
    pub(crate) fn clear(&self) {
        let mut entries = self.entries();
        for record in entries.iter() {
            record.mark_unsubscribed();
        }
        entries.clear();
    }
}
