// Copyright 2023 Trident Foundation. All rights reserved.
// Trident is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use log::warn;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
};

pub use std::sync::mpsc::TryRecvError;

/// One subscription to a [`Feed`].
pub struct FeedReceiver<T> {
    pub id: u64,
    receiver: mpsc::Receiver<T>,
}

impl<T> FeedReceiver<T> {
    pub fn recv(&self) -> Option<T> { self.receiver.recv().ok() }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// A broadcast channel with multiple subscribers. Dropped receivers are
/// pruned on the next send.
pub struct Feed<T> {
    // Used for generating subscription ids unique to this feed.
    next_id: AtomicU64,

    // Name of the current instance.
    name: &'static str,

    // Set of subscriptions, represented as ID => Sender pairs.
    subscriptions: Mutex<BTreeMap<u64, mpsc::Sender<T>>>,
}

impl<T: Clone> Feed<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            name,
            subscriptions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn subscribe(&self) -> FeedReceiver<T> {
        let (sender, receiver) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().insert(id, sender);
        FeedReceiver { id, receiver }
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscriptions.lock().remove(&id).is_some()
    }

    pub fn num_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Deliver `t` to every live subscriber; returns whether anyone
    /// received it.
    pub fn send(&self, t: T) -> bool {
        let mut sent = false;
        let mut invalid = vec![];

        let mut subscriptions = self.subscriptions.lock();
        for (id, sender) in subscriptions.iter() {
            match sender.send(t.clone()) {
                Ok(_) => sent = true,
                Err(_) => {
                    warn!(
                        "Feed {}::{} dropped without unsubscribe",
                        self.name, id
                    );
                    invalid.push(*id);
                }
            }
        }

        for id in invalid {
            subscriptions.remove(&id);
        }

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::Feed;

    #[test]
    fn test_subscribe_send_unsubscribe() {
        let feed = Feed::<u64>::new("test-feed");

        // try send without subscribers
        assert!(!feed.send(1001));

        let rec1 = feed.subscribe();
        assert_eq!(feed.num_subscriptions(), 1);

        assert!(feed.send(1002));
        assert_eq!(rec1.recv(), Some(1002));

        let rec2 = feed.subscribe();
        assert!(feed.send(1003));
        assert_eq!(rec1.recv(), Some(1003));
        assert_eq!(rec2.recv(), Some(1003));

        assert!(feed.unsubscribe(rec1.id));
        assert_eq!(feed.num_subscriptions(), 1);

        assert!(feed.send(1004));
        assert_eq!(rec2.recv(), Some(1004));
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let feed = Feed::<u64>::new("test-feed");

        let rec1 = feed.subscribe();
        let rec2 = feed.subscribe();

        drop(rec1);
        assert_eq!(feed.num_subscriptions(), 2);

        // rec2 still receives; rec1 is pruned during the send
        assert!(feed.send(7));
        assert_eq!(feed.num_subscriptions(), 1);
        assert_eq!(rec2.recv(), Some(7));

        drop(rec2);
        assert!(!feed.send(8));
        assert_eq!(feed.num_subscriptions(), 0);
    }
}
