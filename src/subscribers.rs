//! Instrumentation Bus
//!
//! Subscribers are called with a [`Message`] for every statement the runtime
//! sends to the cluster.
//!
//! ## Copy-on-write
//! The subscriber list is an immutable snapshot behind an `ArcSwap`. Writers
//! (`add`, `remove`, `clear`) build a new list under a mutex and swap it in;
//! notification loads the current snapshot without locking, so a subscriber
//! added or removed mid-notification never disturbs that notification.
//!
//! ## Hierarchy
//! A set created with [`Subscribers::child`] also notifies its parent's
//! subscribers, after its own. A per-table set can chain onto the
//! process-wide set this way.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam::channel::{unbounded, Receiver};
use parking_lot::Mutex;
use tracing::warn;

use crate::statement::Message;

/// A callback registered on a subscriber set
pub type Subscriber<M = Message> = Arc<dyn Fn(&M) + Send + Sync>;

/// A copy-on-write set of subscribers with an optional parent
pub struct Subscribers<M = Message> {
    local: ArcSwap<Vec<Subscriber<M>>>,
    /// Serializes writers; readers never take it
    writer: Mutex<()>,
    parent: Option<Arc<Subscribers<M>>>,
}

fn same<M>(a: &Subscriber<M>, b: &Subscriber<M>) -> bool {
    // Compare data pointers only; vtable addresses are not unique.
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<M> Subscribers<M> {
    pub fn new() -> Self {
        Self {
            local: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            parent: None,
        }
    }

    /// An empty set whose notifications also reach `parent`
    pub fn child(parent: Arc<Subscribers<M>>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    pub fn parent(&self) -> Option<&Arc<Subscribers<M>>> {
        self.parent.as_ref()
    }

    pub fn add(&self, subscriber: Subscriber<M>) {
        let _writer = self.writer.lock();
        let mut next = Vec::clone(&self.local.load());
        next.push(subscriber);
        self.local.store(Arc::new(next));
    }

    /// Register a closure, returning the handle needed to remove it.
    pub fn subscribe<F>(&self, callback: F) -> Subscriber<M>
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        let subscriber: Subscriber<M> = Arc::new(callback);
        self.add(Arc::clone(&subscriber));
        subscriber
    }

    /// Remove a local subscriber. The parent is never touched.
    pub fn remove(&self, subscriber: &Subscriber<M>) -> bool {
        let _writer = self.writer.lock();
        let current = self.local.load_full();
        let next: Vec<_> = current
            .iter()
            .filter(|existing| !same(existing, subscriber))
            .cloned()
            .collect();
        let removed = next.len() != current.len();
        if removed {
            self.local.store(Arc::new(next));
        }
        removed
    }

    /// Remove all local subscribers
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        self.local.store(Arc::new(Vec::new()));
    }

    /// Local subscribers plus everything reachable through the parent
    pub fn len(&self) -> usize {
        self.local.load().len() + self.parent.as_ref().map_or(0, |parent| parent.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `subscriber` is registered on this set itself
    pub fn contains(&self, subscriber: &Subscriber<M>) -> bool {
        self.local
            .load()
            .iter()
            .any(|existing| same(existing, subscriber))
    }

    /// The current local list
    pub fn snapshot(&self) -> Arc<Vec<Subscriber<M>>> {
        self.local.load_full()
    }

    /// Visit local subscribers, then the parent's
    pub fn for_each(&self, mut visit: impl FnMut(&Subscriber<M>)) {
        self.for_each_dyn(&mut visit);
    }

    fn for_each_dyn(&self, visit: &mut dyn FnMut(&Subscriber<M>)) {
        let snapshot = self.local.load_full();
        for subscriber in snapshot.iter() {
            visit(subscriber);
        }
        if let Some(parent) = &self.parent {
            parent.for_each_dyn(visit);
        }
    }

    /// Deliver `message` to every subscriber. A panicking subscriber is
    /// logged and skipped.
    pub fn notify(&self, message: &M) {
        self.for_each(|subscriber| {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| subscriber(message)));
            if delivered.is_err() {
                warn!("instrumentation subscriber panicked; message dropped for it");
            }
        });
    }
}

impl<M> Default for Subscribers<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Subscribers<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("local", &self.local.load().len())
            .field("parent", &self.parent)
            .finish()
    }
}

/// A subscriber that forwards every message to a channel, for observers
/// that consume on another thread. Sends after the receiver is gone are
/// dropped.
pub fn channel() -> (Subscriber<Message>, Receiver<Message>) {
    let (sender, receiver) = unbounded();
    let subscriber: Subscriber<Message> = Arc::new(move |message: &Message| {
        let _ = sender.send(message.clone());
    });
    (subscriber, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Subscriber<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscriber: Subscriber<u32> = Arc::new(move |_: &u32| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, subscriber)
    }

    #[test]
    fn test_add_remove() {
        let set = Subscribers::<u32>::new();
        let (_, subscriber) = counter();
        set.add(Arc::clone(&subscriber));
        assert!(set.contains(&subscriber));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&subscriber));
        assert!(!set.remove(&subscriber));
        assert!(set.is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_during_mutation() {
        let set = Subscribers::<u32>::new();
        let (_, first) = counter();
        set.add(Arc::clone(&first));
        let snapshot = set.snapshot();
        set.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let set = Subscribers::<u32>::new();
        set.subscribe(|_: &u32| panic!("boom"));
        let (count, subscriber) = counter();
        set.add(subscriber);
        set.notify(&7);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
