//! Tests for the Instrumentation Bus
//!
//! These tests verify:
//! - Adding, removing and clearing subscribers
//! - Parent/child subscriber hierarchies
//! - One message per statement sent, including failed sends
//! - Panicking subscribers do not affect results

#![cfg(feature = "memory")]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cassie::driver::memory::Failure;
use cassie::subscribers::channel;
use cassie::{Consistency, Statement, Subscriber, Subscribers, Value};
use common::{insert_thing, record_messages, setup, TABLE};
use parking_lot::Mutex;

// =============================================================================
// Helper Functions
// =============================================================================

/// A subscriber that appends every payload to `sink`
fn collector(sink: &Arc<Mutex<Vec<&'static str>>>) -> Subscriber<&'static str> {
    let sink = Arc::clone(sink);
    Arc::new(move |payload: &&'static str| sink.lock().push(*payload))
}

fn sink() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// =============================================================================
// Subscriber Set Tests
// =============================================================================

#[test]
fn test_add_and_remove_subscribers() {
    let subscribers = Subscribers::<&'static str>::new();
    assert!(subscribers.is_empty());

    let data_1 = sink();
    let data_2 = sink();
    let subscriber_1 = collector(&data_1);
    let subscriber_2 = collector(&data_2);
    subscribers.add(Arc::clone(&subscriber_1));
    subscribers.add(Arc::clone(&subscriber_2));

    assert!(!subscribers.is_empty());
    assert_eq!(subscribers.len(), 2);
    assert!(subscribers.contains(&subscriber_1));
    assert!(subscribers.contains(&subscriber_2));

    subscribers.notify(&"payload");
    assert_eq!(*data_1.lock(), vec!["payload"]);
    assert_eq!(*data_2.lock(), vec!["payload"]);

    subscribers.remove(&subscriber_2);
    assert_eq!(subscribers.len(), 1);
    assert!(subscribers.contains(&subscriber_1));
    assert!(!subscribers.contains(&subscriber_2));

    subscribers.notify(&"more");
    assert_eq!(*data_1.lock(), vec!["payload", "more"]);
    assert_eq!(*data_2.lock(), vec!["payload"]);

    subscribers.remove(&subscriber_1);
    assert_eq!(subscribers.len(), 0);
}

#[test]
fn test_subscriber_hierarchy() {
    let subscribers_1 = Arc::new(Subscribers::<&'static str>::new());
    let subscribers_2 = Subscribers::child(Arc::clone(&subscribers_1));
    let subscribers_3 = Subscribers::child(Arc::clone(&subscribers_1));

    let data_1 = sink();
    let data_2 = sink();
    subscribers_1.add(collector(&data_1));
    subscribers_2.add(collector(&data_2));

    assert_eq!(subscribers_1.len(), 1);
    assert_eq!(subscribers_2.len(), 2);
    assert_eq!(subscribers_3.len(), 1);

    subscribers_1.notify(&"payload_1");
    subscribers_2.notify(&"payload_2");
    subscribers_3.notify(&"payload_3");

    assert_eq!(*data_1.lock(), vec!["payload_1", "payload_2", "payload_3"]);
    assert_eq!(*data_2.lock(), vec!["payload_2"]);

    subscribers_2.clear();
    assert_eq!(subscribers_2.len(), 1);
    subscribers_1.clear();
    assert_eq!(subscribers_2.len(), 0);
}

#[test]
fn test_removing_child_subscriber_keeps_parent() {
    let parent = Arc::new(Subscribers::<&'static str>::new());
    let child = Subscribers::child(Arc::clone(&parent));
    let parent_data = sink();
    let child_data = sink();
    let parent_subscriber = collector(&parent_data);
    let child_subscriber = collector(&child_data);
    parent.add(Arc::clone(&parent_subscriber));
    child.add(Arc::clone(&child_subscriber));

    assert!(!child.remove(&parent_subscriber));
    assert!(child.remove(&child_subscriber));
    assert_eq!(child.len(), 1);

    child.notify(&"after");
    assert_eq!(*parent_data.lock(), vec!["after"]);
    assert!(child_data.lock().is_empty());
}

#[test]
fn test_for_each_visits_local_then_parent() {
    let parent = Arc::new(Subscribers::<&'static str>::new());
    let child = Subscribers::child(Arc::clone(&parent));
    let order = sink();
    let parent_subscriber = collector(&order);
    let child_subscriber = collector(&order);
    parent.add(Arc::clone(&parent_subscriber));
    child.add(Arc::clone(&child_subscriber));

    let mut visited = Vec::new();
    child.for_each(|subscriber| {
        visited.push(Arc::ptr_eq(subscriber, &child_subscriber));
    });
    assert_eq!(visited, vec![true, false]);
}

#[test]
fn test_adding_during_notification_does_not_disturb_it() {
    let subscribers = Arc::new(Subscribers::<&'static str>::new());
    let data = sink();
    let late = collector(&data);

    let adder = Arc::clone(&subscribers);
    let late_clone = Arc::clone(&late);
    subscribers.subscribe(move |_: &&'static str| adder.add(Arc::clone(&late_clone)));

    subscribers.notify(&"first");
    assert!(data.lock().is_empty());
    assert!(subscribers.contains(&late));
}

// =============================================================================
// Runtime Message Tests
// =============================================================================

#[test]
fn test_message_per_execute() {
    let (_cluster, cassie) = setup();
    cassie.set_default_consistency(Consistency::LocalOne);
    let messages = record_messages(&cassie);

    cassie
        .execute(
            "SELECT owner, id, val FROM things WHERE owner = ?",
            vec![Value::Int(1)],
            None,
        )
        .unwrap();
    {
        let messages = messages.lock();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert!(matches!(message.statement(), Statement::Prepared(_)));
        assert_eq!(message.options().arguments(), &[Value::Int(1)]);
        assert_eq!(message.options().consistency, Some(Consistency::LocalOne));
        assert!(message.elapsed_time() < Duration::from_secs(5));
    }

    cassie
        .execute("SELECT owner, id, val FROM things WHERE owner = 1", vec![], None)
        .unwrap();
    {
        let messages = messages.lock();
        assert_eq!(messages.len(), 2);
        let message = &messages[1];
        assert!(matches!(message.statement(), Statement::Simple(_)));
        assert!(message.options().arguments.is_none());
        assert_eq!(message.options().consistency, Some(Consistency::LocalOne));
    }
}

#[test]
fn test_one_message_per_batch() {
    let (_cluster, cassie) = setup();
    let messages = record_messages(&cassie);

    cassie
        .batch(None, || {
            insert_thing(&cassie, 1, 2, "foo");
            cassie.delete(TABLE, &[("owner", Value::Int(1))], None)?;
            Ok(())
        })
        .unwrap();

    let messages = messages.lock();
    assert_eq!(messages.len(), 1);
    match messages[0].statement() {
        Statement::Batch(batch) => assert_eq!(batch.len(), 2),
        other => panic!("expected a batch, got {:?}", other),
    }
    assert_eq!(messages[0].options().consistency, None);
}

#[test]
fn test_message_sent_for_failed_execute() {
    let (cluster, cassie) = setup();
    let messages = record_messages(&cassie);
    cassie.connect().unwrap();
    cluster.inject_failure(Failure::Io);

    assert!(cassie.execute("SELECT * FROM things", vec![], None).is_err());
    assert_eq!(messages.lock().len(), 1);
}

#[test]
fn test_panicking_subscriber_does_not_break_execute() {
    let (_cluster, cassie) = setup();
    cassie
        .subscribers()
        .subscribe(|_| panic!("subscriber bug"));
    let messages = record_messages(&cassie);

    insert_thing(&cassie, 1, 2, "foo");
    let rows = cassie.execute("SELECT * FROM things", vec![], None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(messages.lock().len(), 2);
}

#[test]
fn test_channel_subscriber_delivers_to_other_thread() {
    let (_cluster, cassie) = setup();
    let (subscriber, receiver) = channel();
    cassie.subscribers().add(subscriber);

    let consumer = thread::spawn(move || {
        receiver
            .recv_timeout(Duration::from_secs(5))
            .map(|message| message.statement().cql())
    });
    cassie.execute("SELECT * FROM things", vec![], None).unwrap();
    assert_eq!(consumer.join().unwrap().unwrap(), "SELECT * FROM things");
}
