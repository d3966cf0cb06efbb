//! Batch Context
//!
//! A per-thread buffer of deferred writes. While a [`BatchScope`] is open on
//! a thread, writes issued on that thread are appended to the buffer instead
//! of being sent. The runtime turns the buffer into one logged batch when the
//! outermost scope finishes.
//!
//! Buffers are keyed by runtime instance: a write to one instance is never
//! queued in a batch another instance opened. Other threads never see the
//! buffer. Nested scopes for the same instance on the same thread do not
//! open a buffer of their own; their writes land in the outer one.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::value::Value;

/// A write waiting for its batch to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub cql: String,
    pub values: Vec<Value>,
}

impl PendingWrite {
    pub fn new(cql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            cql: cql.into(),
            values,
        }
    }
}

thread_local! {
    /// Open batches on this thread, one per runtime instance
    static BUFFERS: RefCell<Vec<(u64, Vec<PendingWrite>)>> = const { RefCell::new(Vec::new()) };
}

/// True when `owner` is collecting a batch on this thread
pub fn is_active(owner: u64) -> bool {
    BUFFERS.with(|buffers| buffers.borrow().iter().any(|(id, _)| *id == owner))
}

/// Append a write to `owner`'s batch on this thread. Hands the write back
/// when `owner` has no batch open here.
pub fn enqueue(owner: u64, write: PendingWrite) -> Result<(), PendingWrite> {
    BUFFERS.with(|buffers| {
        match buffers.borrow_mut().iter_mut().find(|(id, _)| *id == owner) {
            Some((_, pending)) => {
                pending.push(write);
                Ok(())
            }
            None => Err(write),
        }
    })
}

/// Number of writes `owner` has buffered on this thread
pub fn pending(owner: u64) -> usize {
    BUFFERS.with(|buffers| {
        buffers
            .borrow()
            .iter()
            .find(|(id, _)| *id == owner)
            .map_or(0, |(_, pending)| pending.len())
    })
}

fn take(owner: u64) -> Option<Vec<PendingWrite>> {
    BUFFERS.with(|buffers| {
        let mut buffers = buffers.borrow_mut();
        let index = buffers.iter().position(|(id, _)| *id == owner)?;
        Some(buffers.swap_remove(index).1)
    })
}

/// Ownership of one instance's batch buffer on this thread.
///
/// The buffer is removed when the scope is finished or dropped, so a unit
/// of work that fails or panics never leaks writes into the next batch.
#[derive(Debug)]
pub struct BatchScope {
    owner: u64,
    // Bound to the thread whose buffer it owns.
    _thread: PhantomData<*const ()>,
}

impl BatchScope {
    /// Install a buffer for `owner` on this thread. `None` when one is
    /// already installed; the caller is then nested inside that batch.
    pub fn open(owner: u64) -> Option<Self> {
        BUFFERS.with(|buffers| {
            let mut buffers = buffers.borrow_mut();
            if buffers.iter().any(|(id, _)| *id == owner) {
                return None;
            }
            buffers.push((owner, Vec::new()));
            Some(Self {
                owner,
                _thread: PhantomData,
            })
        })
    }

    /// Close the scope and take the collected writes, in issue order.
    pub fn finish(self) -> Vec<PendingWrite> {
        take(self.owner).unwrap_or_default()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        take(self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;
    use std::thread;

    const OWNER: u64 = 7;

    fn write(n: i32) -> PendingWrite {
        PendingWrite::new("INSERT INTO t (k) VALUES (?)", vec![Value::Int(n)])
    }

    #[test]
    fn test_enqueue_without_scope_hands_back() {
        assert!(!is_active(OWNER));
        assert_eq!(enqueue(OWNER, write(1)), Err(write(1)));
    }

    #[test]
    fn test_nested_scope_shares_buffer() {
        let outer = BatchScope::open(OWNER).unwrap();
        enqueue(OWNER, write(1)).unwrap();
        assert!(BatchScope::open(OWNER).is_none());
        enqueue(OWNER, write(2)).unwrap();
        assert_eq!(pending(OWNER), 2);

        let writes = outer.finish();
        assert_eq!(writes, vec![write(1), write(2)]);
        assert!(!is_active(OWNER));
    }

    #[test]
    fn test_drop_clears_buffer() {
        let result = panic::catch_unwind(|| {
            let _scope = BatchScope::open(OWNER).unwrap();
            enqueue(OWNER, write(1)).unwrap();
            panic!("unit of work failed");
        });
        assert!(result.is_err());
        assert!(!is_active(OWNER));
        assert_eq!(pending(OWNER), 0);
    }

    #[test]
    fn test_buffer_is_per_thread() {
        let scope = BatchScope::open(OWNER).unwrap();
        enqueue(OWNER, write(1)).unwrap();
        let other = thread::spawn(|| (is_active(OWNER), enqueue(OWNER, write(2)).is_err()))
            .join()
            .unwrap();
        assert_eq!(other, (false, true));
        assert_eq!(scope.finish().len(), 1);
    }

    #[test]
    fn test_buffers_are_per_owner() {
        let first = BatchScope::open(1).unwrap();
        enqueue(1, write(1)).unwrap();
        assert!(!is_active(2));
        assert_eq!(enqueue(2, write(2)), Err(write(2)));

        let second = BatchScope::open(2).unwrap();
        enqueue(2, write(3)).unwrap();
        assert_eq!(second.finish(), vec![write(3)]);
        assert!(is_active(1));
        assert_eq!(first.finish(), vec![write(1)]);
    }
}
