//! Consistency Module
//!
//! Consistency levels and how the effective level of a call is chosen.
//!
//! ## Precedence (highest first)
//! 1. `consistency` set on the call's own options
//! 2. The thread-scoped override installed by [`with_consistency`]
//! 3. The process-wide default held by a [`ConsistencyResolver`]
//! 4. The driver's built-in default (the option is left unset)
//!
//! The scoped override lives in a thread local. Entering a scope saves the
//! previous value and a drop guard puts it back, so nesting works and the
//! value never leaks out of a scope that returns early or panics.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CassieError;

/// Replica acknowledgement policy for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Two => "two",
            Consistency::Three => "three",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
            Consistency::LocalQuorum => "local_quorum",
            Consistency::EachQuorum => "each_quorum",
            Consistency::Serial => "serial",
            Consistency::LocalSerial => "local_serial",
            Consistency::LocalOne => "local_one",
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consistency {
    type Err = CassieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_lowercase().as_str() {
            "any" => Consistency::Any,
            "one" => Consistency::One,
            "two" => Consistency::Two,
            "three" => Consistency::Three,
            "quorum" => Consistency::Quorum,
            "all" => Consistency::All,
            "local_quorum" => Consistency::LocalQuorum,
            "each_quorum" => Consistency::EachQuorum,
            "serial" => Consistency::Serial,
            "local_serial" => Consistency::LocalSerial,
            "local_one" => Consistency::LocalOne,
            other => {
                return Err(CassieError::InvalidArgument(format!(
                    "unknown consistency level: {}",
                    other
                )))
            }
        };
        Ok(level)
    }
}

// =============================================================================
// Thread-scoped override
// =============================================================================

thread_local! {
    static SCOPED: Cell<Option<Consistency>> = const { Cell::new(None) };
}

/// Restores the previous scoped value when dropped.
struct ScopeGuard {
    previous: Option<Consistency>,
}

impl ScopeGuard {
    fn enter(level: Option<Consistency>) -> Self {
        let previous = SCOPED.with(|cell| cell.replace(level));
        Self { previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPED.with(|cell| cell.set(self.previous));
    }
}

/// Run `work` with `level` as the consistency for every call on this thread
/// that does not set one explicitly.
///
/// ```
/// use cassie::{with_consistency, scoped_consistency, Consistency};
///
/// with_consistency(Consistency::One, || {
///     assert_eq!(scoped_consistency(), Some(Consistency::One));
/// });
/// assert_eq!(scoped_consistency(), None);
/// ```
pub fn with_consistency<T, F>(level: Consistency, work: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = ScopeGuard::enter(Some(level));
    work()
}

/// The override installed on this thread, if any.
pub fn scoped_consistency() -> Option<Consistency> {
    SCOPED.with(Cell::get)
}

// =============================================================================
// Resolver
// =============================================================================

/// Holds the process-wide default and applies the precedence rules.
#[derive(Debug, Default)]
pub struct ConsistencyResolver {
    default: RwLock<Option<Consistency>>,
}

impl ConsistencyResolver {
    pub fn new(default: Option<Consistency>) -> Self {
        Self {
            default: RwLock::new(default),
        }
    }

    pub fn default_level(&self) -> Option<Consistency> {
        *self.default.read()
    }

    pub fn set_default_level(&self, level: Option<Consistency>) {
        *self.default.write() = level;
    }

    /// Level used by a call that does not specify one.
    pub fn current(&self) -> Option<Consistency> {
        scoped_consistency().or_else(|| self.default_level())
    }

    /// Effective level for a call. `None` leaves the choice to the driver.
    pub fn resolve(&self, explicit: Option<Consistency>) -> Option<Consistency> {
        explicit.or_else(|| self.current())
    }
}
