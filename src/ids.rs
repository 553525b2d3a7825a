//! Identity and dependency capabilities
//!
//! - [`IdGenerator`]: explicit, injectable source of monotonically increasing
//!   IDs. A process-wide instance backs experiments by default; tests use
//!   their own instance or [`IdGenerator::reset`] for isolation.
//! - [`Identifiable`]: an object exposing a stable integer ID.
//! - [`Dependent`]: an object exposing the items it depends on. Schedulers
//!   consume it polymorphically (experiments, groups, runs, tables...).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// First ID handed out by a fresh generator
pub const FIRST_ID: u64 = 1;

static EXPERIMENT_IDS: IdGenerator = IdGenerator::new();
static GROUP_IDS: IdGenerator = IdGenerator::new();
static RUN_IDS: IdGenerator = IdGenerator::new();

/// Monotonic ID source.
///
/// IDs are never reused for the lifetime of the generator unless
/// [`reset`](Self::reset) is called explicitly.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at [`FIRST_ID`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(FIRST_ID),
        }
    }

    /// Process-wide generator used by experiments built without an explicit one.
    #[must_use]
    pub fn experiments() -> &'static Self {
        &EXPERIMENT_IDS
    }

    /// Process-wide generator for experiment groups.
    #[must_use]
    pub fn groups() -> &'static Self {
        &GROUP_IDS
    }

    /// Process-wide generator for assistant runs.
    #[must_use]
    pub fn runs() -> &'static Self {
        &RUN_IDS
    }

    /// Hand out the next ID.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Peek at the ID the next call to [`next_id`](Self::next_id) will return.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Restart numbering at [`FIRST_ID`].
    ///
    /// Teardown hook for test isolation only: objects created before the
    /// reset keep their IDs, so new objects may collide with them.
    pub fn reset(&self) {
        self.next.store(FIRST_ID, Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// An object with a stable integer identifier.
pub trait Identifiable {
    /// The object's ID
    fn id(&self) -> u64;
}

impl Identifiable for u64 {
    fn id(&self) -> u64 {
        *self
    }
}

impl<T: Identifiable + ?Sized> Identifiable for Arc<T> {
    fn id(&self) -> u64 {
        (**self).id()
    }
}

impl<T: Identifiable + ?Sized> Identifiable for &T {
    fn id(&self) -> u64 {
        (**self).id()
    }
}

/// An object that depends on a collection of other objects.
pub trait Dependent<T> {
    /// The objects this one depends on
    fn depends_on(&self) -> &[T];
}

impl<T, D: Dependent<T> + ?Sized> Dependent<T> for Arc<D> {
    fn depends_on(&self) -> &[T] {
        (**self).depends_on()
    }
}

impl<T, D: Dependent<T> + ?Sized> Dependent<T> for &D {
    fn depends_on(&self) -> &[T] {
        (**self).depends_on()
    }
}
