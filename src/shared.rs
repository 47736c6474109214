use std::cmp;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::owned::Owned;
use crate::upgrade::{Promise, Upgrade, UpgradeError};

// Hidden state shared by every clone of a handle. Owns the managed value
// until teardown, which takes exactly one of two terminal paths: drop the
// value in place, or move it into an Owned and fulfill the promise.
//
struct ControlBlock<T> {
    value: ManuallyDrop<T>,
    upgraded: AtomicBool,
    promise: Promise<Owned<T>>,
}

impl<T> ControlBlock<T> {
    fn new(value: T) -> Self {
        ControlBlock {
            value: ManuallyDrop::new(value),
            upgraded: AtomicBool::new(false),
            promise: Promise::new(),
        }
    }
}

impl<T> Drop for ControlBlock<T> {
    fn drop(&mut self) {
        // Runs when the last handle releases its reference. Arc's
        // release/acquire on the refcount makes every prior access to the
        // value visible here.
        //
        if self.upgraded.load(Ordering::Acquire) {
            // Safety: Drop runs once and the slot is not touched again.
            let value = unsafe { ManuallyDrop::take(&mut self.value) };

            self.promise.fulfill(Owned::new(value));
        } else {
            // No upgrade was ever requested. The promise is never touched.
            //
            // Safety: same as above.
            unsafe { ManuallyDrop::drop(&mut self.value) };
        }
    }
}

/// A reference-counted handle granting read-only access to a shared value.
///
/// `Shared<T>` enforces const access semantics: clones of a handle may be
/// spread across threads and dereferenced concurrently, but none of them can
/// mutate the managed value. The one path back to mutability is
/// [`upgrade`](Shared::upgrade), which converts shared ownership into a sole
/// [`Owned`] handle once every other holder has released its reference.
///
/// Reference counting is delegated to [`Arc`]; equality, ordering and
/// hashing are identity over the underlying control block, so handles are
/// usable as map and set keys.
///
/// # Thread Safety
///
/// Independent clones may be freely moved across threads and used
/// concurrently (`Shared<T>` is `Send + Sync` when `T` is). Write-like
/// operations on a single handle instance (`reset`, `swap`, `upgrade`) take
/// `&mut self`, so the concurrent same-instance read/write hazard of
/// classic shared-pointer libraries is ruled out by the borrow checker
/// rather than papered over with internal locking.
pub struct Shared<T> {
    data: Option<Arc<ControlBlock<T>>>,
}

impl<T> Shared<T> {
    /// Creates a handle managing `value` through a fresh control block.
    pub fn new(value: T) -> Self {
        Shared {
            data: Some(Arc::new(ControlBlock::new(value))),
        }
    }

    /// Creates an empty handle, referencing no control block.
    pub fn none() -> Self {
        Shared { data: None }
    }

    /// Returns a reference to the managed value, or `None` if the handle is
    /// empty. Never panics.
    pub fn get(&self) -> Option<&T> {
        self.data.as_ref().map(|data| &*data.value)
    }

    /// True iff this handle is the only one referencing its control block.
    /// An empty handle is trivially not shared, so `true`.
    ///
    /// The count is a point-in-time observation; a `true` result is only
    /// meaningful when other threads cannot be cloning this handle.
    pub fn is_unique(&self) -> bool {
        match &self.data {
            Some(data) => Arc::strong_count(data) == 1,
            None => true,
        }
    }

    /// Releases this handle's reference, leaving it empty. May trigger
    /// control-block teardown if this was the last reference.
    pub fn reset(&mut self) {
        self.data = None;
    }

    /// Releases the current reference and wraps `value` in a fresh control
    /// block.
    pub fn replace(&mut self, value: T) {
        self.data = Some(Arc::new(ControlBlock::new(value)));
    }

    /// Exchanges the referenced control blocks of two handles. Constant
    /// time, no allocation.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.data, &mut other.data);
    }

    /// Requests the one-shot conversion of shared ownership into sole,
    /// mutable ownership.
    ///
    /// Never blocks. Three outcomes:
    ///
    /// - Empty handle: an already-resolved `Ok` wrapping an empty [`Owned`],
    ///   with no control-block allocation.
    /// - A prior or concurrent upgrade already won the control block's flag:
    ///   an already-resolved [`UpgradeError::AlreadyInProgress`]. This
    ///   handle keeps its reference. The conflict is permanent; retrying on
    ///   any handle of the same control block fails again.
    /// - This call wins the flag: the handle releases its own reference
    ///   (as if [`reset`](Shared::reset)) and the returned [`Upgrade`]
    ///   resolves once the remaining holders release theirs, fulfilled by
    ///   whichever thread drops the last one. With no other holders left it
    ///   is already resolved on return.
    ///
    /// Exactly one `upgrade` call per control block ever succeeds,
    /// regardless of how many race.
    pub fn upgrade(&mut self) -> Upgrade<T> {
        let Some(data) = self.data.as_ref() else {
            return Upgrade::resolved(Ok(Owned::none()));
        };

        // The single synchronization point deciding the unique winner among
        // concurrent upgrade attempts.
        //
        if data
            .upgraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Upgrade::resolved(Err(UpgradeError::AlreadyInProgress));
        }

        let resolution = data.promise.subscribe();

        // Release our own reference. If it was the last one, teardown runs
        // right here and the future below is already resolved.
        //
        self.data = None;

        Upgrade::pending(resolution)
    }

    fn control_addr(&self) -> usize {
        match &self.data {
            Some(data) => Arc::as_ptr(data) as *const () as usize,
            None => 0,
        }
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::none()
    }
}

// A nullable source maps onto the empty handle, mirroring construction from
// a null pointer.
//
impl<T> From<Option<T>> for Shared<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Shared::new(value),
            None => Shared::none(),
        }
    }
}

// Implement Clone trait.
//
impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared {
            data: self.data.clone(),
        }
    }
}

// Dereferencing an empty handle is a contract violation, not a recoverable
// error. Callers must check with get() first.
//
impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.get()
            .expect("dereferenced an empty Shared handle; check get() first")
    }
}

// Equality, ordering and hashing are identity over the control block, never
// value contents. Empty handles all compare equal and order first.
//
impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.control_addr() == other.control_addr()
    }
}

impl<T> Eq for Shared<T> {}

impl<T> PartialOrd for Shared<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.control_addr().cmp(&other.control_addr())
    }
}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.control_addr().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Shared").field(value).finish(),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_get() {
        let shared = Shared::new(42);

        assert_eq!(shared.get(), Some(&42));
        assert_eq!(*shared, 42);
    }

    #[test]
    fn test_empty_handle() {
        let shared = Shared::<i32>::none();

        assert_eq!(shared.get(), None);
        assert!(shared.is_unique());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Shared::from(Some(1)).get(), Some(&1));
        assert_eq!(Shared::<i32>::from(None).get(), None);
    }

    #[test]
    fn test_swap_exchanges_control_blocks() {
        let mut a = Shared::new(1);
        let mut b = Shared::new(2);
        let a_clone = a.clone();

        a.swap(&mut b);

        assert_eq!(*a, 2);
        assert_eq!(*b, 1);
        assert_eq!(b, a_clone);
    }

    #[test]
    #[should_panic(expected = "dereferenced an empty Shared handle")]
    fn test_empty_deref_panics() {
        let shared = Shared::<i32>::none();
        let _ = *shared;
    }
}
