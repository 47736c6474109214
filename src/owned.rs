use std::ops::{Deref, DerefMut};

/// An exclusive-ownership handle.
///
/// `Owned<T>` is the sole owner of its value and therefore permits mutable
/// access, in contrast to [`Shared`](crate::Shared) which only ever hands out
/// const views. It is the type delivered by a successful
/// [`Shared::upgrade`](crate::Shared::upgrade).
///
/// An empty `Owned` exists so that upgrading an empty `Shared` has a result
/// to resolve to.
#[derive(Debug, Default)]
pub struct Owned<T> {
    value: Option<T>,
}

impl<T> Owned<T> {
    /// Creates a handle owning `value`.
    pub fn new(value: T) -> Self {
        Owned { value: Some(value) }
    }

    /// Creates an empty handle.
    pub fn none() -> Self {
        Owned { value: None }
    }

    /// Returns a reference to the owned value, or `None` if the handle is
    /// empty. Never panics.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns a mutable reference to the owned value, or `None` if the
    /// handle is empty.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Consumes the handle and returns the owned value, if any.
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

// Dereferencing an empty handle is a contract violation, not a recoverable
// error. Callers must check with get() first.
//
impl<T> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value
            .as_ref()
            .expect("dereferenced an empty Owned handle; check get() first")
    }
}

impl<T> DerefMut for Owned<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value
            .as_mut()
            .expect("dereferenced an empty Owned handle; check get() first")
    }
}
