//! A reference-counted read-only handle with a one-shot upgrade to
//! exclusive ownership.
//!
//! [`Shared<T>`] lets any number of threads hold const views of one value.
//! A single holder may call [`Shared::upgrade`] to reclaim sole, mutable
//! ownership as an [`Owned<T>`]: an atomic compare-exchange picks exactly
//! one winner among racing upgraders, the call never blocks, and the
//! resulting [`Upgrade`] future resolves when the last remaining handle is
//! released. If no upgrade is ever requested, the value is simply dropped
//! with the last handle.
//!
//! ```
//! use shared_upgrade::{FutureExtension, Shared};
//!
//! let mut first = Shared::new(String::from("shared"));
//! let mut second = first.clone();
//!
//! // Both handles read; neither can mutate.
//! assert_eq!(first.get(), second.get());
//!
//! // First come, first (and only) served.
//! let upgrade = first.upgrade();
//! assert!(second.upgrade().unwrap_result().is_err());
//!
//! // The last release resolves the upgrade.
//! second.reset();
//! let mut owned = upgrade.wait_result().unwrap();
//! owned.push_str(" no more");
//! assert_eq!(owned.get(), Some(&String::from("shared no more")));
//! ```

pub mod future_extension;
pub mod owned;
pub mod shared;
pub mod upgrade;

// Re-export the handle types for convenience.
pub use future_extension::FutureExtension;
pub use owned::Owned;
pub use shared::Shared;
pub use upgrade::{Upgrade, UpgradeError};
