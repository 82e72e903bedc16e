//! Deferred release of reference-counted objects.
//!
//! When the last conventional owner of an object lets go, the object can be
//! handed to an [`AutoreleaseQueue`] instead of being destroyed. The queue holds
//! one ownership share for a grace period of [`LIFETIME_IN_TICKS`] sweeps
//! (about [`OBJ_LIFETIME_SECS`] seconds) and a background timer releases it
//! afterwards, so subsystems that briefly re-acquire a handle never race with
//! destruction.
//!
//! - [`ReleaseQueue`]: the queue itself, drivable by hand.
//! - [`AutoreleaseQueue`]: the queue plus its timer thread and registry binding.
//! - [`time_add`] / [`time_subtract`]: wraparound arithmetic on the tick counter.
//!
//! 引用计数对象的延迟释放。
//! 对象的最后一个常规所有者释放它时，可以将其交给 [`AutoreleaseQueue`]，
//! 队列在宽限期内持有一份所有权，之后由后台定时器释放。
//!
//! # Example
//! ```
//! use autorelease::{Handle, ManagedObject, ReleaseQueue, LIFETIME_IN_TICKS};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Obj(AtomicUsize);
//! impl ManagedObject for Obj {
//!     fn uid(&self) -> Handle { Handle(7) }
//!     fn retain(&self) { self.0.fetch_add(1, Ordering::SeqCst); }
//!     fn final_release(&self) { self.0.fetch_sub(1, Ordering::SeqCst); }
//!     fn ref_count(&self) -> usize { self.0.load(Ordering::SeqCst) }
//! }
//!
//! let queue = ReleaseQueue::new();
//! let obj = Arc::new(Obj(AtomicUsize::new(0)));
//! queue.admit(obj.clone(), true).unwrap();
//! assert_eq!(obj.ref_count(), 1);
//!
//! for _ in 0..LIFETIME_IN_TICKS {
//!     queue.sweep();
//! }
//! assert_eq!(queue.count(), 0);
//! assert_eq!(obj.ref_count(), 0);
//! ```

mod autorelease;
mod error;
mod object;
mod persist;
mod queue;
mod registry;
mod sync;
mod time;
mod timer;

pub use autorelease::{AutoreleaseQueue, AutoreleaseQueueBuilder};
pub use error::{AdmitError, PersistError, QueueError};
pub use object::{Handle, LifetimePolicy, ManagedObject, OwnedRef, QueueLifetime, QueueRef};
pub use persist::{FORMAT_VERSION, LEGACY_FORMAT_VERSION};
pub use queue::ReleaseQueue;
pub use registry::ObjectRegistry;
pub use time::{
    LIFETIME_IN_TICKS, OBJ_LIFETIME_SECS, ONE_TICK, TICK_DURATION, TICK_DURATION_SECS, TimePoint,
    time_add, time_subtract,
};

#[cfg(test)]
mod tests;
