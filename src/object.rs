use crate::sync::Arc;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;

/// Stable numeric identity of a managed object.
///
/// This is what the registry hands out and what the legacy on-disk layout stored
/// in place of live references.
///
/// 托管对象的稳定数字标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Reference-counting contract of objects that can be handed to the queue.
///
/// The conventional owners of an object drive `retain` and their own release
/// path; when that path reaches zero it admits the object to the queue instead
/// of destroying it. The queue only ever calls [`ManagedObject::final_release`],
/// which must destroy the object at zero and never re-admit it.
///
/// 可交给队列的对象的引用计数约定。
/// 队列只调用 `final_release`，它在计数归零时销毁对象，且不能再次入队。
pub trait ManagedObject: Send + Sync + 'static {
    /// Stable identifier, used for diagnostics and duplicate detection.
    fn uid(&self) -> Handle;

    /// Take one ownership share.
    fn retain(&self);

    /// Drop one ownership share; destroys the object once no owner is left.
    fn final_release(&self);

    /// Current number of ownership shares. Diagnostics only.
    fn ref_count(&self) -> usize;

    /// Mark the object dead without tearing it down.
    ///
    /// Called when the surrounding system is being dismantled and the usual
    /// release path would touch already-destroyed collaborators.
    fn invalidate(&self) {}
}

/// Retain/release operations an [`OwnedRef`] applies to its target.
/// [`OwnedRef`] 对目标对象执行的 retain/release 操作。
pub trait LifetimePolicy<T: ?Sized> {
    fn retain(object: &T);
    fn release(object: &T);
}

/// Policy used by the queue: retain normally, release through the final path.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueLifetime;

impl<T: ManagedObject> LifetimePolicy<T> for QueueLifetime {
    #[inline]
    fn retain(object: &T) {
        object.retain();
    }

    #[inline]
    fn release(object: &T) {
        object.final_release();
    }
}

/// An owning reference whose share is managed by the policy `P`.
///
/// Creating or cloning an `OwnedRef` retains the target; dropping it releases
/// it. The `Arc` keeps the memory valid, while the policy drives the object's
/// own logical count, so destruction happens only when *every* owner let go.
///
/// 由策略 `P` 管理所有权份额的引用。
/// 创建或克隆时 retain，drop 时 release。
pub struct OwnedRef<T: ?Sized, P: LifetimePolicy<T>> {
    object: Arc<T>,
    _policy: PhantomData<fn() -> P>,
}

/// The owning reference stored by the queue.
pub type QueueRef<T> = OwnedRef<T, QueueLifetime>;

impl<T: ?Sized, P: LifetimePolicy<T>> OwnedRef<T, P> {
    /// Take one share of `object`.
    #[inline]
    pub fn new(object: Arc<T>) -> Self {
        P::retain(&object);
        Self {
            object,
            _policy: PhantomData,
        }
    }

    /// Borrow the underlying `Arc` without touching the share count.
    #[inline]
    pub fn as_arc(&self) -> &Arc<T> {
        &self.object
    }
}

impl<T: ManagedObject, P: LifetimePolicy<T>> OwnedRef<T, P> {
    /// Forget this share without releasing it, and mark the target dead.
    ///
    /// 放弃此份额但不释放，并将对象标记为失效。
    pub fn nullify(self) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once.
        let object = unsafe { std::ptr::read(&this.object) };
        object.invalidate();
    }
}

impl<T: ?Sized, P: LifetimePolicy<T>> Clone for OwnedRef<T, P> {
    #[inline]
    fn clone(&self) -> Self {
        Self::new(self.object.clone())
    }
}

impl<T: ?Sized, P: LifetimePolicy<T>> Deref for OwnedRef<T, P> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: ?Sized, P: LifetimePolicy<T>> Drop for OwnedRef<T, P> {
    #[inline]
    fn drop(&mut self) {
        P::release(&self.object);
    }
}

impl<T: ?Sized + fmt::Debug, P: LifetimePolicy<T>> fmt::Debug for OwnedRef<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedRef").field(&&*self.object).finish()
    }
}

/// A reference persists as whatever the object type serializes itself to.
///
/// There is no matching `Deserialize`: a restored reference must be bound to
/// the live object with the same id, which only the queue's registry knows.
impl<T: ?Sized + Serialize, P: LifetimePolicy<T>> Serialize for OwnedRef<T, P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (*self.object).serialize(serializer)
    }
}
