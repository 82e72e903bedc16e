use crate::error::{AdmitError, PersistError};
use crate::object::{Handle, ManagedObject, QueueRef};
use crate::persist::{self, Restored};
use crate::registry::ObjectRegistry;
use crate::sync::{Arc, Mutex};
use crate::time::{LIFETIME_IN_TICKS, ONE_TICK, TimePoint, time_add, time_subtract};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

/// A queued reference together with the tick it was admitted at.
pub(crate) type Entry<T> = (QueueRef<T>, TimePoint);

/// Queue contents. Only ever touched under [`ReleaseQueue`]'s lock.
///
/// 队列内容，只在 [`ReleaseQueue`] 的锁内访问。
pub(crate) struct QueueState<T: ManagedObject> {
    /// Entries in admission order.
    /// 按入队顺序排列的条目。
    pub(crate) entries: VecDeque<Entry<T>>,
    /// Ids of every queued object; an object is queued at most once.
    /// 所有已入队对象的 id；每个对象最多入队一次。
    queued: HashSet<Handle>,
    pub(crate) tick_counter: TimePoint,
}

impl<T: ManagedObject> QueueState<T> {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            queued: HashSet::new(),
            tick_counter: 0,
        }
    }

    fn push(&mut self, object: Arc<T>, stamp: TimePoint) -> Result<(), AdmitError> {
        let uid = object.uid();
        if !self.queued.insert(uid) {
            return Err(AdmitError::AlreadyQueued(uid));
        }
        self.entries.push_back((QueueRef::new(object), stamp));
        Ok(())
    }

    /// Move every expired reference out of the queue.
    ///
    /// An entry stamped with the current tick has an age of one: ticks are
    /// counted inclusively, so `0..=4` is five whole intervals.
    ///
    /// 把所有过期引用移出队列。
    fn take_expired(&mut self) -> Vec<QueueRef<T>> {
        let now = self.tick_counter;
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());

        for (object, stamp) in self.entries.drain(..) {
            let age = time_add(time_subtract(now, stamp), ONE_TICK);
            trace!(id = %object.uid(), age, ref_count = object.ref_count(), "aqueue: inspect");

            if age >= LIFETIME_IN_TICKS {
                self.queued.remove(&object.uid());
                expired.push(object);
            } else {
                kept.push_back((object, stamp));
            }
        }

        self.entries = kept;
        expired
    }

    fn take_all(&mut self) -> VecDeque<Entry<T>> {
        self.queued.clear();
        std::mem::take(&mut self.entries)
    }
}

/// The deferred-release queue itself, without a timer.
///
/// Holds one ownership share of every admitted object. Each [`sweep`](Self::sweep)
/// releases the entries whose grace period ran out and advances the tick
/// counter. [`AutoreleaseQueue`](crate::AutoreleaseQueue) drives sweeps from a
/// background timer; `ReleaseQueue` can also be driven by hand.
///
/// 延迟释放队列本身（不含定时器）。
/// 持有每个入队对象的一份所有权；每次 `sweep` 释放宽限期已过的条目并推进计数器。
pub struct ReleaseQueue<T: ManagedObject> {
    state: Mutex<QueueState<T>>,
}

impl<T: ManagedObject> Default for ReleaseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ManagedObject> ReleaseQueue<T> {
    /// Create an empty queue with the tick counter at zero.
    /// 创建一个空队列，计数器为零。
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
        }
    }

    /// Prolong the lifetime of `object`.
    ///
    /// A public admission is stamped with the current tick and survives a full
    /// grace period of [`LIFETIME_IN_TICKS`] sweeps. A private admission is
    /// back-dated by that same amount, so it only survives until the next sweep.
    ///
    /// Fails with [`AdmitError::AlreadyQueued`] if `object` is still queued; the
    /// object's count is left untouched in that case.
    ///
    /// 延长 `object` 的生命周期。
    /// 公开入队以当前 tick 标记，存活完整宽限期；私有入队被回溯，只存活到下一次清扫。
    pub fn admit(&self, object: Arc<T>, is_public: bool) -> Result<(), AdmitError> {
        let uid = object.uid();
        debug!(id = %uid, public = is_public, "aqueue: admit");

        let mut state = self.state.lock();
        let stamp = if is_public {
            state.tick_counter
        } else {
            time_subtract(state.tick_counter, LIFETIME_IN_TICKS)
        };
        state.push(object, stamp)
    }

    /// Number of queued entries.
    /// 队列中条目的数量。
    pub fn count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Current value of the tick counter.
    pub fn tick_counter(&self) -> TimePoint {
        self.state.lock().tick_counter
    }

    /// Ticks elapsed since `stamp`, i.e. `tick_counter - stamp` with wraparound.
    pub fn lifetime_diff(&self, stamp: TimePoint) -> TimePoint {
        time_subtract(self.tick_counter(), stamp)
    }

    /// Snapshot of `(id, admission tick)` for every entry, in queue order.
    pub fn entries(&self) -> Vec<(Handle, TimePoint)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(object, stamp)| (object.uid(), *stamp))
            .collect()
    }

    /// Release every expired entry, then advance the tick counter by one.
    ///
    /// Expired references are moved out under the lock and released after it
    /// is dropped, so an object's teardown never runs while the queue is locked.
    /// Returns the number of released entries.
    ///
    /// 释放所有过期条目，然后把计数器加一。
    /// 过期引用在锁内移出、锁外释放。返回释放的条目数。
    pub fn sweep(&self) -> usize {
        let expired = {
            let mut state = self.state.lock();
            let expired = state.take_expired();
            state.tick_counter = time_add(state.tick_counter, ONE_TICK);
            expired
        };

        let released = expired.len();
        debug!(released, "aqueue: objects released");
        drop(expired);
        released
    }

    /// Drop every entry without honoring grace periods and reset the counter.
    ///
    /// Only meant for controlled shutdown. Returns the number of released entries.
    ///
    /// 不考虑宽限期，清空所有条目并重置计数器。仅用于受控关闭。
    pub fn clear(&self) -> usize {
        let drained = {
            let mut state = self.state.lock();
            state.tick_counter = 0;
            state.take_all()
        };

        let released = drained.len();
        drop(drained);
        released
    }

    /// Invalidate every entry without releasing it, leaving the queue empty.
    ///
    /// Used when the surrounding system is already torn down and a regular
    /// release would reach destroyed collaborators.
    ///
    /// 使所有条目失效但不释放，并清空队列。
    pub fn nullify(&self) -> usize {
        let drained = self.state.lock().take_all();
        let invalidated = drained.len();
        for (object, _) in drained {
            object.nullify();
        }
        invalidated
    }

    /// Encode the tick counter and all entries in the current format.
    /// 以当前格式编码计数器和所有条目。
    pub fn save(&self) -> Result<Vec<u8>, PersistError>
    where
        T: Serialize,
    {
        let state = self.state.lock();
        persist::encode(state.tick_counter, &state.entries)
    }

    /// Replace the queue contents with a saved payload.
    ///
    /// Both the current and the legacy format are accepted; `registry` is only
    /// used to bind entries to live objects: the current format falls back to
    /// rebuilding an object the registry does not know, the legacy format drops
    /// it. No share is taken before the payload is accepted. Previously queued
    /// references are released once the new contents are in place.
    ///
    /// 用保存的数据替换队列内容。
    /// 接受当前格式和旧格式；`registry` 只用于解析旧格式中的原始句柄。
    pub fn load<R>(&self, bytes: &[u8], registry: &R) -> Result<(), PersistError>
    where
        T: DeserializeOwned,
        R: ObjectRegistry<T> + ?Sized,
    {
        let restored = persist::decode::<T>(bytes)?.normalize(registry);
        let previous = self.replace(restored)?;
        drop(previous);
        Ok(())
    }

    /// Objects currently held by the queue, in queue order.
    #[cfg(test)]
    pub(crate) fn objects(&self) -> Vec<Arc<T>> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(object, _)| object.as_arc().clone())
            .collect()
    }

    fn replace(&self, restored: Restored<T>) -> Result<VecDeque<Entry<T>>, PersistError> {
        let mut queued = HashSet::with_capacity(restored.entries.len());
        for (object, _) in &restored.entries {
            let uid = object.uid();
            if !queued.insert(uid) {
                return Err(PersistError::DuplicateEntry(uid));
            }
        }

        let entries = restored
            .entries
            .into_iter()
            .map(|(object, stamp)| (QueueRef::new(object), stamp))
            .collect();

        let mut state = self.state.lock();
        state.queued = queued;
        state.tick_counter = restored.tick_counter;
        Ok(std::mem::replace(&mut state.entries, entries))
    }
}
