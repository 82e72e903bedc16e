use crate::error::{AdmitError, PersistError, QueueError};
use crate::object::{Handle, ManagedObject};
use crate::queue::ReleaseQueue;
use crate::registry::ObjectRegistry;
use crate::sync;
use crate::time::{TICK_DURATION, TimePoint};
use crate::timer::{Sweep, TimerDriver};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_THREAD_NAME: &str = "aqueue-timer";

impl<T: ManagedObject> Sweep for ReleaseQueue<T> {
    #[inline]
    fn sweep(&self) {
        ReleaseQueue::sweep(self);
    }
}

/// Builder for configuring an [`AutoreleaseQueue`].
///
/// - `tick_interval`: wall-clock time between two sweeps. The grace period
///   stays [`LIFETIME_IN_TICKS`](crate::LIFETIME_IN_TICKS) sweeps.
/// - `autostart`: arm the timer as soon as the queue is built.
/// - `thread_name`: name of the timer thread.
///
/// # Example
/// ```
/// use autorelease::{AutoreleaseQueue, AutoreleaseQueueBuilder, Handle, ManagedObject, ObjectRegistry};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Obj;
/// impl ManagedObject for Obj {
///     fn uid(&self) -> Handle { Handle(1) }
///     fn retain(&self) {}
///     fn final_release(&self) {}
///     fn ref_count(&self) -> usize { 0 }
/// }
///
/// struct Registry;
/// impl ObjectRegistry<Obj> for Registry {
///     fn resolve(&self, _handle: Handle) -> Option<Arc<Obj>> { None }
/// }
///
/// let queue: AutoreleaseQueue<Obj, Registry> = AutoreleaseQueueBuilder::new(Arc::new(Registry))
///     .tick_interval(Duration::from_millis(50))
///     .autostart(false)
///     .build()
///     .unwrap();
/// assert!(!queue.is_running());
/// ```
///
/// 用于配置 [`AutoreleaseQueue`] 的构建器。
pub struct AutoreleaseQueueBuilder<R> {
    registry: Arc<R>,
    tick_interval: Duration,
    autostart: bool,
    thread_name: String,
}

impl<R> AutoreleaseQueueBuilder<R> {
    /// Create a builder with default settings, bound to `registry`.
    /// 创建一个带有默认设置、绑定到 `registry` 的构建器。
    #[inline]
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            tick_interval: TICK_DURATION,
            autostart: true,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }

    /// Set the wall-clock interval between two sweeps.
    ///
    /// Default: [`TICK_DURATION`] (2 seconds)
    ///
    /// 设置两次清扫之间的间隔。
    #[inline]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Whether the timer is armed right after `build()`.
    ///
    /// Default: `true`
    #[inline]
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    #[inline]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Build the queue and spawn its timer thread.
    ///
    /// 构建队列并启动定时器线程。
    pub fn build<T>(self) -> Result<AutoreleaseQueue<T, R>, QueueError>
    where
        T: ManagedObject,
        R: ObjectRegistry<T>,
    {
        let queue: Arc<ReleaseQueue<T>> = Arc::new(ReleaseQueue::new());
        let timer = TimerDriver::spawn(queue.clone(), self.tick_interval, self.thread_name)?;

        let aqueue = AutoreleaseQueue {
            timer,
            queue,
            registry: self.registry,
        };
        if self.autostart {
            aqueue.start();
        }

        debug!(interval = ?self.tick_interval, "aqueue created");
        Ok(aqueue)
    }
}

/// Prolongs the lifetime of objects whose conventional owners released them.
///
/// Admitted objects are held for a grace period and released by a background
/// timer that sweeps the queue every tick. The queue is bound to one registry,
/// which it reads only when loading the legacy format.
///
/// Lock order is fixed: the timer lock is always taken before the queue lock.
///
/// **Shutdown**: call [`clear`](Self::clear) (or let every entry expire) before
/// the registry goes away. Dropping a non-empty queue is a lifetime defect; the
/// remaining entries are invalidated rather than released.
///
/// 延长已被常规所有者释放的对象的生命周期。
/// 入队对象在宽限期内被保留，由后台定时器每个 tick 清扫并释放。
/// 锁顺序固定：先定时器锁，后队列锁。
pub struct AutoreleaseQueue<T: ManagedObject, R: ObjectRegistry<T>> {
    // Declared first: the timer thread is joined before the queue is released.
    timer: TimerDriver,
    queue: Arc<ReleaseQueue<T>>,
    registry: Arc<R>,
}

impl<T: ManagedObject, R: ObjectRegistry<T>> AutoreleaseQueue<T, R> {
    /// Create a queue with default settings and start its timer.
    #[inline]
    pub fn new(registry: Arc<R>) -> Result<Self, QueueError> {
        Self::builder(registry).build()
    }

    #[inline]
    pub fn builder(registry: Arc<R>) -> AutoreleaseQueueBuilder<R> {
        AutoreleaseQueueBuilder::new(registry)
    }

    /// Prolong the lifetime of `object`. See [`ReleaseQueue::admit`].
    #[inline]
    pub fn admit(&self, object: sync::Arc<T>, is_public: bool) -> Result<(), AdmitError> {
        self.queue.admit(object, is_public)
    }

    /// Number of objects in the queue.
    /// 队列中对象的数量。
    #[inline]
    pub fn count(&self) -> usize {
        self.queue.count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Arm the background timer.
    #[inline]
    pub fn start(&self) {
        self.timer.start();
    }

    /// Stop background sweeps.
    ///
    /// Blocks until an in-flight sweep completes; no sweep runs after this
    /// returns until the next [`start`](Self::start). Idempotent.
    ///
    /// 停止后台清扫。等待正在进行的清扫完成；返回后不会再有清扫，直到下一次 `start`。
    #[inline]
    pub fn stop(&self) {
        self.timer.stop();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    /// Run one sweep now, serialized with timer-driven sweeps.
    /// Returns the number of released objects.
    ///
    /// 立即执行一次清扫（与定时器清扫互斥），返回释放的对象数。
    pub fn tick(&self) -> usize {
        self.timer.exclusive(|| self.queue.sweep())
    }

    /// Stop the timer, release every entry and reset the tick counter.
    ///
    /// Grace periods are not honored; meant for controlled shutdown.
    pub fn clear(&self) -> usize {
        self.stop();
        self.timer.exclusive(|| self.queue.clear())
    }

    /// Invalidate every entry without releasing it. See [`ReleaseQueue::nullify`].
    pub fn nullify(&self) -> usize {
        self.timer.exclusive(|| self.queue.nullify())
    }

    #[inline]
    pub fn tick_counter(&self) -> TimePoint {
        self.queue.tick_counter()
    }

    #[inline]
    pub fn lifetime_diff(&self, stamp: TimePoint) -> TimePoint {
        self.queue.lifetime_diff(stamp)
    }

    #[inline]
    pub fn entries(&self) -> Vec<(Handle, TimePoint)> {
        self.queue.entries()
    }

    #[inline]
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Encode the queue in the current format.
    pub fn save(&self) -> Result<Vec<u8>, PersistError>
    where
        T: Serialize,
    {
        self.queue.save()
    }

    /// Replace the queue contents with a saved payload, current or legacy.
    ///
    /// Runs under the timer lock so no sweep observes a half-restored queue.
    ///
    /// 用保存的数据（当前或旧格式）替换队列内容。在定时器锁内执行。
    pub fn load(&self, bytes: &[u8]) -> Result<(), PersistError>
    where
        T: DeserializeOwned,
    {
        self.timer.exclusive(|| self.queue.load(bytes, self.registry.as_ref()))
    }
}

impl<T: ManagedObject, R: ObjectRegistry<T>> Drop for AutoreleaseQueue<T, R> {
    fn drop(&mut self) {
        self.stop();

        let remaining = self.queue.count();
        if remaining > 0 {
            error!(remaining, "aqueue dropped while not empty, invalidating entries");
            self.queue.nullify();
        }

        debug!("aqueue destroyed");
    }
}
