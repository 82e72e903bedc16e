/// 测试辅助：带引用计数的测试对象和注册表
use crate::{AutoreleaseQueue, AutoreleaseQueueBuilder, Handle, ManagedObject, ObjectRegistry};
use antidote::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// 测试对象：记录引用计数、是否已销毁、是否已失效
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TestObject {
    id: u64,
    #[serde(skip)]
    refs: AtomicUsize,
    #[serde(skip)]
    destroyed: AtomicBool,
    #[serde(skip)]
    invalidated: AtomicBool,
}

impl TestObject {
    /// 创建一个常规引用计数已归零的对象（即将入队）
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            ..Default::default()
        })
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl ManagedObject for TestObject {
    fn uid(&self) -> Handle {
        Handle(self.id)
    }

    fn retain(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn final_release(&self) {
        let previous = self.refs.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "released object {} with no owner", self.id);
        if previous == 1 {
            let already = self.destroyed.swap(true, Ordering::SeqCst);
            assert!(!already, "object {} destroyed twice", self.id);
        }
    }

    fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }
}

/// 测试注册表：句柄到存活对象的映射
#[derive(Default)]
pub(crate) struct TestRegistry {
    objects: Mutex<HashMap<Handle, Arc<TestObject>>>,
}

impl TestRegistry {
    pub(crate) fn with_objects(objects: &[Arc<TestObject>]) -> Arc<Self> {
        let registry = Self::default();
        {
            let mut map = registry.objects.lock();
            for object in objects {
                map.insert(object.uid(), object.clone());
            }
        }
        Arc::new(registry)
    }
}

impl ObjectRegistry<TestObject> for TestRegistry {
    fn resolve(&self, handle: Handle) -> Option<Arc<TestObject>> {
        self.objects.lock().get(&handle).cloned()
    }
}

pub(crate) type TestQueue = AutoreleaseQueue<TestObject, TestRegistry>;

/// 不自动启动定时器的队列，清扫完全由测试手动驱动
pub(crate) fn manual_queue() -> TestQueue {
    manual_queue_with(TestRegistry::with_objects(&[]))
}

pub(crate) fn manual_queue_with(registry: Arc<TestRegistry>) -> TestQueue {
    AutoreleaseQueueBuilder::new(registry)
        .autostart(false)
        .build()
        .expect("failed to build queue")
}

/// 使用很短清扫间隔的自动队列
pub(crate) fn timed_queue(interval: Duration) -> TestQueue {
    AutoreleaseQueueBuilder::new(TestRegistry::with_objects(&[]))
        .tick_interval(interval)
        .thread_name("aqueue-test-timer")
        .build()
        .expect("failed to build queue")
}

/// 轮询直到条件成立或超时
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
