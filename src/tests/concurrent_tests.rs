/// 并发测试模块
/// 测试多个变更线程与定时器线程同时访问队列
use super::support::{TestObject, manual_queue, timed_queue, wait_until};
use crate::{LIFETIME_IN_TICKS, ManagedObject};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// 测试1: 多个线程并发入队不同对象
#[test]
fn test_concurrent_admissions_distinct_objects() {
    let queue = Arc::new(manual_queue());
    let mut handles = vec![];

    for t in 0..8u64 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            let objects: Vec<_> = (0..100).map(|i| TestObject::new(t * 1000 + i)).collect();
            for (i, object) in objects.iter().enumerate() {
                queue.admit(object.clone(), i % 2 == 0).unwrap();
            }
            objects
        }));
    }

    let objects: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(queue.count(), 800);

    // 第一次清扫释放全部私有条目
    assert_eq!(queue.tick(), 400);
    for _ in 1..LIFETIME_IN_TICKS {
        queue.tick();
    }
    assert_eq!(queue.count(), 0);
    assert!(objects.iter().all(|o| o.is_destroyed()));
}

/// 测试2: 多个线程同时入队同一对象，只有一个成功
#[test]
fn test_concurrent_duplicate_admission() {
    let queue = Arc::new(manual_queue());
    let object = TestObject::new(1);
    let accepted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = queue.clone();
            let object = object.clone();
            let accepted = accepted.clone();
            thread::spawn(move || {
                if queue.admit(object, true).is_ok() {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(queue.count(), 1);
    assert_eq!(object.ref_count(), 1);
    queue.clear();
}

/// 测试3: 定时器运行期间并发入队，最终全部被释放
#[test]
fn test_admissions_while_timer_runs() {
    let queue = Arc::new(timed_queue(Duration::from_millis(2)));
    let mut handles = vec![];

    for t in 0..4u64 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            let mut objects = Vec::new();
            for i in 0..250 {
                let object = TestObject::new(t * 1000 + i);
                queue.admit(object.clone(), i % 3 == 0).unwrap();
                objects.push(object);
                if i % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            objects
        }));
    }

    let objects: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()));
    assert!(objects.iter().all(|o| o.is_destroyed()));
}

/// 测试4: 读取 count 的线程与清扫并发
#[test]
fn test_count_concurrent_with_sweeps() {
    let queue = Arc::new(manual_queue());
    for i in 0..100 {
        queue.admit(TestObject::new(i), false).unwrap();
    }

    let reader = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut last = usize::MAX;
            for _ in 0..1000 {
                let count = queue.count();
                // 没有新的入队，count 只能减少
                assert!(count <= last);
                last = count;
            }
        })
    };

    queue.tick();
    reader.join().unwrap();
    assert_eq!(queue.count(), 0);
}

/// 测试5: 其他线程持有的引用在出队后仍然有效
#[test]
fn test_reacquired_reference_outlives_eviction() {
    let queue = Arc::new(manual_queue());
    let object = TestObject::new(7);
    queue.admit(object.clone(), false).unwrap();

    // 并发子系统在清扫之前重新获取对象
    let worker = {
        let object = object.clone();
        object.retain();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            assert!(!object.is_destroyed());
            object.final_release();
        })
    };

    queue.tick();
    assert!(!object.is_destroyed());

    worker.join().unwrap();
    assert!(object.is_destroyed());
}
