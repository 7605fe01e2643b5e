//! # 在册线程
//!
//! 宿主的调度器不归我们指挥，线程的优先级（以及锁的优先级捐赠）
//! 落在这里的记录上，供同步原语和测试观察。

use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub const DEFAULT_PRIORITY: u32 = 0;

pub struct Thread {
    name: String,
    /// 自带的优先级
    base: u32,
    /// 捐赠生效期间会高出 base
    effective: Mutex<u32>,
}

impl Thread {
    fn new(name: String, priority: u32) -> Self {
        Self {
            name,
            base: priority,
            effective: Mutex::new(priority),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        *self.effective.lock().unwrap()
    }

    /// 接受捐赠，临时抬高优先级
    pub(crate) fn set_priority(&self, priority: u32) {
        *self.effective.lock().unwrap() = priority;
    }

    /// 捐赠结束，回到自带的优先级
    pub(crate) fn restore_priority(&self) {
        *self.effective.lock().unwrap() = self.base;
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
}

/// 当前线程的记录；没登记过的线程首次询问时就地入册
pub fn current() -> Arc<Thread> {
    CURRENT.with(|current| {
        current
            .borrow_mut()
            .get_or_insert_with(|| {
                let name = std::thread::current()
                    .name()
                    .unwrap_or("anonymous")
                    .to_string();
                Arc::new(Thread::new(name, DEFAULT_PRIORITY))
            })
            .clone()
    })
}

/// 以给定优先级起一个在册线程
pub fn spawn(name: &str, priority: u32, f: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    let record = Arc::new(Thread::new(name.into(), priority));
    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            CURRENT.with(|current| *current.borrow_mut() = Some(record));
            f();
        })
        .expect("failed to spawn kernel thread")
}
