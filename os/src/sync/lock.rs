use std::sync::{Arc, Mutex};

use super::Semaphore;
use crate::thread;
use crate::thread::Thread;

/// 不可重入的互斥锁，带优先级捐赠：
/// 高优先级线程来等低优先级的持有者时，把持有者临时抬到自己的优先级，
/// 持有者释放时恢复原样。
pub struct Lock {
    semaphore: Semaphore,
    holder: Mutex<Option<Arc<Thread>>>,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    pub fn new() -> Self {
        Self {
            semaphore: Semaphore::new(1),
            holder: Mutex::new(None),
        }
    }

    pub fn acquire(&self) {
        assert!(!self.is_held_by_current_thread(), "lock is not reentrant");

        let me = thread::current();
        if let Some(holder) = &*self.holder.lock().unwrap() {
            if holder.priority() < me.priority() {
                holder.set_priority(me.priority());
            }
        }

        self.semaphore.p();
        *self.holder.lock().unwrap() = Some(me);
    }

    pub fn release(&self) {
        assert!(
            self.is_held_by_current_thread(),
            "released by a thread that does not hold it"
        );

        thread::current().restore_priority();
        *self.holder.lock().unwrap() = None;
        self.semaphore.v();
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.holder
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|holder| Arc::ptr_eq(holder, &thread::current()))
    }
}
