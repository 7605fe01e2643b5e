use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::Lock;
use super::Semaphore;

/// 条件变量。每个等待者睡在自己的信号量上；
/// 入队发生在锁内，放锁与入睡之间不会丢唤醒。
pub struct Condition {
    queue: Mutex<VecDeque<Arc<Semaphore>>>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// 原子地放开 `lock` 并睡去；醒来后重新拿回 `lock`
    pub fn wait(&self, lock: &Lock) {
        assert!(lock.is_held_by_current_thread());

        let semaphore = Arc::new(Semaphore::new(0));
        self.queue.lock().unwrap().push_back(semaphore.clone());

        lock.release();
        semaphore.p();
        lock.acquire();
    }

    /// 叫醒一个等待者
    pub fn signal(&self, lock: &Lock) {
        assert!(lock.is_held_by_current_thread());

        if let Some(semaphore) = self.queue.lock().unwrap().pop_front() {
            semaphore.v();
        }
    }

    /// 叫醒全部等待者
    pub fn broadcast(&self, lock: &Lock) {
        assert!(lock.is_held_by_current_thread());

        while let Some(semaphore) = self.queue.lock().unwrap().pop_front() {
            semaphore.v();
        }
    }
}
