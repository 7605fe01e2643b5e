use std::sync::{Condvar, Mutex};

/// 计数信号量
pub struct Semaphore {
    value: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            value: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// 等到值大于零，随即取走一个
    pub fn p(&self) {
        let mut value = self.value.lock().unwrap();
        while *value == 0 {
            value = self.available.wait(value).unwrap();
        }
        *value -= 1;
    }

    /// 放回一个，叫醒一个等待者
    pub fn v(&self) {
        *self.value.lock().unwrap() += 1;
        self.available.notify_one();
    }
}
