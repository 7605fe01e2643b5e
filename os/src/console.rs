//! # 同步控制台
//!
//! 半双工的字符设备裹上两重协调：信号量等设备的中断
//! （读到一个字符 / 写完一个字符），两把方向锁让并发的
//! 读与写各自成串，字符不相互穿插。

use std::sync::Arc;

use crate::sync::{Lock, Semaphore};

/// 字符设备驱动特质。中断一侧由设备的驱动线程通过
/// [`SynchConsole::read_avail`] 与 [`SynchConsole::write_done`] 投递。
pub trait CharDevice: Send + Sync {
    /// 取走已就绪的输入字符
    fn get_char(&self) -> u8;

    /// 开始输出一个字符
    fn put_char(&self, ch: u8);
}

pub struct SynchConsole {
    device: Arc<dyn CharDevice>,
    read_avail: Semaphore,
    write_done: Semaphore,
    read_lock: Lock,
    write_lock: Lock,
}

impl SynchConsole {
    pub fn new(device: Arc<dyn CharDevice>) -> Self {
        Self {
            device,
            read_avail: Semaphore::new(0),
            write_done: Semaphore::new(0),
            read_lock: Lock::new(),
            write_lock: Lock::new(),
        }
    }

    /// 设备中断：有输入字符就绪了
    pub fn read_avail(&self) {
        self.read_avail.v();
    }

    /// 设备中断：上一个输出字符写完了
    pub fn write_done(&self) {
        self.write_done.v();
    }

    pub fn read_char(&self) -> u8 {
        self.read_avail.p();
        self.device.get_char()
    }

    pub fn write_char(&self, ch: u8) {
        self.device.put_char(ch);
        self.write_done.p();
    }

    /// 读一行：到换行或装满为止。返回的计数不含换行符，
    /// 换行符也不落进缓冲区。
    pub fn read_buffer(&self, buf: &mut [u8]) -> usize {
        self.read_lock.acquire();
        let mut count = 0;
        while count < buf.len() {
            let ch = self.read_char();
            if ch == b'\n' {
                break;
            }
            buf[count] = ch;
            count += 1;
        }
        self.read_lock.release();
        count
    }

    /// 整段写出，中途不让别的写者插进来
    pub fn write_buffer(&self, buf: &[u8]) {
        self.write_lock.acquire();
        for &ch in buf {
            self.write_char(ch);
        }
        self.write_lock.release();
    }
}
