//! # 同步记录
//!
//! 每个正打开的在盘对象挂一条记录：
//! 文件记录承载读者/写者协调、句柄计数与滞后删除的记账；
//! 目录与空闲位图的记录只是一把互斥锁加一份常开的存储文件。

use std::sync::{Arc, Condvar, Mutex};

use sector_fs::File;

use crate::sync::Lock;
use crate::Error;

struct FileState {
    /// 在外的句柄数
    opened: u32,
    being_removed: bool,
    reading: u32,
    writing: bool,
    waiting_to_write: u32,
}

/// 一份正被打开的文件的协调记录
pub struct FileRecord {
    path: String,
    /// 滞后删除时凭这两样找回目录里的记录
    parent: Arc<DirRecord>,
    name: String,
    file: File,
    state: Mutex<FileState>,
    state_changed: Condvar,
}

impl FileRecord {
    /// 首次打开时建档，句柄数从 1 起步
    pub(super) fn new(path: String, parent: Arc<DirRecord>, name: String, file: File) -> Self {
        Self {
            path,
            parent,
            name,
            file,
            state: Mutex::new(FileState {
                opened: 1,
                being_removed: false,
                reading: 0,
                writing: false,
                waiting_to_write: 0,
            }),
            state_changed: Condvar::new(),
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.file.sector()
    }

    #[inline]
    pub(super) fn file(&self) -> &File {
        &self.file
    }

    #[inline]
    pub(super) fn parent(&self) -> &Arc<DirRecord> {
        &self.parent
    }

    #[inline]
    pub(super) fn name(&self) -> &str {
        &self.name
    }

    /// 又多了一个句柄。已判删除的文件不再接客。
    pub(super) fn file_opened(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.being_removed {
            return Err(Error::Busy);
        }
        state.opened += 1;
        Ok(())
    }

    /// 关掉一个句柄，返回是否已无人持有
    pub(super) fn file_closed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.opened -= 1;
        state.opened == 0
    }

    pub(super) fn set_to_remove(&self) {
        self.state.lock().unwrap().being_removed = true;
    }

    pub fn ready_to_remove(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.being_removed && state.opened == 0
    }

    /// 读者进场。写者在场或在排队时都不进，这样写者不会被读者流饿死。
    pub fn begin_reading(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writing || state.waiting_to_write > 0 {
            state = self.state_changed.wait(state).unwrap();
        }
        state.reading += 1;
    }

    pub fn finish_reading(&self) {
        let mut state = self.state.lock().unwrap();
        state.reading -= 1;
        if state.reading == 0 {
            self.state_changed.notify_all();
        }
    }

    /// 写者登记排队，等场上清空后独占进场
    pub fn begin_writing(&self) {
        let mut state = self.state.lock().unwrap();
        state.waiting_to_write += 1;
        while state.writing || state.reading > 0 {
            state = self.state_changed.wait(state).unwrap();
        }
        state.waiting_to_write -= 1;
        state.writing = true;
    }

    pub fn finish_writing(&self) {
        let mut state = self.state.lock().unwrap();
        state.writing = false;
        self.state_changed.notify_all();
    }

    /// 诊断与测试用：当前的 (读者数, 写者在场, 排队写者数)
    pub fn rw_state(&self) -> (u32, bool, u32) {
        let state = self.state.lock().unwrap();
        (state.reading, state.writing, state.waiting_to_write)
    }
}

/// 目录或空闲位图的协调记录。
/// 改动它守护的对象时要握着 `lock` 走完整个操作。
pub struct DirRecord {
    sector: u32,
    file: File,
    pub lock: Lock,
}

impl DirRecord {
    pub(super) fn new(file: File) -> Self {
        Self {
            sector: file.sector(),
            file,
            lock: Lock::new(),
        }
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    #[inline]
    pub(super) fn file(&self) -> &File {
        &self.file
    }
}
