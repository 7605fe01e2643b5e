//! # 进程
//!
//! 一个进程在内核侧的家当：句柄表与当前目录。
//! 0 号句柄接在控制台输入上，1 号接在输出上。
//! 退出状态在 [`ProcessTable`] 交接，join 的线程在那里睡。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::config::MAX_OPEN_FILES;
use crate::fs::{DirRecord, OpenFile};
use crate::memory::SpaceId;
use crate::sync::{Condition, Lock};
use crate::{Error, Kernel};

pub type Fid = usize;

/// 进程的退出状态登记处
pub struct ProcessTable {
    lock: Lock,
    exited: Condition,
    // 只在持有 lock 时碰
    states: Mutex<BTreeMap<SpaceId, ProcessState>>,
}

#[derive(Debug, Clone, Copy)]
enum ProcessState {
    Running { joinable: bool },
    Exited(i32),
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            lock: Lock::new(),
            exited: Condition::new(),
            states: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn register(&self, id: SpaceId, joinable: bool) {
        self.lock.acquire();
        self.states
            .lock()
            .unwrap()
            .insert(id, ProcessState::Running { joinable });
        self.lock.release();
    }

    pub(crate) fn exit(&self, id: SpaceId, status: i32) {
        self.lock.acquire();
        let mut states = self.states.lock().unwrap();
        match states.get(&id).copied() {
            Some(ProcessState::Running { joinable: true }) => {
                // 留下状态等人来收
                states.insert(id, ProcessState::Exited(status));
                drop(states);
                self.exited.broadcast(&self.lock);
            }
            _ => {
                states.remove(&id);
                drop(states);
            }
        }
        self.lock.release();
    }

    pub(crate) fn join(&self, id: SpaceId) -> Result<i32, Error> {
        self.lock.acquire();
        let result = loop {
            let state = self.states.lock().unwrap().get(&id).copied();
            match state {
                None | Some(ProcessState::Running { joinable: false }) => {
                    break Err(Error::InvalidArgument);
                }
                Some(ProcessState::Exited(status)) => {
                    self.states.lock().unwrap().remove(&id);
                    break Ok(status);
                }
                Some(ProcessState::Running { joinable: true }) => {
                    self.exited.wait(&self.lock);
                }
            }
        };
        self.lock.release();
        result
    }
}

/// 一个用户进程的内核侧身份
pub struct Process {
    kernel: Arc<Kernel>,
    space: SpaceId,
    handles: Mutex<[Option<Handle>; MAX_OPEN_FILES]>,
    cwd: Mutex<Arc<DirRecord>>,
}

#[derive(Clone)]
enum Handle {
    ConsoleInput,
    ConsoleOutput,
    File(Arc<OpenFile>),
}

impl Process {
    /// 新进程：0、1 号句柄接好控制台，当前目录从根出发
    pub fn new(kernel: Arc<Kernel>, space: SpaceId) -> Self {
        let cwd = kernel.file_system.root();
        Self {
            kernel,
            space,
            handles: Mutex::new(std::array::from_fn(|fid| match fid {
                0 => Some(Handle::ConsoleInput),
                1 => Some(Handle::ConsoleOutput),
                _ => None,
            })),
            cwd: Mutex::new(cwd),
        }
    }

    #[inline]
    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn create(&self, path: &str) -> Result<(), Error> {
        self.kernel.file_system.create(&self.cwd(), path, 0, false)
    }

    pub fn mkdir(&self, path: &str) -> Result<(), Error> {
        self.kernel.file_system.create(&self.cwd(), path, 0, true)
    }

    pub fn remove(&self, path: &str) -> Result<(), Error> {
        self.kernel.file_system.remove(&self.cwd(), path)
    }

    pub fn open(&self, path: &str) -> Result<Fid, Error> {
        let file = self.kernel.file_system.open(&self.cwd(), path)?;
        let mut handles = self.handles.lock().unwrap();
        let fid = handles
            .iter()
            .position(|handle| handle.is_none())
            .ok_or(Error::OutOfHandles)?;
        handles[fid] = Some(Handle::File(Arc::new(file)));
        Ok(fid)
    }

    /// 控制台句柄与空槽都不给关
    pub fn close(&self, fid: Fid) -> Result<(), Error> {
        let mut handles = self.handles.lock().unwrap();
        match handles.get(fid) {
            Some(Some(Handle::File(_))) => {
                handles[fid] = None;
                Ok(())
            }
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn read(&self, buf: &mut [u8], fid: Fid) -> Result<usize, Error> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument);
        }
        match self.handle(fid)? {
            Handle::ConsoleInput => Ok(self.kernel.console.read_buffer(buf)),
            Handle::ConsoleOutput => Err(Error::KindMismatch),
            Handle::File(file) => Ok(file.read(buf)),
        }
    }

    pub fn write(&self, buf: &[u8], fid: Fid) -> Result<usize, Error> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument);
        }
        match self.handle(fid)? {
            Handle::ConsoleInput => Err(Error::KindMismatch),
            Handle::ConsoleOutput => {
                self.kernel.console.write_buffer(buf);
                Ok(buf.len())
            }
            Handle::File(file) => file.write(buf),
        }
    }

    /// 换当前目录，目标必须是目录
    pub fn cd(&self, path: &str) -> Result<(), Error> {
        let target = self.kernel.file_system.resolve_dir(&self.cwd(), path)?;
        *self.cwd.lock().unwrap() = target;
        Ok(())
    }

    pub fn exit(&self, status: i32) {
        self.kernel.exit(self.space, status);
    }

    fn handle(&self, fid: Fid) -> Result<Handle, Error> {
        self.handles
            .lock()
            .unwrap()
            .get(fid)
            .and_then(|handle| handle.clone())
            .ok_or(Error::InvalidArgument)
    }

    fn cwd(&self) -> Arc<DirRecord> {
        self.cwd.lock().unwrap().clone()
    }
}
