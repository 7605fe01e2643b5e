//! # 同步登记处
//!
//! 文件头扇区号 → 协调记录的有序映射，两类记录各一张表，
//! 同一把互斥罩着，只做短暂的查表与增删。
//! 根目录与空闲位图开机入驻，永不除名。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::records::{DirRecord, FileRecord};
use crate::Error;

pub(super) struct Registry {
    inner: Mutex<Inner>,
}

struct Inner {
    files: BTreeMap<u32, Arc<FileRecord>>,
    nodes: BTreeMap<u32, Arc<DirRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                files: BTreeMap::new(),
                nodes: BTreeMap::new(),
            }),
        }
    }

    /// 打开一份文件：已在档就给记录添一个句柄（判了删除的不给），
    /// 不在档就建档入册。整个决定在登记处互斥下一气呵成。
    pub fn open_file(
        &self,
        sector: u32,
        make: impl FnOnce() -> FileRecord,
    ) -> Result<Arc<FileRecord>, Error> {
        let mut inner = self.inner.lock().unwrap();
        match inner.files.get(&sector) {
            Some(record) => {
                record.file_opened()?;
                Ok(record.clone())
            }
            None => {
                let record = Arc::new(make());
                inner.files.insert(sector, record.clone());
                Ok(record)
            }
        }
    }

    /// 关一个句柄，返回是否轮到调用者补办滞后的删除。
    /// 要补办时记录暂且留档，好让并发的打开照样吃到 `Busy`；
    /// 办完由 [`Registry::retire_file`] 摘档。
    pub fn close_file(&self, record: &Arc<FileRecord>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !record.file_closed() {
            return false;
        }
        if record.ready_to_remove() {
            true
        } else {
            inner.files.remove(&record.sector());
            false
        }
    }

    /// 滞后删除办完，把记录摘下
    pub fn retire_file(&self, sector: u32) {
        self.inner.lock().unwrap().files.remove(&sector);
    }

    pub fn file(&self, sector: u32) -> Option<Arc<FileRecord>> {
        self.inner.lock().unwrap().files.get(&sector).cloned()
    }

    pub fn node(&self, sector: u32) -> Option<Arc<DirRecord>> {
        self.inner.lock().unwrap().nodes.get(&sector).cloned()
    }

    pub fn node_or_insert(
        &self,
        sector: u32,
        make: impl FnOnce() -> DirRecord,
    ) -> Arc<DirRecord> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .entry(sector)
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    pub fn remove_node(&self, sector: u32) {
        self.inner.lock().unwrap().nodes.remove(&sector);
    }
}
