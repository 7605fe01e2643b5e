//! 打开文件的句柄：游标、读写协调，以及滞后删除的了结。

use std::sync::{Arc, Mutex};

use super::records::FileRecord;
use super::FileSystem;
use crate::Error;

/// 一个打开的文件句柄。松手（drop）即关闭；
/// 文件若已判了滞后删除且这是最后一个句柄，关闭时就地回收。
pub struct OpenFile {
    fs: FileSystem,
    record: Arc<FileRecord>,
    position: Mutex<u32>,
}

impl OpenFile {
    pub(super) fn new(fs: FileSystem, record: Arc<FileRecord>) -> Self {
        Self {
            fs,
            record,
            position: Mutex::new(0),
        }
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.record.sector()
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.record.file().length()
    }

    #[inline]
    pub fn record(&self) -> &Arc<FileRecord> {
        &self.record
    }

    pub fn seek(&self, position: u32) {
        *self.position.lock().unwrap() = position;
    }

    /// 从游标处读，读了多少游标走多少
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut position = self.position.lock().unwrap();
        let n = self.read_at(buf, *position);
        *position += n as u32;
        n
    }

    /// 从游标处写，写了多少游标走多少
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        let mut position = self.position.lock().unwrap();
        let n = self.write_at(buf, *position)?;
        *position += n as u32;
        Ok(n)
    }

    /// 定点读。读者之间并行，与写者互斥，写者优先。
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> usize {
        self.record.begin_reading();
        let n = self.record.file().read_at(buf, offset);
        self.record.finish_reading();
        n
    }

    /// 定点写，独占进场。越过末尾的部分先把文件扩过去。
    pub fn write_at(&self, buf: &[u8], offset: u32) -> Result<usize, Error> {
        self.record.begin_writing();
        let result = self.write_exclusive(buf, offset);
        self.record.finish_writing();
        result
    }

    fn write_exclusive(&self, buf: &[u8], offset: u32) -> Result<usize, Error> {
        let end = offset as usize + buf.len();
        let length = self.record.file().length() as usize;
        if end > length {
            self.fs
                .expand_file(self.record.sector(), (end - length) as u32)?;
        }
        Ok(self.record.file().write_at(buf, offset))
    }

    /// 显式关闭，等价于就地 drop
    pub fn close(self) {}
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.fs.close_file(&self.record);
    }
}
