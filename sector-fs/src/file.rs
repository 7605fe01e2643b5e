//! # 文件层
//!
//! [`File`] 是一个打开的在盘文件：缓存住文件头，按偏移读写数据扇区。
//! 这一层不做任何并发协调，读写者之间的先后由上层裁决。

use alloc::sync::Arc;

use spin::Mutex;

use crate::bitmap::Bitmap;
use crate::layout::FileHeader;
use crate::{NoSpace, SectorBuf, SectorDisk, SECTOR_SIZE};

pub struct File {
    /// 文件头所在扇区
    sector: u32,
    header: Mutex<FileHeader>,
    disk: Arc<dyn SectorDisk>,
}

impl File {
    /// 打开 `sector` 处的文件头所描述的文件
    pub fn new(disk: Arc<dyn SectorDisk>, sector: u32) -> Self {
        let mut header = FileHeader::new();
        header.fetch_from(&disk, sector);
        Self {
            sector,
            header: Mutex::new(header),
            disk,
        }
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.header.lock().length()
    }

    /// 从 `offset` 起读满 `buf`，返回实际读得的字节数；越过文件末尾的部分截断
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> usize {
        let header = self.header.lock();
        let length = header.length();
        if offset >= length || buf.is_empty() {
            return 0;
        }
        let len = buf.len().min((length - offset) as usize);

        let mut bounce: SectorBuf = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < len {
            let pos = offset as usize + done;
            let inside = pos % SECTOR_SIZE;
            let n = (SECTOR_SIZE - inside).min(len - done);

            self.disk.read_sector(header.byte_to_sector(pos as u32), &mut bounce);
            buf[done..done + n].copy_from_slice(&bounce[inside..inside + n]);
            done += n;
        }
        done
    }

    /// 把 `buf` 写到 `offset` 起的位置，返回写入的字节数。
    /// 不会越过文件末尾；要加长文件得先 [`File::expand`]。
    pub fn write_at(&self, buf: &[u8], offset: u32) -> usize {
        let header = self.header.lock();
        let length = header.length();
        if offset >= length || buf.is_empty() {
            return 0;
        }
        let len = buf.len().min((length - offset) as usize);

        let mut bounce: SectorBuf = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < len {
            let pos = offset as usize + done;
            let inside = pos % SECTOR_SIZE;
            let n = (SECTOR_SIZE - inside).min(len - done);
            let sector = header.byte_to_sector(pos as u32);

            if n < SECTOR_SIZE {
                // 半个扇区的写得先读回另外半个
                self.disk.read_sector(sector, &mut bounce);
            }
            bounce[inside..inside + n].copy_from_slice(&buf[done..done + n]);
            self.disk.write_sector(sector, &bounce);
            done += n;
        }
        done
    }

    /// 原地加长文件，并立刻把更新过的头部写回盘上
    pub fn expand(&self, free_map: &mut Bitmap, new_bytes: u32) -> Result<(), NoSpace> {
        let mut header = self.header.lock();
        header.expand(free_map, new_bytes)?;
        header.write_back(&self.disk, self.sector);
        Ok(())
    }

    /// 观察缓存的文件头
    #[inline]
    pub fn map_header<V>(&self, f: impl FnOnce(&FileHeader) -> V) -> V {
        f(&self.header.lock())
    }
}
