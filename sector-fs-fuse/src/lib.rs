#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use sector_fs::SectorDisk;
use sector_fs::SECTOR_SIZE;

/// 宿主机文件模拟的磁盘
pub struct BlockFile {
    file: Mutex<File>,
    num_sectors: u32,
}

impl BlockFile {
    /// 新建指定大小的镜像，旧内容清掉
    pub fn create(file: File, num_sectors: u32) -> Self {
        file.set_len(0).expect("truncating error");
        file.set_len(num_sectors as u64 * SECTOR_SIZE as u64)
            .expect("resizing error");
        Self {
            file: Mutex::new(file),
            num_sectors,
        }
    }

    /// 打开现成的镜像，扇区数由文件大小定
    pub fn open(file: File) -> Self {
        let len = file.metadata().expect("missing metadata").len();
        assert_eq!(len % SECTOR_SIZE as u64, 0, "not a sector-aligned image!");
        Self {
            num_sectors: (len / SECTOR_SIZE as u64) as u32,
            file: Mutex::new(file),
        }
    }
}

impl SectorDisk for BlockFile {
    fn read_sector(&self, sector: u32, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))
            .expect("seeking error");
        assert_eq!(file.read(buf).unwrap(), SECTOR_SIZE, "not a complete sector!");
    }

    fn write_sector(&self, sector: u32, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }

    fn num_sectors(&self) -> u32 {
        self.num_sectors
    }
}

/// 内存模拟的磁盘，测试用
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    num_sectors: u32,
}

impl MemDisk {
    pub fn new(num_sectors: u32) -> Self {
        Self {
            data: Mutex::new(vec![0; num_sectors as usize * SECTOR_SIZE]),
            num_sectors,
        }
    }
}

impl SectorDisk for MemDisk {
    fn read_sector(&self, sector: u32, buf: &mut [u8]) {
        assert!(sector < self.num_sectors, "sector out of range");
        let data = self.data.lock().unwrap();
        buf.copy_from_slice(&data[sector as usize * SECTOR_SIZE..][..SECTOR_SIZE]);
    }

    fn write_sector(&self, sector: u32, buf: &[u8]) {
        assert!(sector < self.num_sectors, "sector out of range");
        let mut data = self.data.lock().unwrap();
        data[sector as usize * SECTOR_SIZE..][..SECTOR_SIZE].copy_from_slice(buf);
    }

    fn num_sectors(&self) -> u32 {
        self.num_sectors
    }
}
