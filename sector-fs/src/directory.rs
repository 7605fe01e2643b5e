//! # 目录层
//!
//! 目录是一张定长记录的表，整张表作为一个普通文件存储；
//! 表满之后按 [`NEW_DIR_ENTRIES`] 条一截地扩展存储文件。
//!
//! 查找是线性扫描：第一条名字相符的在用记录即命中。
//! 名字的唯一性由插入方保证。

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::layout::DirEntry;
use crate::{File, NoSpace, SectorDisk};

/// 目录长满后一次新增的记录数
pub const NEW_DIR_ENTRIES: usize = 5;

/// 目录的内存映像
pub struct Directory {
    table: Vec<DirEntry>,
}

impl Directory {
    /// `size` 条空记录的目录；从盘上读回旧目录时传 0
    pub fn new(size: usize) -> Self {
        Self {
            table: vec![DirEntry::default(); size],
        }
    }

    /// 从存储文件读回整张表
    pub fn fetch_from(&mut self, file: &File) {
        let size = file.length() as usize / DirEntry::SIZE;
        let mut table = vec![DirEntry::default(); size];
        for (i, entry) in table.iter_mut().enumerate() {
            assert_eq!(
                file.read_at(entry.as_bytes_mut(), (i * DirEntry::SIZE) as u32),
                DirEntry::SIZE
            );
        }
        self.table = table;
    }

    /// 把整张表写回存储文件
    pub fn write_back(&self, file: &File) {
        assert_eq!(file.length() as usize, self.table.len() * DirEntry::SIZE);
        for (i, entry) in self.table.iter().enumerate() {
            assert_eq!(
                file.write_at(entry.as_bytes(), (i * DirEntry::SIZE) as u32),
                DirEntry::SIZE
            );
        }
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        self.table.iter().position(|e| e.is_used() && e.name() == name)
    }

    /// 按名字找到此项的文件头所在扇区
    pub fn find(&self, name: &str) -> Option<u32> {
        self.find_index(name).map(|i| self.table[i].sector())
    }

    /// 名字存在且是一个目录
    pub fn is_dir(&self, name: &str) -> bool {
        self.find_index(name)
            .map(|i| self.table[i].is_dir())
            .unwrap_or(false)
    }

    /// 插到第一个空槽；没有空槽就先把存储文件扩出一截。
    /// `file` 是本目录自己的存储文件。
    pub fn add(
        &mut self,
        name: &str,
        sector: u32,
        is_dir: bool,
        free_map: &mut Bitmap,
        file: &File,
    ) -> Result<(), NoSpace> {
        debug_assert!(self.find_index(name).is_none());

        let slot = match self.table.iter().position(|e| !e.is_used()) {
            Some(slot) => slot,
            None => {
                file.expand(free_map, (NEW_DIR_ENTRIES * DirEntry::SIZE) as u32)?;
                let slot = self.table.len();
                // 新扩出来的扇区还是盘上的陈年旧账，不能读回来当记录用
                self.table.resize(slot + NEW_DIR_ENTRIES, DirEntry::default());
                slot
            }
        };
        self.table[slot] = DirEntry::new(name, sector, is_dir);
        Ok(())
    }

    /// 注销一条记录。只动表，此项引用的扇区归文件系统处置。
    pub fn remove(&mut self, name: &str) -> bool {
        match self.find_index(name) {
            Some(i) => {
                self.table[i].set_unused();
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.iter().all(|e| !e.is_used())
    }

    /// 递归列出本目录与各子目录的全部名字，目录以 `/` 结尾
    pub fn list(&self, disk: &Arc<dyn SectorDisk>, path: &str, out: &mut Vec<String>) {
        for e in self.entries() {
            let suffix = if e.is_dir() { "/" } else { "" };
            out.push(format!("{}/{}{}", path, e.name(), suffix));
        }
        for e in self.entries().filter(|e| e.is_dir()) {
            let file = File::new(disk.clone(), e.sector());
            let mut sub = Directory::new(0);
            sub.fetch_from(&file);
            sub.list(disk, &format!("{}/{}", path, e.name()), out);
        }
    }

    /// 返回并注销第一条名字以 `SWAP.` 开头的在用记录。
    /// 开机清扫残留交换文件时使用。
    pub fn find_swap_file(&mut self) -> Option<String> {
        let entry = self
            .table
            .iter_mut()
            .find(|e| e.is_used() && e.name().starts_with("SWAP."))?;
        assert!(!entry.is_dir());
        let name = String::from(entry.name());
        entry.set_unused();
        Some(name)
    }

    /// 所有在用记录
    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.table.iter().filter(|e| e.is_used())
    }
}
