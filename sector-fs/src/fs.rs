//! # 格式化与一致性检查层
//!
//! 空闲位图和根目录都以普通文件的形式存在，
//! 它们的文件头钉在两个众所周知的扇区上，开机时凭此找到它们。
//!
//! [`check`] 在静止状态下重走全部活结构，重建一份影子位图，
//! 与盘上的空闲位图逐位对照；任何引用越界或重复引用都算不一致。

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::directory::Directory;
use crate::layout::{DirEntry, FileHeader};
use crate::{File, SectorDisk, NONE_SECTOR, NUM_DIRECT, NUM_INDIRECT, SECTOR_SIZE};

/// 空闲位图的文件头所在扇区
pub const FREE_MAP_SECTOR: u32 = 0;
/// 根目录的文件头所在扇区
pub const ROOT_DIR_SECTOR: u32 = 1;

/// 新目录初始的记录数
pub const NUM_DIR_ENTRIES: usize = 10;
/// 新目录存储文件的初始大小
pub const DIRECTORY_FILE_SIZE: u32 = (NUM_DIR_ENTRIES * DirEntry::SIZE) as u32;

/// 路径长度上限
pub const PATH_NAME_MAX_LEN: usize = 100;

/// 空闲位图文件应有的大小：每个扇区一位
#[inline]
pub fn free_map_file_size(disk: &Arc<dyn SectorDisk>) -> u32 {
    disk.num_sectors().div_ceil(8)
}

/// 在空盘上铺设初始结构：空闲位图与空的根目录
pub fn format(disk: &Arc<dyn SectorDisk>) {
    log::debug!("formatting the file system");

    let mut free_map = Bitmap::new(disk.num_sectors());
    let mut map_header = FileHeader::new();
    let mut dir_header = FileHeader::new();

    // 两个文件头的栖身之所先占住，谁也别想拿走
    free_map.mark(FREE_MAP_SECTOR);
    free_map.mark(ROOT_DIR_SECTOR);

    map_header
        .allocate(&mut free_map, free_map_file_size(disk))
        .expect("no room for the free map");
    dir_header
        .allocate(&mut free_map, DIRECTORY_FILE_SIZE)
        .expect("no room for the root directory");

    // 头部先落盘，File::new 才能从盘上读回它们
    map_header.write_back(disk, FREE_MAP_SECTOR);
    dir_header.write_back(disk, ROOT_DIR_SECTOR);

    let map_file = File::new(disk.clone(), FREE_MAP_SECTOR);
    let dir_file = File::new(disk.clone(), ROOT_DIR_SECTOR);
    free_map.write_back(&map_file);
    Directory::new(NUM_DIR_ENTRIES).write_back(&dir_file);
}

/// 全盘一致性检查，一致返回 `true`。不改动任何状态。
pub fn check(disk: &Arc<dyn SectorDisk>) -> bool {
    log::debug!("performing file system check");

    let mut shadow = Bitmap::new(disk.num_sectors());
    shadow.mark(FREE_MAP_SECTOR);
    shadow.mark(ROOT_DIR_SECTOR);

    let mut error = false;

    let mut map_header = FileHeader::new();
    map_header.fetch_from(disk, FREE_MAP_SECTOR);
    if map_header.length() != free_map_file_size(disk) {
        log::warn!("bad free map header: wrong file size");
        error = true;
    }
    error |= check_header(&map_header, FREE_MAP_SECTOR, disk, &mut shadow);

    let mut dir_header = FileHeader::new();
    dir_header.fetch_from(disk, ROOT_DIR_SECTOR);
    error |= check_header(&dir_header, ROOT_DIR_SECTOR, disk, &mut shadow);

    let root_file = File::new(disk.clone(), ROOT_DIR_SECTOR);
    let mut root = Directory::new(0);
    root.fetch_from(&root_file);
    error |= check_directory(&root, "", disk, &mut shadow);

    // 影子位图必须与盘上的空闲位图完全一致
    let map_file = File::new(disk.clone(), FREE_MAP_SECTOR);
    let mut free_map = Bitmap::new(disk.num_sectors());
    free_map.fetch_from(&map_file);
    for sector in 0..disk.num_sectors() {
        if free_map.test(sector) != shadow.test(sector) {
            log::warn!("inconsistent free map at sector {sector}");
            error = true;
        }
    }

    if error {
        log::warn!("file system check failed");
    } else {
        log::debug!("file system check succeeded");
    }
    !error
}

/// 引用一个扇区：号码要在盘内，而且谁也不能引用第二次
fn check_sector(sector: u32, disk: &Arc<dyn SectorDisk>, shadow: &mut Bitmap) -> bool {
    if sector >= disk.num_sectors() {
        log::warn!("sector number {sector} out of range");
        return true;
    }
    if shadow.test(sector) {
        log::warn!("sector {sector} referenced twice");
        return true;
    }
    shadow.mark(sector);
    false
}

fn check_header(
    header: &FileHeader,
    at: u32,
    disk: &Arc<dyn SectorDisk>,
    shadow: &mut Bitmap,
) -> bool {
    let raw = header.raw();
    log::debug!(
        "checking file header {}: {} bytes over {} data sectors",
        at,
        raw.num_bytes,
        raw.num_sectors
    );

    let mut error = false;
    if raw.num_sectors != raw.num_bytes.div_ceil(SECTOR_SIZE as u32) {
        log::warn!("header {at}: sector count not compatible with file size");
        error = true;
    }
    if raw.num_sectors as usize > NUM_DIRECT + NUM_INDIRECT * NUM_INDIRECT {
        log::warn!("header {at}: too many blocks");
        return true;
    }

    for i in 0..raw.num_sectors {
        error |= check_sector(header.byte_to_sector(i * SECTOR_SIZE as u32), disk, shadow);
    }

    if raw.indir_sector != NONE_SECTOR {
        error |= check_sector(raw.indir_sector as u32, disk, shadow);
        for &first in header.first_indir() {
            if first == NONE_SECTOR {
                break;
            }
            error |= check_sector(first as u32, disk, shadow);
        }
    }
    error
}

fn check_directory(
    dir: &Directory,
    path: &str,
    disk: &Arc<dyn SectorDisk>,
    shadow: &mut Bitmap,
) -> bool {
    let mut error = false;
    let mut known: Vec<&str> = Vec::new();

    for entry in dir.entries() {
        if known.contains(&entry.name()) {
            log::warn!("{path}/: repeated name {:?}", entry.name());
            error = true;
        } else {
            known.push(entry.name());
        }

        error |= check_sector(entry.sector(), disk, shadow);

        let mut header = FileHeader::new();
        header.fetch_from(disk, entry.sector());
        error |= check_header(&header, entry.sector(), disk, shadow);

        if entry.is_dir() {
            let sub_path = format!("{}/{}", path, entry.name());
            if sub_path.len() > PATH_NAME_MAX_LEN {
                log::warn!("path {sub_path:?} too long");
                error = true;
            }

            let file = File::new(disk.clone(), entry.sector());
            let mut sub = Directory::new(0);
            sub.fetch_from(&file);
            error |= check_directory(&sub, &sub_path, disk, shadow);
        }
    }
    error
}
