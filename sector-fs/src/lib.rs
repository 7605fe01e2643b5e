#![no_std]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 格式化与一致性检查层：在空盘上铺设初始结构，静止时校验在盘结构
mod fs;
pub use fs::{check, format, free_map_file_size};
pub use fs::{DIRECTORY_FILE_SIZE, FREE_MAP_SECTOR, NUM_DIR_ENTRIES, PATH_NAME_MAX_LEN, ROOT_DIR_SECTOR};

// 文件层：挂在某个文件头下的无同步字节读写
mod file;
pub use file::File;

// 目录层：定长记录表
mod directory;
pub use directory::{Directory, NEW_DIR_ENTRIES};

// 磁盘数据结构层：文件头（含两级间接索引）与目录项
mod layout;
pub use layout::{DirEntry, FileHeader, RawFileHeader};
pub use layout::{FILE_NAME_MAX_LEN, MAX_DIRECT_SIZE, MAX_FILE_SIZE, NUM_DIRECT, NUM_INDIRECT};

// 空闲扇区位图
mod bitmap;
pub use bitmap::Bitmap;

// 扇区设备接口层
mod disk;
pub use disk::SectorDisk;

/// 一次磁盘 I/O 的单位
pub const SECTOR_SIZE: usize = 128;

/// 表示“无此扇区”的哨兵
pub const NONE_SECTOR: i32 = -1;

/// 分配失败：空闲扇区不足
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoSpace;

type SectorBuf = [u8; SECTOR_SIZE];
