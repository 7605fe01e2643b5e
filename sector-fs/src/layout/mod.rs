//! # 磁盘数据结构层
//!
//! 盘上的两类定长结构：
//! 文件头（一个扇区，内嵌直接索引与两级间接索引的根） | 目录项（32字节记录）

mod header;
pub use header::{FileHeader, RawFileHeader};
pub use header::{MAX_DIRECT_SIZE, MAX_FILE_SIZE, NUM_DIRECT, NUM_INDIRECT};

mod dir_entry;
pub use dir_entry::{DirEntry, FILE_NAME_MAX_LEN};
