//! 文件头（对应 UNIX 的 inode）既是文件的元信息，也是数据扇区的索引：
//! 前 [`NUM_DIRECT`] 个数据扇区的号码内嵌于头部，
//! 其余的经一张一级间接表、再经各二级间接表寻得。
//! 头部的在盘映像恰好占据一个扇区。
//!
//! 两级间接表随头部一起读入内存；除了长度与扇区数，
//! 头部不记录权限、属主、时间戳之类的东西。

use alloc::sync::Arc;
use core::{mem, ptr, slice};

use crate::bitmap::Bitmap;
use crate::{NoSpace, SectorDisk, NONE_SECTOR, SECTOR_SIZE};

/// 内嵌于头部的数据扇区号个数
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 3 * mem::size_of::<u32>()) / mem::size_of::<u32>();
/// 一张间接表所含的扇区号个数
pub const NUM_INDIRECT: usize = SECTOR_SIZE / mem::size_of::<u32>();
/// 只靠直接索引所能达到的文件大小
pub const MAX_DIRECT_SIZE: usize = NUM_DIRECT * SECTOR_SIZE;
/// 文件大小的上限
pub const MAX_FILE_SIZE: usize = MAX_DIRECT_SIZE + NUM_INDIRECT * NUM_INDIRECT * SECTOR_SIZE;

/// 文件头的在盘映像
#[derive(Debug, Clone)]
#[repr(C)]
pub struct RawFileHeader {
    /// 文件字节数
    pub num_bytes: u32,
    /// 数据扇区数
    pub num_sectors: u32,
    /// 一级间接表所在扇区，[`NONE_SECTOR`] 表示此文件没有间接索引
    pub indir_sector: i32,
    /// 各数据扇区的号码
    pub data_sectors: [u32; NUM_DIRECT],
}

const _: () = assert!(mem::size_of::<RawFileHeader>() == SECTOR_SIZE);

/// 文件头与其随行的两级间接表
pub struct FileHeader {
    raw: RawFileHeader,
    /// 一级间接表：二级间接表所在的扇区
    first_indir: [i32; NUM_INDIRECT],
    /// 各二级间接表：直接索引之外的数据扇区
    second_indir: [[i32; NUM_INDIRECT]; NUM_INDIRECT],
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            raw: RawFileHeader {
                num_bytes: 0,
                num_sectors: 0,
                indir_sector: NONE_SECTOR,
                data_sectors: [0; NUM_DIRECT],
            },
            first_indir: [NONE_SECTOR; NUM_INDIRECT],
            second_indir: [[NONE_SECTOR; NUM_INDIRECT]; NUM_INDIRECT],
        }
    }

    /// 为一个新文件圈定数据扇区和所需的间接表。
    /// 先数清空位再逐个认领，空闲扇区不足时位图分毫不动。
    pub fn allocate(&mut self, free_map: &mut Bitmap, file_size: u32) -> Result<(), NoSpace> {
        if file_size as usize > MAX_FILE_SIZE {
            return Err(NoSpace);
        }

        self.raw.num_bytes = file_size;
        self.raw.num_sectors = file_size.div_ceil(SECTOR_SIZE as u32);

        // 超出直接索引的部分需要整级的一级表，外加若干二级表
        let mut indir_sectors = 0;
        if file_size as usize > MAX_DIRECT_SIZE {
            let indir_ptrs = self.raw.num_sectors as usize - NUM_DIRECT;
            indir_sectors = indir_ptrs.div_ceil(NUM_INDIRECT) + 1;
        }

        if (free_map.count_clear() as usize) < self.raw.num_sectors as usize + indir_sectors {
            return Err(NoSpace);
        }

        for i in 0..(self.raw.num_sectors as usize).min(NUM_DIRECT) {
            self.raw.data_sectors[i] = free_map.find().unwrap();
        }

        if indir_sectors != 0 {
            self.raw.indir_sector = free_map.find().unwrap() as i32;
            let mut left = self.raw.num_sectors as usize - NUM_DIRECT;
            for i in 0..indir_sectors - 1 {
                self.first_indir[i] = free_map.find().unwrap() as i32;
                for j in 0..NUM_INDIRECT {
                    if left == 0 {
                        break;
                    }
                    self.second_indir[i][j] = free_map.find().unwrap() as i32;
                    left -= 1;
                }
            }
        }
        Ok(())
    }

    /// 归还此文件引用的所有扇区。被引用的扇区必须处于已标记状态。
    pub fn deallocate(&mut self, free_map: &mut Bitmap) {
        for i in 0..(self.raw.num_sectors as usize).min(NUM_DIRECT) {
            let sector = self.raw.data_sectors[i];
            assert!(free_map.test(sector), "data sector ought to be marked");
            free_map.clear(sector);
        }

        if self.raw.indir_sector != NONE_SECTOR {
            assert!(free_map.test(self.raw.indir_sector as u32), "indirect sector ought to be marked");
            free_map.clear(self.raw.indir_sector as u32);

            for i in 0..NUM_INDIRECT {
                if self.first_indir[i] == NONE_SECTOR {
                    break;
                }
                assert!(free_map.test(self.first_indir[i] as u32), "indirect sector ought to be marked");
                free_map.clear(self.first_indir[i] as u32);

                for j in 0..NUM_INDIRECT {
                    if self.second_indir[i][j] == NONE_SECTOR {
                        break;
                    }
                    assert!(free_map.test(self.second_indir[i][j] as u32), "data sector ought to be marked");
                    free_map.clear(self.second_indir[i][j] as u32);
                }
            }
        }
    }

    /// 从盘上读回头部，顺带读回所有在用的间接表
    pub fn fetch_from(&mut self, disk: &Arc<dyn SectorDisk>, sector: u32) {
        disk.read_sector(sector, self.raw.as_bytes_mut());
        if self.raw.indir_sector != NONE_SECTOR {
            disk.read_sector(self.raw.indir_sector as u32, table_bytes_mut(&mut self.first_indir));
            for i in 0..NUM_INDIRECT {
                if self.first_indir[i] == NONE_SECTOR {
                    break;
                }
                disk.read_sector(self.first_indir[i] as u32, table_bytes_mut(&mut self.second_indir[i]));
            }
        }
    }

    /// 把头部连同所有在用的间接表写回盘上
    pub fn write_back(&self, disk: &Arc<dyn SectorDisk>, sector: u32) {
        disk.write_sector(sector, self.raw.as_bytes());
        if self.raw.indir_sector != NONE_SECTOR {
            disk.write_sector(self.raw.indir_sector as u32, table_bytes(&self.first_indir));
            for i in 0..NUM_INDIRECT {
                if self.first_indir[i] == NONE_SECTOR {
                    break;
                }
                disk.write_sector(self.first_indir[i] as u32, table_bytes(&self.second_indir[i]));
            }
        }
    }

    /// 文件内偏移到扇区号的翻译。偏移必须落在文件长度以内。
    pub fn byte_to_sector(&self, offset: u32) -> u32 {
        let index = offset as usize / SECTOR_SIZE;
        if index < NUM_DIRECT {
            return self.raw.data_sectors[index];
        }

        let index = index - NUM_DIRECT;
        self.second_indir[index / NUM_INDIRECT][index % NUM_INDIRECT] as u32
    }

    /// 原地扩展文件。
    ///
    /// 末尾扇区还空着的字节不计入新增量；一级表按真正落进去的指针数认领，
    /// 顶层表若尚不存在再多认领一张。空闲扇区不足时位图分毫不动。
    /// 成功后由调用者负责把头部写回盘上。
    pub fn expand(&mut self, free_map: &mut Bitmap, new_bytes: u32) -> Result<(), NoSpace> {
        assert!(new_bytes != 0);

        if self.raw.num_bytes as usize + new_bytes as usize > MAX_FILE_SIZE {
            return Err(NoSpace);
        }

        let on_last_sector =
            (SECTOR_SIZE as u32 - self.raw.num_bytes % SECTOR_SIZE as u32) % SECTOR_SIZE as u32;
        let new_sectors = new_bytes.saturating_sub(on_last_sector).div_ceil(SECTOR_SIZE as u32) as usize;

        let old_sectors = self.raw.num_sectors as usize;
        let total_sectors = old_sectors + new_sectors;

        let mut indir_sectors = 0;
        if total_sectors > NUM_DIRECT {
            let old_tables = old_sectors.saturating_sub(NUM_DIRECT).div_ceil(NUM_INDIRECT);
            let new_tables = (total_sectors - NUM_DIRECT).div_ceil(NUM_INDIRECT);
            indir_sectors = new_tables - old_tables;
            if self.raw.indir_sector == NONE_SECTOR {
                indir_sectors += 1;
            }
        }

        if (free_map.count_clear() as usize) < new_sectors + indir_sectors {
            return Err(NoSpace);
        }

        log::debug!(
            "expanding file of {} bytes by {} bytes",
            self.raw.num_bytes,
            new_bytes
        );

        self.raw.num_bytes += new_bytes;
        self.raw.num_sectors = total_sectors as u32;

        let mut left = new_sectors;
        for i in old_sectors..total_sectors.min(NUM_DIRECT) {
            self.raw.data_sectors[i] = free_map.find().unwrap();
            left -= 1;
        }

        if total_sectors > NUM_DIRECT {
            if self.raw.indir_sector == NONE_SECTOR {
                self.raw.indir_sector = free_map.find().unwrap() as i32;
            }
            let mut index = old_sectors.saturating_sub(NUM_DIRECT);
            while left > 0 {
                let (i, j) = (index / NUM_INDIRECT, index % NUM_INDIRECT);
                if self.first_indir[i] == NONE_SECTOR {
                    self.first_indir[i] = free_map.find().unwrap() as i32;
                }
                self.second_indir[i][j] = free_map.find().unwrap() as i32;
                index += 1;
                left -= 1;
            }
        }
        Ok(())
    }

    /// 文件的字节数
    #[inline]
    pub fn length(&self) -> u32 {
        self.raw.num_bytes
    }

    #[inline]
    pub fn raw(&self) -> &RawFileHeader {
        &self.raw
    }

    #[inline]
    pub fn first_indir(&self) -> &[i32; NUM_INDIRECT] {
        &self.first_indir
    }
}

impl RawFileHeader {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

#[inline]
fn table_bytes(table: &[i32; NUM_INDIRECT]) -> &[u8] {
    unsafe { slice::from_raw_parts(ptr::from_ref(table).cast(), SECTOR_SIZE) }
}

#[inline]
fn table_bytes_mut(table: &mut [i32; NUM_INDIRECT]) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(ptr::from_mut(table).cast(), SECTOR_SIZE) }
}
