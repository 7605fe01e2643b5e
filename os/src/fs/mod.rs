//! # 文件系统门面
//!
//! 路径解析与建档、打开、删除、原地扩展，全部在同步登记处的记录
//! 保护下进行。
//!
//! 锁序（防死锁）：目录锁沿路径自根向叶手递手；登记处的互斥只在
//! 持有当前目录锁时短暂嵌套；空闲位图锁最后拿。改动目录或位图的
//! 操作中途失败时，丢弃内存里的映像、不写回，盘上状态保持原样。

mod open_file;
pub use open_file::OpenFile;

mod path;
pub use path::split_path;

mod records;
pub use records::{DirRecord, FileRecord};

mod registry;
use registry::Registry;

use std::sync::Arc;

use sector_fs::{Bitmap, Directory, File, FileHeader, SectorDisk};
use sector_fs::{DIRECTORY_FILE_SIZE, FREE_MAP_SECTOR, NUM_DIR_ENTRIES, ROOT_DIR_SECTOR};

use crate::Error;

/// 整个文件系统的共享状态。克隆出去的是同一份。
#[derive(Clone)]
pub struct FileSystem {
    inner: Arc<FsInner>,
}

struct FsInner {
    disk: Arc<dyn SectorDisk>,
    registry: Registry,
    root: Arc<DirRecord>,
    free_map: Arc<DirRecord>,
}

impl FileSystem {
    /// 挂载磁盘。`format` 为真时先在盘上铺设空的文件系统。
    pub fn new(disk: Arc<dyn SectorDisk>, format: bool) -> Self {
        log::debug!("initializing the file system");
        if format {
            sector_fs::format(&disk);
        }

        let registry = Registry::new();
        let free_map = registry.node_or_insert(FREE_MAP_SECTOR, || {
            DirRecord::new(File::new(disk.clone(), FREE_MAP_SECTOR))
        });
        let root = registry.node_or_insert(ROOT_DIR_SECTOR, || {
            DirRecord::new(File::new(disk.clone(), ROOT_DIR_SECTOR))
        });

        Self {
            inner: Arc::new(FsInner {
                disk,
                registry,
                root,
                free_map,
            }),
        }
    }

    /// 根目录的记录，可作一切路径解析的起点
    pub fn root(&self) -> Arc<DirRecord> {
        self.inner.root.clone()
    }

    #[inline]
    pub fn disk(&self) -> &Arc<dyn SectorDisk> {
        &self.inner.disk
    }

    /// 建立文件或目录。目录拿固定的初始大小，文件拿 `initial_size`。
    pub fn create(
        &self,
        cwd: &Arc<DirRecord>,
        path: &str,
        initial_size: u32,
        is_dir: bool,
    ) -> Result<(), Error> {
        if is_dir {
            log::debug!("creating directory {path}");
        } else {
            log::debug!("creating file {path}, size {initial_size}");
        }

        let (dir_path, name) = split_path(path)?;
        let dir = self
            .find_directory(cwd, dir_path)
            .ok_or(Error::PathNotFound)?;

        // 根目录下不许建 SWAP. 打头的目录，免得跟交换文件打起来
        if is_dir && dir.sector() == ROOT_DIR_SECTOR && name.starts_with("SWAP.") {
            return Err(Error::Reserved);
        }

        dir.lock.acquire();
        let result = self.create_locked(&dir, name, initial_size, is_dir);
        dir.lock.release();
        result
    }

    fn create_locked(
        &self,
        dir: &DirRecord,
        name: &str,
        initial_size: u32,
        is_dir: bool,
    ) -> Result<(), Error> {
        let mut table = Directory::new(0);
        table.fetch_from(dir.file());
        if table.find(name).is_some() {
            return Err(Error::NameExists);
        }

        let free_map = &self.inner.free_map;
        free_map.lock.acquire();
        let result = self.create_with_free_map(dir, &mut table, name, initial_size, is_dir);
        free_map.lock.release();
        result
    }

    fn create_with_free_map(
        &self,
        dir: &DirRecord,
        table: &mut Directory,
        name: &str,
        initial_size: u32,
        is_dir: bool,
    ) -> Result<(), Error> {
        // 中途失败就丢弃 map 与 table 不写回，盘上分毫不动
        let mut map = self.load_free_map();
        let sector = map.find().ok_or(Error::NoSpace)?;

        let mut header = FileHeader::new();
        let size = if is_dir { DIRECTORY_FILE_SIZE } else { initial_size };
        header.allocate(&mut map, size)?;

        // 数据扇区到手之后才动目录。表满时的就地扩张会把目录头写上盘，
        // 而这之后不会再失败，扩张不至于悬空。
        table.add(name, sector, is_dir, &mut map, dir.file())?;

        header.write_back(&self.inner.disk, sector);
        table.write_back(dir.file());
        self.store_free_map(&map);

        if is_dir {
            let new_file = File::new(self.inner.disk.clone(), sector);
            Directory::new(NUM_DIR_ENTRIES).write_back(&new_file);
        }
        Ok(())
    }

    /// 打开文件读写。目录不给开。
    pub fn open(&self, cwd: &Arc<DirRecord>, path: &str) -> Result<OpenFile, Error> {
        log::debug!("opening file {path}");
        let (dir_path, name) = split_path(path)?;
        let dir = self
            .find_directory(cwd, dir_path)
            .ok_or(Error::PathNotFound)?;

        dir.lock.acquire();
        let result = self.open_locked(&dir, path, name);
        dir.lock.release();

        result.map(|record| OpenFile::new(self.clone(), record))
    }

    fn open_locked(
        &self,
        dir: &Arc<DirRecord>,
        path: &str,
        name: &str,
    ) -> Result<Arc<FileRecord>, Error> {
        let mut table = Directory::new(0);
        table.fetch_from(dir.file());

        let sector = table.find(name).ok_or(Error::PathNotFound)?;
        if table.is_dir(name) {
            return Err(Error::KindMismatch);
        }

        self.inner.registry.open_file(sector, || {
            FileRecord::new(
                path.into(),
                dir.clone(),
                name.into(),
                File::new(self.inner.disk.clone(), sector),
            )
        })
    }

    /// 删除文件或空目录。还开着的文件只记一笔账，
    /// 最后一个句柄关掉时才真正回收。
    pub fn remove(&self, cwd: &Arc<DirRecord>, path: &str) -> Result<(), Error> {
        log::debug!("removing {path}");
        let (dir_path, name) = split_path(path)?;
        let dir = self
            .find_directory(cwd, dir_path)
            .ok_or(Error::PathNotFound)?;

        dir.lock.acquire();
        let result = self.remove_locked(&dir, name);
        dir.lock.release();
        result
    }

    fn remove_locked(&self, dir: &Arc<DirRecord>, name: &str) -> Result<(), Error> {
        let mut table = Directory::new(0);
        table.fetch_from(dir.file());
        let sector = table.find(name).ok_or(Error::PathNotFound)?;

        if table.is_dir(name) {
            // 目录只删空的；在档的顺带除名
            let node = self.inner.registry.node(sector);
            let empty = match &node {
                Some(node) => directory_is_empty(node.file()),
                None => directory_is_empty(&File::new(self.inner.disk.clone(), sector)),
            };
            if !empty {
                return Err(Error::NotEmpty);
            }
            if node.is_some() {
                self.inner.registry.remove_node(sector);
            }
            self.reclaim(dir, &mut table, name, sector);
            return Ok(());
        }

        match self.inner.registry.file(sector) {
            // 还有人开着：挂上删除标记，目录里的名字留到最后一关
            Some(record) => {
                record.set_to_remove();
                Ok(())
            }
            None => {
                self.reclaim(dir, &mut table, name, sector);
                Ok(())
            }
        }
    }

    /// 立即回收：数据扇区、头部扇区、目录记录，一并落盘
    fn reclaim(&self, dir: &DirRecord, table: &mut Directory, name: &str, sector: u32) {
        let mut header = FileHeader::new();
        header.fetch_from(&self.inner.disk, sector);

        let free_map = &self.inner.free_map;
        free_map.lock.acquire();
        let mut map = self.load_free_map();
        header.deallocate(&mut map);
        map.clear(sector);
        table.remove(name);
        self.store_free_map(&map);
        free_map.lock.release();

        table.write_back(dir.file());
    }

    /// 关一个句柄；轮到补办滞后删除时就在这儿办
    pub(crate) fn close_file(&self, record: &Arc<FileRecord>) {
        if !self.inner.registry.close_file(record) {
            return;
        }

        log::debug!("finishing deferred removal of {}", record.path());
        let parent = record.parent();
        parent.lock.acquire();
        let mut table = Directory::new(0);
        table.fetch_from(parent.file());
        // 滞后删除期间名字一直挂在父目录里
        self.reclaim(parent, &mut table, record.name(), record.sector());
        self.inner.registry.retire_file(record.sector());
        parent.lock.release();
    }

    /// 原地扩展一个已打开的文件。记录必在档，因为文件开着。
    pub fn expand_file(&self, sector: u32, new_bytes: u32) -> Result<(), Error> {
        assert!(new_bytes != 0);
        let record = self
            .inner
            .registry
            .file(sector)
            .expect("expanding a file that is not open");

        let free_map = &self.inner.free_map;
        free_map.lock.acquire();
        let mut map = self.load_free_map();
        // File::expand 成功时顺手把头部写回
        let result = record.file().expand(&mut map, new_bytes);
        if result.is_ok() {
            self.store_free_map(&map);
        }
        free_map.lock.release();

        result.map_err(Into::into)
    }

    /// 沿路径找到目标目录的记录，途经的目录逐个“打开”进登记处。
    /// 手递手持锁：验完孩子再放开爹。
    pub fn find_directory(&self, cwd: &Arc<DirRecord>, dir_path: &str) -> Option<Arc<DirRecord>> {
        let mut current = if dir_path.starts_with('/') {
            self.inner.root.clone()
        } else {
            cwd.clone()
        };

        for component in dir_path.split('/').filter(|c| !c.is_empty()) {
            current.lock.acquire();
            let mut table = Directory::new(0);
            table.fetch_from(current.file());

            if !table.is_dir(component) {
                // 没有这一项，或者它是个文件
                current.lock.release();
                return None;
            }
            let sector = table.find(component).unwrap();
            let next = self.inner.registry.node_or_insert(sector, || {
                DirRecord::new(File::new(self.inner.disk.clone(), sector))
            });
            current.lock.release();
            current = next;
        }
        Some(current)
    }

    /// 解析到目录记录本身（cd 用）。存在但是个文件时给 `KindMismatch`。
    pub fn resolve_dir(&self, cwd: &Arc<DirRecord>, path: &str) -> Result<Arc<DirRecord>, Error> {
        if path == "/" {
            return Ok(self.root());
        }

        let (dir_path, name) = split_path(path)?;
        let parent = self
            .find_directory(cwd, dir_path)
            .ok_or(Error::PathNotFound)?;

        parent.lock.acquire();
        let mut table = Directory::new(0);
        table.fetch_from(parent.file());
        let result = match table.find(name) {
            None => Err(Error::PathNotFound),
            Some(_) if !table.is_dir(name) => Err(Error::KindMismatch),
            Some(sector) => Ok(self.inner.registry.node_or_insert(sector, || {
                DirRecord::new(File::new(self.inner.disk.clone(), sector))
            })),
        };
        parent.lock.release();
        result
    }

    /// 静止状态下的全盘一致性检查
    pub fn check(&self) -> bool {
        sector_fs::check(&self.inner.disk)
    }

    /// 开机清扫：上回留在根目录里的交换文件统统删掉
    pub fn cleanup(&self) {
        let root = self.root();
        let mut table = Directory::new(0);
        table.fetch_from(root.file());
        while let Some(name) = table.find_swap_file() {
            log::debug!("cleaning up stale swap file {name}");
            let _ = self.remove(&root, &format!("/{name}"));
        }
    }

    /// 全树名录，目录以 `/` 结尾
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut table = Directory::new(0);
        table.fetch_from(self.inner.root.file());
        table.list(&self.inner.disk, "", &mut names);
        names
    }

    fn load_free_map(&self) -> Bitmap {
        let mut map = Bitmap::new(self.inner.disk.num_sectors());
        map.fetch_from(self.inner.free_map.file());
        map
    }

    fn store_free_map(&self, map: &Bitmap) {
        map.write_back(self.inner.free_map.file());
    }
}

fn directory_is_empty(file: &File) -> bool {
    let mut table = Directory::new(0);
    table.fetch_from(file);
    table.is_empty()
}
