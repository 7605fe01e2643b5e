//! # 教学内核的核心
//!
//! 在盘文件系统加上层层并发控制、按需调页的虚拟内存引擎、
//! 同步控制台，以及薄薄一层进程门面。
//!
//! 内核的单例状态全部装在 [`Kernel`] 里，由调用者显式传递，
//! 不藏在环境全局量背后。磁盘与控制台设备是外来的协作者，
//! 以特质对象的身份进门。

pub mod config;

mod error;
pub use error::Error;

pub mod console;
pub mod fs;
pub mod logging;
pub mod memory;
pub mod process;
pub mod sync;
pub mod thread;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use sector_fs::SectorDisk;

use console::{CharDevice, SynchConsole};
use fs::FileSystem;
use memory::{Executable, SpaceId, TranslationEntry, Vm};
use process::ProcessTable;

pub struct KernelOptions {
    /// 要不要先格式化磁盘
    pub format: bool,
    pub num_phys_pages: usize,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            format: true,
            num_phys_pages: config::DEFAULT_NUM_PHYS_PAGES,
        }
    }
}

pub struct Kernel {
    pub file_system: FileSystem,
    pub console: SynchConsole,
    pub processes: ProcessTable,
    vm: Mutex<Vm>,
    next_space: AtomicU32,
}

impl Kernel {
    pub fn new(
        disk: Arc<dyn SectorDisk>,
        device: Arc<dyn CharDevice>,
        options: KernelOptions,
    ) -> Self {
        logging::init();
        let kernel = Self {
            file_system: FileSystem::new(disk, options.format),
            console: SynchConsole::new(device),
            processes: ProcessTable::new(),
            vm: Mutex::new(Vm::new(options.num_phys_pages)),
            next_space: AtomicU32::new(0),
        };
        // 开机清扫上一回残留的交换文件
        kernel.file_system.cleanup();
        kernel
    }

    /// 装载可执行映像：建地址空间、开满幅的交换文件、登记进程，
    /// 然后把处理器交给它（寄存器摆好初值）。
    pub fn exec(&self, path: &str, joinable: bool) -> Result<SpaceId, Error> {
        let root = self.file_system.root();
        let file = self.file_system.open(&root, path)?;
        let exec = Executable::new(file).ok_or(Error::InvalidArgument)?;

        let id = self.next_space.fetch_add(1, Ordering::Relaxed);
        let num_pages = (exec.size() + config::USER_STACK_SIZE).div_ceil(config::PAGE_SIZE);
        let size = (num_pages * config::PAGE_SIZE) as u32;

        let swap_path = format!("/SWAP.{id}");
        self.file_system.create(&root, &swap_path, size, false)?;
        let swap = self.file_system.open(&root, &swap_path)?;

        let space = memory::AddressSpace::new(exec, swap);
        {
            let mut vm = self.vm.lock().unwrap();
            vm.insert_space(id, space);
            vm.activate(id);
            vm.init_registers(id);
        }

        self.processes.register(id, joinable);
        log::info!("space {id} loaded from {path}");
        Ok(id)
    }

    /// 进程退场：帧与交换文件归还，状态留给 join 的人
    pub fn exit(&self, id: SpaceId, status: i32) {
        log::debug!("space {id} exiting with status {status}");
        let space = self.vm.lock().unwrap().remove_space(id);
        // 交换文件的句柄在锁外落下，随手删掉文件本身
        drop(space);
        let _ = self
            .file_system
            .remove(&self.file_system.root(), &format!("/SWAP.{id}"));
        self.processes.exit(id, status);
    }

    /// 等一个可 join 的进程退场，取回它的状态
    pub fn join(&self, id: SpaceId) -> Result<i32, Error> {
        self.processes.join(id)
    }

    /// 往某空间的虚拟地址处写（缺的页沿途补齐）
    pub fn write_user(&self, id: SpaceId, vaddr: u32, data: &[u8]) -> Result<(), Error> {
        self.vm.lock().unwrap().write_user(id, vaddr, data)
    }

    /// 从某空间的虚拟地址处读
    pub fn read_user(&self, id: SpaceId, vaddr: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.vm.lock().unwrap().read_user(id, vaddr, buf)
    }

    /// 诊断与测试用：页表快照
    pub fn page_snapshot(&self, id: SpaceId) -> Option<Vec<TranslationEntry>> {
        self.vm.lock().unwrap().page_snapshot(id)
    }

    /// 诊断与测试用：各物理页帧的主人
    pub fn frame_owners(&self) -> Vec<Option<(SpaceId, usize)>> {
        self.vm.lock().unwrap().frame_owners()
    }

    pub fn read_register(&self, register: usize) -> u32 {
        self.vm.lock().unwrap().machine().read_register(register)
    }
}
