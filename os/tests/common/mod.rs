//! 各测试共用的零件
#![allow(unused)]

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use os::console::CharDevice;
use os::memory::{RawExecHeader, Segment, EXEC_MAGIC};
use os::{Kernel, KernelOptions};
use sector_fs::SectorDisk;
use sector_fs_fuse::MemDisk;

pub fn mem_disk(sectors: u32) -> Arc<dyn SectorDisk> {
    Arc::new(MemDisk::new(sectors))
}

pub fn kernel_on(disk: Arc<dyn SectorDisk>, format: bool, num_phys_pages: usize) -> Arc<Kernel> {
    Arc::new(Kernel::new(
        disk,
        Arc::new(NullConsole),
        KernelOptions {
            format,
            num_phys_pages,
        },
    ))
}

pub fn kernel() -> Arc<Kernel> {
    kernel_on(mem_disk(256), true, os::config::DEFAULT_NUM_PHYS_PAGES)
}

/// 什么都不接的控制台设备
pub struct NullConsole;

impl CharDevice for NullConsole {
    fn get_char(&self) -> u8 {
        0
    }
    fn put_char(&self, _: u8) {}
}

/// 脚本控制台：输入预先排队，输出收进缓冲；
/// “中断”的投递交给测试线程
pub struct ScriptedConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
    wrote: Mutex<Sender<()>>,
}

impl ScriptedConsole {
    pub fn new() -> (Arc<Self>, Receiver<()>) {
        let (wrote, receiver) = channel();
        let device = Arc::new(Self {
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
            wrote: Mutex::new(wrote),
        });
        (device, receiver)
    }

    /// 塞进输入字符，并为每个字符投一次“读就绪”中断
    pub fn feed(&self, console: &os::console::SynchConsole, bytes: &[u8]) {
        for &byte in bytes {
            self.input.lock().unwrap().push_back(byte);
            console.read_avail();
        }
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }
}

impl CharDevice for ScriptedConsole {
    fn get_char(&self) -> u8 {
        self.input.lock().unwrap().pop_front().unwrap_or(0)
    }

    fn put_char(&self, ch: u8) {
        self.output.lock().unwrap().push(ch);
        let _ = self.wrote.lock().unwrap().send(());
    }
}

/// 输出中断泵：设备每咽下一个字符，就补一个“写完成”中断
pub fn pump_write_done(kernel: Arc<Kernel>, receiver: Receiver<()>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while receiver.recv().is_ok() {
            kernel.console.write_done();
        }
    })
}

/// 在文件系统里装一个可执行映像：代码段是给定的字节，数据段全空
pub fn install_program(kernel: &Kernel, path: &str, code: &[u8]) {
    let mut header = RawExecHeader::default();
    header.magic = EXEC_MAGIC;
    header.code = Segment {
        addr: 0,
        size: code.len() as u32,
        file_offset: RawExecHeader::SIZE as u32,
    };

    let root = kernel.file_system.root();
    kernel.file_system.create(&root, path, 0, false).unwrap();
    let image = kernel.file_system.open(&root, path).unwrap();
    image.write_at(header.as_bytes(), 0).unwrap();
    if !code.is_empty() {
        image.write_at(code, RawExecHeader::SIZE as u32).unwrap();
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(13).wrapping_add(seed))
        .collect()
}
