//! # 地址空间
//!
//! 每个用户程序一张页表，页一律惰性装载：
//! 第一次缺页才从可执行映像读进来，被逐出的脏页睡进本进程的交换文件，
//! 再缺页时从交换文件里醒来。交换文件在空间出生时就开好了。

use super::executable::Executable;
use super::machine::{Machine, PageFlag, TranslationEntry};
use crate::config::{NEXT_PC_REG, NUM_TOTAL_REGS, PAGE_SIZE, PC_REG, STACK_REG, USER_STACK_SIZE};
use crate::fs::OpenFile;

pub type SpaceId = u32;

pub struct AddressSpace {
    num_pages: usize,
    page_table: Vec<TranslationEntry>,
    exec: Executable,
    /// 本进程的交换文件，建空间时按满幅大小造好，此后不再伸缩
    swap: OpenFile,
}

impl AddressSpace {
    pub fn new(exec: Executable, swap: OpenFile) -> Self {
        let size = exec.size() + USER_STACK_SIZE;
        let num_pages = size.div_ceil(PAGE_SIZE);
        log::debug!("initializing address space, {num_pages} pages, {size} bytes");

        Self {
            num_pages,
            page_table: (0..num_pages).map(TranslationEntry::new).collect(),
            exec,
            swap,
        }
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    #[inline]
    pub fn page(&self, vpn: usize) -> &TranslationEntry {
        &self.page_table[vpn]
    }

    #[inline]
    pub(super) fn page_mut(&mut self, vpn: usize) -> &mut TranslationEntry {
        &mut self.page_table[vpn]
    }

    /// 用户寄存器组的初值：PC 从 0 起步，栈顶离末尾留 16 字节余量
    pub fn init_registers(&self, machine: &mut Machine) {
        for register in 0..NUM_TOTAL_REGS {
            machine.write_register(register, 0);
        }
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, 4);
        machine.write_register(STACK_REG, (self.num_pages * PAGE_SIZE - 16) as u32);
    }

    /// 让出处理器前：TLB 里攒下的脏位落回页表
    pub fn save_state(&mut self, machine: &Machine) {
        for entry in machine.tlb() {
            if entry.is(PageFlag::Valid) && entry.is(PageFlag::Dirty) {
                self.page_table[entry.vpn].set(PageFlag::Dirty);
            }
        }
    }

    /// 接过处理器时：TLB 里残留的翻译全部作废
    pub fn restore_state(&self, machine: &mut Machine) {
        for entry in machine.tlb_mut() {
            entry.unset(PageFlag::Valid);
        }
    }

    /// 把一页装进指定的物理页帧：
    /// 进过交换文件的页以交换文件为准，否则把可执行映像里
    /// 与这页重叠的部分读进来，其余留零。
    pub(super) fn load_frame(&mut self, vpn: usize, frame: usize, machine: &mut Machine) {
        self.page_table[vpn].frame = Some(frame);
        machine.frame_bytes_mut(frame).fill(0);

        if self.page_table[vpn].is(PageFlag::Swap) {
            assert_eq!(
                self.swap
                    .read_at(machine.frame_bytes_mut(frame), (vpn * PAGE_SIZE) as u32),
                PAGE_SIZE
            );
        } else {
            self.load_from_executable(vpn, machine.frame_bytes_mut(frame));
        }
    }

    fn load_from_executable(&self, vpn: usize, frame_bytes: &mut [u8]) {
        let page_start = (vpn * PAGE_SIZE) as u32;
        let page_end = page_start + PAGE_SIZE as u32;

        let code = self.exec.code();
        let start = page_start.max(code.addr);
        let end = page_end.min(code.addr + code.size);
        if start < end {
            self.exec.read_code(
                &mut frame_bytes[(start - page_start) as usize..(end - page_start) as usize],
                start - code.addr,
            );
        }

        let data = self.exec.init_data();
        let start = page_start.max(data.addr);
        let end = page_end.min(data.addr + data.size);
        if start < end {
            self.exec.read_init_data(
                &mut frame_bytes[(start - page_start) as usize..(end - page_start) as usize],
                start - data.addr,
            );
        }
    }

    /// 逐出一页。先收 TLB：作废匹配的翻译，它攒的脏位落回页表，
    /// 不然这回写脏的内容就丢了。脏页随后写进交换文件。
    pub(super) fn save_to_swap(&mut self, vpn: usize, machine: &mut Machine) {
        let frame = self.page_table[vpn]
            .frame
            .expect("evicting a page that owns no frame");

        for entry in machine.tlb_mut() {
            if entry.is(PageFlag::Valid) && entry.frame == Some(frame) {
                if entry.is(PageFlag::Dirty) {
                    self.page_table[vpn].set(PageFlag::Dirty);
                }
                entry.unset(PageFlag::Valid);
                break;
            }
        }

        if self.page_table[vpn].is(PageFlag::Dirty) {
            self.page_table[vpn].set(PageFlag::Swap);
            let written = self
                .swap
                .write_at(machine.frame_bytes(frame), (vpn * PAGE_SIZE) as u32)
                .expect("the swap file never grows");
            assert_eq!(written, PAGE_SIZE);
        }

        let entry = &mut self.page_table[vpn];
        entry.unset(PageFlag::Valid);
        entry.unset(PageFlag::Use);
        entry.unset(PageFlag::Dirty);
    }
}
