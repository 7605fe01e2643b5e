//! # 物理页帧登记表
//!
//! 每个物理页帧记着它正替哪个地址空间的哪个虚页干活，
//! 配一把轮转游标做第二次机会（时钟）替换。
//! 帧的认领与归还只从这里走。

use std::collections::BTreeMap;

use sector_fs::Bitmap;

use super::address_space::{AddressSpace, SpaceId};
use super::machine::{Machine, PageFlag, TranslationEntry};

pub(super) type Spaces = BTreeMap<SpaceId, AddressSpace>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    space: SpaceId,
    vpn: usize,
}

pub struct CoreMap {
    /// 帧号 → 现在的主人
    owners: Vec<Option<Owner>>,
    /// 空闲页帧位图
    free_frames: Bitmap,
    /// 时钟游标
    victim: usize,
}

impl CoreMap {
    pub fn new(num_phys_pages: usize) -> Self {
        Self {
            owners: vec![None; num_phys_pages],
            free_frames: Bitmap::new(num_phys_pages as u32),
            victim: 0,
        }
    }

    /// 该虚页的内容正躺在它页表项指着的帧里吗
    pub fn in_memory(&self, space: SpaceId, entry: &TranslationEntry) -> bool {
        entry
            .frame
            .is_some_and(|frame| self.owners[frame] == Some(Owner { space, vpn: entry.vpn }))
    }

    #[inline]
    pub fn frames_free(&self) -> u32 {
        self.free_frames.count_clear()
    }

    /// 认领一个空闲页帧给 (space, vpn)
    pub fn find(&mut self, space: SpaceId, vpn: usize) -> usize {
        let frame = self.free_frames.find().expect("no free frame to claim") as usize;
        self.owners[frame] = Some(Owner { space, vpn });
        frame
    }

    /// 第二次机会：游标一路前进，撂倒沿途的访问位，
    /// 碰上没被访问过的页就把它逐出、空出它的帧。
    /// 只要有页在用，至多两圈必有结果。
    pub fn free_page(&mut self, spaces: &mut Spaces, machine: &mut Machine) {
        loop {
            self.victim = (self.victim + 1) % self.owners.len();
            let Owner { space, vpn } = self.owners[self.victim].expect("clock hand on an unowned frame");
            let entry = spaces.get_mut(&space).unwrap().page_mut(vpn);
            if !entry.is(PageFlag::Use) {
                break;
            }
            entry.unset(PageFlag::Use);
        }

        let Owner { space, vpn } = self.owners[self.victim].unwrap();
        log::debug!("evicting frame {} (space {space}, vpn {vpn})", self.victim);
        self.free_frames.clear(self.victim as u32);
        self.owners[self.victim] = None;
        spaces.get_mut(&space).unwrap().save_to_swap(vpn, machine);
    }

    /// TLB 报告某帧被写过：帧还归原主的话，把脏位落到页表上
    pub fn update_entry(&self, frame: usize, spaces: &mut Spaces) {
        if let Some(Owner { space, vpn }) = self.owners[frame] {
            let space = spaces.get_mut(&space).unwrap();
            if space.page(vpn).frame == Some(frame) {
                space.page_mut(vpn).set(PageFlag::Dirty);
            }
        }
    }

    /// 某空间销户，归还它占着的所有帧
    pub fn release_space(&mut self, space: SpaceId) {
        for frame in 0..self.owners.len() {
            if self.owners[frame].is_some_and(|owner| owner.space == space) {
                self.owners[frame] = None;
                self.free_frames.clear(frame as u32);
            }
        }
    }
}
