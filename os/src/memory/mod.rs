//! # 虚拟内存引擎
//!
//! 所有地址空间登记在 [`Vm`] 的表里，以空间号为钥匙；
//! 缺页处理、时钟替换、用户内存搬运都在同一把锁下进行
//! （锁由 [`crate::Kernel`] 持有）。

mod machine;
pub use machine::{Machine, PageFlag, TranslationEntry};

mod executable;
pub use executable::{Executable, RawExecHeader, Segment, MAGIC as EXEC_MAGIC};

mod address_space;
pub use address_space::{AddressSpace, SpaceId};

mod core_map;
pub use core_map::CoreMap;

mod transfer;

use std::collections::BTreeMap;

use core_map::Spaces;

pub struct Vm {
    machine: Machine,
    core_map: CoreMap,
    spaces: Spaces,
    /// 正占着处理器的空间
    current: Option<SpaceId>,
}

impl Vm {
    pub fn new(num_phys_pages: usize) -> Self {
        Self {
            machine: Machine::new(num_phys_pages),
            core_map: CoreMap::new(num_phys_pages),
            spaces: BTreeMap::new(),
            current: None,
        }
    }

    #[inline]
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    #[inline]
    pub fn space(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(&id)
    }

    pub fn insert_space(&mut self, id: SpaceId, space: AddressSpace) {
        self.spaces.insert(id, space);
    }

    /// 空间销户：归还全部页帧，注销残留的翻译。
    /// 空间本身交还调用者，好让交换文件的句柄在这把锁外面落下。
    pub fn remove_space(&mut self, id: SpaceId) -> Option<AddressSpace> {
        self.core_map.release_space(id);
        if self.current == Some(id) {
            if let Some(space) = self.spaces.get(&id) {
                space.restore_state(&mut self.machine);
            }
            self.current = None;
        }
        self.spaces.remove(&id)
    }

    /// 切换地址空间：旧的保存状态，新的把 TLB 清场
    pub fn activate(&mut self, id: SpaceId) {
        if self.current == Some(id) {
            return;
        }
        if let Some(old) = self.current {
            if let Some(space) = self.spaces.get_mut(&old) {
                space.save_state(&self.machine);
            }
        }
        let space = self.spaces.get(&id).expect("activating an unknown space");
        space.restore_state(&mut self.machine);
        self.current = Some(id);
    }

    pub fn init_registers(&mut self, id: SpaceId) {
        let Self { machine, spaces, .. } = self;
        spaces
            .get(&id)
            .expect("unknown space")
            .init_registers(machine);
    }

    /// 缺页：轮转挑一个 TLB 槽位装入该页的翻译。
    /// 被顶掉的翻译若攒着脏位，先经核心映射落回页表。
    pub fn handle_fault(&mut self, id: SpaceId, vpn: usize) {
        let cursor = self.machine.tlb_cursor();
        let slot = self.machine.tlb()[cursor];
        if slot.is(PageFlag::Valid) && slot.is(PageFlag::Dirty) {
            if let Some(frame) = slot.frame {
                self.core_map.update_entry(frame, &mut self.spaces);
            }
        }

        let entry = self.load_page(id, vpn);
        self.machine.tlb_mut()[cursor] = entry;
        self.machine.advance_tlb_cursor();
    }

    /// 把 (id, vpn) 弄进物理内存，返回它的翻译。
    /// 没有空闲页帧就先请时钟腾一个。
    fn load_page(&mut self, id: SpaceId, vpn: usize) -> TranslationEntry {
        {
            let space = self.spaces.get_mut(&id).expect("fault in an unknown space");
            let entry = space.page_mut(vpn);
            entry.set(PageFlag::Valid);
            entry.set(PageFlag::Use);
            if self.core_map.in_memory(id, space.page(vpn)) {
                return *space.page(vpn);
            }
        }

        if self.core_map.frames_free() == 0 {
            self.core_map.free_page(&mut self.spaces, &mut self.machine);
        }

        let frame = self.core_map.find(id, vpn);
        let space = self.spaces.get_mut(&id).unwrap();
        space.load_frame(vpn, frame, &mut self.machine);
        *space.page(vpn)
    }

    /// 诊断与测试用：该空间每一页的翻译快照
    pub fn page_snapshot(&self, id: SpaceId) -> Option<Vec<TranslationEntry>> {
        self.spaces
            .get(&id)
            .map(|space| (0..space.num_pages()).map(|vpn| *space.page(vpn)).collect())
    }

    /// 诊断与测试用：各帧的主人 (space, vpn)
    pub fn frame_owners(&self) -> Vec<Option<(SpaceId, usize)>> {
        (0..self.machine.num_phys_pages())
            .map(|frame| {
                self.spaces.iter().find_map(|(&id, space)| {
                    (0..space.num_pages()).find_map(|vpn| {
                        (space.page(vpn).frame == Some(frame)
                            && self.core_map.in_memory(id, space.page(vpn)))
                        .then_some((id, vpn))
                    })
                })
            })
            .collect()
    }
}
