//! 用户内存搬运。每经过一页都走一遍 TLB：命中就用，
//! 不命中触发缺页；访问位与脏位记在 TLB 翻译上，如同硬件所为。

use super::machine::PageFlag;
use super::{SpaceId, Vm};
use crate::config::PAGE_SIZE;
use crate::Error;

impl Vm {
    /// 往 (id, vaddr) 处写 `data`
    pub fn write_user(&mut self, id: SpaceId, vaddr: u32, data: &[u8]) -> Result<(), Error> {
        self.check_range(id, vaddr, data.len())?;
        self.activate(id);

        let mut done = 0;
        while done < data.len() {
            let pos = vaddr as usize + done;
            let (vpn, inside) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
            let n = (PAGE_SIZE - inside).min(data.len() - done);

            let slot = self.ensure_translated(id, vpn);
            // 写访问：硬件会在 TLB 翻译上记下访问位与脏位
            let entry = &mut self.machine.tlb_mut()[slot];
            entry.set(PageFlag::Use);
            entry.set(PageFlag::Dirty);
            let frame = entry.frame.unwrap();

            self.machine.frame_bytes_mut(frame)[inside..inside + n]
                .copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    /// 从 (id, vaddr) 处读满 `buf`
    pub fn read_user(&mut self, id: SpaceId, vaddr: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.check_range(id, vaddr, buf.len())?;
        self.activate(id);

        let mut done = 0;
        while done < buf.len() {
            let pos = vaddr as usize + done;
            let (vpn, inside) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
            let n = (PAGE_SIZE - inside).min(buf.len() - done);

            let slot = self.ensure_translated(id, vpn);
            let entry = &mut self.machine.tlb_mut()[slot];
            entry.set(PageFlag::Use);
            let frame = entry.frame.unwrap();

            buf[done..done + n].copy_from_slice(&self.machine.frame_bytes(frame)[inside..inside + n]);
            done += n;
        }
        Ok(())
    }

    /// vpn 的翻译已在 TLB 里就直接用，否则触发缺页；返回槽位号
    fn ensure_translated(&mut self, id: SpaceId, vpn: usize) -> usize {
        if let Some(slot) = self
            .machine
            .tlb()
            .iter()
            .position(|entry| entry.is(PageFlag::Valid) && entry.vpn == vpn)
        {
            return slot;
        }
        let slot = self.machine.tlb_cursor();
        self.handle_fault(id, vpn);
        slot
    }

    fn check_range(&self, id: SpaceId, vaddr: u32, len: usize) -> Result<(), Error> {
        let space = self.space(id).ok_or(Error::InvalidArgument)?;
        if vaddr as usize + len > space.num_pages() * PAGE_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}
