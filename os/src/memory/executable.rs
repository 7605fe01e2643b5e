//! 可执行映像：一个平铺的头部，跟着三段内容。
//! 代码段与已初始化数据段按需从文件读入；未初始化段只占地址不占盘。

use core::{mem, ptr, slice};

use crate::fs::OpenFile;

pub const MAGIC: u32 = 0x4e0f_f04e;

/// 段描述
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct Segment {
    /// 装载到的虚拟地址
    pub addr: u32,
    pub size: u32,
    /// 内容在映像文件里的偏移
    pub file_offset: u32,
}

/// 映像打头的头部
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct RawExecHeader {
    pub magic: u32,
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl RawExecHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

/// 绑在一个打开文件上的可执行映像
pub struct Executable {
    file: OpenFile,
    header: RawExecHeader,
}

impl Executable {
    /// 读头部并验魔数
    pub fn new(file: OpenFile) -> Option<Self> {
        let mut header = RawExecHeader::default();
        if file.read_at(header.as_bytes_mut(), 0) != RawExecHeader::SIZE {
            return None;
        }
        (header.magic == MAGIC).then_some(Self { file, header })
    }

    /// 地址空间要铺到的大小，不含用户栈
    pub fn size(&self) -> usize {
        [self.header.code, self.header.init_data, self.header.uninit_data]
            .iter()
            .map(|segment| (segment.addr + segment.size) as usize)
            .max()
            .unwrap()
    }

    #[inline]
    pub fn code(&self) -> Segment {
        self.header.code
    }

    #[inline]
    pub fn init_data(&self) -> Segment {
        self.header.init_data
    }

    /// 读代码段的一截
    pub fn read_code(&self, buf: &mut [u8], offset: u32) -> usize {
        self.file.read_at(buf, self.header.code.file_offset + offset)
    }

    /// 读已初始化数据段的一截
    pub fn read_init_data(&self, buf: &mut [u8], offset: u32) -> usize {
        self.file
            .read_at(buf, self.header.init_data.file_offset + offset)
    }
}
