use derive_more::{Display, Error as DeriveError};

/// 各门面操作的失败口径。没有异常，失败都从返回值走。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, DeriveError)]
pub enum Error {
    /// 路径里某一环不存在，或不是目录
    #[display("path not found")]
    PathNotFound,

    /// 目标名字已经被占了
    #[display("name already exists")]
    NameExists,

    /// 要删的目录还有东西
    #[display("directory not empty")]
    NotEmpty,

    /// 空闲扇区不够本次分配或扩展
    #[display("no space left on disk")]
    NoSpace,

    /// 文件已判了删除，只等最后一个句柄关掉
    #[display("file is pending removal")]
    Busy,

    /// 对象的种类不对：开目录、cd 到文件之类
    #[display("wrong kind of file system object")]
    KindMismatch,

    /// 根目录下 `SWAP.` 打头的目录名是留给交换文件的
    #[display("reserved name")]
    Reserved,

    /// 句柄表满了
    #[display("process handle table is full")]
    OutOfHandles,

    /// 空指针、非正长度、名字或路径超长
    #[display("invalid argument")]
    InvalidArgument,
}

impl From<sector_fs::NoSpace> for Error {
    fn from(_: sector_fs::NoSpace) -> Self {
        Self::NoSpace
    }
}
