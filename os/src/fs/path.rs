//! 路径的拆分与合法性检查。`.` 与 `..` 不在话下。

use crate::config::{FILE_NAME_MAX_LEN, PATH_NAME_MAX_LEN};
use crate::Error;

/// 把路径拆成目录部分与末项名字。
/// 打头的 `/` 表示从根出发；结尾的 `/` 只要不是整条路径就先剪掉。
pub fn split_path(path: &str) -> Result<(&str, &str), Error> {
    if path.is_empty() || path.len() > PATH_NAME_MAX_LEN {
        return Err(Error::InvalidArgument);
    }

    let trimmed = if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };

    let (dir_path, name) = match trimmed.rfind('/') {
        None => ("", trimmed),
        Some(0) => ("/", &trimmed[1..]),
        Some(at) => (&trimmed[..at], &trimmed[at + 1..]),
    };

    if name.is_empty() || name.len() > FILE_NAME_MAX_LEN {
        return Err(Error::InvalidArgument);
    }
    Ok((dir_path, name))
}
