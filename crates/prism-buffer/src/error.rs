use core::fmt;

/// `ByteRegion` 的错误域。
///
/// # 设计背景（Why）
/// - 字节区域只有一种失败方式：调用方给出的区间违反 `0 ≤ from ≤ to ≤ len`；
/// - crate 需要保持 `no_std + alloc`，因此不派生 `thiserror`，而是手写 `Display`，
///   上层（`prism-core::CoreError`）通过 `From` 吸收本类型。
///
/// # 契约说明（What）
/// - `from`/`to`：调用方请求的区间；对单点访问（`get`）而言 `to = from + 1`；
/// - `len`：请求发生时区域的逻辑长度。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// 请求区间越界。
    OutOfRange { from: usize, to: usize, len: usize },
}

impl BufferError {
    pub(crate) fn out_of_range(from: usize, to: usize, len: usize) -> Self {
        BufferError::OutOfRange { from, to, len }
    }

    /// 稳定错误码，遵循 `<域>.<语义>` 约定。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::OutOfRange { .. } => "buffer.out_of_range",
        }
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::OutOfRange { from, to, len } => write!(
                f,
                "byte range [{from}, {to}) is out of bounds for region of length {len}"
            ),
        }
    }
}

impl core::error::Error for BufferError {}
