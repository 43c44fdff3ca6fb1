#![cfg_attr(not(feature = "std"), no_std)]

//! `prism-buffer` 提供抓包数据的底层存储：分块追加、零拷贝切片的 [`ByteRegion`]。
//!
//! # 模块定位（Why）
//! - 协议抓包体量大，且绝大多数访问是“扫描式”的（查找头部分隔符、魔数比对、前后缀判断），
//!   复制才是主要成本；因此存储层以固定容量分块 + 引用计数切片为核心，而不是单块 `Vec<u8>`。
//! - 上层元素树（`prism-core`）中的每个节点都持有一段 `ByteRegion`，子节点的字节总是父节点字节的切片，
//!   借助 `bytes::Bytes` 的引用计数实现“同一份内存，多种视图”。
//!
//! # 设计概要（How）
//! - `region` 模块实现 [`ByteRegion`]：段列表 + 段起始偏移表，支持 O(1) 摊还追加与 O(log n) 定位；
//! - `charset` 模块提供 [`Charset`]，用于显式字符集下的大小写无关前后缀比较；
//! - `error` 模块定义唯一的错误 [`BufferError::OutOfRange`]，越界永远视为编程或数据损坏信号。
//!
//! # 契约（What）
//! - 所有区间操作都满足 `0 ≤ from ≤ to ≤ len`，否则返回错误而非 panic；
//! - 物化缓存（`to_bytes` 的拼接副本）在任何追加/截断时同步失效；
//! - 本 crate 仅依赖 `alloc`，关闭 `std` 特性后可在 `no_std` 环境构建。

extern crate alloc;

mod charset;
mod error;
mod region;

pub use charset::Charset;
pub use error::BufferError;
pub use region::{ByteRegion, DEFAULT_CHUNK_CAPACITY};
