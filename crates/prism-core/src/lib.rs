//! `prism-core` 定义抓包消息模型：元素/切面树、有序多值映射与路径查询引擎。
//!
//! # 模块定位（Why）
//! - 原始抓包字节在这里被组织成可检查、可查询、可以边构建边读取的树；
//! - 一段字节可以同时拥有多种解读（切面），每种解读贡献自己的命名子节点，路径查询在这些子节点上导航；
//! - 协议解码本身不在本 crate 内：解码插件只需实现 [`Facet`] 并向元素追加切面与子元素。
//!
//! # 结构概览（How）
//! - `element`：[`ElementArena`]（只追加的仓库，父引用为编号）与 [`Element`]；
//! - `facet`：[`Facet`] 能力契约与下转型辅助；
//! - `facets`：内置结构切面（HTTP、映射/列表、透明包装、TCP/IP、配对链接、标记）；
//! - `multimap`：[`OrderedMultiMap`]，保持顺序且允许重复键；
//! - `query`：[`PathQuery`] 与外部注入的 [`PredicateEvaluator`]；
//! - `error`：[`CoreError`] 及其稳定错误码。

mod element;
mod error;
mod facet;
pub mod facets;
mod multimap;
pub mod query;

pub use element::{Element, ElementArena, ElementId};
pub use error::CoreError;
pub use facet::{AsAny, Facet};
pub use multimap::OrderedMultiMap;
pub use prism_buffer::{BufferError, ByteRegion, Charset};
pub use query::{PathQuery, PredicateContext, PredicateEvaluator};
