//! 元素与元素仓库。
//!
//! # 模块定位（Why）
//! - 元素是“某段抓包字节 + 若干解读（切面）”的节点；父子关系用于路径查询与上下文查找，
//!   但子元素绝不能延长父元素的生命周期；
//! - 因此所有元素都由只追加的 [`ElementArena`] 持有，父引用只是一个 [`ElementId`]，
//!   元素对仓库本身也只保留 `Weak`，不会形成引用环。
//!
//! # 契约（What）
//! - 元素一旦加入仓库便不会被移除，`ElementId` 在仓库生命周期内稳定；
//! - 子元素的编号恒大于父元素的编号；
//! - 切面集合保持插入顺序，允许同类切面重复出现；移除切面时，其 `on_removed` 回调在释放切面锁之后执行。

use std::{
    fmt,
    sync::{Arc, Weak},
};

use bytes::Bytes;
use parking_lot::RwLock;
use prism_buffer::{ByteRegion, Charset};

use crate::{
    CoreError, Facet, OrderedMultiMap,
    facet::{downcast_facet, facet_is, short_type_name},
    query::{PathQuery, PredicateEvaluator},
};

/// 元素在所属仓库内的唯一编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

impl ElementId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 只追加的元素仓库。
///
/// # 教案式说明
/// - **意图 (Why)**：以编号代替指针表达父子关系，父查找是一次下标访问；
/// - **契约 (What)**：`create_*` 可在任意线程调用，内部以写锁串行化编号分配；
///   读取（`get`/`parent_of`/`root_of`）只取读锁；
/// - **风险 (Trade-offs)**：元素永不回收，内存随抓包规模线性增长，这与“消息累积在历史中”的语义一致。
#[derive(Default)]
pub struct ElementArena {
    elements: RwLock<Vec<Arc<Element>>>,
}

impl ElementArena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 创建没有父元素的顶层元素（一条消息，或独立解码出的结构根）。
    pub fn create_root(self: &Arc<Self>, content: ByteRegion) -> Arc<Element> {
        self.insert(None, content)
    }

    /// 在 `parent` 下创建子元素；子元素的内容应当是父元素内容的切片或其解码结果。
    pub fn create_child(self: &Arc<Self>, parent: &Element, content: ByteRegion) -> Arc<Element> {
        self.insert(Some(parent.id), content)
    }

    fn insert(self: &Arc<Self>, parent: Option<ElementId>, content: ByteRegion) -> Arc<Element> {
        let mut elements = self.elements.write();
        let element = Arc::new(Element {
            id: ElementId(elements.len()),
            parent,
            arena: Arc::downgrade(self),
            content,
            facets: RwLock::new(Vec::new()),
        });
        elements.push(Arc::clone(&element));
        element
    }

    pub fn get(&self, id: ElementId) -> Option<Arc<Element>> {
        self.elements.read().get(id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    pub fn parent_of(&self, element: &Element) -> Option<Arc<Element>> {
        element.parent.and_then(|id| self.get(id))
    }

    /// 元素在父元素子集合中的键；同一元素被多个切面挂载时返回第一个键。
    pub fn key_of(&self, element: &Element) -> Option<String> {
        let parent = self.parent_of(element)?;
        parent
            .child_nodes_with_key()
            .entries()
            .find(|(_, child)| child.id == element.id)
            .map(|(key, _)| key.to_owned())
    }

    /// 沿父链上溯到顶层元素；元素自身为顶层时返回自身。
    pub fn root_of(&self, element: &Element) -> Option<Arc<Element>> {
        let mut current = element.id;
        let elements = self.elements.read();
        while let Some(parent) = elements.get(current.0)?.parent {
            current = parent;
        }
        elements.get(current.0).cloned()
    }
}

impl fmt::Debug for ElementArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementArena")
            .field("len", &self.len())
            .finish()
    }
}

/// 抓包树中的一个节点：一段字节区域及其有序切面集合。
pub struct Element {
    id: ElementId,
    parent: Option<ElementId>,
    arena: Weak<ElementArena>,
    content: ByteRegion,
    facets: RwLock<Vec<Arc<dyn Facet>>>,
}

impl Element {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn parent_id(&self) -> Option<ElementId> {
        self.parent
    }

    /// 所属仓库；仓库已被释放时返回 `None`。
    pub fn arena(&self) -> Option<Arc<ElementArena>> {
        self.arena.upgrade()
    }

    pub fn parent(&self) -> Option<Arc<Element>> {
        self.arena()?.parent_of(self)
    }

    /// 本元素在父元素子集合中的键。
    pub fn key(&self) -> Option<String> {
        self.arena()?.key_of(self)
    }

    /// 本元素所在的顶层消息。
    pub fn root(&self) -> Option<Arc<Element>> {
        self.arena()?.root_of(self)
    }

    pub fn content(&self) -> &ByteRegion {
        &self.content
    }

    /// 连续的原始字节（rawContent）。
    pub fn raw_content(&self) -> Bytes {
        self.content.to_bytes()
    }

    /// 以 UTF-8 解码原始字节，非法序列替换为 `U+FFFD`。
    pub fn raw_string_content(&self) -> String {
        self.content.to_string_lossy(Charset::Utf8)
    }

    /// 追加一个切面；已有的同类切面保持不变。
    pub fn add_facet<F: Facet>(&self, facet: F) {
        self.add_facet_arc(Arc::new(facet));
    }

    pub fn add_facet_arc(&self, facet: Arc<dyn Facet>) {
        tracing::trace!(element = %self.id, facet = facet.name(), "facet added");
        self.facets.write().push(facet);
    }

    /// 移除所有同类切面后追加新切面。
    pub fn add_or_replace_facet<F: Facet>(&self, facet: F) {
        self.remove_facet::<F>();
        self.add_facet(facet);
    }

    /// 移除所有 `T` 类型的切面，返回移除数量。
    ///
    /// 回调在释放切面写锁之后依次执行，回调内可以再次读取或修改本元素。
    pub fn remove_facet<T: Facet>(&self) -> usize {
        let removed: Vec<Arc<dyn Facet>> = {
            let mut facets = self.facets.write();
            let (removed, kept) = facets.drain(..).partition(|facet| facet_is::<T>(facet));
            *facets = kept;
            removed
        };
        for facet in &removed {
            facet.on_removed(self);
        }
        removed.len()
    }

    /// 第一个 `T` 类型的切面。
    pub fn facet<T: Facet>(&self) -> Option<Arc<T>> {
        self.facets.read().iter().find_map(downcast_facet::<T>)
    }

    /// 按插入顺序返回所有 `T` 类型的切面。
    pub fn facets_of<T: Facet>(&self) -> Vec<Arc<T>> {
        self.facets
            .read()
            .iter()
            .filter_map(downcast_facet::<T>)
            .collect()
    }

    /// 与 [`Element::facet`] 相同，缺失时返回 [`CoreError::MissingFacet`]。
    pub fn facet_or_fail<T: Facet>(&self) -> Result<Arc<T>, CoreError> {
        self.facet::<T>().ok_or_else(|| CoreError::MissingFacet {
            element: self.id,
            facet: short_type_name::<T>(),
        })
    }

    pub fn has_facet<T: Facet>(&self) -> bool {
        self.facets.read().iter().any(facet_is::<T>)
    }

    /// 当前切面集合的快照（插入顺序）。
    pub fn facets(&self) -> Vec<Arc<dyn Facet>> {
        self.facets.read().clone()
    }

    /// 所有切面子节点的并集：按切面插入顺序，再按各切面自身的子节点顺序。
    pub fn child_nodes_with_key(&self) -> OrderedMultiMap<Arc<Element>> {
        let facets = self.facets();
        let mut union = OrderedMultiMap::new();
        for facet in &facets {
            union.extend(facet.children());
        }
        union
    }

    pub fn child_nodes(&self) -> Vec<Arc<Element>> {
        self.child_nodes_with_key().into_iter().map(|(_, child)| child).collect()
    }

    pub fn children_with_key(&self, key: &str) -> Vec<Arc<Element>> {
        self.child_nodes_with_key().get_all(key).cloned().collect()
    }

    /// 在以本元素为 `$` 的上下文中执行路径查询。
    pub fn find_all(self: &Arc<Self>, path: &str) -> Result<Vec<Arc<Element>>, CoreError> {
        PathQuery::parse(path)?.execute(self, None)
    }

    /// 带谓词求值器的路径查询。
    pub fn find_all_with(
        self: &Arc<Self>,
        path: &str,
        evaluator: &dyn PredicateEvaluator,
    ) -> Result<Vec<Arc<Element>>, CoreError> {
        PathQuery::parse(path)?.execute(self, Some(evaluator))
    }

    /// 路径查询的第一个结果。
    pub fn find_element(self: &Arc<Self>, path: &str) -> Result<Option<Arc<Element>>, CoreError> {
        Ok(self.find_all(path)?.into_iter().next())
    }

    /// 透明包装节点以其内容子节点替代自身（可递归），其他节点返回自身。
    pub fn descend_if_advised(self: &Arc<Self>) -> Vec<Arc<Element>> {
        let carriers: Vec<Arc<dyn Facet>> = self
            .facets
            .read()
            .iter()
            .filter(|facet| facet.is_content_carrier())
            .cloned()
            .collect();
        if carriers.is_empty() {
            return vec![Arc::clone(self)];
        }
        carriers
            .iter()
            .flat_map(|facet| facet.children().into_iter().map(|(_, child)| child))
            .flat_map(|child| child.descend_if_advised())
            .collect()
    }

    /// 所有切面均允许时，本节点才可出现在最终查询结果中。
    pub fn keep_in_final_result(&self) -> bool {
        self.facets.read().iter().all(|facet| facet.keep_in_final_result())
    }

    pub fn expects_reply(&self) -> bool {
        self.facets.read().iter().any(|facet| facet.expects_reply())
    }

    pub fn is_reply(&self) -> bool {
        self.facets.read().iter().any(|facet| facet.is_reply())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facets: Vec<&'static str> = self.facets.read().iter().map(|facet| facet.name()).collect();
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("len", &self.content.len())
            .field("facets", &facets)
            .finish()
    }
}
