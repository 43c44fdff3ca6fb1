use std::fmt;

/// 保持插入顺序、允许重复键的关联容器。
///
/// # 设计背景（Why）
/// - 切面的子节点与 HTTP 头部都是“有名字、有顺序、可重复”的集合：`Set-Cookie` 可以出现多次，
///   路径查询的默认结果顺序也取决于插入顺序；
/// - 唯一键映射（`HashMap`/`BTreeMap`）会丢失顺序或合并重复键，因此独立成类型，而不是去适配标准映射接口。
///
/// # 契约说明（What）
/// - 迭代顺序恒等于插入顺序；
/// - `*_ignore_case` 系列先做 ASCII 折叠比较，再回退到 Unicode 小写比较；
/// - 位置访问 [`OrderedMultiMap::get_index`] 以插入序号为准，与键无关。
#[derive(Clone, PartialEq, Eq)]
pub struct OrderedMultiMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedMultiMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// 追加一条记录，从不覆盖已有的同名键。
    pub fn push(&mut self, key: impl Into<String>, value: V) {
        self.entries.push((key.into(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 第一个精确匹配 `key` 的值。
    pub fn get_first(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// 第一个大小写无关匹配 `key` 的值。
    pub fn get_first_ignore_case(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(candidate, _)| keys_equal_ignore_case(candidate, key))
            .map(|(_, value)| value)
    }

    /// 按插入顺序返回所有精确匹配 `key` 的值。
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a V> + 'a {
        self.entries
            .iter()
            .filter(move |(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// 按插入顺序返回所有大小写无关匹配 `key` 的值。
    pub fn get_all_ignore_case<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a V> + 'a {
        self.entries
            .iter()
            .filter(move |(candidate, _)| keys_equal_ignore_case(candidate, key))
            .map(|(_, value)| value)
    }

    /// 第 `index` 条记录（按插入顺序）。
    pub fn get_index(&self, index: usize) -> Option<(&str, &V)> {
        self.entries
            .get(index)
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_first(key).is_some()
    }

    pub fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.get_first_ignore_case(key).is_some()
    }

    /// 按插入顺序遍历 `(键, 值)`。
    pub fn entries(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.iter().map(|(_, value)| value)
    }

    /// 移除所有精确匹配 `key` 的记录，按原顺序返回被移除的值。
    pub fn remove_all(&mut self, key: &str) -> Vec<V> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (candidate, value) in self.entries.drain(..) {
            if candidate == key {
                removed.push(value);
            } else {
                kept.push((candidate, value));
            }
        }
        self.entries = kept;
        removed
    }
}

pub(crate) fn keys_equal_ignore_case(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right)
        || (!(left.is_ascii() && right.is_ascii()) && left.to_lowercase() == right.to_lowercase())
}

impl<V> Default for OrderedMultiMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for OrderedMultiMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, value)| (key, value)))
            .finish()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMultiMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V> Extend<(K, V)> for OrderedMultiMap<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.push(key, value);
        }
    }
}

impl<V> IntoIterator for OrderedMultiMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a OrderedMultiMap<V> {
    type Item = (&'a str, &'a V);
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (String, V)>, fn(&'a (String, V)) -> (&'a str, &'a V)>;

    fn into_iter(self) -> Self::IntoIter {
        fn split<V>((key, value): &(String, V)) -> (&str, &V) {
            (key.as_str(), value)
        }
        self.entries.iter().map(split::<V> as fn(&'a (String, V)) -> (&'a str, &'a V))
    }
}
