use alloc::{string::String, vec, vec::Vec};
use core::{cmp, fmt};

use bytes::{Bytes, BytesMut};
use spin::Mutex;

use crate::{BufferError, Charset, charset::chars_eq_ignore_case};

/// 默认分块容量（8 KiB），与典型 TCP 读缓冲同量级。
pub const DEFAULT_CHUNK_CAPACITY: usize = 8 * 1024;

const MAX_UTF8_WIDTH: usize = 4;

/// `ByteRegion` 是抓包字节的分块存储，同时也是它自己的零拷贝切片类型。
///
/// # 设计动机（Why）
/// - 抓包消息往往以网络包为单位陆续到达，需要 O(1) 摊还追加；
/// - 协议解析会把一条消息切成头部、正文、参数等大量子区间，每个子区间都要能独立查找与比较，
///   但不能复制底层字节；
/// - 读取方大多是扫描式访问，仅在需要连续内存时才物化一次副本，且该副本必须随写入失效。
///
/// # 结构设计（How）
/// - `segments`：按逻辑顺序排列的只读段（`Bytes`），每段非空；切片只是对段再做 `Bytes::slice`；
/// - `starts`：每段的逻辑起始偏移，用二分查找把逻辑下标映射到 `(段, 段内偏移)`；
/// - `tail`：当前固定容量分块中尚未写入的剩余空间，追加先写入此处再冻结为新段；
/// - `materialized`：多段区域的拼接副本缓存，所有 `&mut self` 写操作同步清空。
///
/// # 契约说明（What）
/// - `len() == Σ segments[i].len()`，切片 `slice(from, to)` 的长度恒为 `to - from`；
/// - 所有区间操作在违反 `0 ≤ from ≤ to ≤ len` 时返回 [`BufferError::OutOfRange`]；
/// - 克隆与切片共享底层内存；对副本的追加写入新的分块，不会影响原区域。
///
/// # 风险与取舍（Trade-offs）
/// - 每次 `append` 都会冻结出一个新段，段数量随追加次数增长；对于“按包追加”的抓包场景这是可接受的，
///   换来的是任意时刻都能以 `&self` 零拷贝切片。
pub struct ByteRegion {
    segments: Vec<Bytes>,
    starts: Vec<usize>,
    len: usize,
    tail: BytesMut,
    chunk_capacity: usize,
    materialized: Mutex<Option<Bytes>>,
}

impl ByteRegion {
    /// 创建空区域，使用 [`DEFAULT_CHUNK_CAPACITY`]。
    pub fn new() -> Self {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    /// 以指定分块容量创建空区域；容量为 0 时按 1 处理。
    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self {
            segments: Vec::new(),
            starts: Vec::new(),
            len: 0,
            tail: BytesMut::new(),
            chunk_capacity: chunk_capacity.max(1),
            materialized: Mutex::new(None),
        }
    }

    /// 以已有的 `Bytes` 作为唯一段构造区域，不复制。
    pub fn from_bytes(bytes: Bytes) -> Self {
        let mut region = Self::new();
        region.push_segment(bytes);
        region
    }

    /// 逻辑长度。
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 追加新分块时使用的容量。
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// 当前的段数量。
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// 按逻辑顺序遍历各段的连续切片。
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.segments.iter().map(|segment| segment.as_ref())
    }

    /// 追加字节。
    ///
    /// # 执行逻辑（How）
    /// 1. 清空物化缓存；
    /// 2. 若当前分块已写满，申请一个新的 `chunk_capacity` 分块；
    /// 3. 写入不超过剩余容量的前缀，并将已写部分 `split().freeze()` 为新段；
    /// 4. 重复直到输入耗尽。写入永远不触发已有分块的重新分配。
    pub fn append(&mut self, mut data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.invalidate();
        while !data.is_empty() {
            if self.tail.capacity() == self.tail.len() {
                self.tail = BytesMut::with_capacity(self.chunk_capacity);
            }
            let room = self.tail.capacity() - self.tail.len();
            let take = cmp::min(room, data.len());
            self.tail.extend_from_slice(&data[..take]);
            let written = self.tail.split().freeze();
            self.push_segment(written);
            data = &data[take..];
        }
    }

    /// 以零拷贝方式追加一段已有的 `Bytes`。
    pub fn append_bytes(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.invalidate();
        self.push_segment(bytes);
    }

    /// 以零拷贝方式追加另一个区域的全部内容。
    pub fn append_region(&mut self, other: &ByteRegion) {
        if other.is_empty() {
            return;
        }
        self.invalidate();
        for segment in &other.segments {
            self.push_segment(segment.clone());
        }
    }

    /// 读取单个字节。
    pub fn get(&self, index: usize) -> Result<u8, BufferError> {
        if index >= self.len {
            return Err(BufferError::out_of_range(index, index + 1, self.len));
        }
        let (segment, offset) = self.locate(index);
        Ok(self.segments[segment][offset])
    }

    /// 返回 `[from, to)` 的零拷贝视图（subArray）。
    ///
    /// - 完整区间返回与源共享全部段的视图；
    /// - 越界返回 [`BufferError::OutOfRange`]。
    pub fn slice(&self, from: usize, to: usize) -> Result<ByteRegion, BufferError> {
        self.check_range(from, to)?;
        if from == 0 && to == self.len {
            return Ok(self.clone());
        }
        Ok(self.slice_unchecked(from, to))
    }

    /// 将逻辑长度收缩为 `new_len`，不重新分配。
    pub fn truncate(&mut self, new_len: usize) -> Result<(), BufferError> {
        if new_len > self.len {
            return Err(BufferError::out_of_range(0, new_len, self.len));
        }
        if new_len == self.len {
            return Ok(());
        }
        self.invalidate();
        if new_len == 0 {
            self.segments.clear();
            self.starts.clear();
        } else {
            let (segment, offset) = self.locate(new_len);
            let keep = if offset > 0 { segment + 1 } else { segment };
            self.segments.truncate(keep);
            self.starts.truncate(keep);
            if offset > 0 {
                self.segments[segment].truncate(offset);
            }
        }
        self.len = new_len;
        Ok(())
    }

    /// 物化为连续字节（toByteArray）。
    ///
    /// - 空区域返回空 `Bytes`；单段区域直接返回该段（引用计数克隆）；
    /// - 多段区域拼接一次并缓存，后续调用复用缓存直到区域被修改。
    pub fn to_bytes(&self) -> Bytes {
        match self.segments.len() {
            0 => Bytes::new(),
            1 => self.segments[0].clone(),
            _ => {
                let mut memo = self.materialized.lock();
                if let Some(bytes) = memo.as_ref() {
                    return bytes.clone();
                }
                let mut joined = BytesMut::with_capacity(self.len);
                for segment in &self.segments {
                    joined.extend_from_slice(segment);
                }
                let frozen = joined.freeze();
                *memo = Some(frozen.clone());
                frozen
            }
        }
    }

    /// 复制为 `Vec<u8>`。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }

    /// 是否持有物化缓存，仅用于诊断与测试。
    pub fn has_materialized_copy(&self) -> bool {
        self.materialized.lock().is_some()
    }

    /// 逐字节遍历。
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes_from(0)
    }

    /// 按字符集解码全部内容。
    pub fn to_string_lossy(&self, charset: Charset) -> String {
        match self.segments.len() {
            0 => String::new(),
            1 => charset.decode(&self.segments[0]),
            _ => charset.decode(&self.to_bytes()),
        }
    }

    /// 自 `from` 起查找单个字节。
    pub fn index_of_byte(&self, needle: u8, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let (first, offset) = self.locate(from);
        for index in first..self.segments.len() {
            let skip = if index == first { offset } else { 0 };
            if let Some(hit) = self.segments[index][skip..].iter().position(|&b| b == needle) {
                return Some(self.starts[index] + skip + hit);
            }
        }
        None
    }

    /// 自 `from` 起查找字节序列，匹配可跨越段边界。
    ///
    /// 空 needle 在 `from ≤ len` 时返回 `from`，与常见字符串语义一致。
    pub fn index_of(&self, needle: &[u8], from: usize) -> Option<usize> {
        let Some((&head, _)) = needle.split_first() else {
            return (from <= self.len).then_some(from);
        };
        let last_start = self.len.checked_sub(needle.len())?;
        let mut position = from;
        while position <= last_start {
            position = self.index_of_byte(head, position)?;
            if position > last_start {
                return None;
            }
            if self.matches_at(position, needle) {
                return Some(position);
            }
            position += 1;
        }
        None
    }

    /// 查找最后一次出现的单个字节。
    pub fn last_index_of_byte(&self, needle: u8) -> Option<usize> {
        self.rfind_byte(needle, self.len.checked_sub(1)?)
    }

    /// 查找最后一次出现的字节序列。
    pub fn last_index_of(&self, needle: &[u8]) -> Option<usize> {
        let Some((&head, _)) = needle.split_first() else {
            return Some(self.len);
        };
        let mut candidate = self.len.checked_sub(needle.len())?;
        loop {
            let position = self.rfind_byte(head, candidate)?;
            if self.matches_at(position, needle) {
                return Some(position);
            }
            candidate = position.checked_sub(1)?;
        }
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.matches_at(0, prefix)
    }

    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.len >= suffix.len() && self.matches_at(self.len - suffix.len(), suffix)
    }

    /// 忽略区域开头的 ASCII 空白后判断前缀。
    pub fn starts_with_trimmed(&self, prefix: &[u8]) -> bool {
        let start = self
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.len);
        self.matches_at(start, prefix)
    }

    /// 忽略区域末尾的 ASCII 空白后判断后缀。
    pub fn ends_with_trimmed(&self, suffix: &[u8]) -> bool {
        let end = self.trimmed_end();
        end >= suffix.len() && self.matches_at(end - suffix.len(), suffix)
    }

    /// 在给定字符集下大小写无关地判断前缀；`prefix` 无法以该字符集表示时返回 `false`。
    ///
    /// `Utf8` 下逐字符比较：大小写折叠可能改变字符的编码长度（如 `ſ`/`s`、`K`/`k`），
    /// 因此候选窗口按字符数而不是按 `prefix` 的字节数截取。
    pub fn starts_with_ignore_case(&self, prefix: &str, charset: Charset) -> bool {
        if charset == Charset::Utf8 {
            let window = self.len.min(prefix.chars().count() * MAX_UTF8_WIDTH);
            let head = Charset::Utf8.decode(&self.copy_range(0, window));
            let mut candidates = head.chars();
            return prefix
                .chars()
                .all(|wanted| candidates.next().is_some_and(|found| chars_eq_ignore_case(found, wanted)));
        }
        let Some(encoded) = charset.encode(prefix) else {
            return false;
        };
        if encoded.len() > self.len {
            return false;
        }
        charset.eq_ignore_case(&self.copy_range(0, encoded.len()), &encoded)
    }

    /// 在给定字符集下大小写无关地判断后缀；`Utf8` 的比较方式同 [`Self::starts_with_ignore_case`]。
    pub fn ends_with_ignore_case(&self, suffix: &str, charset: Charset) -> bool {
        if charset == Charset::Utf8 {
            let window = self.len.min(suffix.chars().count() * MAX_UTF8_WIDTH);
            let tail = Charset::Utf8.decode(&self.copy_range(self.len - window, self.len));
            let mut candidates = tail.chars().rev();
            return suffix
                .chars()
                .rev()
                .all(|wanted| candidates.next().is_some_and(|found| chars_eq_ignore_case(found, wanted)));
        }
        let Some(encoded) = charset.encode(suffix) else {
            return false;
        };
        if encoded.len() > self.len {
            return false;
        }
        charset.eq_ignore_case(&self.copy_range(self.len - encoded.len(), self.len), &encoded)
    }

    /// 按分隔符切分为有序的零拷贝视图列表。
    ///
    /// - `n` 次命中产生 `n + 1` 段，空段保留；
    /// - 空分隔符返回只含整个区域的列表。
    pub fn split(&self, delimiter: &[u8]) -> Vec<ByteRegion> {
        if delimiter.is_empty() {
            return vec![self.clone()];
        }
        let mut parts = Vec::new();
        let mut start = 0;
        while let Some(hit) = self.index_of(delimiter, start) {
            parts.push(self.slice_unchecked(start, hit));
            start = hit + delimiter.len();
        }
        parts.push(self.slice_unchecked(start, self.len));
        parts
    }

    fn check_range(&self, from: usize, to: usize) -> Result<(), BufferError> {
        if from > to || to > self.len {
            return Err(BufferError::out_of_range(from, to, self.len));
        }
        Ok(())
    }

    /// 调用方已保证 `from ≤ to ≤ len`。
    fn slice_unchecked(&self, from: usize, to: usize) -> ByteRegion {
        let mut view = ByteRegion::with_chunk_capacity(self.chunk_capacity);
        if from == to {
            return view;
        }
        let (first, offset) = self.locate(from);
        let mut remaining = to - from;
        let mut skip = offset;
        for segment in &self.segments[first..] {
            let take = cmp::min(segment.len() - skip, remaining);
            view.push_segment(segment.slice(skip..skip + take));
            remaining -= take;
            skip = 0;
            if remaining == 0 {
                break;
            }
        }
        view
    }

    fn push_segment(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.starts.push(self.len);
        self.len += segment.len();
        self.segments.push(segment);
    }

    fn invalidate(&mut self) {
        *self.materialized.get_mut() = None;
    }

    /// 将 `position < len` 映射为 `(段下标, 段内偏移)`。
    fn locate(&self, position: usize) -> (usize, usize) {
        debug_assert!(position < self.len);
        match self.starts.binary_search(&position) {
            Ok(index) => (index, 0),
            Err(index) => (index - 1, position - self.starts[index - 1]),
        }
    }

    fn bytes_from(&self, position: usize) -> impl Iterator<Item = u8> + '_ {
        let (first, offset) = if position < self.len {
            self.locate(position)
        } else {
            (self.segments.len(), 0)
        };
        self.segments[first..]
            .iter()
            .enumerate()
            .flat_map(move |(index, segment)| {
                let skip = if index == 0 { offset } else { 0 };
                segment[skip..].iter().copied()
            })
    }

    fn matches_at(&self, position: usize, needle: &[u8]) -> bool {
        match position.checked_add(needle.len()) {
            Some(end) if end <= self.len => self
                .bytes_from(position)
                .zip(needle.iter())
                .all(|(actual, &expected)| actual == expected),
            _ => false,
        }
    }

    /// 自 `at`（含）向前查找字节。
    fn rfind_byte(&self, needle: u8, at: usize) -> Option<usize> {
        if at >= self.len {
            return None;
        }
        let (last, offset) = self.locate(at);
        for index in (0..=last).rev() {
            let segment = &self.segments[index];
            let end = if index == last { offset + 1 } else { segment.len() };
            if let Some(hit) = segment[..end].iter().rposition(|&b| b == needle) {
                return Some(self.starts[index] + hit);
            }
        }
        None
    }

    fn trimmed_end(&self) -> usize {
        for index in (0..self.segments.len()).rev() {
            if let Some(hit) = self.segments[index]
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
            {
                return self.starts[index] + hit + 1;
            }
        }
        0
    }

    fn copy_range(&self, from: usize, to: usize) -> Vec<u8> {
        self.bytes_from(from).take(to - from).collect()
    }
}

impl Clone for ByteRegion {
    /// 克隆共享全部段与物化缓存，但不共享未写满的分块。
    fn clone(&self) -> Self {
        Self {
            segments: self.segments.clone(),
            starts: self.starts.clone(),
            len: self.len,
            tail: BytesMut::new(),
            chunk_capacity: self.chunk_capacity,
            materialized: Mutex::new(self.materialized.lock().clone()),
        }
    }
}

impl Default for ByteRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ByteRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteRegion")
            .field("len", &self.len)
            .field("segments", &self.segments.len())
            .field("chunk_capacity", &self.chunk_capacity)
            .finish()
    }
}

impl PartialEq for ByteRegion {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for ByteRegion {}

impl PartialEq<[u8]> for ByteRegion {
    fn eq(&self, other: &[u8]) -> bool {
        self.len == other.len() && self.iter().eq(other.iter().copied())
    }
}

impl PartialEq<&[u8]> for ByteRegion {
    fn eq(&self, other: &&[u8]) -> bool {
        *self == **other
    }
}

impl From<&[u8]> for ByteRegion {
    fn from(value: &[u8]) -> Self {
        let mut region = Self::new();
        region.append(value);
        region
    }
}

impl From<Vec<u8>> for ByteRegion {
    fn from(value: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(value))
    }
}

impl From<Bytes> for ByteRegion {
    fn from(value: Bytes) -> Self {
        Self::from_bytes(value)
    }
}

impl From<&str> for ByteRegion {
    fn from(value: &str) -> Self {
        Self::from(value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(parts: &[&[u8]]) -> ByteRegion {
        let mut region = ByteRegion::with_chunk_capacity(4);
        for part in parts {
            region.append(part);
        }
        region
    }

    #[test]
    fn append_splits_into_fixed_capacity_chunks() {
        let region = chunked(&[b"abcdefghij"]);
        assert_eq!(region.len(), 10);
        let lens: Vec<usize> = region.segments().map(<[u8]>::len).collect();
        assert_eq!(lens, vec![4, 4, 2]);
    }

    #[test]
    fn small_appends_fill_the_open_chunk_before_allocating() {
        let region = chunked(&[b"ab", b"cd", b"ef"]);
        let lens: Vec<usize> = region.segments().map(<[u8]>::len).collect();
        assert_eq!(lens, vec![2, 2, 2]);
        assert_eq!(region.to_vec(), b"abcdef");
    }

    #[test]
    fn materialized_copy_is_dropped_on_append_and_truncate() {
        let mut region = chunked(&[b"abc", b"def"]);
        assert_eq!(region.to_bytes().as_ref(), b"abcdef");
        assert!(region.has_materialized_copy());

        region.append(b"g");
        assert!(!region.has_materialized_copy());
        assert_eq!(region.to_bytes().as_ref(), b"abcdefg");

        region.truncate(2).expect("收缩到合法长度");
        assert!(!region.has_materialized_copy());
        assert_eq!(region.to_bytes().as_ref(), b"ab");
    }

    #[test]
    fn single_segment_is_returned_without_memoizing() {
        let region = ByteRegion::from(b"hello".to_vec());
        assert_eq!(region.to_bytes().as_ref(), b"hello");
        assert!(!region.has_materialized_copy());
    }

    #[test]
    fn truncate_inside_a_segment_keeps_the_prefix() {
        let mut region = chunked(&[b"abcdefghij"]);
        region.truncate(6).expect("合法收缩");
        assert_eq!(region.to_vec(), b"abcdef");
        assert_eq!(region.segment_count(), 2);
        assert!(region.truncate(7).is_err());
    }

    #[test]
    fn slicing_after_truncate_is_checked_against_the_new_length() {
        let mut region = chunked(&[b"abcdefgh"]);
        let before = region.slice(2, 8).expect("截断前合法");
        region.truncate(4).expect("合法收缩");
        assert_eq!(
            region.slice(2, 8),
            Err(BufferError::OutOfRange { from: 2, to: 8, len: 4 })
        );
        assert_eq!(before.to_vec(), b"cdefgh");
    }

    #[test]
    fn appending_to_a_slice_does_not_touch_the_source() {
        let source = chunked(&[b"abcdef"]);
        let mut view = source.slice(1, 3).expect("合法区间");
        view.append(b"XY");
        assert_eq!(view.to_vec(), b"bcXY");
        assert_eq!(source.to_vec(), b"abcdef");
    }

    #[test]
    fn trimmed_and_case_insensitive_affixes() {
        let region = chunked(&[b"  \r\nHTTP/1.1 200", b" OK \r\n"]);
        assert!(region.starts_with_trimmed(b"HTTP/"));
        assert!(!region.starts_with(b"HTTP/"));
        assert!(region.ends_with_trimmed(b"OK"));
        assert!(region.ends_with_ignore_case("ok \r\n", Charset::Ascii));

        let body = ByteRegion::from("Content-Type: JSON");
        assert!(body.starts_with_ignore_case("content-type", Charset::Utf8));
        assert!(!body.starts_with_ignore_case("content-typé", Charset::Ascii));
    }

    #[test]
    fn utf8_case_folding_may_change_encoded_width() {
        // `ſ` 占两字节、`K`（开尔文符号）占三字节，折叠后的 `s`、`k` 各占一字节。
        let long_s = chunked(&["ſet-cookie: a".as_bytes()]);
        assert!(long_s.starts_with_ignore_case("SET-", Charset::Utf8));
        assert!(!long_s.starts_with_ignore_case("SET-X", Charset::Utf8));

        let kelvin = chunked(&["100 \u{212A}".as_bytes()]);
        assert!(kelvin.ends_with_ignore_case(" k", Charset::Utf8));
        assert!(kelvin.ends_with_ignore_case("100 K", Charset::Utf8));
        assert!(!kelvin.ends_with_ignore_case("x100 k", Charset::Utf8));

        let plain = ByteRegion::from("set");
        assert!(plain.starts_with_ignore_case("ſET", Charset::Utf8));
        assert!(plain.starts_with_ignore_case("", Charset::Utf8));
    }

    #[test]
    fn split_keeps_empty_parts() {
        let region = chunked(&[b"a,,b", b",c,"]);
        let parts: Vec<Vec<u8>> = region.split(b",").iter().map(ByteRegion::to_vec).collect();
        assert_eq!(
            parts,
            vec![b"a".to_vec(), Vec::new(), b"b".to_vec(), b"c".to_vec(), Vec::new()]
        );
    }

    #[test]
    fn last_index_of_crosses_segment_boundaries() {
        let region = chunked(&[b"\r\n\r", b"\nab\r", b"\n\r\nx"]);
        assert_eq!(region.last_index_of(b"\r\n"), Some(8));
        assert_eq!(region.index_of(b"\r\n\r\n", 0), Some(0));
        assert_eq!(region.index_of(b"\r\n\r\n", 1), Some(6));
        assert_eq!(region.last_index_of_byte(b'a'), Some(4));
    }

    #[test]
    fn get_is_bounds_checked() {
        let region = ByteRegion::from("ab");
        assert_eq!(region.get(1), Ok(b'b'));
        assert_eq!(
            region.get(2),
            Err(BufferError::OutOfRange { from: 2, to: 3, len: 2 })
        );
    }
}
