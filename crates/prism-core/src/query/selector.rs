//! 解析后的路径步骤。

use crate::multimap::keys_equal_ignore_case;

/// 一个以 `.` 分隔的路径段解析后的形态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// 路径末尾的空段：候选集原样保留。
    Identity,
    /// 后面还有段的空段：候选自身加上全部后代（文档顺序）。
    Descendants,
    /// 名称或 `*`，可带若干方括号选择器。
    Select { head: Head, brackets: Vec<Bracket> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Head {
    /// 段以 `[` 开头：选择器直接作用于当前候选的子节点。
    Current,
    /// `*`：全部子节点。
    All,
    /// 精确键匹配。
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Bracket {
    /// 非负整数：第 n 个子节点，越界得到空集。
    Index(usize),
    /// `'a'|~'b'`：按键选择子节点。
    Names(Vec<NameLiteral>),
    /// `*`：全部子节点。
    All,
    /// `?(...)`：交给外部谓词求值器逐个判断子节点。
    Predicate(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NameLiteral {
    pub(crate) name: String,
    pub(crate) ignore_case: bool,
}

impl NameLiteral {
    pub(crate) fn matches(&self, key: &str) -> bool {
        if self.ignore_case {
            keys_equal_ignore_case(&self.name, key)
        } else {
            self.name == key
        }
    }
}

impl Step {
    pub(crate) fn predicates(&self) -> impl Iterator<Item = &str> + '_ {
        let brackets: &[Bracket] = match self {
            Step::Select { brackets, .. } => brackets,
            _ => &[],
        };
        brackets.iter().filter_map(|bracket| match bracket {
            Bracket::Predicate(expression) => Some(expression.as_str()),
            _ => None,
        })
    }
}

/// 按 `application/x-www-form-urlencoded` 规则解码选择器字面量与查询参数键：`%XX` 为字节，`+` 为空格。
///
/// 非法的百分号序列或解码后不是 UTF-8 时返回 `None`。
pub fn url_decode(literal: &str) -> Option<String> {
    let bytes = literal.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                let high = hex_value(*bytes.get(index + 1)?)?;
                let low = hex_value(*bytes.get(index + 2)?)?;
                decoded.push((high << 4) | low);
                index += 3;
            }
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            other => {
                decoded.push(other);
                index += 1;
            }
        }
    }
    String::from_utf8(decoded).ok()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_decoding_handles_escapes() {
        assert_eq!(url_decode("x%2Did").as_deref(), Some("x-id"));
        assert_eq!(url_decode("a+b").as_deref(), Some("a b"));
        assert_eq!(url_decode("%C3%A4").as_deref(), Some("ä"));
        assert_eq!(url_decode("%zz"), None);
        assert_eq!(url_decode("%4"), None);
        assert_eq!(url_decode("%FF"), None);
    }
}
