//! 路径文本 → [`Step`] 序列。
//!
//! # 执行逻辑（How）
//! 1. 校验起始符（`$`，或相对路径允许的 `@`）；
//! 2. 在引号与括号之外按 `.` 切段：末尾空段为恒等，其余空段为递归下降；
//! 3. 每段拆为“头部（名称 / `*` / 空）+ 若干方括号选择器”，选择器按“整数 → `?(…)` → `*` → 字面量集合”的优先级识别。
//!
//! 所有语法错误都在执行前以 [`CoreError::MalformedPath`] 报告。

use crate::CoreError;

use super::selector::{Bracket, Head, NameLiteral, Step, url_decode};

pub(crate) fn parse_steps(path: &str, allow_relative: bool) -> Result<Vec<Step>, CoreError> {
    let rest = match path.as_bytes().first() {
        Some(b'$') => &path[1..],
        Some(b'@') if allow_relative => &path[1..],
        _ if allow_relative => return Err(CoreError::malformed(path, "path must start with `$` or `@`")),
        _ => return Err(CoreError::malformed(path, "path must start with `$`")),
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = split_top_level(path, rest, b'.')?;
    match rest.as_bytes()[0] {
        b'.' => {
            segments.remove(0);
        }
        b'[' => {}
        _ => {
            return Err(CoreError::malformed(
                path,
                "expected `.` or `[` after the root marker",
            ));
        }
    }

    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| match *segment {
            "" if index == last => Ok(Step::Identity),
            "" => Ok(Step::Descendants),
            text => parse_segment(path, text),
        })
        .collect()
}

fn parse_segment(path: &str, segment: &str) -> Result<Step, CoreError> {
    let head_end = first_top_level_bracket(segment).unwrap_or(segment.len());
    let (head_text, bracket_text) = segment.split_at(head_end);
    let head = match head_text {
        "" => Head::Current,
        "*" => Head::All,
        quoted if quoted.starts_with('\'') => Head::Name(parse_quoted(path, quoted)?),
        bare => Head::Name(parse_bare_key(path, bare)?),
    };
    let brackets = parse_brackets(path, bracket_text)?;
    Ok(Step::Select { head, brackets })
}

fn parse_bare_key(path: &str, key: &str) -> Result<String, CoreError> {
    if key.trim() != key {
        return Err(CoreError::malformed(
            path,
            format!("key `{key}` has an unescaped leading or trailing space"),
        ));
    }
    if key.contains(['\'', '"', '(', ')', ']']) {
        return Err(CoreError::malformed(
            path,
            format!("unexpected character in key `{key}`"),
        ));
    }
    Ok(key.to_owned())
}

/// 解析一个完整的 `'…'` 字面量，反斜杠转义下一个字符。
fn parse_quoted(path: &str, text: &str) -> Result<String, CoreError> {
    let mut chars = text.char_indices();
    if !matches!(chars.next(), Some((_, '\''))) {
        return Err(CoreError::malformed(path, format!("expected quoted name, found `{text}`")));
    }
    let mut name = String::new();
    let mut escaped = false;
    for (index, c) in chars {
        match c {
            _ if escaped => {
                name.push(c);
                escaped = false;
            }
            '\\' => escaped = true,
            '\'' if index + 1 == text.len() => return Ok(name),
            '\'' => {
                return Err(CoreError::malformed(
                    path,
                    format!("unexpected text after quoted name in `{text}`"),
                ));
            }
            _ => name.push(c),
        }
    }
    Err(CoreError::malformed(path, format!("unterminated quote in `{text}`")))
}

fn parse_brackets(path: &str, mut rest: &str) -> Result<Vec<Bracket>, CoreError> {
    let mut brackets = Vec::new();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(CoreError::malformed(
                path,
                format!("unexpected text `{rest}` after selector"),
            ));
        }
        let close = matching_close(rest)
            .ok_or_else(|| CoreError::malformed(path, "unbalanced brackets"))?;
        brackets.push(parse_bracket(path, &rest[1..close])?);
        rest = &rest[close + 1..];
    }
    Ok(brackets)
}

fn parse_bracket(path: &str, inner: &str) -> Result<Bracket, CoreError> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Err(CoreError::malformed(path, "empty selector `[]`"));
    }
    if inner.bytes().all(|b| b.is_ascii_digit()) {
        // 超出 `usize` 的下标不可能命中任何子节点，饱和后按越界处理。
        return Ok(Bracket::Index(inner.parse().unwrap_or(usize::MAX)));
    }
    if let Some(expression) = inner.strip_prefix("?(").and_then(|e| e.strip_suffix(')')) {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(CoreError::malformed(path, "empty predicate `?()`"));
        }
        return Ok(Bracket::Predicate(expression.to_owned()));
    }
    if inner == "*" {
        return Ok(Bracket::All);
    }

    let unrecognised = || CoreError::malformed(path, format!("unrecognised selector `[{inner}]`"));
    let mut names = Vec::new();
    for part in split_top_level(path, inner, b'|')? {
        let part = part.trim();
        let (ignore_case, quoted) = match part.strip_prefix('~') {
            Some(quoted) => (true, quoted.trim_start()),
            None => (false, part),
        };
        if !quoted.starts_with('\'') {
            return Err(unrecognised());
        }
        let literal = parse_quoted(path, quoted)?;
        let name = url_decode(&literal).ok_or_else(|| {
            CoreError::malformed(path, format!("invalid URL encoding in `{literal}`"))
        })?;
        names.push(NameLiteral { name, ignore_case });
    }
    Ok(Bracket::Names(names))
}

/// 引号内的状态跟踪：支持单双引号与反斜杠转义。
#[derive(Default)]
struct QuoteState {
    open: Option<u8>,
    escaped: bool,
}

impl QuoteState {
    /// 喂入一个字节；返回该字节是否位于引号之外且不是引号本身。
    fn outside(&mut self, byte: u8) -> bool {
        match self.open {
            Some(_) if self.escaped => self.escaped = false,
            Some(_) if byte == b'\\' => self.escaped = true,
            Some(quote) if byte == quote => self.open = None,
            Some(_) => {}
            None if byte == b'\'' || byte == b'"' => self.open = Some(byte),
            None => return true,
        }
        false
    }
}

/// 在引号与括号之外按 `separator` 切分。
fn split_top_level<'t>(path: &str, text: &'t str, separator: u8) -> Result<Vec<&'t str>, CoreError> {
    let mut parts = Vec::new();
    let mut quotes = QuoteState::default();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, &byte) in text.as_bytes().iter().enumerate() {
        if !quotes.outside(byte) {
            continue;
        }
        match byte {
            b'[' | b'(' => depth += 1,
            b']' | b')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CoreError::malformed(path, "unbalanced brackets"))?;
            }
            _ if byte == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if quotes.open.is_some() {
        return Err(CoreError::malformed(path, "unterminated quote"));
    }
    if depth != 0 {
        return Err(CoreError::malformed(path, "unbalanced brackets"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn first_top_level_bracket(segment: &str) -> Option<usize> {
    let mut quotes = QuoteState::default();
    segment
        .bytes()
        .position(|byte| quotes.outside(byte) && byte == b'[')
}

/// `text` 以 `[` 开头，返回与之匹配的 `]` 的下标。
fn matching_close(text: &str) -> Option<usize> {
    let mut quotes = QuoteState::default();
    let mut depth = 0usize;
    for (index, byte) in text.bytes().enumerate() {
        if !quotes.outside(byte) {
            continue;
        }
        match byte {
            b'[' | b'(' => depth += 1,
            b']' | b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (byte == b']').then_some(index);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(key: &str) -> Step {
        Step::Select {
            head: Head::Name(key.to_owned()),
            brackets: Vec::new(),
        }
    }

    #[test]
    fn empty_segments_mean_identity_or_descent() {
        assert_eq!(parse_steps("$", false), Ok(Vec::new()));
        assert_eq!(parse_steps("$.a.", false), Ok(vec![name("a"), Step::Identity]));
        assert_eq!(parse_steps("$..a", false), Ok(vec![Step::Descendants, name("a")]));
        assert_eq!(
            parse_steps("$.a..b", false),
            Ok(vec![name("a"), Step::Descendants, name("b")])
        );
    }

    #[test]
    fn quotes_protect_dots_and_spaces() {
        assert_eq!(
            parse_steps("$.'a.b'.' c '", false),
            Ok(vec![name("a.b"), name(" c ")])
        );
    }

    #[test]
    fn brackets_are_recognised_in_priority_order() {
        let steps = parse_steps("$.h[0][*][?(@.x == 'a]')][~'x%2Did'|'b']", false).expect("合法路径");
        assert_eq!(
            steps,
            vec![Step::Select {
                head: Head::Name("h".to_owned()),
                brackets: vec![
                    Bracket::Index(0),
                    Bracket::All,
                    Bracket::Predicate("@.x == 'a]'".to_owned()),
                    Bracket::Names(vec![
                        NameLiteral {
                            name: "x-id".to_owned(),
                            ignore_case: true,
                        },
                        NameLiteral {
                            name: "b".to_owned(),
                            ignore_case: false,
                        },
                    ]),
                ],
            }]
        );
    }

    #[test]
    fn syntax_errors_are_malformed_paths() {
        for path in [
            "header",
            "@.a",
            "$a",
            "$. a",
            "$.a ",
            "$.a[",
            "$.a]",
            "$.a[x]",
            "$.a[]",
            "$.a['x'",
            "$.a[0]b",
            "$.a[?()]",
            "$.a['%zz']",
        ] {
            let err = parse_steps(path, false).expect_err(path);
            assert_eq!(err.code(), "query.malformed_path", "{path}");
        }
    }

    #[test]
    fn relative_paths_need_opt_in() {
        assert_eq!(parse_steps("@.a", true), Ok(vec![name("a")]));
        assert!(parse_steps("a", true).is_err());
    }
}
