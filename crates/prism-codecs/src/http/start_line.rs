//! 起始行与请求目标的字节级解析。
//!
//! 只返回相对输入的字节区间，元素的创建留给插件本体；这样区间可以直接映射为消息字节的切片。

use std::ops::Range;

use prism_core::query::url_decode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StartLine {
    Request {
        method: Range<usize>,
        target: Range<usize>,
    },
    Response {
        code: Range<usize>,
        status: u16,
        reason: Option<Range<usize>>,
    },
}

/// 识别 `METHOD SP target SP HTTP/x` 或 `HTTP/x SP ddd [SP reason]`。
pub(crate) fn parse_start_line(line: &[u8]) -> Option<StartLine> {
    if line.starts_with(b"HTTP/") {
        let code_start = position(line, b' ', 0)? + 1;
        let code_end = position(line, b' ', code_start).unwrap_or(line.len());
        let code = &line[code_start..code_end];
        if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let status = code
            .iter()
            .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));
        let reason = (code_end + 1 < line.len()).then(|| code_end + 1..line.len());
        return Some(StartLine::Response {
            code: code_start..code_end,
            status,
            reason,
        });
    }

    let method_end = position(line, b' ', 0)?;
    let target_end = position(line, b' ', method_end + 1)?;
    let method = &line[..method_end];
    if method.is_empty() || !method.iter().all(|b| b.is_ascii_uppercase() || *b == b'-') {
        return None;
    }
    if target_end == method_end + 1 || !line[target_end + 1..].starts_with(b"HTTP/") {
        return None;
    }
    Some(StartLine::Request {
        method: 0..method_end,
        target: method_end + 1..target_end,
    })
}

/// 请求目标的组成：基础路径与查询参数（键已 URL 解码，值保留原始区间）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) basic_path: Range<usize>,
    pub(crate) parameters: Vec<(String, Range<usize>)>,
}

pub(crate) fn parse_target(target: &[u8]) -> Target {
    let fragment = position(target, b'#', 0).unwrap_or(target.len());
    let query = position(&target[..fragment], b'?', 0);
    let mut parameters = Vec::new();
    if let Some(query) = query {
        let mut offset = query + 1;
        for pair in target[query + 1..fragment].split(|&b| b == b'&') {
            let pair_start = offset;
            offset += pair.len() + 1;
            if pair.is_empty() {
                continue;
            }
            let pair_end = pair_start + pair.len();
            let (key, value) = match position(pair, b'=', 0) {
                Some(eq) => (&pair[..eq], pair_start + eq + 1..pair_end),
                None => (pair, pair_end..pair_end),
            };
            let raw_key = String::from_utf8_lossy(key);
            let name = url_decode(&raw_key).unwrap_or_else(|| raw_key.into_owned());
            parameters.push((name, value));
        }
    }
    Target {
        basic_path: 0..query.unwrap_or(fragment),
        parameters,
    }
}

fn position(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|index| index + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_yields_method_and_target() {
        assert_eq!(
            parse_start_line(b"GET /a?b=1 HTTP/1.1"),
            Some(StartLine::Request {
                method: 0..3,
                target: 4..10,
            })
        );
        assert_eq!(parse_start_line(b"GET /a"), None);
        assert_eq!(parse_start_line(b"get /a HTTP/1.1"), None);
        assert_eq!(parse_start_line(b"GET  HTTP/1.1"), None);
    }

    #[test]
    fn status_line_reason_is_optional() {
        assert_eq!(
            parse_start_line(b"HTTP/1.1 404 Not Found"),
            Some(StartLine::Response {
                code: 9..12,
                status: 404,
                reason: Some(13..22),
            })
        );
        assert_eq!(
            parse_start_line(b"HTTP/1.1 204"),
            Some(StartLine::Response {
                code: 9..12,
                status: 204,
                reason: None,
            })
        );
        assert_eq!(parse_start_line(b"HTTP/1.1 20x OK"), None);
    }

    #[test]
    fn target_parameters_decode_keys_only() {
        let target = parse_target(b"/p?x%2Did=7&&flag&a+b=c%20d#frag");
        assert_eq!(target.basic_path, 0..2);
        let names: Vec<&str> = target.parameters.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["x-id", "flag", "a b"]);
        assert_eq!(target.parameters[0].1, 10..11);
        assert_eq!(target.parameters[1].1, 17..17);
        assert_eq!(target.parameters[2].1, 22..27);
    }

    #[test]
    fn target_without_query_is_all_path() {
        let target = parse_target(b"/index.html");
        assert_eq!(target.basic_path, 0..11);
        assert!(target.parameters.is_empty());
    }
}
