use alloc::{
    string::{String, ToString},
    vec::Vec,
};

/// 大小写无关比较时使用的显式字符集。
///
/// - `Ascii`：仅 7 bit 字符，非 ASCII 字节解码为替换字符；
/// - `Latin1`：ISO-8859-1，每个字节映射到同值码点；
/// - `Utf8`：按 UTF-8 解码，非法序列替换为 `U+FFFD`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    Ascii,
    Latin1,
    #[default]
    Utf8,
}

impl Charset {
    /// 将文本编码为该字符集下的字节；不可表示时返回 `None`。
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            Charset::Ascii => text.is_ascii().then(|| text.as_bytes().to_vec()),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect(),
            Charset::Utf8 => Some(text.as_bytes().to_vec()),
        }
    }

    /// 按字符集解码字节。
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::Utf8 => String::from_utf8_lossy(bytes).to_string(),
        }
    }

    /// 在该字符集语义下比较两段字节是否大小写无关相等。
    pub(crate) fn eq_ignore_case(self, left: &[u8], right: &[u8]) -> bool {
        match self {
            Charset::Ascii => left.eq_ignore_ascii_case(right) && left.is_ascii(),
            _ => self.decode(left).to_lowercase() == self.decode(right).to_lowercase(),
        }
    }
}

/// 单个字符的大小写无关比较：小写或大写映射之一相同即视为相等（`ſ` 与 `s` 只在大写下相同）。
pub(crate) fn chars_eq_ignore_case(left: char, right: char) -> bool {
    left == right
        || left.to_lowercase().eq(right.to_lowercase())
        || left.to_uppercase().eq(right.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_rejects_characters_above_ff() {
        assert_eq!(Charset::Latin1.encode("é"), Some(alloc::vec![0xE9]));
        assert_eq!(Charset::Latin1.encode("€"), None);
    }

    #[test]
    fn latin1_folds_accented_letters() {
        assert!(Charset::Latin1.eq_ignore_case(&[0xC9], &[0xE9]));
        assert!(!Charset::Ascii.eq_ignore_case(&[0xC9], &[0xE9]));
    }

    #[test]
    fn single_characters_fold_through_either_case() {
        assert!(chars_eq_ignore_case('ſ', 'S'));
        assert!(chars_eq_ignore_case('\u{212A}', 'k'));
        assert!(!chars_eq_ignore_case('s', 'z'));
    }
}
