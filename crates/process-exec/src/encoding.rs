use crate::error::ExecError;

const CP_UTF16_LE: u32 = 1200;
const CP_UTF16_BE: u32 = 1201;
const CP_UTF8: u32 = 65001;

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Text encoding used to decode the captured output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    /// Any other Windows code page.
    CodePage(u32),
}

impl OutputEncoding {
    /// Resolves an encoding name. Absent or blank names select UTF-8.
    pub fn from_label(label: Option<&str>) -> Result<Self, ExecError> {
        let Some(label) = label.filter(|label| !label.trim().is_empty()) else {
            return Ok(OutputEncoding::Utf8);
        };

        let unsupported = || ExecError::Encoding { name: label.to_owned() };

        let encoding = Self::parse_label(label).ok_or_else(unsupported)?;

        if let OutputEncoding::CodePage(code_page) = encoding {
            if !is_installed_code_page(code_page) {
                return Err(unsupported());
            }
        }

        Ok(encoding)
    }

    /// Maps a name to an encoding, without checking the code page is installed.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();

        let code_page = match label.as_str() {
            "utf-8" | "utf8" => CP_UTF8,
            "utf-16" | "utf-16le" | "unicode" | "ucs-2" => CP_UTF16_LE,
            "utf-16be" | "unicodefffe" => CP_UTF16_BE,
            "us-ascii" | "ascii" => 20127,
            "latin1" => 28591,
            "shift_jis" | "shift-jis" | "sjis" => 932,
            "gb2312" | "gbk" => 936,
            "ks_c_5601-1987" => 949,
            "big5" => 950,
            "koi8-r" => 20866,
            "koi8-u" => 21866,
            "euc-jp" => 51932,
            "euc-kr" => 51949,
            other => parse_code_page_family(other)?,
        };

        Some(Self::from_code_page(code_page))
    }

    pub fn from_code_page(code_page: u32) -> Self {
        match code_page {
            CP_UTF8 => OutputEncoding::Utf8,
            CP_UTF16_LE => OutputEncoding::Utf16Le,
            CP_UTF16_BE => OutputEncoding::Utf16Be,
            other => OutputEncoding::CodePage(other),
        }
    }

    pub fn code_page(self) -> u32 {
        match self {
            OutputEncoding::Utf8 => CP_UTF8,
            OutputEncoding::Utf16Le => CP_UTF16_LE,
            OutputEncoding::Utf16Be => CP_UTF16_BE,
            OutputEncoding::CodePage(code_page) => code_page,
        }
    }

    /// Decodes a whole captured stream.
    ///
    /// A leading byte order mark overrides the configured encoding and is stripped.
    /// Invalid sequences are replaced with U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        if let Some(rest) = bytes.strip_prefix(BOM_UTF8) {
            return String::from_utf8_lossy(rest).into_owned();
        }

        if let Some(rest) = bytes.strip_prefix(BOM_UTF16_LE) {
            return decode_utf16(rest, u16::from_le_bytes);
        }

        if let Some(rest) = bytes.strip_prefix(BOM_UTF16_BE) {
            return decode_utf16(rest, u16::from_be_bytes);
        }

        match self {
            OutputEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            OutputEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            OutputEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            OutputEncoding::CodePage(code_page) => decode_code_page(code_page, bytes),
        }
    }
}

fn parse_code_page_family(label: &str) -> Option<u32> {
    if let Some(part) = label.strip_prefix("iso-8859-") {
        let part = part.parse::<u32>().ok()?;
        return matches!(part, 1..=9 | 13 | 15).then_some(28590 + part);
    }

    let number = ["windows-", "cp", "ibm"]
        .iter()
        .find_map(|prefix| label.strip_prefix(prefix))
        .unwrap_or(label);

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    number.parse::<u32>().ok().filter(|code_page| *code_page != 0)
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let dangling = !chunks.remainder().is_empty();

    let units = chunks.map(|pair| from_bytes([pair[0], pair[1]]));
    let mut decoded = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect::<String>();

    if dangling {
        decoded.push(char::REPLACEMENT_CHARACTER);
    }

    decoded
}

#[cfg(windows)]
fn is_installed_code_page(code_page: u32) -> bool {
    use windows::Win32::Globalization::IsValidCodePage;

    // SAFETY: No preconditions.
    unsafe { IsValidCodePage(code_page) }.as_bool()
}

#[cfg(not(windows))]
fn is_installed_code_page(code_page: u32) -> bool {
    // Only the encodings that can be decoded without the system tables.
    code_page == 20127 || code_page == 28591
}

#[cfg(windows)]
fn decode_code_page(code_page: u32, bytes: &[u8]) -> String {
    use windows::Win32::Globalization::{MULTI_BYTE_TO_WIDE_CHAR_FLAGS, MultiByteToWideChar};

    if bytes.is_empty() {
        return String::new();
    }

    // SAFETY: No preconditions. Without an output buffer, only the required length is computed.
    let required = unsafe { MultiByteToWideChar(code_page, MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0), bytes, None) };

    let Some(required) = usize::try_from(required).ok().filter(|len| *len > 0) else {
        warn!(code_page, "Failed to decode output with the selected code page");
        return String::from_utf8_lossy(bytes).into_owned();
    };

    let mut wide = vec![0u16; required];

    // SAFETY: `wide` is exactly as large as reported by the previous call.
    let written = unsafe { MultiByteToWideChar(code_page, MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0), bytes, Some(&mut wide)) };

    wide.truncate(usize::try_from(written).unwrap_or_default());

    String::from_utf16_lossy(&wide)
}

#[cfg(not(windows))]
fn decode_code_page(code_page: u32, bytes: &[u8]) -> String {
    match code_page {
        // ISO-8859-1 maps every byte to the code point of the same value.
        28591 => bytes.iter().copied().map(char::from).collect(),
        20127 => bytes
            .iter()
            .map(|b| if b.is_ascii() { char::from(*b) } else { char::REPLACEMENT_CHARACTER })
            .collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("utf-8", OutputEncoding::Utf8)]
    #[case(" UTF8 ", OutputEncoding::Utf8)]
    #[case("65001", OutputEncoding::Utf8)]
    #[case("Unicode", OutputEncoding::Utf16Le)]
    #[case("utf-16BE", OutputEncoding::Utf16Be)]
    #[case("windows-1252", OutputEncoding::CodePage(1252))]
    #[case("cp437", OutputEncoding::CodePage(437))]
    #[case("IBM850", OutputEncoding::CodePage(850))]
    #[case("iso-8859-15", OutputEncoding::CodePage(28605))]
    #[case("shift_jis", OutputEncoding::CodePage(932))]
    #[case("us-ascii", OutputEncoding::CodePage(20127))]
    fn parse_label(#[case] label: &str, #[case] expected: OutputEncoding) {
        assert_eq!(OutputEncoding::parse_label(label), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("not-an-encoding")]
    #[case("windows-")]
    #[case("cp-1")]
    #[case("0")]
    #[case("iso-8859-12")]
    fn parse_label_rejects(#[case] label: &str) {
        assert_eq!(OutputEncoding::parse_label(label), None);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn blank_label_defaults_to_utf8(#[case] label: Option<&str>) {
        assert_eq!(OutputEncoding::from_label(label).unwrap(), OutputEncoding::Utf8);
    }

    #[test]
    fn unknown_label_is_an_encoding_error() {
        let error = OutputEncoding::from_label(Some("klingon")).unwrap_err();
        assert!(matches!(error, ExecError::Encoding { name } if name == "klingon"));
    }

    #[test]
    fn uninstalled_code_page_is_an_encoding_error() {
        let error = OutputEncoding::from_label(Some("cp99999")).unwrap_err();
        assert!(matches!(error, ExecError::Encoding { .. }));
    }

    #[rstest]
    #[case::utf8(OutputEncoding::Utf8, b"caf\xC3\xA9\r\n", "café\r\n")]
    #[case::utf8_invalid(OutputEncoding::Utf8, b"a\xFFb", "a\u{FFFD}b")]
    #[case::utf16le(OutputEncoding::Utf16Le, b"h\0i\0", "hi")]
    #[case::utf16be(OutputEncoding::Utf16Be, b"\0h\0i", "hi")]
    #[case::utf16_dangling(OutputEncoding::Utf16Le, b"h\0i", "h\u{FFFD}")]
    #[case::latin1(OutputEncoding::CodePage(28591), b"caf\xE9", "café")]
    fn decode(#[case] encoding: OutputEncoding, #[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(encoding.decode(bytes), expected);
    }

    #[rstest]
    #[case::utf8_bom(b"\xEF\xBB\xBFok", "ok")]
    #[case::utf16le_bom(b"\xFF\xFEo\0k\0", "ok")]
    #[case::utf16be_bom(b"\xFE\xFF\0o\0k", "ok")]
    fn byte_order_mark_overrides_encoding(#[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(OutputEncoding::CodePage(28591).decode(bytes), expected);
    }
}
