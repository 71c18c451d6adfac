use std::ffi::OsStr;
use std::fmt::Debug;
use std::os::windows::ffi::OsStrExt;

use windows::Win32::UI::Shell::CommandLineToArgvW;
use windows::core::{PCWSTR, PWSTR};

use crate::memory::LocalMemory;

// FIXME: Wrapping the inner buffer with an Option is resulting in an error prone API.
// E.g.: it’s not obvious that we must check the return value of `as_pcwstr` for null.
#[derive(Default, Debug, Clone)]
pub struct WideString(pub Option<Vec<u16>>);

impl WideString {
    pub fn as_pcwstr(&self) -> PCWSTR {
        self.0
            .as_ref()
            .map(|x| PCWSTR::from_raw(x.as_ptr()))
            .unwrap_or_else(PCWSTR::null)
    }

    pub fn as_pwstr(&mut self) -> PWSTR {
        self.0
            .as_mut()
            .map(|x| PWSTR::from_raw(x.as_mut_ptr()))
            .unwrap_or_else(PWSTR::null)
    }
}

impl<T: ?Sized + AsRef<OsStr>> From<&T> for WideString {
    fn from(value: &T) -> Self {
        let mut buf = value.as_ref().encode_wide().collect::<Vec<_>>();
        buf.push(0);
        Self(Some(buf))
    }
}

impl From<String> for WideString {
    fn from(value: String) -> Self {
        Self::from(&value)
    }
}

/// An argument vector, convertible from and to a single Windows command line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct CommandLine(pub Vec<String>);

impl CommandLine {
    pub fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    /// Splits a command line the way the system does for `argv`, using `CommandLineToArgvW`.
    pub fn from_command_line(command_line: &str) -> Self {
        let command_line = WideString::from(command_line);
        let mut arg_cnt = 0;

        // SAFETY: `command_line` is valid and NUL terminated.
        let raw_args = unsafe { CommandLineToArgvW(command_line.as_pcwstr(), &mut arg_cnt) };

        // SAFETY: The block is allocated by `LocalAlloc` and must be freed with `LocalFree`.
        let raw_args = unsafe { LocalMemory::<PWSTR>::from_raw(raw_args) };

        // If we get an error, no args.
        if raw_args.is_null() {
            return Self(vec![]);
        }

        let arg_cnt = usize::try_from(arg_cnt).unwrap_or_default();

        // SAFETY: On success, the block holds `arg_cnt` pointers to NUL terminated strings.
        let args = unsafe { raw_args.cast_slice(arg_cnt) }
            .iter()
            // SAFETY: Each entry is a valid NUL terminated string living in the block.
            .filter_map(|x| unsafe { x.to_string() }.ok())
            .collect::<Vec<_>>();

        Self(args)
    }

    /// Encodes an argument array to a command line string for Windows.
    ///
    /// Follows the rules of the Microsoft C runtime, so that `from_command_line` gives the arguments back.
    /// Loosely based off of https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way.
    pub fn to_command_line(&self) -> String {
        let mut command_line = String::new();

        for (idx, arg) in self.0.iter().enumerate() {
            if idx > 0 {
                command_line.push(' ');
            }

            if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
                command_line.push_str(arg);
                continue;
            }

            command_line.push('"');

            let mut backslashes = 0;
            for c in arg.chars() {
                match c {
                    '\\' => backslashes += 1,
                    '"' => {
                        // Escape the run of backslashes, then the quote itself.
                        push_backslashes(&mut command_line, backslashes * 2 + 1);
                        command_line.push('"');
                        backslashes = 0;
                    }
                    c => {
                        push_backslashes(&mut command_line, backslashes);
                        command_line.push(c);
                        backslashes = 0;
                    }
                }
            }

            // Trailing backslashes precede the closing quote.
            push_backslashes(&mut command_line, backslashes * 2);
            command_line.push('"');
        }

        command_line
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }
}

fn push_backslashes(command_line: &mut String, count: usize) {
    command_line.extend(std::iter::repeat_n('\\', count));
}

impl From<&str> for CommandLine {
    fn from(value: &str) -> Self {
        Self::from_command_line(value)
    }
}

/// Like [`std::mem::size_of`], but returns a u32 instead.
///
/// Typically fine since we rarely work with structs whose size in memory is bigger than u32::MAX.
#[expect(clippy::cast_possible_truncation)]
pub(crate) const fn u32size_of<T>() -> u32 {
    size_of::<T>() as u32
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain(&["cmd.exe", "/c", "exit"], r#"cmd.exe /c exit"#)]
    #[case::spaces(&[r"C:\Program Files\app.exe", "a b"], r#""C:\Program Files\app.exe" "a b""#)]
    #[case::empty(&["echo", ""], r#"echo """#)]
    #[case::quote(&["say", r#"he said "hi""#], r#"say "he said \"hi\"""#)]
    #[case::trailing_backslash(&[r"C:\some dir\"], r#""C:\some dir\\""#)]
    #[case::backslash_before_quote(&[r#"a\"b"#], r#""a\\\"b""#)]
    #[case::inner_backslashes(&[r"a\\b c"], r#""a\\b c""#)]
    fn to_command_line(#[case] args: &[&str], #[case] expected: &str) {
        let command_line = CommandLine::new(args.iter().map(|x| (*x).to_owned()).collect());
        assert_eq!(command_line.to_command_line(), expected);
    }

    #[rstest]
    #[case(&["cmd.exe", "/c", "exit"])]
    #[case(&[r"C:\Program Files\app.exe", "a b", ""])]
    #[case(&["say", r#"he said "hi""#, r"C:\some dir\"])]
    #[case(&["x", r#"a\"b"#, r"a\\b c", "tab\there"])]
    fn from_command_line_inverts_to_command_line(#[case] args: &[&str]) {
        let command_line = CommandLine::new(args.iter().map(|x| (*x).to_owned()).collect());

        let parsed = CommandLine::from_command_line(&command_line.to_command_line());

        assert_eq!(parsed, command_line);
    }

    #[test]
    fn from_command_line_splits_on_whitespace() {
        let parsed = CommandLine::from("app.exe  one \"two three\"");
        assert_eq!(parsed.args(), ["app.exe", "one", "two three"]);
    }
}
