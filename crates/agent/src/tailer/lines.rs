//! 바이트 버퍼를 완전한 줄 단위로 분리

/// 분리 결과
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineSplit {
    /// 완전한 줄 (종결자와 끝의 `\r` 제거, 잘못된 UTF-8 은 대체 문자로 치환)
    pub lines: Vec<String>,
    /// 소비한 바이트 수 (마지막 종결자 뒤까지)
    pub consumed: usize,
}

/// `buf`를 `\n` 기준으로 분리합니다.
///
/// `max_line_length`보다 긴 줄은 종결자 유무와 관계없이 그 길이 단위 조각으로
/// 나누어 방출합니다. 마지막 `\n` 이후 남은 꼬리가 한도보다 짧으면 소비하지 않습니다.
pub fn split_lines(buf: &[u8], max_line_length: usize) -> LineSplit {
    let max = max_line_length.max(1);
    let mut split = LineSplit::default();
    let mut rest = buf;

    while !rest.is_empty() {
        let window = &rest[..rest.len().min(max + 1)];
        let (line, used) = match window.iter().position(|b| *b == b'\n') {
            Some(pos) if pos <= max => (&rest[..pos], pos + 1),
            _ if rest.len() >= max => (&rest[..max], max),
            // 종결자 없는 짧은 꼬리
            _ => break,
        };
        split.lines.push(decode(line));
        split.consumed += used;
        rest = &rest[used..];
    }

    split
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let split = split_lines(b"a\nbb\nccc\n", 1024);
        assert_eq!(split.lines, vec!["a", "bb", "ccc"]);
        assert_eq!(split.consumed, 9);
    }

    #[test]
    fn holds_back_tail() {
        let split = split_lines(b"a\nbb", 1024);
        assert_eq!(split.lines, vec!["a"]);
        assert_eq!(split.consumed, 2);
    }

    #[test]
    fn empty_lines_are_kept() {
        let split = split_lines(b"\n\nx\n", 1024);
        assert_eq!(split.lines, vec!["", "", "x"]);
        assert_eq!(split.consumed, 4);
    }

    #[test]
    fn only_trailing_cr_is_stripped() {
        let split = split_lines(b"a\rb\r\n", 1024);
        assert_eq!(split.lines, vec!["a\rb"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let split = split_lines(b"ok\xff\n", 1024);
        assert_eq!(split.lines, vec!["ok\u{FFFD}"]);
        assert_eq!(split.consumed, 4);
    }

    #[test]
    fn oversized_tail_is_forced_in_pieces() {
        let split = split_lines(b"x\nabcdefghij", 4);
        assert_eq!(split.lines, vec!["x", "abcd", "efgh"]);
        assert_eq!(split.consumed, 10);
    }

    #[test]
    fn long_terminated_line_is_split() {
        let split = split_lines(b"abcdefgh\nz\n", 4);
        assert_eq!(split.lines, vec!["abcd", "efgh", "z"]);
        assert_eq!(split.consumed, 11);
    }

    #[test]
    fn line_of_exactly_max_length_is_whole() {
        let split = split_lines(b"abcd\nef", 4);
        assert_eq!(split.lines, vec!["abcd"]);
        assert_eq!(split.consumed, 5);
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(split_lines(b"", 1024), LineSplit::default());
    }
}
