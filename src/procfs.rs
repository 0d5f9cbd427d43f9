//! Line parsers for the `/proc` formats this crate reads: `maps` (in
//! three different capture shapes) and a task's `stat`.
//!
//! Each parser mirrors one of the `sscanf` patterns the design is
//! specified against rather than a general-purpose `maps` parser, so
//! a line this crate doesn't need to understand (e.g. one with no
//! trailing path) is simply skipped by returning `None`.

/// `%p-%*p %*s %*x %*s %*s %s` — start address and path; lines with no
/// path yield `None`.
pub(crate) fn parse_module_line(line: &str) -> Option<(usize, &str)> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let (start_str, _end_str) = range.split_once('-')?;
    let start = usize::from_str_radix(start_str, 16).ok()?;

    fields.next()?; // perms
    fields.next()?; // offset
    fields.next()?; // dev
    fields.next()?; // inode
    let path = fields.next()?;

    Some((start, path))
}

/// `%lx-%lx %4s` — start, end, four-character permission string.
pub(crate) fn parse_range_line(line: &str) -> Option<(usize, usize, &str)> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let (start_str, end_str) = range.split_once('-')?;
    let start = usize::from_str_radix(start_str, 16).ok()?;
    let end = usize::from_str_radix(end_str, 16).ok()?;
    let perms = fields.next()?;

    Some((start, end, perms))
}

/// `%p-%p %4s %*x %*s %*s %s` — start, end, permission string, path.
pub(crate) fn parse_module_range_line(line: &str) -> Option<(usize, usize, &str, &str)> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let (start_str, end_str) = range.split_once('-')?;
    let start = usize::from_str_radix(start_str, 16).ok()?;
    let end = usize::from_str_radix(end_str, 16).ok()?;
    let perms = fields.next()?;

    fields.next()?; // offset
    fields.next()?; // dev
    fields.next()?; // inode
    let path = fields.next()?;

    Some((start, end, perms, path))
}

/// Extracts the state character from a task's `stat` file contents: the
/// single character two positions after the *last* `)`, since the
/// process/thread name field (enclosed in the first `(`/`)` pair) may
/// itself contain parentheses.
pub(crate) fn parse_task_state(contents: &str) -> Option<char> {
    let close = contents.rfind(')')?;
    contents.as_bytes().get(close + 2).map(|&b| b as char)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn module_line_captures_start_and_path() {
        let line = "7f1234560000-7f1234580000 r-xp 00000000 08:01 1234 /lib/x86_64-linux-gnu/libc.so.6";
        let (start, path) = parse_module_line(line).unwrap();
        assert_eq!(start, 0x7f1234560000);
        assert_eq!(path, "/lib/x86_64-linux-gnu/libc.so.6");
    }

    #[test]
    fn module_line_without_path_is_skipped() {
        let line = "7f1234560000-7f1234580000 rw-p 00000000 00:00 0";
        assert!(parse_module_line(line).is_none());
    }

    #[test]
    fn module_line_with_bracketed_pseudo_path() {
        let line = "7ffd00000000-7ffd00001000 r-xp 00000000 00:00 0 [vdso]";
        let (_, path) = parse_module_line(line).unwrap();
        assert_eq!(path, "[vdso]");
    }

    #[test]
    fn range_line_captures_bounds_and_perms() {
        let line = "7f1234560000-7f1234580000 r-xp 00000000 08:01 1234 /lib/libc.so.6";
        let (start, end, perms) = parse_range_line(line).unwrap();
        assert_eq!(start, 0x7f1234560000);
        assert_eq!(end, 0x7f1234580000);
        assert_eq!(perms, "r-xp");
    }

    #[test]
    fn module_range_line_captures_all_fields() {
        let line = "7f1234560000-7f1234580000 r--p 00000000 08:01 1234 /lib/libc.so.6";
        let (start, end, perms, path) = parse_module_range_line(line).unwrap();
        assert_eq!(start, 0x7f1234560000);
        assert_eq!(end, 0x7f1234580000);
        assert_eq!(perms, "r--p");
        assert_eq!(path, "/lib/libc.so.6");
    }

    #[test]
    fn task_state_after_simple_comm() {
        let contents = "1234 (bash) S 1 1234 1234 0 -1 4194304";
        assert_eq!(parse_task_state(contents), Some('S'));
    }

    #[test]
    fn task_state_after_comm_with_parens() {
        let contents = "5678 (my (weird) prog) R 1 5678 5678 0 -1 4194304";
        assert_eq!(parse_task_state(contents), Some('R'));
    }
}
