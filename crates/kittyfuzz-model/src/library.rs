//! Mutation libraries.
//!
//! Every library-based field walks an ordered list of concrete values: a
//! local library derived from the field's default plus a shared class
//! library of generic payloads. The accessor merges the lists into one
//! virtual list with an index-skip set, so filtering (size limits, value
//! ranges, duplicates) removes entries without renumbering the survivors.
//!
//! Class libraries are computed once per process behind `Lazy` cells; the
//! optional files `kitty_strings.txt` and `kitty_integers.txt` in the
//! current working directory are read at that point.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// One backing list of a [`LibraryAccessor`].
#[derive(Debug, Clone)]
pub(crate) enum LibList<T> {
    Owned(Vec<T>),
    Shared(Arc<Vec<T>>),
}

impl<T> LibList<T> {
    fn len(&self) -> usize {
        match self {
            LibList::Owned(v) => v.len(),
            LibList::Shared(v) => v.len(),
        }
    }

    fn get(&self, i: usize) -> Option<&T> {
        match self {
            LibList::Owned(v) => v.get(i),
            LibList::Shared(v) => v.get(i),
        }
    }
}

/// Several ordered lists exposed as one, with an index-skip set.
#[derive(Debug, Clone, Default)]
pub(crate) struct LibraryAccessor<T> {
    lists: Vec<LibList<T>>,
    total: usize,
    /// Raw indices removed by filtering, ascending.
    skips: Vec<usize>,
}

impl<T> LibraryAccessor<T> {
    pub fn new() -> Self {
        LibraryAccessor {
            lists: Vec::new(),
            total: 0,
            skips: Vec::new(),
        }
    }

    pub fn add_owned(&mut self, list: Vec<T>) {
        self.total += list.len();
        self.lists.push(LibList::Owned(list));
    }

    pub fn add_shared(&mut self, list: Arc<Vec<T>>) {
        self.total += list.len();
        self.lists.push(LibList::Shared(list));
    }

    /// Effective size after filtering.
    pub fn size(&self) -> usize {
        self.total - self.skips.len()
    }

    /// Entry at an effective (post-filter) index.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.size() {
            return None;
        }
        let mut raw = index;
        for &s in &self.skips {
            if s <= raw {
                raw += 1;
            } else {
                break;
            }
        }
        self.get_raw(raw)
    }

    fn get_raw(&self, mut raw: usize) -> Option<&T> {
        for list in &self.lists {
            if raw < list.len() {
                return list.get(raw);
            }
            raw -= list.len();
        }
        None
    }

    /// Mark every raw index for which `remove` returns true as skipped.
    /// `remove` sees entries in raw order, so it can carry dedup state.
    pub fn mark_skips<F: FnMut(&T) -> bool>(&mut self, mut remove: F) {
        let mut skips = Vec::new();
        let mut raw = 0;
        for list in &self.lists {
            for i in 0..list.len() {
                if let Some(item) = list.get(i) {
                    if remove(item) {
                        skips.push(raw);
                    }
                }
                raw += 1;
            }
        }
        self.skips = skips;
    }

    /// Iterate raw entries in order (before skip filtering).
    pub fn iter_raw(&self) -> impl Iterator<Item = &T> {
        self.lists.iter().flat_map(|list| match list {
            LibList::Owned(v) => v.iter(),
            LibList::Shared(v) => v.iter(),
        })
    }
}

/// Drop entries longer than `max_size` bytes and every duplicate value.
pub(crate) fn filter_bytes_library(lib: &mut LibraryAccessor<Vec<u8>>, max_size: Option<usize>) {
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    lib.mark_skips(|value| {
        if let Some(limit) = max_size {
            if value.len() > limit {
                return true;
            }
        }
        !seen.insert(value.clone())
    });
}

// ---------------------------------------------------------------------------
// Payload tables
// ---------------------------------------------------------------------------

/// `base` repeated `1, 2, 4, …, 2^max_power` times.
pub(crate) fn power_list(base: &[u8], max_power: u32) -> Vec<Vec<u8>> {
    (0..=max_power).map(|i| base.repeat(1 << i)).collect()
}

/// The binary ladder plus the decimal repetition counts 10 and 100.
fn power_list_with_decimal(base: &[u8], max_power: u32) -> Vec<Vec<u8>> {
    let mut out = power_list(base, max_power);
    out.push(base.repeat(10));
    out.push(base.repeat(100));
    out
}

/// Shared class library for String fields.
pub(crate) static STRING_CLASS_LIB: Lazy<Arc<Vec<Vec<u8>>>> = Lazy::new(|| {
    let mut lib: Vec<Vec<u8>> = Vec::new();
    lib.push(Vec::new());
    // format strings
    for s in [
        &b"%s"[..],
        b"%%s",
        b"\"%s\"",
        b"%n",
        b"%%n",
        b"\"%n\"",
        b"\r\n",
        b"\n",
    ] {
        lib.extend(power_list_with_decimal(s, 10));
    }
    for s in [&b"\x00"[..], b"\xde\xad\xbe\xef"] {
        lib.extend(power_list_with_decimal(s, 13));
    }
    // *nix command injection
    lib.push(b"|touch /tmp/KITTY".to_vec());
    lib.push(b";touch /tmp/KITTY;".to_vec());
    lib.push(b";ls>/tmp/KITTY".to_vec());
    lib.push(b"\";ls>/tmp/KITTY;ls>\"/dev/null\"".to_vec());
    lib.push(b"';ls>/tmp/KITTY;ls>'/dev/null'".to_vec());
    // windows command injection
    lib.push(b"|notepad".to_vec());
    lib.push(b";notepad;".to_vec());
    lib.push(b"\nnotepad\n".to_vec());
    // sql injection
    lib.push(b"1;SELECT%20*".to_vec());
    lib.push(b"'sqlattempt1".to_vec());
    lib.push(b"(sqlattempt2)".to_vec());
    lib.push(b"OR%201=1".to_vec());
    // paths and path traversal
    let mut long_a = b"/.:/".to_vec();
    long_a.extend(std::iter::repeat(b'A').take(5000));
    long_a.extend(b"\x00\x00");
    lib.push(long_a);
    let mut long_dots = b"/.../".to_vec();
    long_dots.extend(std::iter::repeat(b'A').take(5000));
    long_dots.extend(b"\x00\x00");
    lib.push(long_dots);
    lib.push(b"/.../.../.../.../.../.../.../.../.../.../".to_vec());
    lib.push(b"/../../../../../../../../../../../../etc/passwd".to_vec());
    lib.push(b"/../../../../../../../../../../../../boot.ini".to_vec());
    lib.push(b"..:..:..:..:..:..:..:..:..:..:..:..:..:".to_vec());
    lib.push(b"\\\\*".to_vec());
    lib.push(b"\\\\?\\".to_vec());
    lib.extend(power_list_with_decimal(b"/\\", 9));
    lib.extend(power_list_with_decimal(b"/.", 9));
    lib.push(b"!@#$%%^#$%#$@#$%$$@#$%^^**(()".to_vec());
    lib.push(b"%01%02%03%04%0a%0d%0aADSF".to_vec());
    lib.push(b"%01%02%03@%04%0a%0d%0aADSF".to_vec());
    lib.push(b"/%00/".to_vec());
    lib.push(b"%00/".to_vec());
    lib.push(b"%00".to_vec());
    lib.push(b"%u0000".to_vec());
    lib.push(b"%\xfe\xf0%\x00\xff".to_vec());
    lib.extend(power_list_with_decimal(b"%\xfe\xf0%\x01\xff", 5));
    lib.extend(load_extra_strings(Path::new("./kitty_strings.txt")));
    Arc::new(lib)
});

/// Shared class library for Delimiter fields.
pub(crate) static DELIMITER_CLASS_LIB: Lazy<Arc<Vec<Vec<u8>>>> = Lazy::new(|| {
    let mut lib: Vec<Vec<u8>> = Vec::new();
    for delim in b" \t!@#$%^&*()-_+=:;'\"/\\?<>.,\r\n" {
        lib.extend(power_list(&[*delim], 2));
    }
    lib.extend(power_list(b"\r\n", 3));
    lib.extend(power_list(b"\t\r\n", 3));
    lib.push(Vec::new());
    Arc::new(lib)
});

/// Integers appended to every BitField class library.
pub(crate) static INTEGER_FILE_LIB: Lazy<Arc<Vec<i128>>> =
    Lazy::new(|| Arc::new(load_extra_integers(Path::new("./kitty_integers.txt"))));

/// One payload per line, trailing newline stripped, bytes kept verbatim.
pub(crate) fn load_extra_strings(path: &Path) -> Vec<Vec<u8>> {
    if !path.exists() {
        log::info!("no strings file [{}]", path.display());
        return Vec::new();
    }
    match std::fs::read(path) {
        Ok(data) => {
            let mut out = Vec::new();
            for line in data.split(|&b| b == b'\n') {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                out.push(line.to_vec());
            }
            // A trailing newline produces one empty tail entry, not a payload.
            if out.last().is_some_and(|l| l.is_empty()) {
                out.pop();
            }
            out
        }
        Err(e) => {
            log::warn!("could not read strings from {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// One integer literal per line: decimal or 0x-prefixed hex, optional sign.
pub(crate) fn load_extra_integers(path: &Path) -> Vec<i128> {
    if !path.exists() {
        log::info!("no integers file [{}]", path.display());
        return Vec::new();
    }
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("could not read integers from {}: {e}", path.display());
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_int_literal(line) {
            Some(v) => out.push(v),
            None => log::warn!("skipping invalid integer literal {line:?} in {}", path.display()),
        }
    }
    out
}

fn parse_int_literal(s: &str) -> Option<i128> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else {
        rest.parse::<i128>().ok()?
    };
    Some(if negative { -value } else { value })
}
