//! Minimal SQL scanner.
//!
//! Only knows enough SQL to find keywords outside of string literals,
//! quoted identifiers, comments, soup references and parentheses. Everything
//! else is passed through untouched by the compiler.

/// A bare word found while scanning, with its byte range and nesting depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub start: usize,
    pub end: usize,
    /// Parenthesis depth; 0 means the outermost statement.
    pub depth: usize,
    /// Lowercased text
    pub text: String,
}

/// Returns the index just past the closing quote of a quoted run starting at `start`.
///
/// A doubled quote character inside the run is an escaped quote. An unterminated
/// run extends to the end of input.
pub(crate) fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if i + 1 < bytes.len() && bytes[i + 1] == quote {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Returns the index just past a `-- ...` line comment or a `/* ... */` block
/// comment starting at `start`, or `None` when no comment starts there.
/// An unterminated block comment extends to the end of input.
pub(crate) fn skip_comment(bytes: &[u8], start: usize) -> Option<usize> {
    match (bytes.get(start), bytes.get(start + 1)) {
        (Some(b'-'), Some(b'-')) => {
            let mut i = start + 2;
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            Some((i + 1).min(bytes.len()))
        }
        (Some(b'/'), Some(b'*')) => {
            let mut i = start + 2;
            while i + 1 < bytes.len() {
                if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                    return Some(i + 2);
                }
                i += 1;
            }
            Some(bytes.len())
        }
        _ => None,
    }
}

/// Skips a literal, quoted identifier, soup reference or comment at `i`.
fn skip_opaque(sql: &str, i: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let closing = |c: char| match sql[i..].find(c) {
        Some(offset) => i + offset + 1,
        None => bytes.len(),
    };
    match bytes[i] {
        b'\'' | b'"' | b'`' => Some(skip_quoted(bytes, i, bytes[i])),
        b'[' => Some(closing(']')),
        b'{' => Some(closing('}')),
        _ => skip_comment(bytes, i),
    }
}

/// Scan all bare words in `sql`.
pub fn words(sql: &str) -> Vec<Word> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(next) = skip_opaque(sql, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b if is_word_byte(b) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                words.push(Word {
                    start,
                    end: i,
                    depth,
                    text: sql[start..i].to_lowercase(),
                });
            }
            _ => i += 1,
        }
    }

    words
}

/// Byte offsets of the commas of the outermost statement.
pub fn top_level_commas(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut commas = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(next) = skip_opaque(sql, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => commas.push(i),
            _ => {}
        }
        i += 1;
    }

    commas
}

/// Words of the outermost statement only.
pub fn top_level_words(sql: &str) -> Vec<Word> {
    words(sql).into_iter().filter(|w| w.depth == 0).collect()
}
