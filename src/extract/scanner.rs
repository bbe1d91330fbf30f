//! Incremental scanner for GraphQL literals embedded in host-language source.
//!
//! Recognises two forms:
//!
//! ```text
//! graphql(`query UserInfo { viewer { id } }`)
//! avatar: GraphQL<`fragment UserAvatar on User @componentField(field: "avatar") { url }`>
//! ```
//!
//! The source is read in fixed-size chunks. After each chunk the buffer is
//! trimmed to the earliest literal that could still complete, so a match that
//! straddles a chunk boundary is found on a later iteration and the whole file
//! is never held in memory. Line and column numbers are tracked incrementally.

use std::io::{self, Read};
use std::sync::OnceLock;

use regex::bytes::Regex;

/// Default read size.
pub const CHUNK_SIZE: usize = 4096;

const GRAPHQL_CALL: &[u8] = b"graphql(";
const COMPONENT_FIELD: &[u8] = b"GraphQL<";

/// How far back a kept tail may reach when no literal is in flight.
const MAX_TAIL: usize = 256;

fn pattern() -> io::Result<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"graphql\(\s*`((?:(?-u:[^`\\])|(?s-u:\\.))*)`\s*\)|(\w+)\s*:\s*GraphQL<\s*`((?:(?-u:[^`\\])|(?s-u:\\.))*)`\s*>",
            )
        })
        .as_ref()
        .map_err(|err| io::Error::other(err.to_string()))
}

/// One GraphQL literal found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Literal text with `` \` `` unescaped
    pub content: String,
    /// Byte offset of the first content byte
    pub offset_byte: usize,
    /// 0-based line of the first content character
    pub line: usize,
    /// 0-based column (in characters) of the first content character
    pub column: usize,
    /// Property name for `prop: GraphQL<...>` declarations
    pub prop: Option<String>,
}

/// Scan `reader` with the default chunk size.
pub fn scan_source<R: Read>(reader: R) -> io::Result<Vec<ExtractedDocument>> {
    scan_source_chunked(reader, CHUNK_SIZE)
}

/// Scan `reader`, reading `chunk_size` bytes at a time.
pub fn scan_source_chunked<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Vec<ExtractedDocument>> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size * 2);
    let mut buffer_start = 0usize;
    let mut tracker = LineTracker::default();
    let mut found = Vec::new();
    let pattern = pattern()?;

    loop {
        let read = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let eof = read == 0;
        buffer.extend_from_slice(&chunk[..read]);

        let mut consumed = 0;
        for caps in pattern.captures_iter(&buffer) {
            let (content, prop) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(content), _, _) => (content, None),
                (None, Some(prop), Some(content)) => (content, Some(String::from_utf8_lossy(prop.as_bytes()).into_owned())),
                _ => continue,
            };
            let (line, column) = tracker.position_after(&buffer[..content.start()]);
            found.push(ExtractedDocument {
                content: unescape(content.as_bytes()),
                offset_byte: buffer_start + content.start(),
                line,
                column,
                prop,
            });
            if let Some(whole) = caps.get(0) {
                consumed = whole.end();
            }
        }

        if eof {
            break;
        }

        let keep_from = live_literal_start(&buffer, consumed).unwrap_or_else(|| tail_start(&buffer, consumed));
        tracker.advance(&buffer[..keep_from]);
        buffer.drain(..keep_from);
        buffer_start += keep_from;
    }

    Ok(found)
}

/// Replace `` \` `` with `` ` `` and decode lossily.
fn unescape(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'`') {
            out.push(b'`');
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Earliest literal opening at or after `from` that has not completed yet.
fn live_literal_start(buffer: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while at < buffer.len() {
        let rest = &buffer[at..];
        let call = find(rest, GRAPHQL_CALL);
        let field = find(rest, COMPONENT_FIELD);
        let (offset, keyword_len, is_field) = match (call, field) {
            (Some(c), Some(f)) if f < c => (f, COMPONENT_FIELD.len(), true),
            (Some(c), _) => (c, GRAPHQL_CALL.len(), false),
            (None, Some(f)) => (f, COMPONENT_FIELD.len(), true),
            (None, None) => return None,
        };
        let start = at + offset;
        if is_incomplete(&buffer[start + keyword_len..]) {
            return Some(if is_field { declaration_start(buffer, start).max(from) } else { start });
        }
        at = start + keyword_len;
    }
    None
}

/// The text after a keyword can still grow into a full match.
fn is_incomplete(after: &[u8]) -> bool {
    let mut i = skip_whitespace(after, 0);
    if i == after.len() {
        return true;
    }
    if after[i] != b'`' {
        return false;
    }
    i += 1;
    while i < after.len() {
        match after[i] {
            b'\\' => i += 2,
            b'`' => {
                // a closed literal followed by its delimiter would already have matched
                return skip_whitespace(after, i + 1) == after.len();
            }
            _ => i += 1,
        }
    }
    true
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Walk back from a `GraphQL<` keyword over `<ident> :` to the declaration start.
fn declaration_start(buffer: &[u8], keyword: usize) -> usize {
    let mut i = keyword;
    while i > 0 && buffer[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i > 0 && buffer[i - 1] == b':' {
        i -= 1;
        while i > 0 && buffer[i - 1].is_ascii_whitespace() {
            i -= 1;
        }
        while i > 0 && is_word(buffer[i - 1]) {
            i -= 1;
        }
    }
    i
}

/// Keep a trailing run that may be the beginning of a keyword or declaration.
fn tail_start(buffer: &[u8], from: usize) -> usize {
    let floor = from.max(buffer.len().saturating_sub(MAX_TAIL));
    let mut i = buffer.len();
    while i > floor && (is_word(buffer[i - 1]) || matches!(buffer[i - 1], b':' | b'(' | b'<' | b' ' | b'\t' | b'\r' | b'\n')) {
        i -= 1;
    }
    i
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// 0-based line/column of the first byte of the current buffer.
#[derive(Debug, Default, Clone, Copy)]
struct LineTracker {
    line: usize,
    column: usize,
}

impl LineTracker {
    fn position_after(&self, bytes: &[u8]) -> (usize, usize) {
        match bytes.iter().rposition(|&b| b == b'\n') {
            Some(last) => {
                let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
                (self.line + newlines, char_count(&bytes[last + 1..]))
            }
            None => (self.line, self.column + char_count(bytes)),
        }
    }

    fn advance(&mut self, bytes: &[u8]) {
        let (line, column) = self.position_after(bytes);
        self.line = line;
        self.column = column;
    }
}

/// Number of UTF-8 characters, counting lead bytes (invalid bytes count as one each).
fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, chunk: usize) -> Vec<ExtractedDocument> {
        scan_source_chunked(text.as_bytes(), chunk).unwrap()
    }

    /// Line/column of the extracted document must point at its first character.
    fn assert_positions(text: &str, docs: &[ExtractedDocument]) {
        for doc in docs {
            let line = text.split('\n').nth(doc.line).unwrap();
            let rest: String = line.chars().skip(doc.column).collect();
            let first_line = doc.content.split('\n').next().unwrap();
            assert!(rest.starts_with(first_line), "{rest:?} vs {first_line:?}");
            assert_eq!(&text.as_bytes()[doc.offset_byte..doc.offset_byte + 1], &doc.content.as_bytes()[..1]);
        }
    }

    #[test]
    fn test_standalone_document() {
        let text = "const q = graphql(`query A { a }`)\n";
        let docs = scan(text, CHUNK_SIZE);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "query A { a }");
        assert_eq!((docs[0].line, docs[0].column), (0, 19));
        assert_eq!(docs[0].prop, None);
        assert_positions(text, &docs);
    }

    #[test]
    fn test_component_field_declaration() {
        let text = "type Props = {\n  avatar: GraphQL<`fragment UserAvatar on User { url }`>\n}";
        let docs = scan(text, CHUNK_SIZE);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].prop.as_deref(), Some("avatar"));
        assert_eq!(docs[0].line, 1);
        assert_positions(text, &docs);
    }

    #[test]
    fn test_escaped_backticks_are_unescaped() {
        let text = r"graphql(`query A { a(x: \`y\`) }`)";
        let docs = scan(text, CHUNK_SIZE);
        assert_eq!(docs[0].content, "query A { a(x: `y`) }");
    }

    #[test]
    fn test_matches_across_tiny_chunks() {
        let text = "// header\nlet a = graphql(`\n  query A {\n    a\n  }\n`);\nlet props = { user: GraphQL<`fragment U on User { id }`> };\nlet b = graphql( `query B { b }` )\n";
        let whole = scan(text, CHUNK_SIZE);
        assert_eq!(whole.len(), 3);
        for chunk in [1, 2, 3, 5, 7, 13] {
            assert_eq!(scan(text, chunk), whole, "chunk size {chunk}");
        }
        assert_positions(text, &whole);
        assert_eq!(whole[1].prop.as_deref(), Some("user"));
    }

    #[test]
    fn test_multibyte_columns_count_characters() {
        let text = "é ü graphql(`query A { a }`)";
        let docs = scan(text, 3);
        assert_eq!(docs[0].column, 13);
        assert_positions(text, &docs);
    }

    #[test]
    fn test_non_utf8_bytes_are_preserved_lossily() {
        let mut bytes = b"graphql(`query A { a(x: \"".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\") }`)");
        let docs = scan_source_chunked(&bytes[..], 4).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains('\u{fffd}'));
    }

    #[test]
    fn test_dead_prefixes_do_not_block_later_matches() {
        let text = "graphql(notALiteral) and graphql(`query A { a }`)";
        let docs = scan(text, 4);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "query A { a }");
    }

    #[test]
    fn test_unterminated_literal_yields_nothing() {
        assert!(scan("graphql(`query A { a }", 4).is_empty());
    }
}
