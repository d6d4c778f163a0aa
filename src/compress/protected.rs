//! Detection of spans the compressor must never alter

/// Kinds of protected content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedKind {
    CodeBlock,
    InlineCode,
    Url,
    FilePath,
}

/// Byte range of protected content within the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedSpan {
    pub start: usize,
    pub end: usize,
    pub kind: ProtectedKind,
}

/// Find fenced code blocks, including an unterminated trailing fence
pub fn find_code_blocks(text: &str) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i + 3 <= bytes.len() {
        if &bytes[i..i + 3] != b"```" {
            i += 1;
            continue;
        }

        let start = i;
        let mut j = i + 3;
        let mut closed = None;
        while j + 3 <= bytes.len() {
            if &bytes[j..j + 3] == b"```" {
                closed = Some(j + 3);
                break;
            }
            j += 1;
        }

        match closed {
            Some(end) => {
                spans.push(ProtectedSpan {
                    start,
                    end,
                    kind: ProtectedKind::CodeBlock,
                });
                i = end;
            }
            None => {
                spans.push(ProtectedSpan {
                    start,
                    end: bytes.len(),
                    kind: ProtectedKind::CodeBlock,
                });
                break;
            }
        }
    }

    spans
}

/// Find backtick-delimited inline code in a region starting at `offset`
pub fn find_inline_code(text: &str, offset: usize) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        match bytes[i + 1..].iter().position(|&b| b == b'`') {
            Some(rel) => {
                let end = i + 1 + rel + 1;
                spans.push(ProtectedSpan {
                    start: offset + i,
                    end: offset + end,
                    kind: ProtectedKind::InlineCode,
                });
                i = end;
            }
            None => break,
        }
    }

    spans
}

/// Find http and https URLs in a region starting at `offset`
pub fn find_urls(text: &str, offset: usize) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();
    let mut last_end = 0;

    for (idx, _) in text.match_indices("http") {
        if idx < last_end {
            continue;
        }
        let rest = &text[idx..];
        let scheme_len = if rest.starts_with("https://") {
            8
        } else if rest.starts_with("http://") {
            7
        } else {
            continue;
        };
        if idx > 0 {
            let prev = text.as_bytes()[idx - 1];
            if prev.is_ascii_alphanumeric() {
                continue;
            }
        }

        let mut end = idx + scheme_len;
        for (rel, ch) in rest[scheme_len..].char_indices() {
            if ch.is_whitespace() || matches!(ch, '<' | '>' | '"' | ')' | ']' | '}') {
                break;
            }
            end = idx + scheme_len + rel + ch.len_utf8();
        }
        // Trailing sentence punctuation is not part of the URL
        while end > idx + scheme_len {
            let last = text.as_bytes()[end - 1];
            if matches!(last, b'.' | b',' | b';' | b':' | b'!' | b'?') {
                end -= 1;
            } else {
                break;
            }
        }

        spans.push(ProtectedSpan {
            start: offset + idx,
            end: offset + end,
            kind: ProtectedKind::Url,
        });
        last_end = end;
    }

    spans
}

fn is_file_path(token: &str) -> bool {
    if !token.contains('/') || token.contains("://") {
        return false;
    }
    if token.starts_with('/')
        || token.starts_with("./")
        || token.starts_with("../")
        || token.starts_with("~/")
    {
        return true;
    }
    // Relative paths count when the final segment carries an extension
    match token.rsplit('/').next() {
        Some(last) => last.contains('.') && !last.ends_with('.') && !last.starts_with('.'),
        None => false,
    }
}

/// Find file-path tokens in a region starting at `offset`
pub fn find_file_paths(text: &str, offset: usize) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();
    let mut token_start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(start) = token_start.take() {
                push_path_span(text, start, i, offset, &mut spans);
            }
        } else if token_start.is_none() {
            token_start = Some(i);
        }
    }
    if let Some(start) = token_start {
        push_path_span(text, start, text.len(), offset, &mut spans);
    }

    spans
}

fn push_path_span(
    text: &str,
    mut start: usize,
    mut end: usize,
    offset: usize,
    spans: &mut Vec<ProtectedSpan>,
) {
    let bytes = text.as_bytes();

    // Strip surrounding punctuation that is not part of the path
    while start < end && matches!(bytes[start], b'(' | b'"' | b'\'' | b'[' | b'{') {
        start += 1;
    }
    while end > start
        && matches!(
            bytes[end - 1],
            b')' | b'"' | b'\'' | b']' | b'}' | b',' | b';' | b':' | b'!' | b'?'
        )
    {
        end -= 1;
    }
    // A single trailing period reads as sentence punctuation
    if end > start && bytes[end - 1] == b'.' && !text[start..end].ends_with("..") {
        end -= 1;
    }

    if end > start && is_file_path(&text[start..end]) {
        spans.push(ProtectedSpan {
            start: offset + start,
            end: offset + end,
            kind: ProtectedKind::FilePath,
        });
    }
}

/// Extract all protected spans, sorted and non-overlapping
///
/// Code blocks win over everything; inline code wins over URLs and paths.
pub fn extract_protected_spans(text: &str) -> Vec<ProtectedSpan> {
    let mut spans = find_code_blocks(text);

    for (start, end) in gaps(&spans, text.len()) {
        spans.extend(find_inline_code(&text[start..end], start));
    }

    let mut sorted = spans.clone();
    sorted.sort_by_key(|span| span.start);
    for (start, end) in gaps(&sorted, text.len()) {
        spans.extend(find_urls(&text[start..end], start));
        spans.extend(find_file_paths(&text[start..end], start));
    }

    spans.sort_by_key(|span| span.start);
    spans
}

fn gaps(spans: &[ProtectedSpan], len: usize) -> Vec<(usize, usize)> {
    let mut sorted: Vec<_> = spans.to_vec();
    sorted.sort_by_key(|span| span.start);

    let mut regions = Vec::new();
    let mut cursor = 0;
    for span in &sorted {
        if span.start > cursor {
            regions.push((cursor, span.start));
        }
        cursor = cursor.max(span.end);
    }
    if cursor < len {
        regions.push((cursor, len));
    }
    regions
}
