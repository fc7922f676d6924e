mod document;
pub mod error;
mod frontmatter;

use pulldown_cmark::{Event, Options, Parser, Tag};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub use document::{Document, UNTITLED};
pub use error::{ParseError, ParseErrorCause};
pub use frontmatter::split_front_matter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Prose,
    Code,
    Heading,
    SetextUnderline,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    kind: LineKind,
}

impl Line {
    fn is_blank(&self) -> bool {
        self.kind != LineKind::Code && self.text.trim().is_empty()
    }
}

struct DirectivePatterns {
    import: Regex,
    include: Regex,
}

fn directive_patterns() -> &'static DirectivePatterns {
    static PATTERNS: OnceLock<DirectivePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DirectivePatterns {
        import: Regex::new(
            r#"^\s*import\s+(?:[\w$*{}\s,]+\s+from\s+)?['"][^'"]+['"];?\s*$"#,
        )
        .expect("import pattern is valid"),
        include: Regex::new(r"^\s*\{@include:?\s*[^}]*\}\s*$").expect("include pattern is valid"),
    })
}

/// Read a markdown file below `root` and parse it into a [`Document`].
pub fn parse_markdown_file(root: &Path, file: &Path) -> Result<Document, ParseError> {
    let path = relative_path(root, file);
    let bytes = std::fs::read(file).map_err(|e| ParseError::new(path.clone(), e))?;
    parse_markdown_bytes(&path, bytes)
}

/// Decode raw file bytes as UTF-8 and parse them.
pub fn parse_markdown_bytes(path: &str, bytes: Vec<u8>) -> Result<Document, ParseError> {
    let raw = String::from_utf8(bytes).map_err(|e| ParseError::new(path, e))?;
    Ok(parse_markdown(path, &raw))
}

/// Parse markdown content into a normalized [`Document`].
pub fn parse_markdown(path: &str, raw: &str) -> Document {
    let text = raw.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let (metadata, content) = split_front_matter(&text);

    let lines = strip_non_prose(content);
    let (body, heading_offsets, first_heading) = assemble_body(lines);

    let title = metadata
        .get("title")
        .filter(|t| !t.is_empty())
        .cloned()
        .or(first_heading)
        .unwrap_or_else(|| UNTITLED.to_string());

    Document {
        path: path.to_string(),
        raw_content: raw.to_string(),
        metadata,
        body,
        title,
        heading_offsets,
    }
}

/// Path of `file` relative to `root` with `/` separators.
pub fn relative_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Classify every line of `content` using the markdown event stream, then
/// drop comments and directives and remove heading markers outside code.
fn strip_non_prose(content: &str) -> Vec<Line> {
    let raw_lines: Vec<&str> = content.split('\n').collect();
    let mut line_starts = Vec::with_capacity(raw_lines.len());
    let mut offset = 0;
    for line in &raw_lines {
        line_starts.push(offset);
        offset += line.len() + 1;
    }
    let line_of = |byte: usize| line_starts.partition_point(|&start| start <= byte) - 1;

    let mut kinds = vec![LineKind::Prose; raw_lines.len()];

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
        if range.is_empty() {
            continue;
        }
        let first = line_of(range.start);
        let last = line_of(range.end - 1);
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                for kind in &mut kinds[first..=last] {
                    *kind = LineKind::Code;
                }
            }
            Event::Start(Tag::Heading(..)) => {
                kinds[first] = LineKind::Heading;
                if last > first && is_setext_underline(raw_lines[last]) {
                    kinds[last] = LineKind::SetextUnderline;
                }
            }
            _ => {}
        }
    }

    let patterns = directive_patterns();
    let mut lines = Vec::with_capacity(raw_lines.len());
    let mut in_comment = false;

    for (raw, kind) in raw_lines.into_iter().zip(kinds) {
        if kind == LineKind::Code {
            lines.push(Line {
                text: raw.to_string(),
                kind,
            });
            continue;
        }
        if kind == LineKind::SetextUnderline {
            continue;
        }

        let (text, had_comment) = strip_comments(raw, &mut in_comment);
        if had_comment && text.trim().is_empty() {
            continue;
        }
        if patterns.import.is_match(&text) || patterns.include.is_match(&text) {
            continue;
        }

        let text = match kind {
            LineKind::Heading => strip_heading_markers(&text).to_string(),
            _ => text,
        };
        lines.push(Line { text, kind });
    }

    lines
}

/// Remove HTML comments from one line, carrying open-comment state across
/// lines. Returns the remaining text and whether anything was removed.
fn strip_comments(line: &str, in_comment: &mut bool) -> (String, bool) {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    let mut removed = *in_comment;

    loop {
        if *in_comment {
            match rest.find("-->") {
                Some(end) => {
                    rest = &rest[end + 3..];
                    *in_comment = false;
                }
                None => return (out, true),
            }
        }
        match rest.find("<!--") {
            Some(start) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + 4..];
                *in_comment = true;
                removed = true;
            }
            None => {
                out.push_str(rest);
                return (out, removed);
            }
        }
    }
}

fn is_setext_underline(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && (trimmed.chars().all(|c| c == '=') || trimmed.chars().all(|c| c == '-'))
}

/// `## Title ##` becomes `Title`. Non-ATX lines are returned unchanged.
fn strip_heading_markers(line: &str) -> &str {
    let trimmed = line.trim_start();
    let without_hashes = trimmed.trim_start_matches('#');
    if without_hashes.len() == trimmed.len() {
        return line;
    }

    let text = without_hashes.trim();
    let closed = text.trim_end_matches('#');
    if closed.is_empty() {
        ""
    } else if closed.ends_with([' ', '\t']) {
        closed.trim_end()
    } else {
        text
    }
}

/// Collapse blank runs, trim blank edges and join the lines into the body.
/// Also returns heading offsets (in chars) and the first heading's text.
fn assemble_body(lines: Vec<Line>) -> (String, Vec<usize>, Option<String>) {
    let mut kept: Vec<Line> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if !lines[i].is_blank() {
            kept.push(lines[i].clone());
            i += 1;
            continue;
        }
        let run_end = lines[i..]
            .iter()
            .position(|l| !l.is_blank())
            .map_or(lines.len(), |n| i + n);
        if run_end - i >= 3 {
            kept.push(Line {
                text: String::new(),
                kind: LineKind::Prose,
            });
        } else {
            kept.extend_from_slice(&lines[i..run_end]);
        }
        i = run_end;
    }

    let Some(first) = kept.iter().position(|l| !l.is_blank()) else {
        return (String::new(), Vec::new(), None);
    };
    let last = kept.iter().rposition(|l| !l.is_blank()).unwrap_or(first);

    let mut body = String::new();
    let mut heading_offsets = Vec::new();
    let mut first_heading = None;
    let mut chars = 0;

    for (n, line) in kept[first..=last].iter().enumerate() {
        if n > 0 {
            body.push('\n');
            chars += 1;
        }
        if line.kind == LineKind::Heading && !line.text.trim().is_empty() {
            heading_offsets.push(chars);
            first_heading.get_or_insert_with(|| line.text.trim().to_string());
        }
        body.push_str(&line.text);
        chars += line.text.chars().count();
    }

    (body, heading_offsets, first_heading)
}
