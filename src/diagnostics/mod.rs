//! Shared diagnostics model: spans, findings, and the reporter that turns
//! executed action graphs into user-visible output.

mod files;
pub mod reporter;

pub use files::{FileCache, FileId, LineCol, SourceFile};

/// Span into a source file (byte offsets).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub file_id: FileId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(file_id: FileId, start: usize, end: usize) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }

    #[must_use]
    pub fn empty(file_id: FileId, offset: usize) -> Self {
        Self::new(file_id, offset, offset)
    }
}

/// A finding produced by an analysis run: a position, an optional
/// category refining the analysis name, and a message. Findings are not
/// errors; they are collected and emitted by the reporter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub category: Option<String>,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            category: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_category(span: Span, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            span,
            category: Some(category.into()),
            message: message.into(),
        }
    }
}

/// Render a span as `file:line:column` against the cache, falling back to
/// the raw offset when the file is unknown.
#[must_use]
pub fn position_string(files: &FileCache, span: Span) -> String {
    match files
        .get(span.file_id)
        .and_then(|file| file.line_col(span.start).map(|lc| (file, lc)))
    {
        Some((file, lc)) => format!("{}:{}:{}", file.path.display(), lc.line, lc.column),
        None => format!("<unknown>:#{}", span.start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_string_renders_line_and_column() {
        let mut files = FileCache::default();
        let id = files.add_file("pkg/a.src", "fn main\nbody\n");
        let span = Span::empty(id, 8);
        assert_eq!(position_string(&files, span), "pkg/a.src:2:1");
    }

    #[test]
    fn position_string_falls_back_for_unknown_files() {
        let files = FileCache::default();
        let span = Span::empty(FileId::UNKNOWN, 42);
        assert_eq!(position_string(&files, span), "<unknown>:#42");
    }
}
