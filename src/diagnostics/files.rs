use std::path::{Path, PathBuf};

/// Identifier for source files used when resolving diagnostic positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

impl FileId {
    pub const UNKNOWN: Self = FileId(usize::MAX);
}

impl Default for FileId {
    fn default() -> Self {
        FileId::UNKNOWN
    }
}

/// Captured line/column information (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    #[must_use]
    pub fn new(id: FileId, path: PathBuf, source: String) -> Self {
        let line_starts = compute_line_starts(&source);
        Self {
            id,
            path,
            source,
            line_starts,
        }
    }

    #[must_use]
    pub fn line_col(&self, offset: usize) -> Option<LineCol> {
        if offset > self.source.len() {
            return None;
        }
        let index = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line_start = *self.line_starts.get(index)?;
        Some(LineCol {
            line: index + 1,
            column: offset.saturating_sub(line_start) + 1,
        })
    }

    /// The 1-based line's text, including its terminator.
    #[must_use]
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.saturating_sub(1))?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        self.source.get(start..end)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Collection of source files used by diagnostics.
#[derive(Clone, Debug, Default)]
pub struct FileCache {
    files: Vec<SourceFile>,
}

impl FileCache {
    pub fn add_file(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> FileId {
        let id = FileId(self.files.len());
        let file = SourceFile::new(id, path.into(), source.into());
        self.files.push(file);
        id
    }

    #[must_use]
    pub fn get(&self, file_id: FileId) -> Option<&SourceFile> {
        self.files.get(file_id.0)
    }

    #[must_use]
    pub fn path(&self, file_id: FileId) -> Option<&Path> {
        self.get(file_id).map(|file| file.path.as_path())
    }

    #[must_use]
    pub fn line_col(&self, file_id: FileId, offset: usize) -> Option<LineCol> {
        self.get(file_id).and_then(|file| file.line_col(offset))
    }
}

fn compute_line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (idx, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(idx + 1);
        }
    }
    starts
}
