use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// A single `.plumb` program held in memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    pub fn new(id: SourceId, path: PathBuf, contents: String) -> Self {
        Self { id, path, contents }
    }

    /// Builds an anonymous source, mostly useful from tests and tooling.
    pub fn inline<S: Into<String>>(contents: S) -> Self {
        Self::new(SourceId(0), PathBuf::from("<inline>.plumb"), contents.into())
    }

    /// Returns the 1-based line `line`, if it exists.
    pub fn line(&self, line: usize) -> Option<&str> {
        self.contents.lines().nth(line.checked_sub(1)?)
    }
}
