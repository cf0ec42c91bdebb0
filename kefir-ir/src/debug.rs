//! Source locations and the debug cursor that ties IR instructions back to them.

use std::fmt;

/// An opaque token identifying a position in the original source text. The
/// front-end (preprocessor/parser/AST, all out of scope here) is the only
/// producer of these; the core only stores, copies, and prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Which source file/translation unit, as an index into a table the
    /// front-end owns. `None` for synthetic instructions introduced by a pass.
    pub source_id: Option<u32>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(source_id: Option<u32>, line: u32, column: u32) -> Self {
        Self { source_id, line, column }
    }

    /// A placeholder location for instructions synthesized by the optimizer
    /// (e.g. a phi-pull's replacement value) rather than translated from source.
    pub fn synthetic() -> Self {
        Self { source_id: None, line: 0, column: 0 }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source_id.is_none()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            write!(f, "<synthetic>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Tracks "the IR instruction currently being processed" and its source
/// location, so that newly-created instructions (in the AST-to-IR translator,
/// out of scope here) and newly-substituted ones (in a pass, in scope) inherit
/// a sensible location rather than `synthetic()`.
///
/// Passes must save and restore the cursor around any nested operation that
/// moves it, and must carry the old instruction's location over to whatever
/// replaces it so that an error raised later still points somewhere useful.
#[derive(Debug, Clone, Default)]
pub struct DebugCursor {
    current: Option<SourceLocation>,
}

impl DebugCursor {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current(&self) -> Option<SourceLocation> {
        self.current
    }

    pub fn set(&mut self, location: SourceLocation) {
        self.current = Some(location);
    }

    /// Run `f` with the cursor temporarily set to `location`, restoring the
    /// prior position (whatever it was) afterwards regardless of how `f` returns.
    pub fn with_location<R>(&mut self, location: SourceLocation, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.current;
        self.current = Some(location);
        let result = f(self);
        self.current = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_location_restores_previous_position() {
        let mut cursor = DebugCursor::new();
        cursor.set(SourceLocation::new(Some(1), 5, 1));
        cursor.with_location(SourceLocation::new(Some(1), 99, 1), |c| {
            assert_eq!(c.current().unwrap().line, 99);
        });
        assert_eq!(cursor.current().unwrap().line, 5);
    }
}
