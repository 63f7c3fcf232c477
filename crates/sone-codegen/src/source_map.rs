//! Source mapping: module function index → source location.
//!
//! Each entry maps an emitted function to the span of the definition it was
//! generated from, so a host can resolve a trap in `$name` (or at function
//! index N of the assembled binary) back to source.  Granularity is
//! per-function.

use serde::{Deserialize, Serialize};
use sone_types::Span;

/// A complete source map for a compiled module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry: one function → one source region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Function index in the assembled module (the module has no imports,
    /// so this is the position among its function forms).
    pub func_index: u32,
    /// Function name without the `$` sigil.
    pub func_name: String,
    pub kind: FuncKind,
    /// Source span (1-based line/column); synthetic for library code.
    pub span: Span,
}

/// Classification of an emitted function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FuncKind {
    /// The synthesized top-level initializer run as the start function.
    Init,
    /// A function defined in the program.
    Function,
    /// A standard-library snippet.
    Stdlib,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry at the next function index.
    pub fn push(&mut self, func_name: impl Into<String>, kind: FuncKind, span: Span) {
        let func_index = self.entries.len() as u32;
        self.entries.push(SourceMapEntry {
            func_index,
            func_name: func_name.into(),
            kind,
            span,
        });
    }

    pub fn find_by_func_index(&self, idx: u32) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.func_index == idx)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.func_name == name)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_push_order() {
        let mut sm = SourceMap::new();
        sm.push("util/idx", FuncKind::Stdlib, Span::SYNTHETIC);
        sm.push("osc", FuncKind::Function, Span::new(2, 1, 4, 9));
        sm.push("module/init", FuncKind::Init, Span::new(1, 1, 9, 1));

        assert_eq!(sm.find_by_func_index(1).unwrap().func_name, "osc");
        assert_eq!(sm.find_by_name("module/init").unwrap().func_index, 2);
        assert!(sm.find_by_func_index(3).is_none());
    }

    #[test]
    fn json_uses_snake_case_kinds() {
        let mut sm = SourceMap::new();
        sm.push("osc", FuncKind::Function, Span::new(2, 1, 4, 9));
        let json = String::from_utf8(sm.to_json()).unwrap();
        assert!(json.contains("\"kind\":\"function\""));

        let back = SourceMap::from_json(json.as_bytes()).expect("parse failed");
        assert_eq!(back, sm);
    }
}
