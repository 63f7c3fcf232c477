//! Target value representation and memory layout.
//!
//! Every stored scalar and array element occupies one fixed-size slot:
//!
//! ```text
//! base - 8 : i32   element count (array header)
//! base + 0 : f64   element 0
//! base + 8 : f64   element 1
//! ...
//! ```
//!
//! Integers are 32-bit two's complement, decimals 64-bit IEEE-754,
//! pointers 32-bit byte offsets into the single linear memory.

use std::fmt;

use sone_types::ast::{StorageClass, ValueKind, VarDesc};

// ── Memory ───────────────────────────────────────────────────────────────────

/// Bytes per memory slot (one f64).
pub const MEM_STRIDE: u32 = 8;
/// `log2(MEM_STRIDE)`, used to scale element indices into byte offsets.
pub const STRIDE_SHIFT: u32 = 3;
/// Linear memory page size (64 KiB).
pub const PAGE_SIZE: u32 = 65536;
/// Number of slots that fit in one page.
pub const SLOTS_PER_PAGE: u32 = PAGE_SIZE / MEM_STRIDE;
/// Maximum pages addressable by a 32-bit memory.
pub const MAX_PAGES: u32 = 65536;
/// Export name of the module's linear memory.
pub const MEMORY_EXPORT: &str = "memory";

// ── Functions ────────────────────────────────────────────────────────────────

/// Name of the synthesized function wrapping all top-level statements.
pub const INIT_FUNC: &str = "module/init";
/// Prefix of structured loop labels; the nesting depth is appended.
pub const LOOP_LABEL: &str = "loop";

/// Compiler version, reported by the pipeline.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Value types ──────────────────────────────────────────────────────────────

/// Machine value type of a variable, parameter or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatType {
    I32,
    F64,
}

impl WatType {
    /// Representation of a declared variable or function result:
    /// FLOAT is f64, every other kind is i32.
    pub fn of(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float => Self::F64,
            _ => Self::I32,
        }
    }

    /// Representation of a function parameter: POINTER is i32, every other
    /// kind is passed as f64.
    pub fn param(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Pointer => Self::I32,
            _ => Self::F64,
        }
    }

    /// Representation of a variable as it is actually stored.
    pub fn storage(desc: &VarDesc) -> Self {
        match desc.storage {
            StorageClass::Parameter => Self::param(desc.kind),
            _ => Self::of(desc.kind),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for WatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Constant instructions ────────────────────────────────────────────────────

/// `(i32.const n)`
pub fn i32_const(value: i32) -> String {
    format!("(i32.const {value})")
}

/// `(f64.const x)` with the shortest text that round-trips to the same bits.
pub fn f64_const(value: f64) -> String {
    format!("(f64.const {})", fmt_f64(value))
}

fn fmt_f64(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value}")
    }
}
