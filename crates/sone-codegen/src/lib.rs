//! sone code generator: compiles an analysed AST to WebAssembly module text.
//!
//! # Architecture
//!
//! The code generator walks a scope-resolved, kind-annotated
//! [`sone_types::ast::Program`] once and produces the text of a
//! self-contained module.  The module has no imports.
//!
//! ## Layout
//! - `(memory (export "memory") N)`, present when any array was allocated
//! - standard-library snippets (`util/i32.smax`, `util/i32.smin`,
//!   `util/idx`), in first-requested order
//! - globals and functions, in emission order
//! - exports for every top-level binding flagged exported
//! - `(start $module/init)`, which runs the top-level statements once
//!
//! ## Value Representation
//!
//! INT is `i32`, FLOAT is `f64`, arrays are `i32` pointers into linear
//! memory with an element-count header one stride before element 0.  See
//! [`types`] for the layout constants.

pub mod coerce;
pub mod compiler;
pub mod error;
pub mod expr;
pub mod memory;
pub mod source_map;
pub mod stdlib;
pub mod types;

pub use compiler::{compile, compile_with_source_map, CompilationState};
pub use error::{CodegenError, CodegenResult};
pub use source_map::SourceMap;
