//! sone compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! AST JSON → Code Generator → module text → Assembler → .wasm → Validator
//! ```
//!
//! Lexing, parsing and semantic analysis happen upstream; this crate takes
//! the analysed tree as JSON (or as a [`Program`] value) and returns module
//! text, an optional binary and structured diagnostics.

mod assemble;

pub use assemble::{assemble, validate, AssemblyError};

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sone_codegen::types::COMPILER_VERSION;
use sone_codegen::{CodegenError, SourceMap};
use sone_types::ast::Program;
use sone_types::{CompileErrors, ErrorCode, SoneError, SourceFile, Span};

// ══════════════════════════════════════════════════════════════════════════════
// Options & results
// ══════════════════════════════════════════════════════════════════════════════

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Assemble and validate the module text. Off for hosts that run their
    /// own assembler.
    #[serde(default = "default_assemble")]
    pub assemble: bool,
    /// Program source text, used to quote the offending line in diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_assemble() -> bool {
    true
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            assemble: true,
            source: None,
        }
    }
}

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Module text.
    pub wat: String,
    /// Assembled binary, when assembly was requested.
    pub wasm: Option<Vec<u8>>,
    /// Lowercase hex SHA-256 of `wat`.
    pub module_hash: String,
    pub source_map: SourceMap,
}

/// Serializable result for tooling and the browser entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub wat: Option<String>,
    pub wasm: Option<Vec<u8>>,
    pub module_hash: Option<String>,
    pub source_map: Option<SourceMap>,
    pub errors: CompileErrors,
    pub compiler_version: String,
}

// ══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ══════════════════════════════════════════════════════════════════════════════

/// Decode an analysed program from JSON.
pub fn parse_program(json: &str, file: &str) -> Result<Program, CompileErrors> {
    serde_json::from_str(json).map_err(|e| {
        let span = Span::point(e.line() as u32, e.column() as u32);
        let line = json.lines().nth(e.line().saturating_sub(1)).unwrap_or("");
        CompileErrors::single(
            SoneError::new(
                file,
                ErrorCode::MALFORMED_AST,
                format!("malformed program: {e}"),
                span,
                line,
            )
            .with_suggestion("the input must be an analysed program tree as produced by analysis"),
        )
    })
}

/// Compile a JSON program with default options.
pub fn compile(json: &str, file: &str) -> Result<Artifact, CompileErrors> {
    let program = parse_program(json, file)?;
    compile_program(&program, file, &CompileOptions::default())
}

/// Compile an analysed program.
pub fn compile_program(
    program: &Program,
    file: &str,
    options: &CompileOptions,
) -> Result<Artifact, CompileErrors> {
    let source = options.source.as_deref().map(|s| SourceFile::new(file, s));

    debug!("codegen: {file}");
    let (wat, source_map) = sone_codegen::compile_with_source_map(program)
        .map_err(|e| CompileErrors::single(codegen_diagnostic(&e, file, source.as_ref())))?;
    let module_hash = module_hash(&wat);

    let wasm = if options.assemble {
        debug!("assembling {} bytes of module text", wat.len());
        let bytes = assemble(&wat)
            .and_then(|bytes| validate(&bytes).map(|()| bytes))
            .map_err(|e| CompileErrors::single(assembly_diagnostic(&e, file)))?;
        debug!("module is {} bytes", bytes.len());
        Some(bytes)
    } else {
        None
    };

    Ok(Artifact {
        wat,
        wasm,
        module_hash,
        source_map,
    })
}

/// Run the pipeline and fold the outcome into a [`CompileResult`].
pub fn compile_to_result(json: &str, file: &str, options: &CompileOptions) -> CompileResult {
    let outcome = parse_program(json, file).and_then(|p| compile_program(&p, file, options));
    match outcome {
        Ok(artifact) => CompileResult {
            success: true,
            wat: Some(artifact.wat),
            wasm: artifact.wasm,
            module_hash: Some(artifact.module_hash),
            source_map: Some(artifact.source_map),
            errors: CompileErrors::empty(),
            compiler_version: COMPILER_VERSION.to_string(),
        },
        Err(errors) => CompileResult {
            success: false,
            wat: None,
            wasm: None,
            module_hash: None,
            source_map: None,
            errors,
            compiler_version: COMPILER_VERSION.to_string(),
        },
    }
}

/// Lowercase hex SHA-256 of module text.
pub fn module_hash(wat: &str) -> String {
    format!("{:x}", Sha256::digest(wat.as_bytes()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Diagnostics
// ══════════════════════════════════════════════════════════════════════════════

fn codegen_diagnostic(err: &CodegenError, file: &str, source: Option<&SourceFile>) -> SoneError {
    let span = err.span();
    let line = source
        .and_then(|s| s.line(span.start_line))
        .unwrap_or_default();
    let diag = SoneError::new(file, err.code(), err.to_string(), span, line);
    match err {
        CodegenError::InvalidClampTarget { .. } => {
            diag.with_suggestion("clamp against a range, e.g. `x -< 0..1`")
        }
        CodegenError::InvalidArrayLengthTarget { .. } => {
            diag.with_suggestion("`[]` reads the length of an array value")
        }
        CodegenError::UnresolvedSymbol { name, .. } => {
            diag.with_suggestion(format!("`{name}` must be bound in an enclosing scope"))
        }
        _ => diag,
    }
}

fn assembly_diagnostic(err: &AssemblyError, file: &str) -> SoneError {
    SoneError::new(file, err.code(), err.to_string(), Span::SYNTHETIC, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_assembling() {
        assert!(CompileOptions::default().assemble);
        let opts: CompileOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, CompileOptions::default());
        let opts: CompileOptions = serde_json::from_str(r#"{"assemble":false}"#).unwrap();
        assert!(!opts.assemble);
    }

    #[test]
    fn module_hash_is_hex_sha256() {
        let hash = module_hash("");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(module_hash("(start $a)"), module_hash("(start $b)"));
    }
}
