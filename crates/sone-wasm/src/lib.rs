//! sone compiler as a WASM module for browser and audio-worklet hosts.
//!
//! This crate exposes the sone compilation pipeline via `wasm-bindgen`.
//! The host runs lexing and analysis, hands the analysed tree over as
//! JSON, and instantiates the returned module inside its audio callback.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { compile } from 'sone-wasm';
//!
//! await init();
//!
//! const result = JSON.parse(compile(JSON.stringify(program), "patch.sone"));
//! // { success: true, wat: "(memory ...", wasm: [0, 97, 115, 109, ...],
//! //   module_hash: "3f2a...", source_map: { ... }, errors: { ... } }
//! ```

use sone_compiler::{CompileOptions, CompileResult};
use sone_types::{CompileErrors, ErrorCode, SoneError, Span};
use wasm_bindgen::prelude::*;

/// Compile an analysed program to module text and a validated binary.
///
/// Returns a JSON string containing a `CompileResult`.  On failure,
/// `success` is `false`, `wasm` is `null`, and `errors` contains structured
/// error information.
#[wasm_bindgen]
pub fn compile(program_json: &str, filename: &str) -> String {
    let options = CompileOptions::default();
    to_json(&sone_compiler::compile_to_result(program_json, filename, &options))
}

/// Compile to module text only, for hosts that bring their own assembler.
#[wasm_bindgen]
pub fn compile_text_only(program_json: &str, filename: &str) -> String {
    let options = CompileOptions {
        assemble: false,
        ..CompileOptions::default()
    };
    to_json(&sone_compiler::compile_to_result(program_json, filename, &options))
}

/// Compile with options given as JSON, e.g. `{"assemble": false, "source": "..."}`.
#[wasm_bindgen]
pub fn compile_with_options(program_json: &str, filename: &str, options_json: &str) -> String {
    let result = match serde_json::from_str::<CompileOptions>(options_json) {
        Ok(options) => sone_compiler::compile_to_result(program_json, filename, &options),
        Err(e) => CompileResult {
            success: false,
            wat: None,
            wasm: None,
            module_hash: None,
            source_map: None,
            errors: CompileErrors::single(SoneError::new(
                filename,
                ErrorCode::MALFORMED_AST,
                format!("malformed options: {e}"),
                Span::SYNTHETIC,
                "",
            )),
            compiler_version: version(),
        },
    };
    to_json(&result)
}

/// Return the compiler version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_json(result: &CompileResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"wasm":null,"errors":{{"errors":[{{"message":"Serialization error: {}"}}],"warnings":[],"total_errors":1,"total_warnings":0}}}}"#,
            e
        )
    })
}
