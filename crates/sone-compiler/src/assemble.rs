//! Module text → binary, and binary validation.

use sone_types::ErrorCode;
use thiserror::Error;

/// Failure turning generated module text into a loadable binary.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("module text does not assemble: {0}")]
    Syntax(#[from] wat::Error),

    #[error("module fails validation: {0}")]
    Invalid(#[from] wasmparser::BinaryReaderError),
}

impl AssemblyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Syntax(_) => ErrorCode::ASSEMBLY_FAILED,
            Self::Invalid(_) => ErrorCode::VALIDATION_FAILED,
        }
    }
}

/// Assemble module text into a binary module.
pub fn assemble(text: &str) -> Result<Vec<u8>, AssemblyError> {
    Ok(wat::parse_str(text)?)
}

/// Validate a binary module.
pub fn validate(wasm: &[u8]) -> Result<(), AssemblyError> {
    wasmparser::validate(wasm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_module_assembles_and_validates() {
        let wasm = assemble("(module (func $f (return)) (start $f))").unwrap();
        assert_eq!(&wasm[0..4], b"\0asm");
        validate(&wasm).unwrap();
    }

    #[test]
    fn bad_text_is_a_syntax_error() {
        let err = assemble("(func $f (i32.bogus))").unwrap_err();
        assert!(matches!(err, AssemblyError::Syntax(_)));
        assert_eq!(err.code(), ErrorCode::ASSEMBLY_FAILED);
    }

    #[test]
    fn ill_typed_body_fails_validation() {
        // assembles fine, but the body leaves an i32 where f64 is expected
        let wasm = assemble("(func (result f64) (i32.const 1))").unwrap();
        let err = validate(&wasm).unwrap_err();
        assert!(matches!(err, AssemblyError::Invalid(_)));
        assert_eq!(err.code(), ErrorCode::VALIDATION_FAILED);
    }
}
