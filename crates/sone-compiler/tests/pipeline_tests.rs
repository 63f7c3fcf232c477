//! End-to-end pipeline tests.
//!
//! Tests verify the full pipeline: AST JSON → codegen → module text →
//! .wasm → validation, plus the structured error output.

use sone_compiler::{
    compile, compile_program, compile_to_result, module_hash, parse_program, CompileOptions,
    CompileResult,
};
use sone_types::ast::*;
use sone_types::{ErrorCode, Span};
use wasmi::{Engine, Linker, Module, Store};

// ══════════════════════════════════════════════════════════════════════════════
// Programs
// ══════════════════════════════════════════════════════════════════════════════

/// A one-pole lowpass: `state += (input - state) * coeff`, with the
/// coefficient clamped into `0..1`.
fn lowpass() -> Program {
    let fn_scope = Scope::new().with("input", VarDesc::param(ValueKind::Float));
    let step = FuncDef::new(
        vec!["input".into()],
        Expr::statements(vec![
            Expr::compound(
                CompoundOp::AddAssign,
                Expr::ident("state"),
                Expr::binary(
                    BinOp::Mul,
                    Expr::binary(BinOp::Sub, Expr::ident("input"), Expr::ident("state")),
                    Expr::ident("coeff"),
                ),
            ),
            Expr::ident("state"),
        ]),
        fn_scope,
    )
    .returning(ValueKind::Float);

    Program::new(
        Expr::statements(vec![
            Expr::assign(
                Expr::ident("coeff"),
                Expr::clamp(
                    Expr::float(1.5),
                    Expr::range(Some(Expr::float(0.0)), Some(Expr::float(0.5))),
                ),
            ),
            Expr::assign(Expr::ident("process"), Expr::func(step).at(Span::new(3, 1, 5, 2))),
        ]),
        Scope::new()
            .with("state", VarDesc::global(ValueKind::Float))
            .with("coeff", VarDesc::global(ValueKind::Float))
            .with("process", VarDesc::global(ValueKind::Function).exported()),
    )
}

/// A wavetable filled with a ramp.
fn wavetable() -> Program {
    Program::new(
        Expr::statements(vec![
            Expr::assign(
                Expr::ident("table"),
                Expr::array(vec![Expr::range(None, Some(Expr::int(8)))]),
            ),
            Expr::assign(Expr::ident("i"), Expr::int(0)),
            Expr::loop_(
                Expr::compare(
                    CmpOp::Lt,
                    Expr::ident("i"),
                    Expr::length(Expr::ident("table")),
                ),
                Expr::statements(vec![
                    Expr::assign(
                        Expr::index(Expr::ident("table"), Expr::ident("i")),
                        Expr::binary(BinOp::Mul, Expr::ident("i"), Expr::float(0.125)),
                    ),
                    Expr::step(StepOp::Inc, Expr::ident("i")),
                ]),
            ),
        ]),
        Scope::new()
            .with("table", VarDesc::global(ValueKind::Pointer).exported())
            .with("i", VarDesc::local(ValueKind::Int)),
    )
}

fn to_json(program: &Program) -> String {
    serde_json::to_string(program).expect("serialize program")
}

// ══════════════════════════════════════════════════════════════════════════════
// End to end
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn lowpass_compiles_end_to_end() {
    let artifact = compile(&to_json(&lowpass()), "lowpass.sone").expect("compile");
    let wasm = artifact.wasm.expect("assembled");
    assert_eq!(&wasm[0..4], b"\0asm", "Must start with WASM magic bytes");
    assert_eq!(&wasm[4..8], &[1, 0, 0, 0], "Must be WASM version 1");
    assert_eq!(artifact.module_hash, module_hash(&artifact.wat));

    let engine = Engine::default();
    let module = Module::new(&engine, &wasm[..]).expect("module");
    let mut store = Store::new(&engine, ());
    let instance = Linker::<()>::new(&engine)
        .instantiate(&mut store, &module)
        .expect("instantiate")
        .start(&mut store)
        .expect("start");
    let process = instance
        .get_typed_func::<f64, f64>(&store, "process")
        .expect("process");

    // coeff = 1.5 clamped to 0.5
    assert_eq!(process.call(&mut store, 1.0).expect("call"), 0.5);
    assert_eq!(process.call(&mut store, 1.0).expect("call"), 0.75);
    assert_eq!(process.call(&mut store, 0.0).expect("call"), 0.375);
}

#[test]
fn wavetable_fills_linear_memory() {
    let artifact = compile(&to_json(&wavetable()), "table.sone").expect("compile");
    let wasm = artifact.wasm.expect("assembled");

    let engine = Engine::default();
    let module = Module::new(&engine, &wasm[..]).expect("module");
    let mut store = Store::new(&engine, ());
    let instance = Linker::<()>::new(&engine)
        .instantiate(&mut store, &module)
        .expect("instantiate")
        .start(&mut store)
        .expect("start");

    let base = instance
        .get_global(&store, "table")
        .expect("table")
        .get(&store)
        .i32()
        .expect("i32") as usize;
    let data = instance
        .get_memory(&store, "memory")
        .expect("memory")
        .data(&store);
    let header = i32::from_le_bytes(data[base - 8..base - 4].try_into().unwrap());
    assert_eq!(header, 8);
    for i in 0..8 {
        let at = base + i * 8;
        let value = f64::from_le_bytes(data[at..at + 8].try_into().unwrap());
        assert_eq!(value, i as f64 * 0.125, "element {i}");
    }
}

#[test]
fn text_only_skips_assembly() {
    let options = CompileOptions {
        assemble: false,
        ..CompileOptions::default()
    };
    let artifact = compile_program(&wavetable(), "table.sone", &options).expect("compile");
    assert!(artifact.wasm.is_none());
    assert!(artifact.wat.starts_with("(memory (export \"memory\") 1)"));
}

#[test]
fn source_map_follows_module_order() {
    let artifact = compile(&to_json(&lowpass()), "lowpass.sone").expect("compile");
    let names: Vec<_> = artifact
        .source_map
        .entries
        .iter()
        .map(|e| e.func_name.as_str())
        .collect();
    assert_eq!(names, ["process", "module/init"]);
    let process = artifact.source_map.find_by_func_index(0).expect("entry 0");
    assert_eq!(process.span, Span::new(3, 1, 5, 2));
}

#[test]
fn hand_written_json_compiles() {
    let json = r#"{
        "body": { "kind": { "statements": [
            { "kind": { "assign": {
                "target": { "kind": { "ident": "gain" } },
                "value": { "kind": { "float_lit": 0.5 } }
            } } }
        ] } },
        "scope": { "bindings": [
            { "name": "gain", "kind": "float", "storage": "global", "exported": true }
        ] }
    }"#;
    let artifact = compile(json, "gain.sone").expect("compile");
    assert!(artifact.wat.contains("(global $gain (mut f64) (f64.const 0))"));
    assert!(artifact.wat.contains("(global.set $gain (f64.const 0.5))"));
    assert!(artifact.wat.contains("(export \"gain\" (global $gain))"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn full_pipeline_determinism_100_iterations() {
    let json = to_json(&wavetable());
    let first = compile(&json, "table.sone").expect("compile");
    for i in 0..100 {
        let again = compile(&json, "table.sone").expect("compile");
        assert_eq!(again.wat, first.wat, "iteration {i} differs");
        assert_eq!(again.wasm, first.wasm, "iteration {i} differs");
        assert_eq!(again.module_hash, first.module_hash);
    }
}

#[test]
fn reused_program_value_recompiles_identically() {
    let program = lowpass();
    let options = CompileOptions::default();
    let a = compile_program(&program, "lowpass.sone", &options).expect("compile");
    let b = compile_program(&program, "lowpass.sone", &options).expect("compile");
    assert_eq!(a.wat, b.wat);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn malformed_json_is_e100() {
    let errors = parse_program("{ \"body\": ", "bad.sone").unwrap_err();
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::MALFORMED_AST);
    assert_eq!(errors.errors[0].file, "bad.sone");
}

#[test]
fn codegen_error_produces_structured_json() {
    let program = Program::new(
        Expr::clamp(Expr::ident("x"), Expr::int(3)).at(Span::new(2, 5, 2, 12)),
        Scope::new().with("x", VarDesc::local(ValueKind::Int)),
    );
    let options = CompileOptions {
        source: Some("x = 1\n    x -< 3\n".into()),
        ..CompileOptions::default()
    };
    let result = compile_to_result(&to_json(&program), "clamp.sone", &options);
    assert!(!result.success);
    assert!(result.wasm.is_none());
    assert!(result.wat.is_none());

    let err = &result.errors.errors[0];
    assert_eq!(err.code, ErrorCode::INVALID_CLAMP_TARGET);
    assert_eq!(err.span, Span::new(2, 5, 2, 12));
    assert_eq!(err.source_line, "    x -< 3");
    assert!(err.suggestion.is_some());

    let json = serde_json::to_string(&result).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["success"], false);
    assert!(parsed["errors"]["errors"].is_array());
    assert_eq!(parsed["errors"]["total_errors"], 1);
}

#[test]
fn valid_program_produces_success_result() {
    let options = CompileOptions::default();
    let result = compile_to_result(&to_json(&lowpass()), "lowpass.sone", &options);
    assert!(result.success);
    assert!(result.wasm.is_some());
    assert!(result.module_hash.is_some());
    assert!(!result.errors.has_errors());
    assert_eq!(result.compiler_version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn compile_result_json_roundtrip() {
    let options = CompileOptions::default();
    let result = compile_to_result(&to_json(&wavetable()), "table.sone", &options);
    let json = serde_json::to_string(&result).unwrap();
    let rt: CompileResult = serde_json::from_str(&json).unwrap();
    assert_eq!(rt.success, result.success);
    assert_eq!(rt.wat, result.wat);
    assert_eq!(rt.wasm, result.wasm);
    assert_eq!(rt.source_map, result.source_map);
}
