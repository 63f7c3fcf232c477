//! Expression code generation.
//!
//! Each node translates to folded module text.  Statements leave their
//! values on the operand stack; every function form ends in `(return)`,
//! which discards whatever is left below the result.

use log::debug;
use sone_types::ast::*;
use sone_types::Span;

use crate::coerce::{all_int, arith_kind, as_float, as_type, float_text, int_text, kind_of};
use crate::compiler::CompilationState;
use crate::error::{CodegenError, CodegenResult};
use crate::memory::{self, StoreIndex};
use crate::source_map::FuncKind;
use crate::stdlib::Snippet;
use crate::types::*;

/// The constant operand of `a++` / `a--`.
static ONE: Expr = Expr {
    kind: ExprKind::IntLit(1),
    ty: Some(ValueKind::Int),
    span: Span::SYNTHETIC,
};

/// Translate an expression.
pub fn emit_expr<'a>(expr: &'a Expr, ctx: &mut CompilationState<'a>) -> CodegenResult<String> {
    emit_expr_named(expr, None, ctx)
}

/// Translate an expression; `name` names the function when `expr` is a
/// function definition on the right of an assignment.
pub fn emit_expr_named<'a>(
    expr: &'a Expr,
    name: Option<&str>,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    match &expr.kind {
        // ── Sequences ────────────────────────────────────────────────────
        ExprKind::Statements(stmts) => emit_list(stmts, "\n", ctx),
        ExprKind::Sequence(items) => emit_list(items, " ", ctx),

        // ── Literals ─────────────────────────────────────────────────────
        ExprKind::FloatLit(v) => Ok(f64_const(*v)),
        ExprKind::IntLit(v) => Ok(i32_const(*v)),

        // ── Names & scopes ───────────────────────────────────────────────
        ExprKind::Ident(id) => emit_identifier(id, expr.span, ctx),
        ExprKind::FuncDef(def) => emit_func_def(def, name, expr, ctx),
        ExprKind::Block(block) => emit_block(block, ctx),
        ExprKind::Call { callee, args } => emit_call(callee, args, ctx),

        // ── Arithmetic ───────────────────────────────────────────────────
        ExprKind::Neg(operand) => emit_neg(operand, ctx),
        ExprKind::Binary {
            op: BinOp::BitOr, ..
        } => Err(CodegenError::unimplemented("bitwise operator", expr)),
        ExprKind::Binary { op, left, right } => emit_arith(*op, left, right, ctx),
        ExprKind::Compare { op, left, right } => emit_compare(*op, left, right, ctx),
        ExprKind::Step { op, target } => emit_compound(op.compound(), target, &ONE, expr, ctx),
        ExprKind::CompoundAssign { op, target, value } => {
            emit_compound(*op, target, value, expr, ctx)
        }
        ExprKind::Clamp { value, range } => emit_clamp(value, range, expr, ctx),

        // ── Arrays ───────────────────────────────────────────────────────
        ExprKind::ArrayLit(members) => memory::emit_array_lit(members, expr.span, ctx),
        ExprKind::Index { array, index: None } => memory::emit_length(array, expr.span, ctx),
        ExprKind::Index { index: Some(_), .. } => {
            Err(CodegenError::unimplemented("indexed read", expr))
        }

        // ── Assignment & control flow ────────────────────────────────────
        ExprKind::Assign { target, value } => emit_assign(target, value, expr.span, ctx),
        ExprKind::Loop { cond, body } => emit_loop(cond, body, ctx),

        // Ranges only exist as clamp bounds and array members; field reads
        // have no translation.
        ExprKind::Range { .. } | ExprKind::Field { .. } => {
            Err(CodegenError::unknown_operation(expr))
        }
    }
}

fn emit_list<'a>(
    items: &'a [Expr],
    sep: &str,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let text = emit_expr(item, ctx)?;
        if !text.is_empty() {
            parts.push(text);
        }
    }
    Ok(parts.join(sep))
}

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers, functions & blocks
// ══════════════════════════════════════════════════════════════════════════════

/// `(global.get $x)` / `(local.get $x)`; functions are not values.
fn emit_identifier(
    name: &str,
    span: Span,
    ctx: &mut CompilationState<'_>,
) -> CodegenResult<String> {
    let desc = ctx.resolve(name, span)?;
    if desc.kind == ValueKind::Function {
        return Ok(String::new());
    }
    Ok(format!("({}.get ${name})", storage(desc)))
}

fn storage(desc: &VarDesc) -> &'static str {
    if desc.is_global() {
        "global"
    } else {
        "local"
    }
}

/// Everything needed to generate one function form.
pub struct FunctionForm<'a> {
    pub name: String,
    pub params: &'a [String],
    pub result: Option<ValueKind>,
    pub prologue: Option<&'a Expr>,
    pub body: &'a Expr,
    pub scope: &'a Scope,
    pub span: Span,
    pub kind: FuncKind,
}

fn emit_func_def<'a>(
    def: &'a FuncDef,
    name: Option<&str>,
    expr: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let Some(name) = name else {
        return Err(CodegenError::unimplemented(
            "function definition outside an assignment",
            expr,
        ));
    };
    emit_function(
        FunctionForm {
            name: name.to_string(),
            params: &def.params,
            result: def.result,
            prologue: def.prologue.as_ref(),
            body: &def.body,
            scope: &def.scope,
            span: expr.span,
            kind: FuncKind::Function,
        },
        ctx,
    )?;
    Ok(String::new())
}

/// Generate a function form and push it to the module.
///
/// The enclosing function's locals are parked for the duration and the
/// function's own scope is pushed; both are restored afterwards.
pub fn emit_function<'a>(
    form: FunctionForm<'a>,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<()> {
    debug!("function ${} ({} params)", form.name, form.params.len());
    let saved = ctx.take_locals();
    ctx.enter_scope(form.scope);

    let mut signature = Vec::with_capacity(form.params.len() + 1);
    let mut param_types = Vec::with_capacity(form.params.len());
    for param in form.params {
        let desc = form
            .scope
            .get(param)
            .ok_or_else(|| CodegenError::UnresolvedSymbol {
                name: param.clone(),
                span: form.span,
            })?;
        ctx.mark_declared(desc);
        let ty = WatType::param(desc.kind);
        param_types.push(ty);
        signature.push(format!("(param ${param} {ty})"));
    }
    ctx.record_signature(&form.name, param_types);
    if let Some(result) = form.result {
        signature.push(format!("(result {})", WatType::of(result)));
    }

    ctx.declare_scope(form.scope);

    let mut content = Vec::with_capacity(2);
    if let Some(prologue) = form.prologue {
        content.push(emit_expr(prologue, ctx)?);
    }
    let body = emit_expr(form.body, ctx)?;
    content.push(match form.result {
        Some(result) if !body.is_empty() => {
            fit(body, kind_of(form.body, ctx), WatType::of(result))
        }
        _ => body,
    });

    ctx.exit_scope();
    let locals = ctx.restore_locals(saved);

    let mut text = format!("(func ${}", form.name);
    for part in &signature {
        text.push(' ');
        text.push_str(part);
    }
    for local in &locals {
        text.push_str("\n  ");
        text.push_str(local);
    }
    for part in content.iter().filter(|c| !c.is_empty()) {
        text.push('\n');
        text.push_str(part);
    }
    text.push_str("\n(return))");

    ctx.push_function(&form.name, form.kind, form.span, text);
    Ok(())
}

/// A lexical block: its locals join the enclosing function.
fn emit_block<'a>(block: &'a BlockExpr, ctx: &mut CompilationState<'a>) -> CodegenResult<String> {
    ctx.enter_scope(&block.scope);
    ctx.declare_scope(&block.scope);
    let text = emit_expr(&block.body, ctx)?;
    ctx.exit_scope();
    Ok(text)
}

/// `f(a, b)`; arguments are converted to the callee's parameter types when
/// its definition has already been generated.
fn emit_call<'a>(
    callee: &str,
    args: &'a [Expr],
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let params = ctx.signature(callee).map(<[WatType]>::to_vec);
    let mut text = format!("(call ${callee}");
    for (i, arg) in args.iter().enumerate() {
        let arg = match params.as_ref().and_then(|p| p.get(i)) {
            Some(&ty) => as_type(arg, ty, ctx)?,
            None => emit_expr(arg, ctx)?,
        };
        if !arg.is_empty() {
            text.push(' ');
            text.push_str(&arg);
        }
    }
    text.push(')');
    Ok(text)
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic & comparison
// ══════════════════════════════════════════════════════════════════════════════

/// Unary minus: literals fold, FLOAT negates, anything else is `0 - a`.
fn emit_neg<'a>(operand: &'a Expr, ctx: &mut CompilationState<'a>) -> CodegenResult<String> {
    match operand.kind {
        ExprKind::IntLit(v) => Ok(i32_const(v.wrapping_neg())),
        ExprKind::FloatLit(v) => Ok(f64_const(-v)),
        _ if kind_of(operand, ctx) == Some(ValueKind::Float) => {
            Ok(format!("(f64.neg {})", emit_expr(operand, ctx)?))
        }
        _ => Ok(format!("(i32.sub (i32.const 0) {})", emit_expr(operand, ctx)?)),
    }
}

/// `+ - *`: i32 when both sides are INT, f64 with coercion otherwise.
fn emit_arith<'a>(
    op: BinOp,
    left: &'a Expr,
    right: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let name = match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::BitOr => unreachable!("handled above"),
    };
    emit_numeric_pair(name, name, left, right, ctx)
}

fn emit_compare<'a>(
    op: CmpOp,
    left: &'a Expr,
    right: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let (int_op, float_op) = match op {
        CmpOp::Lt => ("lt_s", "lt"),
        CmpOp::Le => ("le_s", "le"),
        CmpOp::Gt => ("gt_s", "gt"),
        CmpOp::Ge => ("ge_s", "ge"),
        CmpOp::Eq => ("eq", "eq"),
        CmpOp::Ne => ("ne", "ne"),
    };
    emit_numeric_pair(int_op, float_op, left, right, ctx)
}

fn emit_numeric_pair<'a>(
    int_op: &str,
    float_op: &str,
    left: &'a Expr,
    right: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    if all_int(&[left, right], ctx) {
        let l = emit_expr(left, ctx)?;
        let r = emit_expr(right, ctx)?;
        Ok(format!("(i32.{int_op} {l} {r})"))
    } else {
        let l = as_float(left, ctx)?;
        let r = as_float(right, ctx)?;
        Ok(format!("(f64.{float_op} {l} {r})"))
    }
}

/// `a -< min..max` as `max(min(a, max), min)`.
fn emit_clamp<'a>(
    value: &'a Expr,
    range: &'a Expr,
    expr: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let ExprKind::Range { start, end } = &range.kind else {
        return Err(CodegenError::InvalidClampTarget {
            op: expr.kind.label(),
            span: range.span.merge(expr.span),
        });
    };
    let (Some(min), Some(max)) = (start.as_deref(), end.as_deref()) else {
        return Err(CodegenError::unimplemented("open-ended clamp range", range));
    };

    if all_int(&[value, min, max], ctx) {
        ctx.require(Snippet::I32Smax);
        ctx.require(Snippet::I32Smin);
        let v = emit_expr(value, ctx)?;
        let hi = emit_expr(max, ctx)?;
        let lo = emit_expr(min, ctx)?;
        Ok(format!(
            "(call ${} (call ${} {v} {hi}) {lo})",
            Snippet::I32Smax.name(),
            Snippet::I32Smin.name()
        ))
    } else {
        let v = as_float(value, ctx)?;
        let hi = as_float(max, ctx)?;
        let lo = as_float(min, ctx)?;
        Ok(format!("(f64.max (f64.min {v} {hi}) {lo})"))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Assignment
// ══════════════════════════════════════════════════════════════════════════════

/// `a = v`, `a[b] = v`, `a.3 = v`
fn emit_assign<'a>(
    target: &'a Expr,
    value: &'a Expr,
    span: Span,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    match &target.kind {
        ExprKind::Ident(name) => {
            // f = (x) -> ...
            if let ExprKind::FuncDef(_) = value.kind {
                return emit_expr_named(value, Some(name), ctx);
            }
            let desc = storable_target(name, target.span, span, ctx)?;
            match kind_of(value, ctx) {
                Some(ValueKind::Function) | None => Err(CodegenError::invalid_assignment(
                    format!("right side of `{name} =` has no storable value"),
                    span,
                )),
                kind => {
                    let text = emit_expr(value, ctx)?;
                    Ok(emit_store(name, desc, text, kind))
                }
            }
        }
        ExprKind::Index { .. } | ExprKind::Field { .. } => {
            let text = as_float(value, ctx)?;
            emit_element_store(target, text, span, ctx)
        }
        _ => Err(CodegenError::invalid_assignment(
            format!("cannot assign to `{}`", target.kind.label()),
            span,
        )),
    }
}

/// `a += b` as `a = a + b`; `a++` arrives here with `b` = 1.
fn emit_compound<'a>(
    op: CompoundOp,
    target: &'a Expr,
    value: &'a Expr,
    expr: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let kind = arith_kind(target, value, ctx);
    match &target.kind {
        ExprKind::Ident(name) => {
            let desc = storable_target(name, target.span, expr.span, ctx)?;
            let text = emit_arith(op.binary(), target, value, ctx)?;
            Ok(emit_store(name, desc, text, Some(kind)))
        }
        ExprKind::Index { .. } | ExprKind::Field { .. } => {
            // reading the element back is not supported
            let text = emit_arith(op.binary(), target, value, ctx)?;
            emit_element_store(target, float_text(text, Some(kind)), expr.span, ctx)
        }
        _ => Err(CodegenError::invalid_assignment(
            format!("cannot assign to `{}`", target.kind.label()),
            expr.span,
        )),
    }
}

/// Resolve an identifier being stored into; function names only take
/// function definitions.
fn storable_target<'a>(
    name: &str,
    at: Span,
    span: Span,
    ctx: &CompilationState<'a>,
) -> CodegenResult<&'a VarDesc> {
    let desc = ctx.resolve(name, at)?;
    if desc.kind == ValueKind::Function {
        return Err(CodegenError::invalid_assignment(
            format!("function `{name}` can only be assigned a function definition"),
            span,
        ));
    }
    Ok(desc)
}

/// Store into a variable and yield its new value.
///
/// `value` is converted to the variable's storage type first.
fn emit_store(name: &str, desc: &VarDesc, value: String, kind: Option<ValueKind>) -> String {
    let value = fit(value, kind, WatType::storage(desc));
    if desc.is_global() {
        format!("(global.set ${name} {value})(global.get ${name})")
    } else {
        format!("(local.tee ${name} {value})")
    }
}

/// Convert text whose value has `kind` to machine type `ty`.  Text of
/// unknown kind is left alone.
fn fit(text: String, kind: Option<ValueKind>, ty: WatType) -> String {
    match (ty, kind) {
        (_, None) => text,
        (WatType::F64, kind) => float_text(text, kind),
        (WatType::I32, kind) => int_text(text, kind),
    }
}

/// Store an f64 into `a[b]` or `a.3`.
fn emit_element_store<'a>(
    target: &'a Expr,
    value: String,
    span: Span,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    match &target.kind {
        ExprKind::Index {
            array,
            index: Some(index),
        } => memory::emit_indexed_store(array, StoreIndex::Expr(index), &value, span, ctx),
        ExprKind::Field { object, field } => match field.parse::<i32>() {
            Ok(n) => memory::emit_indexed_store(object, StoreIndex::Const(n), &value, span, ctx),
            Err(_) => Err(CodegenError::unimplemented(
                format!("property access `.{field}`"),
                target,
            )),
        },
        _ => Err(CodegenError::invalid_assignment(
            format!("cannot assign to `{}`", target.kind.label()),
            span,
        )),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

/// `cond <| body`: repeat `body` while `cond` holds.
///
/// Labels come from the nesting depth, so a branch inside the body always
/// targets the innermost enclosing loop.
fn emit_loop<'a>(
    cond: &'a Expr,
    body: &'a Expr,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let depth = ctx.enter_loop();
    let label = format!("${LOOP_LABEL}{depth}");

    let test = emit_expr(cond, ctx)?;
    let test = match kind_of(cond, ctx) {
        Some(ValueKind::Float) => format!("(f64.ne {test} (f64.const 0))"),
        _ => test,
    };
    let body = emit_expr(body, ctx)?;
    ctx.exit_loop();

    let then = if body.is_empty() {
        format!("(br {label})")
    } else {
        format!("{body} (br {label})")
    };
    Ok(format!("(loop {label} (if {test} (then {then})))"))
}
