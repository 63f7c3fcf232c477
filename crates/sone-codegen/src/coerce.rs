//! Value-kind resolution and numeric coercions.

use sone_types::ast::{BinOp, Expr, ExprKind, Scope, ValueKind, VarDesc};

use crate::compiler::CompilationState;
use crate::error::CodegenResult;
use crate::expr::emit_expr;
use crate::types::WatType;

/// Resolve the value kind of `expr` in the current scope.
///
/// Literals are known by shape and identifiers by their descriptor.  Other
/// nodes use the analysis annotation, falling back to what the node's
/// shape implies when analysis left none.
pub fn kind_of(expr: &Expr, ctx: &CompilationState<'_>) -> Option<ValueKind> {
    Resolver {
        ctx,
        inner: Vec::new(),
    }
    .kind_of(expr)
}

/// Kind of a variable as read back from storage: numeric parameters
/// arrive as f64 whatever their declared kind.
fn stored_kind(desc: &VarDesc) -> ValueKind {
    if desc.kind.is_numeric() && WatType::storage(desc) == WatType::F64 {
        ValueKind::Float
    } else {
        desc.kind
    }
}

/// Kind lookup that also sees the scopes of blocks entered during
/// resolution, which the state's own stack does not yet hold.
struct Resolver<'s, 'c> {
    ctx: &'s CompilationState<'c>,
    inner: Vec<&'s Scope>,
}

impl<'s, 'c> Resolver<'s, 'c> {
    fn lookup(&self, name: &str) -> Option<&'s VarDesc> {
        self.inner
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.ctx.lookup(name))
    }

    fn kind_of(&mut self, expr: &'s Expr) -> Option<ValueKind> {
        match &expr.kind {
            ExprKind::IntLit(_) => Some(ValueKind::Int),
            ExprKind::FloatLit(_) => Some(ValueKind::Float),
            ExprKind::Ident(name) => self.lookup(name).map(stored_kind),
            _ => expr.ty.or_else(|| self.infer(expr)),
        }
    }

    fn all_int(&mut self, exprs: &[&'s Expr]) -> bool {
        exprs
            .iter()
            .all(|&e| self.kind_of(e) == Some(ValueKind::Int))
    }

    /// Kind a store into `target` yields: the variable read back after the
    /// store, not the value on the right.  Element stores yield nothing.
    fn target_kind(&self, target: &Expr) -> Option<ValueKind> {
        match &target.kind {
            ExprKind::Ident(name) => self.lookup(name).map(stored_kind),
            _ => None,
        }
    }

    fn infer(&mut self, expr: &'s Expr) -> Option<ValueKind> {
        match &expr.kind {
            ExprKind::Statements(items) | ExprKind::Sequence(items) => {
                items.last().and_then(|e| self.kind_of(e))
            }
            ExprKind::FuncDef(_) => Some(ValueKind::Function),
            ExprKind::Block(block) => {
                self.inner.push(&block.scope);
                let kind = self.kind_of(&block.body);
                self.inner.pop();
                kind
            }
            ExprKind::Neg(operand) => self.kind_of(operand),
            ExprKind::Binary {
                op: BinOp::BitOr, ..
            } => None,
            ExprKind::Binary { left, right, .. } => Some(if self.all_int(&[&**left, &**right]) {
                ValueKind::Int
            } else {
                ValueKind::Float
            }),
            ExprKind::Compare { .. } => Some(ValueKind::Int),
            ExprKind::Clamp { value, range } => {
                let ExprKind::Range {
                    start: Some(min),
                    end: Some(max),
                } = &range.kind
                else {
                    return None;
                };
                Some(if self.all_int(&[&**value, &**min, &**max]) {
                    ValueKind::Int
                } else {
                    ValueKind::Float
                })
            }
            ExprKind::Range { .. } => Some(ValueKind::Range),
            ExprKind::ArrayLit(_) => Some(ValueKind::Pointer),
            ExprKind::Index { index: None, .. } => Some(ValueKind::Int),
            ExprKind::Index { index: Some(_), .. } | ExprKind::Field { .. } => {
                Some(ValueKind::Float)
            }
            ExprKind::Assign { target, value } => match target.kind {
                ExprKind::Ident(_) if matches!(value.kind, ExprKind::FuncDef(_)) => {
                    Some(ValueKind::Function)
                }
                _ => self.target_kind(target),
            },
            ExprKind::Step { target, .. } | ExprKind::CompoundAssign { target, .. } => {
                self.target_kind(target)
            }
            ExprKind::Call { .. } | ExprKind::Loop { .. } => None,
            ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::Ident(_) => {
                self.kind_of(expr)
            }
        }
    }
}

/// Result kind of `+ - *`: INT when both operands are INT, FLOAT otherwise.
pub fn arith_kind(left: &Expr, right: &Expr, ctx: &CompilationState<'_>) -> ValueKind {
    if all_int(&[left, right], ctx) {
        ValueKind::Int
    } else {
        ValueKind::Float
    }
}

pub fn all_int(exprs: &[&Expr], ctx: &CompilationState<'_>) -> bool {
    exprs
        .iter()
        .all(|e| kind_of(e, ctx) == Some(ValueKind::Int))
}

/// Translate `expr` as an operand of machine type `ty`.
pub fn as_type<'a>(
    expr: &'a Expr,
    ty: WatType,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    match ty {
        WatType::F64 => as_float(expr, ctx),
        WatType::I32 => as_int(expr, ctx),
    }
}

/// Translate `expr` as an f64 operand.
pub fn as_float<'a>(expr: &'a Expr, ctx: &mut CompilationState<'a>) -> CodegenResult<String> {
    let kind = kind_of(expr, ctx);
    let text = emit_expr(expr, ctx)?;
    Ok(float_text(text, kind))
}

/// Translate `expr` as an i32 operand, truncating FLOAT values.
pub fn as_int<'a>(expr: &'a Expr, ctx: &mut CompilationState<'a>) -> CodegenResult<String> {
    let kind = kind_of(expr, ctx);
    let text = emit_expr(expr, ctx)?;
    Ok(int_text(text, kind))
}

/// Wrap already-translated text of the given kind so it yields an f64.
pub fn float_text(text: String, kind: Option<ValueKind>) -> String {
    match kind {
        Some(ValueKind::Float) => text,
        _ => format!("(f64.convert_i32_s {text})"),
    }
}

/// Wrap already-translated text of the given kind so it yields an i32.
pub fn int_text(text: String, kind: Option<ValueKind>) -> String {
    match kind {
        Some(ValueKind::Float) => format!("(i32.trunc_f64_s {text})"),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sone_types::ast::{CmpOp, CompoundOp, StepOp};

    #[test]
    fn identifiers_resolve_through_scopes() {
        let scope = Scope::new()
            .with("n", VarDesc::local(ValueKind::Int))
            .with("gain", VarDesc::global(ValueKind::Float));
        let mut ctx = CompilationState::new();
        ctx.enter_scope(&scope);

        assert_eq!(kind_of(&Expr::ident("n"), &ctx), Some(ValueKind::Int));
        assert_eq!(kind_of(&Expr::ident("gain"), &ctx), Some(ValueKind::Float));
        assert_eq!(kind_of(&Expr::ident("missing"), &ctx), None);
    }

    #[test]
    fn numeric_parameters_read_as_float() {
        let scope = Scope::new()
            .with("n", VarDesc::param(ValueKind::Int))
            .with("buf", VarDesc::param(ValueKind::Pointer));
        let mut ctx = CompilationState::new();
        ctx.enter_scope(&scope);

        assert_eq!(kind_of(&Expr::ident("n"), &ctx), Some(ValueKind::Float));
        assert_eq!(kind_of(&Expr::ident("buf"), &ctx), Some(ValueKind::Pointer));
    }

    #[test]
    fn structural_fallback() {
        let scope = Scope::new()
            .with("n", VarDesc::local(ValueKind::Int))
            .with("gain", VarDesc::global(ValueKind::Float));
        let mut ctx = CompilationState::new();
        ctx.enter_scope(&scope);

        let int_sum = Expr::binary(BinOp::Add, Expr::ident("n"), Expr::int(1));
        let mixed = Expr::binary(BinOp::Mul, Expr::ident("n"), Expr::ident("gain"));
        let cmp = Expr::compare(CmpOp::Lt, Expr::ident("gain"), Expr::float(0.5));
        assert_eq!(kind_of(&int_sum, &ctx), Some(ValueKind::Int));
        assert_eq!(kind_of(&mixed, &ctx), Some(ValueKind::Float));
        assert_eq!(kind_of(&cmp, &ctx), Some(ValueKind::Int));
        assert_eq!(
            kind_of(&Expr::neg(Expr::ident("gain")), &ctx),
            Some(ValueKind::Float)
        );
    }

    #[test]
    fn stores_yield_the_stored_kind() {
        let scope = Scope::new()
            .with("n", VarDesc::local(ValueKind::Int))
            .with("p", VarDesc::param(ValueKind::Int))
            .with("a", VarDesc::local(ValueKind::Pointer));
        let mut ctx = CompilationState::new();
        ctx.enter_scope(&scope);

        let store = Expr::assign(Expr::ident("n"), Expr::float(1.5));
        let add = Expr::compound(CompoundOp::AddAssign, Expr::ident("n"), Expr::float(0.5));
        let step = Expr::step(StepOp::Inc, Expr::ident("p"));
        let element = Expr::assign(
            Expr::index(Expr::ident("a"), Expr::int(0)),
            Expr::float(1.0),
        );
        assert_eq!(kind_of(&store, &ctx), Some(ValueKind::Int));
        assert_eq!(kind_of(&add, &ctx), Some(ValueKind::Int));
        assert_eq!(kind_of(&step, &ctx), Some(ValueKind::Float));
        assert_eq!(kind_of(&element, &ctx), None);
    }

    #[test]
    fn blocks_resolve_their_own_locals() {
        let outer = Scope::new().with("t", VarDesc::local(ValueKind::Int));
        let mut ctx = CompilationState::new();
        ctx.enter_scope(&outer);

        let inner = Scope::new().with("t", VarDesc::local(ValueKind::Float));
        let block = Expr::block(
            Expr::statements(vec![
                Expr::assign(Expr::ident("t"), Expr::float(1.5)),
                Expr::ident("t"),
            ]),
            inner,
        );
        assert_eq!(kind_of(&block, &ctx), Some(ValueKind::Float));
        // the block's scope is gone once resolution returns
        assert_eq!(kind_of(&Expr::ident("t"), &ctx), Some(ValueKind::Int));
    }

    #[test]
    fn annotation_wins_over_shape() {
        let ctx = CompilationState::new();
        let call = Expr::call("osc", vec![]);
        assert_eq!(kind_of(&call, &ctx), None);
        assert_eq!(
            kind_of(&call.with_ty(ValueKind::Float), &ctx),
            Some(ValueKind::Float)
        );
    }

    #[test]
    fn text_coercions() {
        let one = "(i32.const 1)".to_string();
        assert_eq!(
            float_text(one.clone(), Some(ValueKind::Int)),
            "(f64.convert_i32_s (i32.const 1))"
        );
        assert_eq!(int_text(one, Some(ValueKind::Int)), "(i32.const 1)");
        let half = "(f64.const 0.5)".to_string();
        assert_eq!(float_text(half.clone(), Some(ValueKind::Float)), half);
        assert_eq!(
            int_text(half, Some(ValueKind::Float)),
            "(i32.trunc_f64_s (f64.const 0.5))"
        );
    }
}
