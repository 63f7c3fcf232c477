//! Linear-memory arena and array layout.
//!
//! Arrays are laid out at a uniform [`MEM_STRIDE`] regardless of element
//! kind, with a 32-bit element count in the slot just before element 0.
//! The cursor only ever grows; nothing is freed.

use log::debug;
use sone_types::ast::{Expr, ExprKind, ValueKind};
use sone_types::Span;

use crate::coerce::{as_float, as_int, kind_of};
use crate::compiler::CompilationState;
use crate::error::{CodegenError, CodegenResult};
use crate::expr::emit_expr;
use crate::stdlib::Snippet;
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Allocator
// ══════════════════════════════════════════════════════════════════════════════

/// Monotonic allocation cursor over linear memory, in bytes.
///
/// Always a multiple of [`MEM_STRIDE`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocator {
    cursor: u32,
}

impl MemoryAllocator {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Next free byte offset.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Number of slots handed out so far, headers included.
    pub fn slots(&self) -> u32 {
        self.cursor / MEM_STRIDE
    }

    /// Reserve the header slot of a new array and return the array's base
    /// address: the first element slot, directly after the header.
    pub fn open_array(&mut self) -> CodegenResult<u32> {
        self.advance(1)?;
        Ok(self.cursor)
    }

    /// Reserve `slots` element slots.
    pub fn advance(&mut self, slots: u32) -> CodegenResult<()> {
        self.cursor = slots
            .checked_mul(MEM_STRIDE)
            .and_then(|bytes| self.cursor.checked_add(bytes))
            .ok_or_else(|| {
                CodegenError::LimitExceeded(format!(
                    "allocating {slots} slots past offset {} overflows 32-bit memory",
                    self.cursor
                ))
            })?;
        Ok(())
    }

    /// Pages the memory section must declare, or `None` when nothing was
    /// allocated and the module needs no memory.
    pub fn pages(&self) -> CodegenResult<Option<u32>> {
        if self.cursor == 0 {
            return Ok(None);
        }
        let pages = self.slots().div_ceil(SLOTS_PER_PAGE);
        if pages > MAX_PAGES {
            return Err(CodegenError::LimitExceeded(format!(
                "{pages} memory pages requested, at most {MAX_PAGES} allowed"
            )));
        }
        Ok(Some(pages))
    }
}

/// Byte offset of element `index` of the array based at `base`.
fn slot_offset(base: u32, index: u32) -> CodegenResult<u32> {
    index
        .checked_mul(MEM_STRIDE)
        .and_then(|bytes| base.checked_add(bytes))
        .ok_or_else(|| {
            CodegenError::LimitExceeded(format!("array element {index} lies past 32-bit memory"))
        })
}

// ══════════════════════════════════════════════════════════════════════════════
// Array literals
// ══════════════════════════════════════════════════════════════════════════════

/// What one initializer member contributes to the layout.
enum Member<'e> {
    /// A numeric expression stored as f64 in one slot.
    Value(&'e Expr),
    /// Consecutive integer constants `min..=max`, one slot each.
    Ints(i32, i32),
    /// Slots reserved without an initializing store.
    Reserve(u32),
}

impl Member<'_> {
    fn slots(&self) -> u32 {
        match self {
            Self::Value(_) => 1,
            Self::Ints(min, max) if min <= max => max.abs_diff(*min).saturating_add(1),
            Self::Ints(..) => 0,
            Self::Reserve(n) => *n,
        }
    }
}

fn classify<'e>(member: &'e Expr, ctx: &CompilationState<'_>) -> CodegenResult<Member<'e>> {
    match kind_of(member, ctx) {
        Some(ValueKind::Int | ValueKind::Float) => Ok(Member::Value(member)),
        Some(ValueKind::Range) => {
            let ExprKind::Range { start, end } = &member.kind else {
                return Err(CodegenError::unimplemented(
                    "array initializer: computed range",
                    member,
                ));
            };
            let max = match end.as_deref().map(|e| &e.kind) {
                Some(ExprKind::IntLit(max)) => *max,
                Some(_) => {
                    return Err(CodegenError::unimplemented(
                        "array initializer: computed range",
                        member,
                    ))
                }
                None => {
                    return Err(CodegenError::unimplemented(
                        "array initializer: open-ended range",
                        member,
                    ))
                }
            };
            match start.as_deref().map(|e| &e.kind) {
                // [..n]: n slots, zero by default
                None => Ok(Member::Reserve(max.max(0) as u32)),
                // [a..b]
                Some(ExprKind::IntLit(min)) => Ok(Member::Ints(*min, max)),
                Some(_) => Err(CodegenError::unimplemented(
                    "array initializer: computed range min value",
                    member,
                )),
            }
        }
        _ => Err(CodegenError::unimplemented("array initializer", member)),
    }
}

/// `[a, b, 1..3, ..4]`
///
/// The whole layout is reserved before any member is translated, so arrays
/// created while evaluating a member can never overlap this one.  Leaves
/// the array's base address on the stack.
pub fn emit_array_lit<'a>(
    members: &'a [Expr],
    span: Span,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    let layout = members
        .iter()
        .map(|m| classify(m, ctx))
        .collect::<CodegenResult<Vec<_>>>()?;
    let count = layout
        .iter()
        .try_fold(0u32, |acc, m| acc.checked_add(m.slots()))
        .ok_or_else(|| CodegenError::LimitExceeded("array element count overflows".into()))?;

    let base = ctx.memory.open_array()?;
    ctx.memory.advance(count)?;
    debug!("array at {span}: base {base}, {count} elements");

    let mut out = vec![format!(
        "(i32.store {} {})",
        i32_const((base - MEM_STRIDE) as i32),
        i32_const(count as i32)
    )];
    let mut slot = 0u32;
    for member in layout {
        match member {
            Member::Value(expr) => {
                let value = match expr.kind {
                    ExprKind::IntLit(v) => f64_const(f64::from(v)),
                    _ => as_float(expr, ctx)?,
                };
                out.push(store_f64(slot_offset(base, slot)?, &value));
                slot += 1;
            }
            Member::Ints(min, max) => {
                for v in min..=max {
                    out.push(store_f64(slot_offset(base, slot)?, &f64_const(f64::from(v))));
                    slot += 1;
                }
            }
            Member::Reserve(n) => slot += n,
        }
    }
    out.push(i32_const(base as i32));
    Ok(out.join(" "))
}

fn store_f64(offset: u32, value: &str) -> String {
    format!("(f64.store {} {value})", i32_const(offset as i32))
}

// ══════════════════════════════════════════════════════════════════════════════
// Array access
// ══════════════════════════════════════════════════════════════════════════════

/// `a[]`: load the element count from the header slot before `a`.
pub fn emit_length<'a>(
    array: &'a Expr,
    span: Span,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    if kind_of(array, ctx) != Some(ValueKind::Pointer) {
        return Err(CodegenError::InvalidArrayLengthTarget {
            op: "[]",
            span: array.span.merge(span),
        });
    }
    Ok(format!(
        "(i32.load (i32.sub {} {}))",
        emit_expr(array, ctx)?,
        i32_const(MEM_STRIDE as i32)
    ))
}

/// Where an indexed store writes.
pub enum StoreIndex<'a> {
    /// `a[b]`: runtime index expression.
    Expr(&'a Expr),
    /// `a.3`: numeric field.
    Const(i32),
}

/// `a[b] = v` / `a.3 = v`: store `value` (already f64) at
/// `a + idx(b, a[]) * stride`, wrapping the index into range.
pub fn emit_indexed_store<'a>(
    array: &'a Expr,
    index: StoreIndex<'a>,
    value: &str,
    span: Span,
    ctx: &mut CompilationState<'a>,
) -> CodegenResult<String> {
    ctx.require(Snippet::Idx);
    let base = emit_expr(array, ctx)?;
    let index = match index {
        StoreIndex::Expr(e) => as_int(e, ctx)?,
        StoreIndex::Const(n) => i32_const(n),
    };
    let length = emit_length(array, span, ctx)?;
    Ok(format!(
        "(f64.store (i32.add {base} (i32.shl (call ${idx} {index} {length}) {shift})) {value})",
        idx = Snippet::Idx.name(),
        shift = i32_const(STRIDE_SHIFT as i32),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_precedes_base() {
        let mut mem = MemoryAllocator::new();
        let first = mem.open_array().unwrap();
        assert_eq!(first, MEM_STRIDE);
        mem.advance(3).unwrap();
        let second = mem.open_array().unwrap();
        assert_eq!(second, first + 4 * MEM_STRIDE);
        // the second header sits right after the first array's last element
        assert_eq!(second - MEM_STRIDE, first + 3 * MEM_STRIDE);
    }

    #[test]
    fn pages_round_up() {
        let mut mem = MemoryAllocator::new();
        assert_eq!(mem.pages().unwrap(), None);
        mem.advance(1).unwrap();
        assert_eq!(mem.pages().unwrap(), Some(1));
        mem.advance(SLOTS_PER_PAGE - 1).unwrap();
        assert_eq!(mem.pages().unwrap(), Some(1));
        mem.advance(1).unwrap();
        assert_eq!(mem.pages().unwrap(), Some(2));
    }

    #[test]
    fn overflow_is_reported() {
        let mut mem = MemoryAllocator::new();
        mem.advance(u32::MAX / MEM_STRIDE).unwrap();
        assert!(matches!(
            mem.advance(1),
            Err(CodegenError::LimitExceeded(_))
        ));
    }

    #[test]
    fn span_slot_counts() {
        assert_eq!(Member::Ints(1, 3).slots(), 3);
        assert_eq!(Member::Ints(-2, 2).slots(), 5);
        assert_eq!(Member::Ints(3, 1).slots(), 0);
        assert_eq!(Member::Reserve(4).slots(), 4);
    }
}
