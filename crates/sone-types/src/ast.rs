//! Annotated AST for the sone audio language.
//!
//! Trees arrive from the semantic-analysis pass already scope-resolved:
//! function definitions and lexical blocks carry their own [`Scope`], and
//! nodes whose value kind is not evident from their shape carry a
//! [`ValueKind`] annotation in [`Expr::ty`].
//!
//! Scopes and bindings preserve declaration order (`Vec`, not a map) so
//! that local declarations and exports come out in a stable order.

use serde::{Deserialize, Serialize};

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Program
// ══════════════════════════════════════════════════════════════════════════════

/// A complete analysed program: the top-level statement tree and the
/// module scope it runs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Expr,
    pub scope: Scope,
}

impl Program {
    pub fn new(body: Expr, scope: Scope) -> Self {
        Self { body, scope }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Scopes
// ══════════════════════════════════════════════════════════════════════════════

/// Value kind inferred by analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float,
    Int,
    Range,
    Pointer,
    Function,
}

impl ValueKind {
    /// INT or FLOAT.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

/// Where a variable lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// Module-level variable.
    Global,
    /// Function-local variable.
    Local,
    /// Function parameter.
    Parameter,
}

/// Per-identifier metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDesc {
    pub kind: ValueKind,
    pub storage: StorageClass,
    #[serde(default)]
    pub exported: bool,
}

impl VarDesc {
    pub fn new(kind: ValueKind, storage: StorageClass) -> Self {
        Self {
            kind,
            storage,
            exported: false,
        }
    }

    pub fn global(kind: ValueKind) -> Self {
        Self::new(kind, StorageClass::Global)
    }

    pub fn local(kind: ValueKind) -> Self {
        Self::new(kind, StorageClass::Local)
    }

    pub fn param(kind: ValueKind) -> Self {
        Self::new(kind, StorageClass::Parameter)
    }

    /// Mark the variable as exported from the module.
    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    pub fn is_global(&self) -> bool {
        self.storage == StorageClass::Global
    }
}

/// A named entry in a [`Scope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(flatten)]
    pub desc: VarDesc,
}

/// The identifiers a function body or block introduces, in declaration order.
///
/// Only the scope's own entries are listed; names from enclosing scopes are
/// found by walking outwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A repeated name replaces the earlier descriptor.
    pub fn with(mut self, name: impl Into<String>, desc: VarDesc) -> Self {
        self.insert(name, desc);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, desc: VarDesc) {
        let name = name.into();
        match self.bindings.iter_mut().find(|b| b.name == name) {
            Some(existing) => existing.desc = desc,
            None => self.bindings.push(Binding { name, desc }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&VarDesc> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.desc)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node with its analysis annotation and source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// Value kind inferred by analysis, when it recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<ValueKind>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    /// `a; b; c`: values between statements are discarded.
    Statements(Vec<Expr>),
    /// `a, b, c`
    Sequence(Vec<Expr>),
    FloatLit(f64),
    IntLit(i32),
    /// Bare identifier reference.
    Ident(String),
    /// `(a, b) -> body`
    FuncDef(Box<FuncDef>),
    /// Parenthesised expression that opens its own scope.
    Block(Box<BlockExpr>),
    /// `name(args)`
    Call { callee: String, args: Vec<Expr> },
    /// Unary `-a`.
    Neg(Box<Expr>),
    /// `a + b`, `a - b`, `a * b`, `a | b`
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b` and friends.
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a++`, `a--`
    Step { op: StepOp, target: Box<Expr> },
    /// `a += b`, `a -= b`
    CompoundAssign {
        op: CompoundOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a -< min..max`
    Clamp { value: Box<Expr>, range: Box<Expr> },
    /// `min..max`, `..max`, `min..`
    Range {
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `[a, b, 1..3]`
    ArrayLit(Vec<Expr>),
    /// `a[]` (length) or `a[b]`
    Index {
        array: Box<Expr>,
        index: Option<Box<Expr>>,
    },
    /// `a.b`
    Field { object: Box<Expr>, field: String },
    /// `a = b`
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `cond <| body`
    Loop { cond: Box<Expr>, body: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOp {
    AddAssign,
    SubAssign,
}

impl StepOp {
    /// `a++` is `a += 1`, `a--` is `a -= 1`.
    pub fn compound(self) -> CompoundOp {
        match self {
            Self::Inc => CompoundOp::AddAssign,
            Self::Dec => CompoundOp::SubAssign,
        }
    }
}

impl CompoundOp {
    /// `a += b` is `a = a + b`.
    pub fn binary(self) -> BinOp {
        match self {
            Self::AddAssign => BinOp::Add,
            Self::SubAssign => BinOp::Sub,
        }
    }
}

/// A function definition together with its own scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    /// Parameter names in call order; each has a `Parameter` entry in `scope`.
    #[serde(default)]
    pub params: Vec<String>,
    /// Declared result kind, if the function returns a value.
    #[serde(default)]
    pub result: Option<ValueKind>,
    /// Statements run before the body (default-argument setup and the like).
    #[serde(default)]
    pub prologue: Option<Expr>,
    pub body: Expr,
    #[serde(default)]
    pub scope: Scope,
}

/// A lexical block with its own scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExpr {
    pub body: Expr,
    #[serde(default)]
    pub scope: Scope,
}

impl ExprKind {
    /// Short operator label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Statements(_) => ";",
            Self::Sequence(_) => ",",
            Self::FloatLit(_) => "float literal",
            Self::IntLit(_) => "integer literal",
            Self::Ident(_) => "identifier",
            Self::FuncDef(_) => "->",
            Self::Block(_) => "(",
            Self::Call { .. } => "()",
            Self::Neg(_) => "-",
            Self::Binary { op, .. } => match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::BitOr => "|",
            },
            Self::Compare { op, .. } => match op {
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
                CmpOp::Eq => "==",
                CmpOp::Ne => "!=",
            },
            Self::Step { op, .. } => match op {
                StepOp::Inc => "++",
                StepOp::Dec => "--",
            },
            Self::CompoundAssign { op, .. } => match op {
                CompoundOp::AddAssign => "+=",
                CompoundOp::SubAssign => "-=",
            },
            Self::Clamp { .. } => "-<",
            Self::Range { .. } => "..",
            Self::ArrayLit(_) => "array literal",
            Self::Index { .. } => "[]",
            Self::Field { .. } => ".",
            Self::Assign { .. } => "=",
            Self::Loop { .. } => "<|",
        }
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────
// Used by the analysis pass and by tests to assemble annotated trees.

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            ty: None,
            span: Span::SYNTHETIC,
        }
    }

    /// Attach an analysis annotation.
    pub fn with_ty(mut self, ty: ValueKind) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Attach a source span.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn int(value: i32) -> Self {
        Self::new(ExprKind::IntLit(value)).with_ty(ValueKind::Int)
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::FloatLit(value)).with_ty(ValueKind::Float)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Ident(name.into()))
    }

    pub fn statements(stmts: Vec<Expr>) -> Self {
        Self::new(ExprKind::Statements(stmts))
    }

    pub fn sequence(items: Vec<Expr>) -> Self {
        Self::new(ExprKind::Sequence(items))
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: callee.into(),
            args,
        })
    }

    pub fn neg(operand: Expr) -> Self {
        Self::new(ExprKind::Neg(Box::new(operand)))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn step(op: StepOp, target: Expr) -> Self {
        Self::new(ExprKind::Step {
            op,
            target: Box::new(target),
        })
    }

    pub fn compound(op: CompoundOp, target: Expr, value: Expr) -> Self {
        Self::new(ExprKind::CompoundAssign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn clamp(value: Expr, range: Expr) -> Self {
        Self::new(ExprKind::Clamp {
            value: Box::new(value),
            range: Box::new(range),
        })
    }

    pub fn range(start: Option<Expr>, end: Option<Expr>) -> Self {
        Self::new(ExprKind::Range {
            start: start.map(Box::new),
            end: end.map(Box::new),
        })
        .with_ty(ValueKind::Range)
    }

    pub fn array(members: Vec<Expr>) -> Self {
        Self::new(ExprKind::ArrayLit(members)).with_ty(ValueKind::Pointer)
    }

    /// `array[]`
    pub fn length(array: Expr) -> Self {
        Self::new(ExprKind::Index {
            array: Box::new(array),
            index: None,
        })
        .with_ty(ValueKind::Int)
    }

    /// `array[index]`
    pub fn index(array: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Index {
            array: Box::new(array),
            index: Some(Box::new(index)),
        })
    }

    pub fn field(object: Expr, field: impl Into<String>) -> Self {
        Self::new(ExprKind::Field {
            object: Box::new(object),
            field: field.into(),
        })
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn loop_(cond: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Loop {
            cond: Box::new(cond),
            body: Box::new(body),
        })
    }

    pub fn func(def: FuncDef) -> Self {
        Self::new(ExprKind::FuncDef(Box::new(def))).with_ty(ValueKind::Function)
    }

    pub fn block(body: Expr, scope: Scope) -> Self {
        Self::new(ExprKind::Block(Box::new(BlockExpr { body, scope })))
    }
}

impl FuncDef {
    pub fn new(params: Vec<String>, body: Expr, scope: Scope) -> Self {
        Self {
            params,
            result: None,
            prologue: None,
            body,
            scope,
        }
    }

    pub fn returning(mut self, kind: ValueKind) -> Self {
        self.result = Some(kind);
        self
    }

    pub fn with_prologue(mut self, prologue: Expr) -> Self {
        self.prologue = Some(prologue);
        self
    }
}
