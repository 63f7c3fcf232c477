//! Main module assembler.
//!
//! Orchestrates the code generation pipeline:
//! 1. Wrap the top-level program in the synthetic initializer function and
//!    translate it (nested function definitions emit their own forms)
//! 2. Collect export forms for flagged top-level entries
//! 3. Prepend requested standard-library snippets
//! 4. Prepend the memory section if any array was allocated
//! 5. Declare the initializer as the module's start function

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use sone_types::ast::{Program, Scope, StorageClass, ValueKind, VarDesc};
use sone_types::Span;

use crate::error::{CodegenError, CodegenResult};
use crate::expr::{emit_function, FunctionForm};
use crate::memory::MemoryAllocator;
use crate::source_map::{FuncKind, SourceMap};
use crate::stdlib::Snippet;
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile an analysed [`Program`] into module text.
///
/// Returns the complete text of a module on success, or a [`CodegenError`]
/// describing the first unsupported construct.  No partial text is produced.
pub fn compile(program: &Program) -> CodegenResult<String> {
    compile_with_source_map(program).map(|(text, _)| text)
}

/// Compile a [`Program`] and also return a [`SourceMap`] with one entry per
/// emitted function.
pub fn compile_with_source_map(program: &Program) -> CodegenResult<(String, SourceMap)> {
    debug!(
        "compiling program: {} top-level bindings",
        program.scope.len()
    );
    let mut state = CompilationState::new();

    emit_function(
        FunctionForm {
            name: INIT_FUNC.to_string(),
            params: &[],
            result: None,
            prologue: None,
            body: &program.body,
            scope: &program.scope,
            span: program.body.span,
            kind: FuncKind::Init,
        },
        &mut state,
    )?;

    state.finish(&program.scope)
}

// ══════════════════════════════════════════════════════════════════════════════
// Scope stack
// ══════════════════════════════════════════════════════════════════════════════

/// Lexically enclosing scopes, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack<'a> {
    frames: Vec<&'a Scope>,
}

impl<'a> ScopeStack<'a> {
    pub fn push(&mut self, scope: &'a Scope) {
        self.frames.push(scope);
    }

    pub fn pop(&mut self) {
        debug_assert!(!self.frames.is_empty(), "scope stack underflow");
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Look up a name, searching from innermost to outermost scope.
    pub fn lookup(&self, name: &str) -> Option<&'a VarDesc> {
        self.frames.iter().rev().find_map(|scope| scope.get(name))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CompilationState: per-run codegen state
// ══════════════════════════════════════════════════════════════════════════════

/// State owned by one compilation run and discarded at its end.
///
/// The input tree is only borrowed; which descriptors have already been
/// declared is tracked here, keyed by descriptor address, so the same
/// [`Program`] can be compiled any number of times.
pub struct CompilationState<'a> {
    /// Standard-library snippets in first-requested order.
    includes: Vec<Snippet>,
    /// Top-level global and function forms in emission order.
    forms: Vec<String>,
    /// Local declarations of the function currently being generated.
    locals: Vec<String>,
    /// Names declared in `locals`.
    local_names: HashSet<String>,
    /// Linear-memory arena cursor.
    pub memory: MemoryAllocator,
    scopes: ScopeStack<'a>,
    declared: HashSet<*const VarDesc>,
    loop_depth: u32,
    /// Emitted functions: (name, kind, span), in emission order.
    functions: Vec<(String, FuncKind, Span)>,
    /// Parameter types of every function generated so far.
    signatures: HashMap<String, Vec<WatType>>,
}

/// Locals of an enclosing function, parked while a nested one is generated.
pub struct SavedLocals {
    locals: Vec<String>,
    local_names: HashSet<String>,
}

impl<'a> CompilationState<'a> {
    pub fn new() -> Self {
        Self {
            includes: Vec::new(),
            forms: Vec::new(),
            locals: Vec::new(),
            local_names: HashSet::new(),
            memory: MemoryAllocator::new(),
            scopes: ScopeStack::default(),
            declared: HashSet::new(),
            loop_depth: 0,
            functions: Vec::new(),
            signatures: HashMap::new(),
        }
    }

    // ── Scopes ───────────────────────────────────────────────────────────

    pub fn enter_scope(&mut self, scope: &'a Scope) {
        self.scopes.push(scope);
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Find the descriptor for `name` in the enclosing scopes.
    pub fn lookup(&self, name: &str) -> Option<&'a VarDesc> {
        self.scopes.lookup(name)
    }

    /// Like [`lookup`](Self::lookup), failing with `UnresolvedSymbol`.
    pub fn resolve(&self, name: &str, span: Span) -> CodegenResult<&'a VarDesc> {
        self.lookup(name)
            .ok_or_else(|| CodegenError::UnresolvedSymbol {
                name: name.to_string(),
                span,
            })
    }

    // ── Declarations ─────────────────────────────────────────────────────

    /// Record `desc` as declared. Returns `false` if it already was.
    pub fn mark_declared(&mut self, desc: &'a VarDesc) -> bool {
        self.declared.insert(desc as *const VarDesc)
    }

    pub fn is_declared(&self, desc: &VarDesc) -> bool {
        self.declared.contains(&(desc as *const VarDesc))
    }

    /// Declare every own entry of `scope` except parameters and functions.
    pub fn declare_scope(&mut self, scope: &'a Scope) {
        for binding in scope.iter() {
            if binding.desc.storage != StorageClass::Parameter {
                self.declare(&binding.name, &binding.desc);
            }
        }
    }

    /// Emit the storage declaration for one variable, once.
    ///
    /// Globals become top-level forms; everything else becomes a local of
    /// the function under generation.
    pub fn declare(&mut self, name: &str, desc: &'a VarDesc) {
        if desc.kind == ValueKind::Function || !self.mark_declared(desc) {
            return;
        }
        let ty = WatType::of(desc.kind);
        if desc.is_global() {
            self.push_form(format!("(global ${name} (mut {ty}) ({ty}.const 0))"));
        } else if self.local_names.insert(name.to_string()) {
            self.locals.push(format!("(local ${name} {ty})"));
        }
    }

    /// Park the current function's locals and start an empty set.
    pub fn take_locals(&mut self) -> SavedLocals {
        SavedLocals {
            locals: std::mem::take(&mut self.locals),
            local_names: std::mem::take(&mut self.local_names),
        }
    }

    /// Reinstate parked locals, returning the declarations they replace.
    pub fn restore_locals(&mut self, saved: SavedLocals) -> Vec<String> {
        self.local_names = saved.local_names;
        std::mem::replace(&mut self.locals, saved.locals)
    }

    // ── Top-level forms ──────────────────────────────────────────────────

    pub fn push_form(&mut self, form: String) {
        trace!("form: {form}");
        self.forms.push(form);
    }

    /// Push a finished function form and note it for the source map.
    pub fn push_function(&mut self, name: &str, kind: FuncKind, span: Span, form: String) {
        self.functions.push((name.to_string(), kind, span));
        self.push_form(form);
    }

    /// Record the parameter types of `name` so call sites can convert
    /// their arguments.
    pub fn record_signature(&mut self, name: &str, params: Vec<WatType>) {
        self.signatures.insert(name.to_string(), params);
    }

    pub fn signature(&self, name: &str) -> Option<&[WatType]> {
        self.signatures.get(name).map(Vec::as_slice)
    }

    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    // ── Standard library ─────────────────────────────────────────────────

    /// Request a snippet for inclusion. Repeated requests are ignored.
    pub fn require(&mut self, snippet: Snippet) {
        if !self.includes.contains(&snippet) {
            debug!("including {}", snippet.name());
            self.includes.push(snippet);
        }
    }

    pub fn includes(&self) -> &[Snippet] {
        &self.includes
    }

    // ── Loops ────────────────────────────────────────────────────────────

    /// Enter a loop; returns the depth used for its label.
    pub fn enter_loop(&mut self) -> u32 {
        self.loop_depth += 1;
        self.loop_depth
    }

    pub fn exit_loop(&mut self) {
        self.loop_depth -= 1;
    }

    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    // ── Assembly ─────────────────────────────────────────────────────────

    /// Assemble the final module text.
    ///
    /// Order: memory section, snippets, globals and functions in emission
    /// order, exports, start declaration.
    fn finish(self, top: &Scope) -> CodegenResult<(String, SourceMap)> {
        let mut out = Vec::with_capacity(self.forms.len() + self.includes.len() + 2);
        let mut source_map = SourceMap::new();

        if let Some(pages) = self.memory.pages()? {
            out.push(format!("(memory (export \"{MEMORY_EXPORT}\") {pages})"));
        }

        for snippet in &self.includes {
            out.push(snippet.text().to_string());
            source_map.push(snippet.name(), FuncKind::Stdlib, Span::SYNTHETIC);
        }
        for (name, kind, span) in self.functions {
            source_map.push(name, kind, span);
        }

        out.extend(self.forms);

        for binding in top.iter().filter(|b| b.desc.exported) {
            let kind = if binding.desc.kind == ValueKind::Function {
                "func"
            } else {
                "global"
            };
            out.push(format!(
                "(export \"{name}\" ({kind} ${name}))",
                name = binding.name
            ));
        }

        out.push(format!("(start ${INIT_FUNC})"));

        debug!(
            "module assembled: {} forms, {} snippets, {} bytes of memory",
            out.len(),
            self.includes.len(),
            self.memory.cursor()
        );
        Ok((out.join("\n"), source_map))
    }
}

impl Default for CompilationState<'_> {
    fn default() -> Self {
        Self::new()
    }
}
