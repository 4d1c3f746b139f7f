//! Front-end core of the kiln compiler: lazy named-type resolution,
//! field/method lookup across embedding hierarchies, and shape-based
//! stenciling of generic functions with runtime dictionaries.
//!
//! Lexing, parsing, expression checking, and code generation are external
//! collaborators; this crate consumes a fully name-resolved declaration
//! graph and produces compiled bodies, dictionary layouts, and finalized
//! type information.

pub mod diagnostics;
pub mod export;
pub mod ir;
pub mod lookup;
pub mod resolve;
pub mod span;
pub mod stencil;
pub mod types;

use diagnostics::{CompileError, DiagnosticSink};
use ir::{DeclId, Program};
use span::Span;
use stencil::{CompiledSet, Stenciler};
use types::{TypeId, TypeTable};

/// An explicit instantiation request, e.g. from an exported generic that
/// must exist for a known set of argument types.
#[derive(Debug, Clone)]
pub struct InstRequest {
    pub decl: DeclId,
    pub type_args: Vec<TypeId>,
    pub span: Span,
}

/// Single-pass driver over one compilation batch.
///
/// Populate `table` and `program` from the upstream collaborator, then
/// call [`Frontend::check`]. The batch either completes with a
/// [`CompiledSet`] or aborts once the error ceiling is reached; collected
/// diagnostics stay available on the sink either way.
#[derive(Default)]
pub struct Frontend {
    pub table: TypeTable,
    pub program: Program,
    pub sink: DiagnosticSink,
}

impl Frontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, requests: &[InstRequest]) -> Result<CompiledSet, CompileError> {
        self.table.resolve_all(&mut self.sink);
        self.sink.check_limit()?;

        let mut stenciler = Stenciler::new(&mut self.table, &self.program, &mut self.sink);
        for r in requests {
            stenciler.request(r.decl, &r.type_args, r.span);
        }
        stenciler.check_concrete();
        stenciler.drain();
        let set = stenciler.finalize();
        self.sink.check_limit()?;

        // Method signatures deferred for instantiated receivers complete
        // only now, once every declaration has been processed. Named
        // instances created along the way still need their underlying
        // memoized; resolution is idempotent for everything else.
        self.table.drain_deferred();
        self.table.resolve_all(&mut self.sink);
        self.sink.check_limit()?;
        Ok(set)
    }

    /// Serializes the batch's products for the downstream code generator.
    pub fn export_json(&self, set: &CompiledSet) -> serde_json::Result<String> {
        let snap = export::snapshot(&self.table, &self.program, set);
        export::to_json(&snap)
    }
}
