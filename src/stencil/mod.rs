//! Shape-based stenciling of generic functions.
//!
//! A generic declaration is compiled once per erased shape of its type
//! arguments, never once per concrete instantiation. Each request derives
//! the shape tuple, consults the instantiation cache, and on a miss
//! enqueues a build job; builds run off an explicit FIFO queue so nested
//! generic calls bound stack depth no matter how deep they chain.

pub mod dict;
pub mod shape;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::diagnostics::{CompileError, DiagnosticSink};
use crate::ir::{Body, DeclId, Expr, Program, Stmt};
use crate::lookup::{lookup_field_or_method, missing_method, LookupResult, MissingReason};
use crate::span::Span;
use crate::types::{ShapeKind, Signature, SubstMap, TypeId, TypeTable};

use dict::{DictBuilder, Dictionary, SubDictKind};
use shape::shape_of;

/// Opaque handle to one shape instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(u32);

/// One compiled body per (declaration, shape arguments).
#[derive(Debug, Clone)]
pub struct InstInfo {
    pub decl: DeclId,
    pub name: String,
    pub shape_args: Vec<ShapeKind>,
    pub sig: Signature,
    pub body: Option<Body>,
    pub dict: Dictionary,
    /// Name of the hidden parameter the dictionary is bound to inside the
    /// body.
    pub dict_param: String,
}

pub struct Stenciler<'a> {
    table: &'a mut TypeTable,
    program: &'a Program,
    sink: &'a mut DiagnosticSink,
    insts: Vec<InstInfo>,
    cache: HashMap<(DeclId, Vec<ShapeKind>), InstId>,
    pending: VecDeque<InstId>,
    checked: HashSet<DeclId>,
    dnum: u32,
}

impl<'a> Stenciler<'a> {
    pub fn new(table: &'a mut TypeTable, program: &'a Program, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            table,
            program,
            sink,
            insts: Vec::new(),
            cache: HashMap::new(),
            pending: VecDeque::new(),
            checked: HashSet::new(),
            dnum: 0,
        }
    }

    pub fn inst(&self, id: InstId) -> &InstInfo {
        &self.insts[id.0 as usize]
    }

    pub fn insts(&self) -> &[InstInfo] {
        &self.insts
    }

    /// Requests an instantiation of `decl` with concrete (or already
    /// shape-substituted) type arguments. Returns the cached handle when
    /// the shape tuple was seen before; otherwise registers the
    /// instantiation and queues its build.
    ///
    /// An arity mismatch is reported and recovered with `Invalid`
    /// placeholder arguments so downstream errors can still surface.
    pub fn request(&mut self, decl: DeclId, type_args: &[TypeId], span: Span) -> InstId {
        let program = self.program;
        let f = program.func(decl);
        let expected = f.type_params.len();
        let mut targs = type_args.to_vec();
        if targs.len() != expected {
            self.sink.report(CompileError::ArityMismatch {
                name: f.name.clone(),
                expected,
                got: targs.len(),
                span,
            });
            let invalid = self.table.invalid();
            targs.resize(expected, invalid);
        }

        let shape_args: Vec<ShapeKind> = targs.iter().map(|&t| shape_of(self.table, t)).collect();
        let key = (decl, shape_args.clone());
        if let Some(&id) = self.cache.get(&key) {
            return id;
        }

        let id = InstId(self.insts.len() as u32);
        let name = mangled_name(&f.name, &shape_args);
        let dict_param = format!(".dict.{}.{}", f.name, self.dnum);
        self.dnum += 1;
        self.insts.push(InstInfo {
            decl,
            name,
            shape_args,
            sig: Signature::new(Vec::new(), Vec::new()),
            body: None,
            dict: Dictionary::default(),
            dict_param,
        });
        self.cache.insert(key, id);
        self.pending.push_back(id);
        id
    }

    /// Walks every non-generic body, validating it and requesting an
    /// instantiation for each generic call site encountered.
    pub fn check_concrete(&mut self) {
        let program = self.program;
        let map = SubstMap::new(Vec::new());
        for id in program.decl_ids() {
            if self.sink.at_limit() {
                break;
            }
            let f = program.func(id);
            if f.is_generic() {
                continue;
            }
            self.check_body(id);
            if let Some(body) = &f.body {
                // Concrete bodies contribute no dictionary entries; the
                // builder is discarded.
                let mut b = DictBuilder::new(Vec::new());
                self.stencil_body(body, &map, &mut b);
            }
        }
    }

    /// Builds every queued instantiation. Builds may queue further
    /// instantiations; the loop runs until the queue is empty or the
    /// error ceiling is reached.
    pub fn drain(&mut self) {
        while let Some(id) = self.pending.pop_front() {
            self.build(id);
            if self.sink.at_limit() {
                // The batch aborts at the ceiling; remaining builds are
                // dropped.
                self.pending.clear();
                break;
            }
        }
        assert!(self.pending.is_empty(), "instantiation queue not drained to empty");
    }

    /// Validates a declaration's body once: bound method calls against
    /// the receiver's method set and interface conversions against the
    /// target interface. These checks do not depend on the instantiating
    /// shapes, so they run per declaration, not per instantiation.
    fn check_body(&mut self, decl: DeclId) {
        if !self.checked.insert(decl) {
            return;
        }
        let program = self.program;
        if let Some(body) = &program.func(decl).body {
            for stmt in &body.stmts {
                self.check_stmt(stmt);
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.check_expr(e),
            Stmt::Return(es) => {
                for e in es {
                    self.check_expr(e);
                }
            }
            Stmt::Local { init, .. } => {
                if let Some(e) = init {
                    self.check_expr(e);
                }
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit(_) | Expr::Local(_) | Expr::FuncValue { .. } => {}

            Expr::Call { args, .. } | Expr::Composite { args, .. } => {
                for e in args {
                    self.check_expr(e);
                }
            }

            Expr::Select { base, .. } => self.check_expr(base),

            Expr::BoundCall { recv, recv_ty, method, args, span } => {
                match lookup_field_or_method(self.table, *recv_ty, false, method) {
                    LookupResult::Found { .. } => {}
                    LookupResult::NotFound => self.sink.report(CompileError::type_err(
                        format!("{} has no method '{}'", self.table.type_str(*recv_ty), method),
                        *span,
                    )),
                    LookupResult::Ambiguous { .. } => self.sink.report(
                        CompileError::AmbiguousSelector { name: method.clone(), span: *span },
                    ),
                    LookupResult::NeedsAddress => self.sink.report(
                        CompileError::NeedsAddress { name: method.clone(), span: *span },
                    ),
                }
                self.check_expr(recv);
                for e in args {
                    self.check_expr(e);
                }
            }

            Expr::ConvertIface { value, from, iface, span } => {
                if let Some((m, reason)) = missing_method(self.table, *from, *iface) {
                    let from_str = self.table.type_str(*from);
                    let iface_str = self.table.type_str(*iface);
                    let msg = match reason {
                        MissingReason::NotFound => format!(
                            "{from_str} does not implement {iface_str} (missing method {})",
                            m.name
                        ),
                        MissingReason::WrongSignature => format!(
                            "{from_str} does not implement {iface_str} (wrong type for method {})",
                            m.name
                        ),
                        MissingReason::PointerReceiver => format!(
                            "{from_str} does not implement {iface_str} (method {} has pointer receiver)",
                            m.name
                        ),
                    };
                    self.sink.report(CompileError::type_err(msg, *span));
                }
                self.check_expr(value);
            }
        }
    }

    fn build(&mut self, id: InstId) {
        let program = self.program;
        let decl = self.insts[id.0 as usize].decl;
        let shape_args = self.insts[id.0 as usize].shape_args.clone();
        let f = program.func(decl);
        self.check_body(decl);

        let shape_tys: Vec<TypeId> =
            shape_args.iter().map(|&k| self.table.shape_type(k)).collect();
        let map = SubstMap::new(shape_tys);
        let sig = self.table.subst_sig(&f.sig, &map);

        let mut builder = DictBuilder::new(shape_args);
        let body = f.body.as_ref().map(|b| self.stencil_body(b, &map, &mut builder));

        let info = &mut self.insts[id.0 as usize];
        info.sig = sig;
        info.body = body;
        info.dict = builder.finish();
    }

    fn stencil_body(&mut self, body: &Body, map: &SubstMap, b: &mut DictBuilder) -> Body {
        Body::new(body.stmts.iter().map(|s| self.stencil_stmt(s, map, b)).collect())
    }

    fn stencil_stmt(&mut self, stmt: &Stmt, map: &SubstMap, b: &mut DictBuilder) -> Stmt {
        match stmt {
            Stmt::Expr(e) => Stmt::Expr(self.stencil_expr(e, map, b)),
            Stmt::Return(es) => {
                Stmt::Return(es.iter().map(|e| self.stencil_expr(e, map, b)).collect())
            }
            Stmt::Local { name, ty, init } => {
                let nty = self.table.subst(*ty, map);
                b.add_derived(self.table, nty);
                Stmt::Local {
                    name: name.clone(),
                    ty: nty,
                    init: init.as_ref().map(|e| self.stencil_expr(e, map, b)),
                }
            }
        }
    }

    fn stencil_expr(&mut self, expr: &Expr, map: &SubstMap, b: &mut DictBuilder) -> Expr {
        match expr {
            Expr::IntLit(v) => Expr::IntLit(*v),
            Expr::Local(n) => Expr::Local(n.clone()),

            Expr::Call { callee, type_args, args, span } => {
                let targs: Vec<TypeId> =
                    type_args.iter().map(|&t| self.table.subst(t, map)).collect();
                let args: Vec<Expr> =
                    args.iter().map(|e| self.stencil_expr(e, map, b)).collect();
                if self.program.func(*callee).is_generic() {
                    // Transitive instantiation; cache hit when the shape
                    // tuple was seen already.
                    self.request(*callee, &targs, *span);
                    if targs.iter().any(|&t| self.table.has_shape(t)) {
                        let shape_args =
                            targs.iter().map(|&t| shape_of(self.table, t)).collect();
                        b.add_sub_dict(SubDictKind::Call { callee: *callee, shape_args });
                    }
                }
                Expr::Call { callee: *callee, type_args: targs, args, span: *span }
            }

            Expr::FuncValue { decl, type_args, span } => {
                let targs: Vec<TypeId> =
                    type_args.iter().map(|&t| self.table.subst(t, map)).collect();
                if self.program.func(*decl).is_generic() {
                    self.request(*decl, &targs, *span);
                    if targs.iter().any(|&t| self.table.has_shape(t)) {
                        let shape_args =
                            targs.iter().map(|&t| shape_of(self.table, t)).collect();
                        b.add_sub_dict(SubDictKind::Call { callee: *decl, shape_args });
                    }
                }
                Expr::FuncValue { decl: *decl, type_args: targs, span: *span }
            }

            Expr::BoundCall { recv, recv_ty, method, args, span } => {
                let nrt = self.table.subst(*recv_ty, map);
                if self.table.has_shape(nrt) {
                    b.add_sub_dict(SubDictKind::BoundMethod {
                        recv: shape_of(self.table, nrt),
                        method: method.clone(),
                    });
                }
                Expr::BoundCall {
                    recv: Box::new(self.stencil_expr(recv, map, b)),
                    recv_ty: nrt,
                    method: method.clone(),
                    args: args.iter().map(|e| self.stencil_expr(e, map, b)).collect(),
                    span: *span,
                }
            }

            Expr::ConvertIface { value, from, iface, span } => {
                let nfrom = self.table.subst(*from, map);
                if self.table.has_shape(nfrom) {
                    b.add_itab_conv(nfrom, *iface);
                }
                Expr::ConvertIface {
                    value: Box::new(self.stencil_expr(value, map, b)),
                    from: nfrom,
                    iface: *iface,
                    span: *span,
                }
            }

            Expr::Select { base, base_ty, name, addressable, span } => {
                let nbt = self.table.subst(*base_ty, map);
                if !self.table.has_shape(nbt) {
                    match lookup_field_or_method(self.table, nbt, *addressable, name) {
                        LookupResult::Found { .. } => {}
                        LookupResult::NotFound => self.sink.report(CompileError::type_err(
                            format!(
                                "{} has no field or method '{}'",
                                self.table.type_str(nbt),
                                name
                            ),
                            *span,
                        )),
                        LookupResult::Ambiguous { .. } => self.sink.report(
                            CompileError::AmbiguousSelector { name: name.clone(), span: *span },
                        ),
                        LookupResult::NeedsAddress => self.sink.report(
                            CompileError::NeedsAddress { name: name.clone(), span: *span },
                        ),
                    }
                }
                Expr::Select {
                    base: Box::new(self.stencil_expr(base, map, b)),
                    base_ty: nbt,
                    name: name.clone(),
                    addressable: *addressable,
                    span: *span,
                }
            }

            Expr::Composite { ty, args, span } => {
                let nty = self.table.subst(*ty, map);
                b.add_derived(self.table, nty);
                Expr::Composite {
                    ty: nty,
                    args: args.iter().map(|e| self.stencil_expr(e, map, b)).collect(),
                    span: *span,
                }
            }
        }
    }

    /// Produces the final compiled set: every non-generic declaration,
    /// every built instantiation, and signature metadata for generic
    /// declarations whose bodies are never directly emitted.
    pub fn finalize(self) -> CompiledSet {
        assert!(self.pending.is_empty(), "instantiation queue not drained to empty");
        let Stenciler { program, insts, .. } = self;

        let mut funcs = Vec::new();
        let mut generic_sigs = Vec::new();
        for id in program.decl_ids() {
            let f = program.func(id);
            if f.is_generic() {
                generic_sigs.push(GenericSig {
                    name: f.name.clone(),
                    sig: f.sig.clone(),
                    type_params: f.type_params.iter().map(|p| p.name.clone()).collect(),
                });
            } else {
                funcs.push(CompiledFunc {
                    name: f.name.clone(),
                    span: f.span,
                    sig: f.sig.clone(),
                    body: f.body.clone(),
                    dict: None,
                    dict_param: None,
                });
            }
        }
        for info in insts {
            let span = program.func(info.decl).span;
            funcs.push(CompiledFunc {
                name: info.name,
                span,
                sig: info.sig,
                body: info.body,
                dict: Some(info.dict),
                dict_param: Some(info.dict_param),
            });
        }
        CompiledSet { funcs, generic_sigs }
    }
}

/// A function ready for code generation.
#[derive(Debug, Clone)]
pub struct CompiledFunc {
    pub name: String,
    pub span: Span,
    pub sig: Signature,
    pub body: Option<Body>,
    pub dict: Option<Dictionary>,
    pub dict_param: Option<String>,
}

/// Export-visible signature of an uninstantiated generic declaration.
#[derive(Debug, Clone)]
pub struct GenericSig {
    pub name: String,
    pub sig: Signature,
    pub type_params: Vec<String>,
}

#[derive(Debug)]
pub struct CompiledSet {
    pub funcs: Vec<CompiledFunc>,
    pub generic_sigs: Vec<GenericSig>,
}

fn mangled_name(base: &str, shapes: &[ShapeKind]) -> String {
    let mut out = String::from(base);
    out.push('[');
    for (i, k) in shapes.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if k.ptr {
            out.push_str("shape.ptr");
        } else {
            out.push_str(&format!("shape.{}", k.size));
        }
    }
    out.push(']');
    out
}
