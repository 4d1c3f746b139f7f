use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Opaque handle to a type stored in the [`TypeTable`] arena.
///
/// All identity comparisons during resolution and lookup are keyed by
/// handles, never by transient structural comparison, so separately
/// constructed descriptions of the same entity stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// Opaque handle to a named-type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Byte,
    Int,
    Float,
    Str,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Byte => "byte",
            BasicKind::Int => "int",
            BasicKind::Float => "float",
            BasicKind::Str => "string",
        }
    }

    pub fn size(self) -> u64 {
        match self {
            BasicKind::Bool | BasicKind::Byte => 1,
            BasicKind::Int | BasicKind::Float => 8,
            BasicKind::Str => 16,
        }
    }
}

/// An erased view of a concrete type argument: only the properties code
/// generation cares about survive. Two concrete types with equal shape are
/// interchangeable for a compiled generic body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeKind {
    pub size: u64,
    pub ptr: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub tag: Option<String>,
    pub embedded: bool,
}

impl Field {
    pub fn named(name: impl Into<String>, ty: TypeId) -> Self {
        Self { name: name.into(), ty, tag: None, embedded: false }
    }

    pub fn embedded(name: impl Into<String>, ty: TypeId) -> Self {
        Self { name: name.into(), ty, tag: None, embedded: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
}

impl Signature {
    pub fn new(params: Vec<TypeId>, results: Vec<TypeId>) -> Self {
        Self { params, results }
    }
}

/// A method attached to a named type or listed in an interface.
///
/// `sig` is `None` while signature completion is deferred (methods created
/// for an instantiated receiver get their signature only once the deferred
/// queue runs, substituting the receiver's type arguments into the
/// original's signature).
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub sig: Option<Signature>,
    pub ptr_recv: bool,
    pub span: Span,
    pub inst_recv: Option<DefId>,
}

impl Method {
    pub fn new(name: impl Into<String>, sig: Signature) -> Self {
        Self { name: name.into(), sig: Some(sig), ptr_recv: false, span: Span::dummy(), inst_recv: None }
    }

    pub fn with_ptr_recv(mut self) -> Self {
        self.ptr_recv = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceType {
    pub methods: Vec<Method>,
    pub embeddeds: Vec<TypeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Shared sentinel for anything that failed to resolve. Cycle members
    /// all point here.
    Invalid,
    Basic(BasicKind),
    Pointer(TypeId),
    Struct(StructType),
    Interface(InterfaceType),
    Func(Signature),
    Named(DefId),
    TypeParam { index: u32, name: String, bound: TypeId },
    /// A shape type substituted for a type parameter during stenciling.
    Shape(ShapeKind),
}

/// Resolution state of a named-type definition. Transitions
/// Unresolved -> Resolving -> Resolved exactly once; idempotent after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    Unresolved,
    Resolving,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParamDecl {
    pub name: String,
    pub bound: TypeId,
}

/// A named (defined) type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub span: Span,
    /// Set for definitions loaded from a previously compiled unit. Their
    /// underlying must already be resolved; updating one is an invariant
    /// violation.
    pub imported: bool,
    pub state: ResolveState,
    /// The declared right-hand side. May itself be a named type during
    /// setup; never consulted once `underlying` is memoized.
    pub rhs: TypeId,
    /// Fully unwrapped structural type; never `Type::Named` once set.
    pub underlying: Option<TypeId>,
    pub methods: Vec<Method>,
    pub type_params: Vec<TypeParamDecl>,
    /// Non-empty iff this definition is an instantiation of `orig`.
    pub type_args: Vec<TypeId>,
    pub orig: Option<DefId>,
    pub self_ty: TypeId,
}

/// Work deferred until all declarations are processed. Tasks may enqueue
/// further tasks; the queue is drained in a loop, never by recursion.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredTask {
    CompleteMethod { def: DefId, index: usize },
}

/// The type arena for one compilation unit.
pub struct TypeTable {
    types: Vec<Type>,
    defs: Vec<TypeDef>,
    invalid: TypeId,
    basics: [TypeId; 5],
    shapes: HashMap<ShapeKind, TypeId>,
    named_insts: HashMap<(DefId, Vec<TypeId>), DefId>,
    pub(crate) later: VecDeque<DeferredTask>,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            defs: Vec::new(),
            invalid: TypeId(0),
            basics: [TypeId(0); 5],
            shapes: HashMap::new(),
            named_insts: HashMap::new(),
            later: VecDeque::new(),
        };
        table.invalid = table.alloc(Type::Invalid);
        for kind in [BasicKind::Bool, BasicKind::Byte, BasicKind::Int, BasicKind::Float, BasicKind::Str] {
            table.basics[kind as usize] = table.alloc(Type::Basic(kind));
        }
        table
    }

    pub fn alloc(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn invalid(&self) -> TypeId {
        self.invalid
    }

    pub fn basic(&self, kind: BasicKind) -> TypeId {
        self.basics[kind as usize]
    }

    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        self.alloc(Type::Pointer(base))
    }

    pub fn func(&mut self, sig: Signature) -> TypeId {
        self.alloc(Type::Func(sig))
    }

    pub fn struct_of(&mut self, fields: Vec<Field>) -> TypeId {
        self.alloc(Type::Struct(StructType { fields }))
    }

    pub fn interface_of(&mut self, methods: Vec<Method>, embeddeds: Vec<TypeId>) -> TypeId {
        self.alloc(Type::Interface(InterfaceType { methods, embeddeds }))
    }

    pub fn type_param(&mut self, index: u32, name: impl Into<String>, bound: TypeId) -> TypeId {
        self.alloc(Type::TypeParam { index, name: name.into(), bound })
    }

    /// Interned shape type for a given erased kind.
    pub fn shape_type(&mut self, kind: ShapeKind) -> TypeId {
        if let Some(&id) = self.shapes.get(&kind) {
            return id;
        }
        let id = self.alloc(Type::Shape(kind));
        self.shapes.insert(kind, id);
        id
    }

    /// Declares a named type. The right-hand side may be patched later via
    /// [`TypeTable::set_rhs`] to tie mutually recursive declarations.
    pub fn declare(&mut self, name: impl Into<String>, span: Span, rhs: TypeId) -> DefId {
        let def = DefId(self.defs.len() as u32);
        let self_ty = self.alloc(Type::Named(def));
        self.defs.push(TypeDef {
            name: name.into(),
            span,
            imported: false,
            state: ResolveState::Unresolved,
            rhs,
            underlying: None,
            methods: Vec::new(),
            type_params: Vec::new(),
            type_args: Vec::new(),
            orig: None,
            self_ty,
        });
        def
    }

    /// Declares a definition loaded from a previously compiled unit.
    /// `underlying` must already be structural.
    pub fn declare_imported(&mut self, name: impl Into<String>, underlying: TypeId) -> DefId {
        if matches!(self.ty(underlying), Type::Named(_)) {
            panic!("imported underlying type must not be a named type");
        }
        let def = self.declare(name, Span::dummy(), underlying);
        let d = &mut self.defs[def.0 as usize];
        d.imported = true;
        d.state = ResolveState::Resolved;
        d.underlying = Some(underlying);
        def
    }

    pub fn set_rhs(&mut self, def: DefId, rhs: TypeId) {
        let d = &mut self.defs[def.0 as usize];
        if d.state == ResolveState::Resolved {
            panic!("cannot change the right-hand side of resolved type '{}'", d.name);
        }
        d.rhs = rhs;
    }

    pub fn set_type_params(&mut self, def: DefId, params: Vec<TypeParamDecl>) {
        self.defs[def.0 as usize].type_params = params;
    }

    pub fn def(&self, def: DefId) -> &TypeDef {
        &self.defs[def.0 as usize]
    }

    pub fn def_mut(&mut self, def: DefId) -> &mut TypeDef {
        &mut self.defs[def.0 as usize]
    }

    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    pub fn def_ids(&self) -> impl Iterator<Item = DefId> {
        (0..self.defs.len() as u32).map(DefId)
    }

    pub fn named_type(&self, def: DefId) -> TypeId {
        self.def(def).self_ty
    }

    /// Adds a method unless one with the same name is already attached.
    pub fn add_method(&mut self, def: DefId, method: Method) {
        let d = &mut self.defs[def.0 as usize];
        if d.methods.iter().any(|m| m.name == method.name) {
            return;
        }
        d.methods.push(method);
    }

    pub(crate) fn record_named_inst(&mut self, orig: DefId, targs: Vec<TypeId>, inst: DefId) {
        self.named_insts.insert((orig, targs), inst);
    }

    pub(crate) fn lookup_named_inst(&self, orig: DefId, targs: &[TypeId]) -> Option<DefId> {
        self.named_insts.get(&(orig, targs.to_vec())).copied()
    }

    pub(crate) fn push_later(&mut self, task: DeferredTask) {
        self.later.push_back(task);
    }

    // ── Structural identity ─────────────────────────────────────────

    /// Reports whether two types are identical. Named types compare by
    /// handle (instantiations of the same original additionally compare
    /// their type arguments); everything else compares structurally.
    pub fn identical(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.ty(a), self.ty(b)) {
            (Type::Invalid, Type::Invalid) => true,
            (Type::Basic(x), Type::Basic(y)) => x == y,
            (Type::Shape(x), Type::Shape(y)) => x == y,
            (Type::Pointer(x), Type::Pointer(y)) => self.identical(*x, *y),
            (Type::Func(x), Type::Func(y)) => self.identical_sig(x, y),
            (Type::Struct(x), Type::Struct(y)) => {
                x.fields.len() == y.fields.len()
                    && x.fields.iter().zip(&y.fields).all(|(f, g)| {
                        f.name == g.name
                            && f.embedded == g.embedded
                            && f.tag == g.tag
                            && self.identical(f.ty, g.ty)
                    })
            }
            (Type::Interface(x), Type::Interface(y)) => {
                x.methods.len() == y.methods.len()
                    && x.embeddeds.len() == y.embeddeds.len()
                    && x.methods.iter().zip(&y.methods).all(|(m, n)| {
                        m.name == n.name && self.identical_method_sig(m, n)
                    })
                    && x.embeddeds.iter().zip(&y.embeddeds).all(|(e, f)| self.identical(*e, *f))
            }
            (Type::Named(x), Type::Named(y)) => {
                if x == y {
                    return true;
                }
                let (dx, dy) = (self.def(*x), self.def(*y));
                match (dx.orig, dy.orig) {
                    (Some(ox), Some(oy)) => {
                        ox == oy
                            && dx.type_args.len() == dy.type_args.len()
                            && dx
                                .type_args
                                .iter()
                                .zip(&dy.type_args)
                                .all(|(s, t)| self.identical(*s, *t))
                    }
                    _ => false,
                }
            }
            (
                Type::TypeParam { index: i, bound: bi, .. },
                Type::TypeParam { index: j, bound: bj, .. },
            ) => i == j && self.identical(*bi, *bj),
            _ => false,
        }
    }

    fn identical_sig(&self, a: &Signature, b: &Signature) -> bool {
        a.params.len() == b.params.len()
            && a.results.len() == b.results.len()
            && a.params.iter().zip(&b.params).all(|(x, y)| self.identical(*x, *y))
            && a.results.iter().zip(&b.results).all(|(x, y)| self.identical(*x, *y))
    }

    pub(crate) fn identical_method_sig(&self, a: &Method, b: &Method) -> bool {
        match (&a.sig, &b.sig) {
            (Some(x), Some(y)) => self.identical_sig(x, y),
            _ => false,
        }
    }

    // ── Method sets ─────────────────────────────────────────────────

    /// The computed, order-stable method set of an interface, type
    /// parameter bound, or named interface type: declared methods first,
    /// then embedded interfaces' methods in embedding order, first
    /// occurrence of a name wins.
    pub fn method_set(&self, ty: TypeId) -> Vec<Method> {
        let mut out = Vec::new();
        self.collect_methods(ty, &mut out, &mut Vec::new());
        out
    }

    fn collect_methods(&self, ty: TypeId, out: &mut Vec<Method>, visiting: &mut Vec<TypeId>) {
        if visiting.contains(&ty) {
            return;
        }
        visiting.push(ty);
        match self.ty(ty) {
            Type::Interface(iface) => {
                for m in &iface.methods {
                    if !out.iter().any(|o| o.name == m.name) {
                        out.push(m.clone());
                    }
                }
                for &e in &iface.embeddeds {
                    self.collect_methods(e, out, visiting);
                }
            }
            Type::TypeParam { bound, .. } => self.collect_methods(*bound, out, visiting),
            Type::Named(def) => {
                // Interface method sets may be requested through a named
                // interface type; the underlying must be available.
                let d = self.def(*def);
                if let Some(u) = d.underlying.or(Some(d.rhs)) {
                    if !matches!(self.ty(u), Type::Named(_)) {
                        self.collect_methods(u, out, visiting);
                    }
                }
            }
            _ => {}
        }
        visiting.pop();
    }

    // ── Layout ──────────────────────────────────────────────────────

    /// Size in bytes used for shape derivation. Only defined for concrete
    /// types; asking for the size of a bare type parameter is an internal
    /// inconsistency.
    pub fn size_of(&self, ty: TypeId) -> u64 {
        match self.ty(ty) {
            Type::Invalid => 0,
            Type::Basic(kind) => kind.size(),
            Type::Pointer(_) | Type::Func(_) => 8,
            Type::Interface(_) => 16,
            Type::Shape(kind) => kind.size,
            Type::Struct(st) => st.fields.iter().map(|f| self.size_of(f.ty)).sum(),
            Type::Named(def) => {
                let d = self.def(*def);
                match d.underlying {
                    Some(u) => self.size_of(u),
                    None => self.size_of(d.rhs),
                }
            }
            Type::TypeParam { name, .. } => {
                panic!("cannot compute size of unsubstituted type parameter '{name}'")
            }
        }
    }

    /// True if the type mentions a shape type or an unsubstituted type
    /// parameter anywhere, i.e. it must be carried in a dictionary.
    pub fn has_shape(&self, ty: TypeId) -> bool {
        match self.ty(ty) {
            Type::Shape(_) | Type::TypeParam { .. } => true,
            Type::Invalid | Type::Basic(_) => false,
            Type::Pointer(base) => self.has_shape(*base),
            Type::Func(sig) => {
                sig.params.iter().chain(&sig.results).any(|&t| self.has_shape(t))
            }
            Type::Struct(st) => st.fields.iter().any(|f| self.has_shape(f.ty)),
            Type::Interface(iface) => iface.embeddeds.iter().any(|&e| self.has_shape(e)),
            Type::Named(def) => self.def(*def).type_args.iter().any(|&a| self.has_shape(a)),
        }
    }

    // ── Substitution ────────────────────────────────────────────────

    /// Substitutes type parameters by position, rebuilding composite types
    /// and instantiating named generic types whose arguments changed.
    pub fn subst(&mut self, ty: TypeId, map: &SubstMap) -> TypeId {
        match self.ty(ty).clone() {
            Type::TypeParam { index, .. } => {
                map.params.get(index as usize).copied().unwrap_or(self.invalid)
            }
            Type::Pointer(base) => {
                let nb = self.subst(base, map);
                if nb == base { ty } else { self.pointer_to(nb) }
            }
            Type::Func(sig) => {
                let nsig = self.subst_sig(&sig, map);
                if nsig == sig { ty } else { self.func(nsig) }
            }
            Type::Struct(st) => {
                let mut changed = false;
                let fields = st
                    .fields
                    .iter()
                    .map(|f| {
                        let nt = self.subst(f.ty, map);
                        changed |= nt != f.ty;
                        Field { ty: nt, ..f.clone() }
                    })
                    .collect();
                if changed { self.struct_of(fields) } else { ty }
            }
            Type::Interface(iface) => {
                let mut changed = false;
                let methods: Vec<Method> = iface
                    .methods
                    .iter()
                    .map(|m| {
                        let nsig = m.sig.as_ref().map(|s| self.subst_sig(s, map));
                        changed |= nsig != m.sig;
                        Method { sig: nsig, ..m.clone() }
                    })
                    .collect();
                let embeddeds: Vec<TypeId> = iface
                    .embeddeds
                    .iter()
                    .map(|&e| {
                        let ne = self.subst(e, map);
                        changed |= ne != e;
                        ne
                    })
                    .collect();
                if changed { self.interface_of(methods, embeddeds) } else { ty }
            }
            Type::Named(def) => {
                let d = self.def(def);
                if d.type_args.is_empty() && d.type_params.is_empty() {
                    return ty;
                }
                let orig = d.orig.unwrap_or(def);
                let cur_args = d.type_args.clone();
                let args: Vec<TypeId> = if cur_args.is_empty() {
                    // A generic type referenced from inside its own body:
                    // its parameters are the substitution domain.
                    map.params.clone()
                } else {
                    cur_args.clone()
                };
                let nargs: Vec<TypeId> = args.iter().map(|&a| self.subst(a, map)).collect();
                if nargs == cur_args {
                    return ty;
                }
                let span = self.def(orig).span;
                self.instantiate_named(orig, nargs, span)
            }
            Type::Invalid | Type::Basic(_) | Type::Shape(_) => ty,
        }
    }

    pub fn subst_sig(&mut self, sig: &Signature, map: &SubstMap) -> Signature {
        Signature {
            params: sig.params.iter().map(|&p| self.subst(p, map)).collect(),
            results: sig.results.iter().map(|&r| self.subst(r, map)).collect(),
        }
    }

    // ── Printing ────────────────────────────────────────────────────

    /// Renders a type for diagnostics. Instantiated named types print with
    /// their type arguments in brackets.
    pub fn type_str(&self, ty: TypeId) -> String {
        let mut buf = String::new();
        self.write_type(ty, &mut buf);
        buf
    }

    fn write_type(&self, ty: TypeId, buf: &mut String) {
        match self.ty(ty) {
            Type::Invalid => buf.push_str("invalid type"),
            Type::Basic(kind) => buf.push_str(kind.name()),
            Type::Shape(kind) => {
                if kind.ptr {
                    buf.push_str("shape.ptr");
                } else {
                    let _ = write!(buf, "shape.{}", kind.size);
                }
            }
            Type::Pointer(base) => {
                buf.push('*');
                self.write_type(*base, buf);
            }
            Type::Struct(st) => {
                buf.push_str("struct{");
                for (i, f) in st.fields.iter().enumerate() {
                    if i > 0 {
                        buf.push_str("; ");
                    }
                    if !f.embedded {
                        let _ = write!(buf, "{} ", f.name);
                    }
                    self.write_type(f.ty, buf);
                    if let Some(tag) = &f.tag {
                        let _ = write!(buf, " {tag:?}");
                    }
                }
                buf.push('}');
            }
            Type::Interface(iface) => {
                buf.push_str("interface{");
                let mut first = true;
                for m in &iface.methods {
                    if !first {
                        buf.push_str("; ");
                    }
                    first = false;
                    buf.push_str(&m.name);
                    match &m.sig {
                        Some(sig) => self.write_sig(sig, buf),
                        None => buf.push_str("(…)"),
                    }
                }
                for &e in &iface.embeddeds {
                    if !first {
                        buf.push_str("; ");
                    }
                    first = false;
                    self.write_type(e, buf);
                }
                buf.push('}');
            }
            Type::Func(sig) => {
                buf.push_str("func");
                self.write_sig(sig, buf);
            }
            Type::Named(def) => {
                let d = self.def(*def);
                buf.push_str(&d.name);
                if !d.type_args.is_empty() {
                    buf.push('[');
                    for (i, &a) in d.type_args.iter().enumerate() {
                        if i > 0 {
                            buf.push_str(", ");
                        }
                        self.write_type(a, buf);
                    }
                    buf.push(']');
                }
            }
            Type::TypeParam { name, .. } => buf.push_str(name),
        }
    }

    /// Renders a signature for diagnostics and the export snapshot.
    pub fn sig_str(&self, sig: &Signature) -> String {
        let mut buf = String::from("func");
        self.write_sig(sig, &mut buf);
        buf
    }

    fn write_sig(&self, sig: &Signature, buf: &mut String) {
        buf.push('(');
        for (i, &p) in sig.params.iter().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            self.write_type(p, buf);
        }
        buf.push(')');
        match sig.results.len() {
            0 => {}
            1 => {
                buf.push(' ');
                self.write_type(sig.results[0], buf);
            }
            _ => {
                buf.push_str(" (");
                for (i, &r) in sig.results.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(", ");
                    }
                    self.write_type(r, buf);
                }
                buf.push(')');
            }
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional substitution from a declaration's type parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstMap {
    pub params: Vec<TypeId>,
}

impl SubstMap {
    pub fn new(params: Vec<TypeId>) -> Self {
        Self { params }
    }
}
