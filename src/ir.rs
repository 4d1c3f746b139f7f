//! Intermediate bodies handed to the stenciler and to downstream code
//! generation.
//!
//! The tree is deliberately small: it records exactly what the dictionary
//! builder must see in a generic body (nested generic calls, method calls
//! through a bound, conversions to interface types, composites built over
//! type parameters) plus enough ordinary structure to carry real function
//! bodies around.

use crate::span::Span;
use crate::types::{Signature, TypeId, TypeParamDecl};

/// Opaque handle to a function declaration in a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub span: Span,
    pub type_params: Vec<TypeParamDecl>,
    pub sig: Signature,
    pub body: Option<Body>,
    pub exported: bool,
}

impl FuncDecl {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub stmts: Vec<Stmt>,
}

impl Body {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Return(Vec<Expr>),
    Local { name: String, ty: TypeId, init: Option<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    Local(String),
    /// Direct call; carries explicit type arguments when the callee is
    /// generic.
    Call { callee: DeclId, type_args: Vec<TypeId>, args: Vec<Expr>, span: Span },
    /// Method call dispatched through a type parameter's bound.
    BoundCall { recv: Box<Expr>, recv_ty: TypeId, method: String, args: Vec<Expr>, span: Span },
    /// Conversion of a value to a concrete interface type.
    ConvertIface { value: Box<Expr>, from: TypeId, iface: TypeId, span: Span },
    /// Field or method selection; resolved through embedding lookup.
    Select { base: Box<Expr>, base_ty: TypeId, name: String, addressable: bool, span: Span },
    /// Composite construction of a (possibly derived) type.
    Composite { ty: TypeId, args: Vec<Expr>, span: Span },
    /// A generic function used as a value (instantiation without a call).
    FuncValue { decl: DeclId, type_args: Vec<TypeId>, span: Span },
}

/// The fully name-resolved declaration set for one compilation unit.
#[derive(Debug, Default)]
pub struct Program {
    funcs: Vec<FuncDecl>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(&mut self, decl: FuncDecl) -> DeclId {
        let id = DeclId(self.funcs.len() as u32);
        self.funcs.push(decl);
        id
    }

    pub fn func(&self, id: DeclId) -> &FuncDecl {
        &self.funcs[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: DeclId) -> &mut FuncDecl {
        &mut self.funcs[id.0 as usize]
    }

    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> {
        (0..self.funcs.len() as u32).map(DeclId)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
