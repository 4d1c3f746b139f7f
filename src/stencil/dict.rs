//! Dictionary layout for stenciled generic functions.
//!
//! Entries appear in a fixed order: the shape parameters themselves
//! (positional), derived types the body needs at runtime, sub-dictionary
//! call sites in body order, and interface-conversion sites. Subsection
//! start offsets and the total length are recorded so a downstream
//! consumer can index directly.

use crate::ir::DeclId;
use crate::types::{ShapeKind, TypeId, TypeTable};

/// What a sub-dictionary call site dispatches to.
#[derive(Debug, Clone, PartialEq)]
pub enum SubDictKind {
    /// A nested generic call or instantiation.
    Call { callee: DeclId, shape_args: Vec<ShapeKind> },
    /// A method call or method value reached through a type parameter's
    /// bound.
    BoundMethod { recv: ShapeKind, method: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictEntry {
    ShapeParam(ShapeKind),
    DerivedType(TypeId),
    SubDict(SubDictKind),
    ItabConv { from: TypeId, iface: TypeId },
}

/// Immutable once built; deterministic for equal (declaration, shape-args)
/// keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    pub entries: Vec<DictEntry>,
    pub start_derived: usize,
    pub start_sub_dicts: usize,
    pub start_itab_convs: usize,
}

impl Dictionary {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn shape_params(&self) -> &[DictEntry] {
        &self.entries[..self.start_derived]
    }
}

/// Accumulates entries while a body is stenciled, then freezes them into
/// a [`Dictionary`] with recorded subsection offsets.
#[derive(Debug)]
pub struct DictBuilder {
    shape_params: Vec<ShapeKind>,
    derived: Vec<TypeId>,
    sub_dicts: Vec<SubDictKind>,
    itab_convs: Vec<(TypeId, TypeId)>,
}

impl DictBuilder {
    pub fn new(shape_params: Vec<ShapeKind>) -> Self {
        Self { shape_params, derived: Vec::new(), sub_dicts: Vec::new(), itab_convs: Vec::new() }
    }

    /// Records a type the body computes from its shape parameters.
    /// Deduplicated on first encounter; types without any shape in them
    /// need no dictionary slot.
    pub fn add_derived(&mut self, table: &TypeTable, ty: TypeId) {
        if !table.has_shape(ty) {
            return;
        }
        if self.derived.iter().any(|&d| table.identical(d, ty)) {
            return;
        }
        self.derived.push(ty);
    }

    pub fn add_sub_dict(&mut self, kind: SubDictKind) {
        self.sub_dicts.push(kind);
    }

    pub fn add_itab_conv(&mut self, from: TypeId, iface: TypeId) {
        self.itab_convs.push((from, iface));
    }

    pub fn finish(self) -> Dictionary {
        let mut entries = Vec::with_capacity(
            self.shape_params.len() + self.derived.len() + self.sub_dicts.len() + self.itab_convs.len(),
        );
        entries.extend(self.shape_params.into_iter().map(DictEntry::ShapeParam));
        let start_derived = entries.len();
        entries.extend(self.derived.into_iter().map(DictEntry::DerivedType));
        let start_sub_dicts = entries.len();
        entries.extend(self.sub_dicts.into_iter().map(DictEntry::SubDict));
        let start_itab_convs = entries.len();
        entries.extend(self.itab_convs.into_iter().map(|(from, iface)| DictEntry::ItabConv { from, iface }));
        Dictionary { entries, start_derived, start_sub_dicts, start_itab_convs }
    }
}
