//! Shape derivation: erasing a concrete type argument to the properties
//! code generation cares about.

use crate::types::{ShapeKind, Type, TypeId, TypeTable};

/// Erases a type argument to its shape. Distinct concrete types with equal
/// shape are interchangeable for a compiled generic body.
pub fn shape_of(table: &TypeTable, ty: TypeId) -> ShapeKind {
    ShapeKind { size: table.size_of(ty), ptr: is_pointer_shaped(table, ty) }
}

fn is_pointer_shaped(table: &TypeTable, ty: TypeId) -> bool {
    match table.ty(ty) {
        Type::Pointer(_) | Type::Func(_) => true,
        Type::Shape(kind) => kind.ptr,
        Type::Named(def) => {
            let d = table.def(*def);
            match d.underlying {
                Some(u) => is_pointer_shaped(table, u),
                None => is_pointer_shaped(table, d.rhs),
            }
        }
        _ => false,
    }
}
