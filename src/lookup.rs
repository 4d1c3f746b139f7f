//! Field and method lookup across embedding hierarchies.
//!
//! The search is breadth-first over embedding depth: the shallowest depth
//! with any match wins outright, two matches at one depth are ambiguous,
//! and a pointer-receiver method reached without crossing an indirection
//! from a non-addressable value is a distinct needs-address result.

use std::collections::{HashMap, HashSet};

use crate::types::{DefId, Field, Method, Type, TypeId, TypeTable};

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(Field),
    Method(Method),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Field(f) => &f.name,
            Member::Method(m) => &m.name,
        }
    }
}

/// Exactly one of these per lookup. `Ambiguous` carries the index path of
/// the colliding match but no member; `NeedsAddress` carries neither.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Found { member: Member, index: Vec<usize>, indirect: bool },
    NotFound,
    Ambiguous { index: Vec<usize> },
    NeedsAddress,
}

/// A breadth-first search node during embedding traversal. Never persisted.
#[derive(Debug, Clone)]
struct Embedded {
    ty: TypeId,
    index: Vec<usize>,
    indirect: bool,
    multiples: bool,
}

/// Looks up the field or method `name` on `ty`.
///
/// `addressable` reflects whether the access expression denotes storage
/// whose address can be taken. All named definitions reachable from `ty`
/// must already be resolved.
pub fn lookup_field_or_method(
    table: &TypeTable,
    ty: TypeId,
    addressable: bool,
    name: &str,
) -> LookupResult {
    // A named type whose underlying is a pointer still searches the
    // pointer's base for fields, but a method result is discarded:
    // methods cannot live on pointer base types.
    if let Type::Named(def) = table.ty(ty) {
        let u = table.resolved_underlying(*def);
        if matches!(table.ty(u), Type::Pointer(_)) {
            let res = lookup_impl(table, u, false, name);
            if matches!(&res, LookupResult::Found { member: Member::Method(_), .. }) {
                return LookupResult::NotFound;
            }
            return res;
        }
    }
    lookup_impl(table, ty, addressable, name)
}

fn lookup_impl(table: &TypeTable, ty: TypeId, addressable: bool, name: &str) -> LookupResult {
    // The blank identifier never matches anything.
    if name.is_empty() || name == "_" {
        return LookupResult::NotFound;
    }

    // At most one level of indirection is ever stripped.
    let (start, is_ptr) = deref(table, ty);
    if is_ptr && matches!(table.ty(under_of(table, start)), Type::Interface(_) | Type::TypeParam { .. }) {
        return LookupResult::NotFound;
    }

    let mut current = vec![Embedded { ty: start, index: Vec::new(), indirect: is_ptr, multiples: false }];
    let mut seen: HashSet<DefId> = HashSet::new();

    let mut found: Option<Member> = None;
    let mut found_index: Vec<usize> = Vec::new();
    let mut found_indirect = false;
    let mut found_tpar = false;

    while !current.is_empty() {
        let mut next: Vec<Embedded> = Vec::new();

        'entries: for e in &current {
            let mut ty = e.ty;
            if let Type::Named(def) = table.ty(ty) {
                if !seen.insert(*def) {
                    // Already checked at a shallower depth; also breaks
                    // recursive embedding.
                    continue 'entries;
                }
                // Methods declared directly on the named type come first.
                if let Some(i) = table.def(*def).methods.iter().position(|m| m.name == name) {
                    let index = concat(&e.index, i);
                    if found.is_some() || e.multiples {
                        return LookupResult::Ambiguous { index };
                    }
                    found = Some(Member::Method(table.def(*def).methods[i].clone()));
                    found_index = index;
                    found_indirect = e.indirect;
                    found_tpar = false;
                    // A named type cannot also have a matching field or
                    // interface method.
                    continue 'entries;
                }
                ty = table.resolved_underlying(*def);
            }

            match table.ty(ty) {
                Type::Struct(st) => {
                    for (i, f) in st.fields.iter().enumerate() {
                        if f.name == name {
                            let index = concat(&e.index, i);
                            if found.is_some() || e.multiples {
                                return LookupResult::Ambiguous { index };
                            }
                            found = Some(Member::Field(f.clone()));
                            found_index = index;
                            found_indirect = e.indirect;
                            found_tpar = false;
                            continue;
                        }
                        // Collect embedded fields for the next depth, but
                        // only while no match exists yet.
                        if found.is_none() && f.embedded {
                            let (ft, fptr) = deref(table, f.ty);
                            next.push(Embedded {
                                ty: ft,
                                index: concat(&e.index, i),
                                indirect: e.indirect || fptr,
                                multiples: e.multiples,
                            });
                        }
                    }
                }
                Type::Interface(_) => {
                    let set = table.method_set(ty);
                    if let Some(i) = set.iter().position(|m| m.name == name) {
                        let index = concat(&e.index, i);
                        if found.is_some() || e.multiples {
                            return LookupResult::Ambiguous { index };
                        }
                        found = Some(Member::Method(set[i].clone()));
                        found_index = index;
                        found_indirect = e.indirect;
                        found_tpar = false;
                    }
                }
                Type::TypeParam { .. } => {
                    let set = table.method_set(ty);
                    if let Some(i) = set.iter().position(|m| m.name == name) {
                        let index = concat(&e.index, i);
                        if found.is_some() || e.multiples {
                            return LookupResult::Ambiguous { index };
                        }
                        found = Some(Member::Method(set[i].clone()));
                        found_index = index;
                        found_indirect = e.indirect;
                        found_tpar = true;
                    }
                }
                _ => {}
            }
        }

        if found.is_some() {
            // Shallowest depth with a match wins; deeper candidates are
            // never consulted.
            break;
        }
        current = consolidate_multiples(table, next);
    }

    let member = match found {
        Some(m) => m,
        None => return LookupResult::NotFound,
    };
    // Bound methods dispatch through the dictionary and never need the
    // receiver's address.
    if let Member::Method(m) = &member {
        if m.ptr_recv && !found_tpar && !found_indirect && !addressable {
            return LookupResult::NeedsAddress;
        }
    }
    LookupResult::Found { member, index: found_index, indirect: found_indirect }
}

/// Merges occurrences of the same type at one depth into a single entry
/// marked `multiples`. A handle hit is the fast path; on miss, previously
/// seen entries are scanned for structural identity.
fn consolidate_multiples(table: &TypeTable, mut list: Vec<Embedded>) -> Vec<Embedded> {
    if list.len() <= 1 {
        return list;
    }
    let mut out: Vec<Embedded> = Vec::with_capacity(list.len());
    let mut prev: HashMap<TypeId, usize> = HashMap::new();
    for e in list.drain(..) {
        if let Some(i) = lookup_type(table, &prev, e.ty) {
            out[i].multiples = true;
        } else {
            prev.insert(e.ty, out.len());
            out.push(e);
        }
    }
    out
}

fn lookup_type(table: &TypeTable, prev: &HashMap<TypeId, usize>, ty: TypeId) -> Option<usize> {
    if let Some(&i) = prev.get(&ty) {
        return Some(i);
    }
    for (&t, &i) in prev {
        if table.identical(t, ty) {
            return Some(i);
        }
    }
    None
}

fn deref(table: &TypeTable, ty: TypeId) -> (TypeId, bool) {
    match table.ty(ty) {
        Type::Pointer(base) => (*base, true),
        _ => (ty, false),
    }
}

fn under_of(table: &TypeTable, ty: TypeId) -> TypeId {
    match table.ty(ty) {
        Type::Named(def) => table.resolved_underlying(*def),
        _ => ty,
    }
}

fn concat(index: &[usize], i: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(index.len() + 1);
    out.extend_from_slice(index);
    out.push(i);
    out
}

/// Why a type fails to satisfy an interface method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    NotFound,
    WrongSignature,
    PointerReceiver,
}

/// Reports the first method of `iface` that `v` lacks or has with an
/// unusable form, or `None` if `v` satisfies the interface. A method
/// reachable only through the receiver's address is reported separately
/// so the diagnostic can suggest taking a pointer.
pub fn missing_method(table: &TypeTable, v: TypeId, iface: TypeId) -> Option<(Method, MissingReason)> {
    for m in table.method_set(iface) {
        match lookup_field_or_method(table, v, false, &m.name) {
            LookupResult::Found { member: Member::Method(f), .. } => {
                if !table.identical_method_sig(&f, &m) {
                    return Some((m, MissingReason::WrongSignature));
                }
            }
            LookupResult::NeedsAddress => return Some((m, MissingReason::PointerReceiver)),
            _ => return Some((m, MissingReason::NotFound)),
        }
    }
    None
}
