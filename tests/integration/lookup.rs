use kiln::diagnostics::DiagnosticSink;
use kiln::lookup::{lookup_field_or_method, missing_method, LookupResult, Member, MissingReason};
use kiln::span::Span;
use kiln::types::{BasicKind, Field, Method, Signature, TypeTable};

fn resolve_all(table: &mut TypeTable) {
    let mut sink = DiagnosticSink::default();
    table.resolve_all(&mut sink);
    assert!(sink.is_empty(), "unexpected errors: {:?}", sink.errors());
}

#[test]
fn two_same_depth_embeddings_with_field_x_are_ambiguous() {
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let st_a = table.struct_of(vec![Field::named("X", int)]);
    let a = table.declare("A", Span::dummy(), st_a);
    let st_b = table.struct_of(vec![Field::named("X", int)]);
    let b = table.declare("B", Span::dummy(), st_b);
    let outer_st = {
        let a_ty = table.named_type(a);
        let b_ty = table.named_type(b);
        table.struct_of(vec![Field::embedded("A", a_ty), Field::embedded("B", b_ty)])
    };
    let outer = table.declare("Outer", Span::dummy(), outer_st);
    resolve_all(&mut table);

    let outer_ty = table.named_type(outer);
    assert!(matches!(
        lookup_field_or_method(&table, outer_ty, true, "X"),
        LookupResult::Ambiguous { .. }
    ));
}

#[test]
fn lowering_one_embedding_restores_shadowing() {
    // Same shape as above, but B no longer holds X directly; it embeds C
    // which does. A's X at depth 1 now shadows C's X at depth 2.
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let st_a = table.struct_of(vec![Field::named("X", int)]);
    let a = table.declare("A", Span::dummy(), st_a);
    let st_c = table.struct_of(vec![Field::named("X", int)]);
    let c = table.declare("C", Span::dummy(), st_c);
    let st_b = {
        let c_ty = table.named_type(c);
        table.struct_of(vec![Field::embedded("C", c_ty)])
    };
    let b = table.declare("B", Span::dummy(), st_b);
    let outer_st = {
        let a_ty = table.named_type(a);
        let b_ty = table.named_type(b);
        table.struct_of(vec![Field::embedded("A", a_ty), Field::embedded("B", b_ty)])
    };
    let outer = table.declare("Outer", Span::dummy(), outer_st);
    resolve_all(&mut table);

    let outer_ty = table.named_type(outer);
    match lookup_field_or_method(&table, outer_ty, true, "X") {
        LookupResult::Found { member, index, .. } => {
            assert!(matches!(member, Member::Field(_)));
            // Through A (field 0), then its X (field 0).
            assert_eq!(index, vec![0, 0]);
        }
        other => panic!("expected found, got {:?}", other),
    }
}

#[test]
fn two_methods_at_same_depth_are_ambiguous() {
    let mut table = TypeTable::new();
    let empty = table.struct_of(vec![]);
    let a = table.declare("A", Span::dummy(), empty);
    let b = table.declare("B", Span::dummy(), empty);
    table.add_method(a, Method::new("M", Signature::new(vec![], vec![])));
    table.add_method(b, Method::new("M", Signature::new(vec![], vec![])));
    let outer_st = {
        let a_ty = table.named_type(a);
        let b_ty = table.named_type(b);
        table.struct_of(vec![Field::embedded("A", a_ty), Field::embedded("B", b_ty)])
    };
    resolve_all(&mut table);

    assert!(matches!(
        lookup_field_or_method(&table, outer_st, true, "M"),
        LookupResult::Ambiguous { .. }
    ));
}

#[test]
fn ptr_receiver_through_value_embedding_needs_address() {
    let mut table = TypeTable::new();
    let empty = table.struct_of(vec![]);
    let t = table.declare("T", Span::dummy(), empty);
    table.add_method(t, Method::new("M", Signature::new(vec![], vec![])).with_ptr_recv());
    let outer = {
        let t_ty = table.named_type(t);
        table.struct_of(vec![Field::embedded("T", t_ty)])
    };
    resolve_all(&mut table);

    assert_eq!(lookup_field_or_method(&table, outer, false, "M"), LookupResult::NeedsAddress);
    assert!(matches!(
        lookup_field_or_method(&table, outer, true, "M"),
        LookupResult::Found { .. }
    ));
}

#[test]
fn ptr_receiver_through_pointer_embedding_is_found() {
    let mut table = TypeTable::new();
    let empty = table.struct_of(vec![]);
    let t = table.declare("T", Span::dummy(), empty);
    table.add_method(t, Method::new("M", Signature::new(vec![], vec![])).with_ptr_recv());
    let outer = {
        let t_ty = table.named_type(t);
        let t_ptr = table.pointer_to(t_ty);
        table.struct_of(vec![Field::embedded("T", t_ptr)])
    };
    resolve_all(&mut table);

    // Crossing the embedded pointer satisfies the receiver; no address
    // of the outer value is needed.
    match lookup_field_or_method(&table, outer, false, "M") {
        LookupResult::Found { indirect, .. } => assert!(indirect),
        other => panic!("expected found, got {:?}", other),
    }
}

#[test]
fn shallow_method_shadows_deeper_field_of_same_name() {
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let inner_st = table.struct_of(vec![Field::named("Size", int)]);
    let inner = table.declare("Inner", Span::dummy(), inner_st);
    let outer_st = {
        let inner_ty = table.named_type(inner);
        table.struct_of(vec![Field::embedded("Inner", inner_ty)])
    };
    let outer = table.declare("Outer", Span::dummy(), outer_st);
    table.add_method(outer, Method::new("Size", Signature::new(vec![], vec![int])));
    resolve_all(&mut table);

    let outer_ty = table.named_type(outer);
    match lookup_field_or_method(&table, outer_ty, true, "Size") {
        LookupResult::Found { member, index, .. } => {
            assert!(matches!(member, Member::Method(_)));
            assert_eq!(index, vec![0]);
        }
        other => panic!("expected found, got {:?}", other),
    }
}

#[test]
fn lookup_on_pointer_strips_one_level_only() {
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let st = table.struct_of(vec![Field::named("x", int)]);
    let t = table.declare("T", Span::dummy(), st);
    let (t_ptr, t_ptr_ptr) = {
        let t_ty = table.named_type(t);
        let p = table.pointer_to(t_ty);
        let pp = table.pointer_to(p);
        (p, pp)
    };
    resolve_all(&mut table);

    assert!(matches!(
        lookup_field_or_method(&table, t_ptr, false, "x"),
        LookupResult::Found { indirect: true, .. }
    ));
    assert_eq!(lookup_field_or_method(&table, t_ptr_ptr, false, "x"), LookupResult::NotFound);
}

#[test]
fn interface_satisfaction_reports_first_gap() {
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let empty = table.struct_of(vec![]);
    let t = table.declare("Buf", Span::dummy(), empty);
    table.add_method(t, Method::new("Len", Signature::new(vec![], vec![int])));
    resolve_all(&mut table);
    let t_ty = table.named_type(t);

    let iface = table.interface_of(
        vec![
            Method::new("Len", Signature::new(vec![], vec![int])),
            Method::new("Reset", Signature::new(vec![], vec![])),
        ],
        vec![],
    );
    match missing_method(&table, t_ty, iface) {
        Some((m, MissingReason::NotFound)) => assert_eq!(m.name, "Reset"),
        other => panic!("expected missing Reset, got {:?}", other),
    }
}

#[test]
fn embedded_interface_methods_promote_through_structs() {
    let mut table = TypeTable::new();
    let int = table.basic(BasicKind::Int);
    let reader = table.interface_of(
        vec![Method::new("Read", Signature::new(vec![], vec![int]))],
        vec![],
    );
    let named_reader = table.declare("Reader", Span::dummy(), reader);
    let outer = {
        let r_ty = table.named_type(named_reader);
        table.struct_of(vec![Field::embedded("Reader", r_ty)])
    };
    resolve_all(&mut table);

    match lookup_field_or_method(&table, outer, false, "Read") {
        LookupResult::Found { member, .. } => assert_eq!(member.name(), "Read"),
        other => panic!("expected found, got {:?}", other),
    }
}
