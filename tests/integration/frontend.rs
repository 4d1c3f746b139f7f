use kiln::diagnostics::CompileError;
use kiln::ir::{Body, Expr, FuncDecl, Stmt};
use kiln::span::Span;
use kiln::types::{BasicKind, Field, Method, Signature, Type, TypeParamDecl};
use kiln::{Frontend, InstRequest};

#[test]
fn batch_with_embedding_generics_and_export() {
    let mut fe = Frontend::new();
    let int = fe.table.basic(BasicKind::Int);

    // Base = struct { id int } with method Id() int.
    let base_st = fe.table.struct_of(vec![Field::named("id", int)]);
    let base = fe.table.declare("Base", Span::dummy(), base_st);
    fe.table.add_method(base, Method::new("Id", Signature::new(vec![], vec![int])));

    // User = struct { Base; name string }
    let str_ty = fe.table.basic(BasicKind::Str);
    let user_st = {
        let base_ty = fe.table.named_type(base);
        fe.table.struct_of(vec![
            Field::embedded("Base", base_ty),
            Field::named("name", str_ty),
        ])
    };
    let user = fe.table.declare("User", Span::dummy(), user_st);
    let user_ty = fe.table.named_type(user);

    // Generic describe[T any](x T) calls nothing fancy; main selects a
    // promoted method and instantiates describe with two types of equal
    // shape.
    let any = fe.table.interface_of(vec![], vec![]);
    let tp = fe.table.type_param(0, "T", any);
    let describe = fe.program.add_func(FuncDecl {
        name: "describe".into(),
        span: Span::dummy(),
        type_params: vec![TypeParamDecl { name: "T".into(), bound: any }],
        sig: Signature::new(vec![tp], vec![]),
        body: Some(Body::new(vec![Stmt::Expr(Expr::ConvertIface {
            value: Box::new(Expr::Local("x".into())),
            from: tp,
            iface: any,
            span: Span::dummy(),
        })])),
        exported: true,
    });

    let user_ptr = fe.table.pointer_to(user_ty);
    let base_ptr = {
        let base_ty = fe.table.named_type(base);
        fe.table.pointer_to(base_ty)
    };
    fe.program.add_func(FuncDecl {
        name: "main".into(),
        span: Span::dummy(),
        type_params: vec![],
        sig: Signature::new(vec![], vec![]),
        body: Some(Body::new(vec![
            Stmt::Expr(Expr::Select {
                base: Box::new(Expr::Local("u".into())),
                base_ty: user_ty,
                name: "Id".into(),
                addressable: true,
                span: Span::dummy(),
            }),
            Stmt::Expr(Expr::Call {
                callee: describe,
                type_args: vec![user_ptr],
                args: vec![Expr::Local("u".into())],
                span: Span::dummy(),
            }),
            Stmt::Expr(Expr::Call {
                callee: describe,
                type_args: vec![base_ptr],
                args: vec![Expr::Local("b".into())],
                span: Span::dummy(),
            }),
        ])),
        exported: true,
    });

    let set = fe.check(&[]).unwrap();
    assert!(fe.sink.is_empty(), "unexpected errors: {:?}", fe.sink.errors());

    // Both pointer instantiations share one shape.
    let stenciled: Vec<&str> = set
        .funcs
        .iter()
        .filter(|f| f.dict.is_some())
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(stenciled, vec!["describe[shape.ptr]"]);

    let json = fe.export_json(&set).unwrap();
    assert!(json.contains("\"User\""));
    assert!(json.contains("describe[shape.ptr]"));
    assert!(json.contains("\"generics\""));
}

#[test]
fn ambiguous_selector_in_batch_then_shadowed_variant() {
    // Two same-depth embeddings with field X: ambiguous. Nesting one of
    // them a level deeper makes the shallow field win.
    for (nest_deeper, expect_errors) in [(false, 1), (true, 0)] {
        let mut fe = Frontend::new();
        let int = fe.table.basic(BasicKind::Int);
        let st_a = fe.table.struct_of(vec![Field::named("X", int)]);
        let a = fe.table.declare("A", Span::dummy(), st_a);
        let holder_st = fe.table.struct_of(vec![Field::named("X", int)]);
        let holder = fe.table.declare("Holder", Span::dummy(), holder_st);
        let b_rhs = if nest_deeper {
            let holder_ty = fe.table.named_type(holder);
            fe.table.struct_of(vec![Field::embedded("Holder", holder_ty)])
        } else {
            fe.table.struct_of(vec![Field::named("X", int)])
        };
        let b = fe.table.declare("B", Span::dummy(), b_rhs);
        let outer_st = {
            let a_ty = fe.table.named_type(a);
            let b_ty = fe.table.named_type(b);
            fe.table.struct_of(vec![Field::embedded("A", a_ty), Field::embedded("B", b_ty)])
        };
        let outer = fe.table.declare("Outer", Span::dummy(), outer_st);
        let outer_ty = fe.table.named_type(outer);

        fe.program.add_func(FuncDecl {
            name: "main".into(),
            span: Span::dummy(),
            type_params: vec![],
            sig: Signature::new(vec![], vec![]),
            body: Some(Body::new(vec![Stmt::Expr(Expr::Select {
                base: Box::new(Expr::Local("o".into())),
                base_ty: outer_ty,
                name: "X".into(),
                addressable: true,
                span: Span::new(5, 6),
            })])),
            exported: true,
        });

        let _ = fe.check(&[]).unwrap();
        assert_eq!(fe.sink.error_count(), expect_errors, "nest_deeper={nest_deeper}");
        if expect_errors == 1 {
            assert!(matches!(fe.sink.errors()[0], CompileError::AmbiguousSelector { .. }));
        }
    }
}

#[test]
fn explicit_requests_instantiate_exported_generics() {
    let mut fe = Frontend::new();
    let any = fe.table.interface_of(vec![], vec![]);
    let tp = fe.table.type_param(0, "T", any);
    let decl = fe.program.add_func(FuncDecl {
        name: "id".into(),
        span: Span::dummy(),
        type_params: vec![TypeParamDecl { name: "T".into(), bound: any }],
        sig: Signature::new(vec![tp], vec![tp]),
        body: Some(Body::new(vec![Stmt::Return(vec![Expr::Local("x".into())])])),
        exported: true,
    });
    let int = fe.table.basic(BasicKind::Int);
    let str_ty = fe.table.basic(BasicKind::Str);

    let set = fe
        .check(&[
            InstRequest { decl, type_args: vec![int], span: Span::dummy() },
            InstRequest { decl, type_args: vec![str_ty], span: Span::dummy() },
        ])
        .unwrap();

    let stenciled: Vec<&str> = set
        .funcs
        .iter()
        .filter(|f| f.dict.is_some())
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(stenciled, vec!["id[shape.8]", "id[shape.16]"]);
    assert!(fe.sink.is_empty());
}

#[test]
fn instantiated_named_types_complete_methods_after_check() {
    let mut fe = Frontend::new();
    let int = fe.table.basic(BasicKind::Int);
    let any = fe.table.interface_of(vec![], vec![]);
    let tp = fe.table.type_param(0, "T", any);
    let st = fe.table.struct_of(vec![Field::named("item", tp)]);
    let boxed = fe.table.declare("Box", Span::dummy(), st);
    fe.table.set_type_params(boxed, vec![TypeParamDecl { name: "T".into(), bound: any }]);
    fe.table.add_method(boxed, Method::new("Get", Signature::new(vec![], vec![tp])));

    let inst_ty = fe.table.instantiate_named(boxed, vec![int], Span::dummy());
    let inst = match fe.table.ty(inst_ty) {
        Type::Named(def) => *def,
        other => panic!("expected named instance, got {:?}", other),
    };
    assert!(fe.table.def(inst).methods[0].sig.is_none());

    fe.check(&[]).unwrap();

    let sig = fe.table.def(inst).methods[0].sig.clone().unwrap();
    assert_eq!(sig.results, vec![int]);
}
