//! Lazy resolution of named-type definitions to their structural
//! underlying type.
//!
//! Every definition moves Unresolved -> Resolving -> Resolved exactly once.
//! `under` walks the chain of right-hand sides until a non-named type is
//! reached, memoizing every definition along the way so repeat queries are
//! O(1). A repeated definition in the walk is a cycle: it is reported once,
//! and every walked definition gets the shared `Invalid` sentinel as its
//! underlying, breaking the cycle for all of them.

use std::collections::HashMap;

use crate::diagnostics::{CompileError, DiagnosticSink};
use crate::span::Span;
use crate::types::{DefId, DeferredTask, Method, ResolveState, SubstMap, Type, TypeId, TypeTable};

impl TypeTable {
    /// Resolves every definition in declaration order.
    pub fn resolve_all(&mut self, sink: &mut DiagnosticSink) {
        for def in self.def_ids().collect::<Vec<_>>() {
            self.resolve(def, sink);
        }
    }

    /// Runs a definition's resolver exactly once; idempotent afterwards.
    pub fn resolve(&mut self, def: DefId, sink: &mut DiagnosticSink) {
        match self.def(def).state {
            ResolveState::Resolved => return,
            // Reentry during an in-progress walk; the outer walk finishes
            // the job (a true cycle is caught there, not here).
            ResolveState::Resolving => return,
            ResolveState::Unresolved => {}
        }
        if self.def(def).imported {
            panic!(
                "imported type '{}' with unresolved underlying type",
                self.def(def).name
            );
        }
        self.def_mut(def).state = ResolveState::Resolving;
        self.under(def, sink);
        self.def_mut(def).state = ResolveState::Resolved;
    }

    /// Follows the chain of named right-hand sides to the structural
    /// underlying type, memoizing it on every definition walked.
    pub fn under(&mut self, def: DefId, sink: &mut DiagnosticSink) -> TypeId {
        if let Some(u) = self.def(def).underlying {
            return u;
        }

        let mut seen: HashMap<DefId, usize> = HashMap::new();
        let mut path: Vec<DefId> = Vec::new();
        let mut cur = def;
        let final_ty = loop {
            if let Some(u) = self.def(cur).underlying {
                // Joined an already-memoized chain.
                break u;
            }
            if let Some(&i) = seen.get(&cur) {
                self.report_cycle(&path, i, sink);
                break self.invalid();
            }
            seen.insert(cur, path.len());
            path.push(cur);
            let rhs = self.def(cur).rhs;
            match self.ty(rhs) {
                Type::Named(next) => cur = *next,
                _ => break rhs,
            }
        };

        for &d in &path {
            let td = self.def_mut(d);
            if td.imported {
                panic!("imported type '{}' with unresolved underlying type", td.name);
            }
            td.underlying = Some(final_ty);
            td.state = ResolveState::Resolved;
        }
        final_ty
    }

    fn report_cycle(&self, path: &[DefId], start: usize, sink: &mut DiagnosticSink) {
        let mut names: Vec<&str> = path[start..].iter().map(|&d| self.def(d).name.as_str()).collect();
        names.push(self.def(path[start]).name.as_str());
        sink.report(CompileError::Cycle {
            path: names.join(" -> "),
            span: self.def(path[start]).span,
        });
    }

    /// Memoized underlying of a resolved definition. Asking before
    /// resolution has run is an internal inconsistency.
    pub fn resolved_underlying(&self, def: DefId) -> TypeId {
        let d = self.def(def);
        match d.underlying {
            Some(u) => u,
            None => panic!("underlying chain of '{}' left unexpanded", d.name),
        }
    }

    /// Requests an instantiation of a generic named type, recovering from
    /// an arity mismatch with `Invalid` placeholder arguments so
    /// independent downstream errors can still surface.
    pub fn request_instance(
        &mut self,
        orig: DefId,
        mut targs: Vec<TypeId>,
        span: Span,
        sink: &mut DiagnosticSink,
    ) -> TypeId {
        let expected = self.def(orig).type_params.len();
        if targs.len() != expected {
            sink.report(CompileError::ArityMismatch {
                name: self.def(orig).name.clone(),
                expected,
                got: targs.len(),
                span,
            });
            targs.resize(expected, self.invalid());
        }
        self.instantiate_named(orig, targs, span)
    }

    /// Creates (or returns the cached) instantiation of `orig` with the
    /// given type arguments. The new definition is registered in the
    /// instance map before its right-hand side is substituted, so
    /// recursive generic types tie back to it instead of recursing.
    ///
    /// Methods are created as placeholders; their signatures are completed
    /// through the deferred queue once all declarations are processed.
    pub fn instantiate_named(&mut self, orig: DefId, targs: Vec<TypeId>, span: Span) -> TypeId {
        let expected = self.def(orig).type_params.len();
        if targs.len() != expected {
            panic!(
                "instantiating '{}' with {} type arguments, want {}",
                self.def(orig).name,
                targs.len(),
                expected
            );
        }
        if let Some(inst) = self.lookup_named_inst(orig, &targs) {
            return self.named_type(inst);
        }

        let name = self.def(orig).name.clone();
        let invalid = self.invalid();
        let inst = self.declare(name, span, invalid);
        {
            let d = self.def_mut(inst);
            d.orig = Some(orig);
            d.type_args = targs.clone();
        }
        self.record_named_inst(orig, targs.clone(), inst);

        let map = SubstMap::new(targs);
        let orig_rhs = self.def(orig).rhs;
        let rhs = self.subst(orig_rhs, &map);
        self.set_rhs(inst, rhs);

        let methods = self.def(orig).methods.clone();
        for (index, m) in methods.into_iter().enumerate() {
            self.def_mut(inst).methods.push(Method {
                sig: None,
                inst_recv: Some(inst),
                ..m
            });
            self.push_later(DeferredTask::CompleteMethod { def: inst, index });
        }
        self.named_type(inst)
    }

    /// Drains the deferred queue in a loop. Tasks may enqueue further
    /// tasks; leftover entries after the loop would be an internal
    /// inconsistency.
    pub fn drain_deferred(&mut self) {
        while let Some(task) = self.later.pop_front() {
            match task {
                DeferredTask::CompleteMethod { def, index } => self.complete_method(def, index),
            }
        }
        assert!(self.later.is_empty(), "deferred task queue not drained to empty");
    }

    /// Substitutes the receiver's type arguments into the original
    /// method's signature.
    fn complete_method(&mut self, def: DefId, index: usize) {
        let d = self.def(def);
        let orig = match d.orig {
            Some(o) => o,
            None => panic!("completing a method on '{}', which is not an instantiation", d.name),
        };
        let map = SubstMap::new(d.type_args.clone());
        let orig_sig = match &self.def(orig).methods[index].sig {
            Some(sig) => sig.clone(),
            None => panic!(
                "original method '{}' has no signature",
                self.def(orig).methods[index].name
            ),
        };
        let sig = self.subst_sig(&orig_sig, &map);
        self.def_mut(def).methods[index].sig = Some(sig);
    }
}
