//! JSON snapshot of the front end's products for the downstream code
//! generator: finalized named types, compiled functions with their
//! dictionary layouts, and signatures of uninstantiated generics.

use serde::Serialize;

use crate::ir::Program;
use crate::stencil::dict::{DictEntry, Dictionary, SubDictKind};
use crate::stencil::CompiledSet;
use crate::types::{ShapeKind, TypeTable};

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub types: Vec<TypeExport>,
    pub funcs: Vec<FuncExport>,
    pub generics: Vec<GenericExport>,
}

#[derive(Debug, Serialize)]
pub struct TypeExport {
    pub name: String,
    pub underlying: String,
    pub methods: Vec<MethodExport>,
}

#[derive(Debug, Serialize)]
pub struct MethodExport {
    pub name: String,
    pub sig: String,
    pub ptr_recv: bool,
}

#[derive(Debug, Serialize)]
pub struct FuncExport {
    pub name: String,
    pub sig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dict: Option<DictExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dict_param: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenericExport {
    pub name: String,
    pub sig: String,
    pub type_params: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DictExport {
    pub entries: Vec<DictEntryExport>,
    pub start_derived: usize,
    pub start_sub_dicts: usize,
    pub start_itab_convs: usize,
    pub len: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind")]
pub enum DictEntryExport {
    ShapeParam { shape: ShapeKind },
    DerivedType { ty: String },
    SubDictCall { callee: String, shape_args: Vec<ShapeKind> },
    SubDictBound { recv: ShapeKind, method: String },
    ItabConv { from: String, iface: String },
}

/// Builds the export snapshot. Every named definition must be resolved
/// and every deferred method signature completed by now.
pub fn snapshot(table: &TypeTable, program: &Program, set: &CompiledSet) -> Snapshot {
    let types = table
        .def_ids()
        .map(|def| {
            let d = table.def(def);
            let underlying = table.type_str(table.resolved_underlying(def));
            let methods = d
                .methods
                .iter()
                .map(|m| {
                    let sig = match &m.sig {
                        Some(sig) => table.sig_str(sig),
                        None => panic!("method '{}' exported with incomplete signature", m.name),
                    };
                    MethodExport { name: m.name.clone(), sig, ptr_recv: m.ptr_recv }
                })
                .collect();
            TypeExport { name: table.type_str(d.self_ty), underlying, methods }
        })
        .collect();

    let funcs = set
        .funcs
        .iter()
        .map(|f| FuncExport {
            name: f.name.clone(),
            sig: table.sig_str(&f.sig),
            dict: f.dict.as_ref().map(|d| export_dict(table, program, d)),
            dict_param: f.dict_param.clone(),
        })
        .collect();

    let generics = set
        .generic_sigs
        .iter()
        .map(|g| GenericExport {
            name: g.name.clone(),
            sig: table.sig_str(&g.sig),
            type_params: g.type_params.clone(),
        })
        .collect();

    Snapshot { types, funcs, generics }
}

fn export_dict(table: &TypeTable, program: &Program, dict: &Dictionary) -> DictExport {
    let entries = dict
        .entries
        .iter()
        .map(|e| match e {
            DictEntry::ShapeParam(k) => DictEntryExport::ShapeParam { shape: *k },
            DictEntry::DerivedType(ty) => DictEntryExport::DerivedType { ty: table.type_str(*ty) },
            DictEntry::SubDict(SubDictKind::Call { callee, shape_args }) => {
                DictEntryExport::SubDictCall {
                    callee: program.func(*callee).name.clone(),
                    shape_args: shape_args.clone(),
                }
            }
            DictEntry::SubDict(SubDictKind::BoundMethod { recv, method }) => {
                DictEntryExport::SubDictBound { recv: *recv, method: method.clone() }
            }
            DictEntry::ItabConv { from, iface } => DictEntryExport::ItabConv {
                from: table.type_str(*from),
                iface: table.type_str(*iface),
            },
        })
        .collect();
    DictExport {
        entries,
        start_derived: dict.start_derived,
        start_sub_dicts: dict.start_sub_dicts,
        start_itab_convs: dict.start_itab_convs,
        len: dict.len(),
    }
}

pub fn to_json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}
