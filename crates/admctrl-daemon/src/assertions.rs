//! Facts handed to the trust evaluator for one request.
//!
//! Key scheme (per function `f`, library `l`, instance index `k` counted
//! across all libraries of `f`, top-level position `p`, parameter `j`):
//!
//! ```text
//! f = defined                 f.num  f.first  f.last
//! f.l = defined               f.l.num  f.l.first  f.l.last
//! f.k.pos = p                 func.p.name = f
//! f.k.param.j = value         func.p.param.j = value
//! f.l.param.j.min / .max      f.param.j.min / .max
//! RESOURCE.<key> = amount     TIMESTAMP = seconds since the epoch
//! ```
//!
//! Client pairs may not use any of these names: `func`, `RESOURCE` and
//! `TIMESTAMP` are refused outright, and names under a requested function are
//! refused once the catalog is known.

use std::time::{SystemTime, UNIX_EPOCH};

use admctrl_core::catalog::{ArgBounds, Catalog};
use admctrl_core::protocol::{Pair, ResourceRequirement};
use admctrl_core::{AdmCtrlError, Result};

use crate::policy::FactSink;

const DEFINED: &str = "defined";

fn put(
    sink: &mut dyn FactSink,
    name: &str,
    value: &str,
    rejected: fn(String) -> AdmCtrlError,
) -> Result<()> {
    sink.add_fact(name, value).map_err(|e| e.into_admctrl(rejected))
}

fn fact(sink: &mut dyn FactSink, name: &str, value: &str) -> Result<()> {
    put(sink, name, value, AdmCtrlError::Internal)
}

/// Roots of the derived fact names that do not depend on the catalog.
const RESERVED_ROOTS: [&str; 3] = ["func", "RESOURCE", "TIMESTAMP"];

fn is_pair_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Whether `name` is `root` or lies under `root.`.
fn under(name: &str, root: &str) -> bool {
    name.strip_prefix(root)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Client-supplied name/value pairs, verbatim.
pub fn emit_pairs(sink: &mut dyn FactSink, pairs: &[Pair]) -> Result<()> {
    for p in pairs {
        if !is_pair_name(&p.name) {
            return Err(AdmCtrlError::Pair(format!("invalid name {:?}", p.name)));
        }
        if RESERVED_ROOTS.iter().any(|root| under(&p.name, root)) {
            return Err(AdmCtrlError::Pair(format!("{} is a reserved name", p.name)));
        }
        if p.value.contains('\0') {
            return Err(AdmCtrlError::Pair(format!("{}: NUL in value", p.name)));
        }
        put(sink, &p.name, &p.value, AdmCtrlError::Pair)?;
    }
    Ok(())
}

/// Refuse pairs that would shadow a fact derived from `catalog`.
pub fn check_pair_collisions(pairs: &[Pair], catalog: &Catalog) -> Result<()> {
    for p in pairs {
        if let Some(ft) = catalog.functions().iter().find(|ft| under(&p.name, &ft.name)) {
            return Err(AdmCtrlError::Pair(format!(
                "{} collides with facts of function {}",
                p.name, ft.name
            )));
        }
    }
    Ok(())
}

fn emit_bounds(sink: &mut dyn FactSink, prefix: &str, bounds: &[ArgBounds]) -> Result<()> {
    for (j, b) in bounds.iter().enumerate() {
        if let Some((min, max)) = b.render() {
            fact(sink, &format!("{prefix}.param.{j}.min"), &min)?;
            fact(sink, &format!("{prefix}.param.{j}.max"), &max)?;
        }
    }
    Ok(())
}

/// Function, library, instance and bound facts for every catalog entry.
pub fn emit_catalog(sink: &mut dyn FactSink, catalog: &Catalog) -> Result<()> {
    for ft in catalog.functions() {
        let f = ft.name.as_str();
        fact(sink, f, DEFINED)?;
        fact(sink, &format!("{f}.num"), &ft.num.to_string())?;
        fact(sink, &format!("{f}.first"), &ft.first.to_string())?;
        fact(sink, &format!("{f}.last"), &ft.last.to_string())?;

        let mut k = 0usize;
        for lib in &ft.libraries {
            let fl = format!("{f}.{}", lib.name);
            fact(sink, &fl, DEFINED)?;
            fact(sink, &format!("{fl}.num"), &lib.num().to_string())?;
            fact(sink, &format!("{fl}.first"), &lib.first.to_string())?;
            fact(sink, &format!("{fl}.last"), &lib.last.to_string())?;

            for inst in &lib.instances {
                let pos = inst.position;
                fact(sink, &format!("{f}.{k}.pos"), &pos.to_string())?;
                fact(sink, &format!("func.{pos}.name"), f)?;
                for (j, arg) in inst.args.iter().enumerate() {
                    let v = arg.render();
                    fact(sink, &format!("{f}.{k}.param.{j}"), &v)?;
                    fact(sink, &format!("func.{pos}.param.{j}"), &v)?;
                }
                k += 1;
            }
            emit_bounds(sink, &fl, &lib.bounds)?;
        }
        emit_bounds(sink, f, &ft.bounds)?;
    }
    Ok(())
}

/// `RESOURCE.<key>` for each computed requirement.
pub fn emit_requirements(sink: &mut dyn FactSink, required: &[ResourceRequirement]) -> Result<()> {
    for r in required {
        fact(
            sink,
            &format!("RESOURCE.{}", r.key),
            &r.required.to_string(),
        )?;
    }
    Ok(())
}

pub fn emit_timestamp(sink: &mut dyn FactSink, now: SystemTime) -> Result<()> {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    fact(sink, "TIMESTAMP", &secs.to_string())
}
