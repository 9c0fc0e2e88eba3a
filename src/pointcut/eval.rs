//! Pointcut evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use super::{Expr, Pointcut};
use crate::descriptor::MethodSignature;

/// Reference chains deeper than this evaluate to `false`.
pub const MAX_REFERENCE_DEPTH: usize = 32;

/// Named pointcuts, keyed by lookup name.
pub type PointcutTable = HashMap<String, Arc<Pointcut>>;

/// Named pointcuts visible to an expression.
///
/// Bare names resolve against the local (aspect) table first, then the
/// global table, where qualified `aspect.name` keys and `global.name` keys
/// live.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    local: Option<&'a PointcutTable>,
    global: Option<&'a PointcutTable>,
}

impl<'a> Scope<'a> {
    pub fn new(local: &'a PointcutTable, global: &'a PointcutTable) -> Self {
        Self {
            local: Some(local),
            global: Some(global),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn global_only(global: &'a PointcutTable) -> Self {
        Self {
            local: None,
            global: Some(global),
        }
    }

    /// Look up a named pointcut.
    pub fn resolve(&self, name: &str) -> Option<&'a Arc<Pointcut>> {
        if let Some(found) = self.local.and_then(|t| t.get(name)) {
            return Some(found);
        }
        let global = self.global?;
        global
            .get(name)
            .or_else(|| global.get(&format!("global.{name}")))
    }
}

/// Evaluate `pointcut` against `method`.
///
/// Unresolvable references are a permissive miss (`false`), never an error.
/// A reference chain that exceeds [`MAX_REFERENCE_DEPTH`] (a cycle) makes the
/// whole expression a miss, so `!loop()` does not match everything.
pub fn evaluate(pointcut: &Pointcut, method: &MethodSignature, scope: Scope<'_>) -> bool {
    match eval_expr(pointcut.expr(), method, scope, 0) {
        Ok(matched) => matched,
        Err(TooDeep(reference)) => {
            warn!(
                pointcut = %pointcut,
                reference = %reference,
                method = %method,
                "Pointcut reference chain too deep, treating as no match"
            );
            false
        }
    }
}

/// The reference at which the depth limit was hit.
struct TooDeep(String);

fn eval_expr(
    expr: &Expr,
    method: &MethodSignature,
    scope: Scope<'_>,
    depth: usize,
) -> Result<bool, TooDeep> {
    Ok(match expr {
        Expr::Execution(pattern) => pattern.matches(method),
        Expr::Annotation(tag) => method.has_tag(tag),
        Expr::Reference(name) => {
            if depth >= MAX_REFERENCE_DEPTH {
                return Err(TooDeep(name.clone()));
            }
            match scope.resolve(name) {
                Some(referenced) => eval_expr(referenced.expr(), method, scope, depth + 1)?,
                None => {
                    trace!(reference = %name, "Unresolved pointcut reference");
                    false
                }
            }
        }
        Expr::Unsupported { .. } => false,
        Expr::Not(inner) => !eval_expr(inner, method, scope, depth)?,
        Expr::And(lhs, rhs) => {
            eval_expr(lhs, method, scope, depth)? && eval_expr(rhs, method, scope, depth)?
        }
        Expr::Or(lhs, rhs) => {
            eval_expr(lhs, method, scope, depth)? || eval_expr(rhs, method, scope, depth)?
        }
    })
}

/// Find a named pointcut in `table` that reaches itself through bare
/// references within the same table. Returns the cycle path.
pub(crate) fn find_cycle(table: &PointcutTable) -> Option<Vec<String>> {
    let mut names: Vec<&String> = table.keys().collect();
    names.sort();
    for start in names {
        let mut path = vec![start.clone()];
        if reaches(table, start, start, &mut path) {
            return Some(path);
        }
    }
    None
}

fn reaches(table: &PointcutTable, from: &str, goal: &str, path: &mut Vec<String>) -> bool {
    let Some(pointcut) = table.get(from) else {
        return false;
    };
    let mut refs = Vec::new();
    references(pointcut.expr(), &mut refs);
    for next in refs {
        if next == goal {
            path.push(next.to_string());
            return true;
        }
        if path.iter().any(|seen| seen == next) {
            continue;
        }
        path.push(next.to_string());
        if reaches(table, next, goal, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn references<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
    match expr {
        Expr::Reference(name) => out.push(name),
        Expr::Not(inner) => references(inner, out),
        Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            references(lhs, out);
            references(rhs, out);
        }
        Expr::Execution(_) | Expr::Annotation(_) | Expr::Unsupported { .. } => {}
    }
}
