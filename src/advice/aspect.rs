//! Aspect declarations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{AdviceBody, AdviceDescriptor, AdviceFn, AdviceKind, AdviceArgs, AroundFn, Param};
use crate::interfaces::{Fault, Value};
use crate::pipeline::Proceed;
use crate::pointcut::{find_cycle, Pointcut, PointcutSyntaxError, PointcutTable};

/// Order given to advice that declares none: runs last.
pub const DEFAULT_ORDER: i32 = i32::MAX;

static NEXT_ASPECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one aspect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AspectId(u64);

/// One advice declaration, before its pointcut is parsed.
#[derive(Clone)]
pub struct AdviceDecl {
    kind: AdviceKind,
    name: Option<String>,
    pointcut: String,
    order: Option<i32>,
    returning: Option<String>,
    throwing: Option<String>,
    params: Vec<Param>,
    body: AdviceBody,
}

impl AdviceDecl {
    fn plain<F>(kind: AdviceKind, pointcut: &str, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        let body: AdviceFn = Arc::new(body);
        Self {
            kind,
            name: None,
            pointcut: pointcut.to_string(),
            order: None,
            returning: None,
            throwing: None,
            params,
            body: AdviceBody::Plain(body),
        }
    }

    /// Runs before the target. Receives the join point.
    pub fn before<F>(pointcut: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        Self::plain(AdviceKind::Before, pointcut, vec![Param::JoinPoint], body)
    }

    /// Runs after a successful call. Receives the join point.
    pub fn after<F>(pointcut: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        Self::plain(AdviceKind::After, pointcut, vec![Param::JoinPoint], body)
    }

    /// Runs on a returned value, bound under `returning`.
    pub fn after_returning<F>(pointcut: &str, returning: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        let mut decl = Self::plain(
            AdviceKind::AfterReturning,
            pointcut,
            vec![Param::JoinPoint, Param::Named(returning.to_string())],
            body,
        );
        decl.returning = Some(returning.to_string());
        decl
    }

    /// Runs on a raised cause, bound under `throwing`.
    pub fn after_throwing<F>(pointcut: &str, throwing: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        let mut decl = Self::plain(
            AdviceKind::AfterThrowing,
            pointcut,
            vec![Param::JoinPoint, Param::Named(throwing.to_string())],
            body,
        );
        decl.throwing = Some(throwing.to_string());
        decl
    }

    /// Wraps the call; the body decides whether and how often to proceed.
    pub fn around<F>(pointcut: &str, body: F) -> Self
    where
        F: Fn(&Proceed<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        let body: AroundFn = Arc::new(body);
        Self {
            kind: AdviceKind::Around,
            name: None,
            pointcut: pointcut.to_string(),
            order: None,
            returning: None,
            throwing: None,
            params: Vec::new(),
            body: AdviceBody::Around(body),
        }
    }

    /// Name used in logs. Defaults to `<kind>#<index>`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit order; overrides the aspect's default.
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Replace the declared parameter list.
    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params = params.into_iter().collect();
        self
    }

    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    pub fn pointcut(&self) -> &str {
        &self.pointcut
    }
}

/// A named bundle of advice plus the pointcuts it exports.
pub struct Aspect {
    id: AspectId,
    name: String,
    order: i32,
    pointcuts: Vec<(String, String)>,
    advice: Vec<AdviceDecl>,
}

/// Result of compiling an aspect for registration.
pub(crate) struct CompiledAspect {
    pub(crate) local: PointcutTable,
    pub(crate) advice: Vec<AdviceDescriptor>,
}

/// Pointcut compilation failure, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompileError {
    pub(crate) element: String,
    pub(crate) source: PointcutSyntaxError,
}

impl Aspect {
    pub fn builder(name: impl Into<String>) -> AspectBuilder {
        AspectBuilder {
            name: name.into(),
            order: DEFAULT_ORDER,
            pointcuts: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn id(&self) -> AspectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default order for advice that declares none.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Exported named pointcuts as `(name, expression)`.
    pub fn pointcuts(&self) -> &[(String, String)] {
        &self.pointcuts
    }

    pub fn advice(&self) -> &[AdviceDecl] {
        &self.advice
    }

    /// Parse every pointcut and build descriptors, numbering advice from
    /// `first_seq`.
    pub(crate) fn compile(&self, first_seq: u64) -> Result<CompiledAspect, CompileError> {
        let mut local = PointcutTable::new();
        for (name, expression) in &self.pointcuts {
            let pointcut = Pointcut::parse(expression).map_err(|source| CompileError {
                element: format!("pointcut {name}"),
                source,
            })?;
            local.insert(name.clone(), Arc::new(pointcut));
        }
        if let Some(cycle) = find_cycle(&local) {
            let name = &cycle[0];
            let fragment = local.get(name).map(|p| p.source()).unwrap_or_default();
            return Err(CompileError {
                element: format!("pointcut {name}"),
                source: PointcutSyntaxError::new(
                    format!("reference cycle {}", cycle.join(" -> ")),
                    fragment,
                    0,
                ),
            });
        }

        let aspect_name: Arc<str> = Arc::from(self.name.as_str());
        let mut advice = Vec::with_capacity(self.advice.len());
        for (index, decl) in self.advice.iter().enumerate() {
            let name = decl
                .name
                .clone()
                .unwrap_or_else(|| format!("{}#{}", decl.kind, index));
            let pointcut = Pointcut::parse(&decl.pointcut).map_err(|source| CompileError {
                element: format!("advice {name}"),
                source,
            })?;
            advice.push(AdviceDescriptor {
                kind: decl.kind,
                aspect: self.id,
                aspect_name: Arc::clone(&aspect_name),
                name,
                pointcut: Arc::new(pointcut),
                order: decl.order.unwrap_or(self.order),
                seq: first_seq + index as u64,
                returning: decl.returning.clone(),
                throwing: decl.throwing.clone(),
                params: decl.params.clone(),
                body: decl.body.clone(),
            });
        }

        Ok(CompiledAspect { local, advice })
    }
}

impl std::fmt::Debug for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aspect")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("order", &self.order)
            .field("pointcuts", &self.pointcuts)
            .field("advice", &self.advice.len())
            .finish()
    }
}

/// Builder for [`Aspect`].
pub struct AspectBuilder {
    name: String,
    order: i32,
    pointcuts: Vec<(String, String)>,
    advice: Vec<AdviceDecl>,
}

impl AspectBuilder {
    /// Default order for this aspect's advice.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Export a named pointcut.
    pub fn pointcut(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.pointcuts.push((name.into(), expression.into()));
        self
    }

    pub fn advice(mut self, decl: AdviceDecl) -> Self {
        self.advice.push(decl);
        self
    }

    pub fn before<F>(self, pointcut: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.advice(AdviceDecl::before(pointcut, body))
    }

    pub fn after<F>(self, pointcut: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.advice(AdviceDecl::after(pointcut, body))
    }

    pub fn after_returning<F>(self, pointcut: &str, returning: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.advice(AdviceDecl::after_returning(pointcut, returning, body))
    }

    pub fn after_throwing<F>(self, pointcut: &str, throwing: &str, body: F) -> Self
    where
        F: Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.advice(AdviceDecl::after_throwing(pointcut, throwing, body))
    }

    pub fn around<F>(self, pointcut: &str, body: F) -> Self
    where
        F: Fn(&Proceed<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.advice(AdviceDecl::around(pointcut, body))
    }

    pub fn build(self) -> Arc<Aspect> {
        Arc::new(Aspect {
            id: AspectId(NEXT_ASPECT_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            order: self.order,
            pointcuts: self.pointcuts,
            advice: self.advice,
        })
    }
}
