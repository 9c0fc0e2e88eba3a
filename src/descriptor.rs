//! Method and type descriptors.
//!
//! Signatures arrive pre-computed from whatever front-end inspects the
//! declarations (parser, compiler plugin, manual registration). The engine
//! never looks at source; capability tags stand in for annotations.

use std::fmt;
use std::time::Duration;

use crate::dispatch::{AsyncOptions, ExceptionPolicy};

/// Tag marking a method for async dispatch.
pub const TAG_ASYNC: &str = "async";
/// Tag conventionally attached to methods a front-end considers interceptable.
pub const TAG_INTERCEPTABLE: &str = "interceptable";

/// Outer return type names treated as futures.
const FUTURE_TYPES: &[&str] = &[
    "Future",
    "CompletableFuture",
    "CompletionStage",
    "ListenableFuture",
];

/// Declared method modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Final,
    Abstract,
    Synchronized,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::Static => "static",
            Self::Final => "final",
            Self::Abstract => "abstract",
            Self::Synchronized => "synchronized",
        };
        f.write_str(name)
    }
}

/// Immutable description of one method.
///
/// Equality and hashing are structural so signatures work as cache keys
/// regardless of where they were built.
///
/// # Example
///
/// ```
/// use weft::descriptor::MethodSignature;
///
/// let sig = MethodSignature::new("com.x.Foo", "bar")
///     .params(["int", "java.lang.String"])
///     .returns("int")
///     .tag("interceptable");
///
/// assert_eq!(sig.qualified_name(), "com.x.Foo.bar");
/// assert!(sig.has_tag("interceptable"));
/// assert!(sig.is_overridable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Fully qualified owning type name.
    pub owner: String,
    /// Method name.
    pub name: String,
    /// Ordered parameter type names.
    pub params: Vec<String>,
    /// Return type name.
    pub returns: String,
    /// Declared capability tags.
    pub tags: Vec<String>,
    /// Declared modifiers. Defaults to `public`.
    pub modifiers: Vec<Modifier>,
    /// Per-method async settings; unset fields fall back to configuration.
    pub async_options: Option<AsyncOptions>,
}

impl MethodSignature {
    /// Create a public, parameterless `void` method.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            params: Vec::new(),
            returns: "void".to_string(),
            tags: Vec::new(),
            modifiers: vec![Modifier::Public],
            async_options: None,
        }
    }

    /// Set the parameter type names.
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Set the return type name.
    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }

    /// Add a capability tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the modifier list.
    pub fn modifiers(mut self, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        self.modifiers = modifiers.into_iter().collect();
        self
    }

    /// Tag the method `async` and attach dispatch settings.
    pub fn asynchronous(mut self, options: AsyncOptions) -> Self {
        if !self.is_async() {
            self.tags.push(TAG_ASYNC.to_string());
        }
        self.async_options = Some(options);
        self
    }

    /// Shorthand for an async method with an explicit timeout and policy.
    pub fn asynchronous_with(self, timeout: Duration, policy: ExceptionPolicy) -> Self {
        self.asynchronous(AsyncOptions::default().timeout(timeout).policy(policy))
    }

    /// `owner.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Whether the capability tag list contains `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the method is tagged for async dispatch.
    pub fn is_async(&self) -> bool {
        self.has_tag(TAG_ASYNC)
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    /// Public, non-final, non-static.
    pub fn is_overridable(&self) -> bool {
        self.has_modifier(Modifier::Public)
            && !self.has_modifier(Modifier::Final)
            && !self.has_modifier(Modifier::Static)
    }

    /// Whether the declared return type is itself a future.
    ///
    /// Only the outer type name counts: `CompletableFuture<String>` is a
    /// future, `List<Future<String>>` is not.
    pub fn returns_future(&self) -> bool {
        let outer = self.returns.split('<').next().unwrap_or_default().trim();
        let simple = outer.rsplit('.').next().unwrap_or(outer);
        FUTURE_TYPES.contains(&simple)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}({})",
            self.returns,
            self.owner,
            self.name,
            self.params.join(", ")
        )
    }
}

/// The public surface of a concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// Fully qualified type name.
    pub name: String,
    /// Declared methods, in declaration order.
    pub methods: Vec<MethodSignature>,
    /// Sealed types cannot be substituted.
    pub sealed: bool,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            sealed: false,
        }
    }

    /// Add a method. The owner is forced to this type's name.
    pub fn method(mut self, mut signature: MethodSignature) -> Self {
        signature.owner = self.name.clone();
        self.methods.push(signature);
        self
    }

    /// Mark the type sealed.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Find a method by name and arity, falling back to the first method
    /// with that name.
    pub fn resolve(&self, name: &str, arity: usize) -> Option<(usize, &MethodSignature)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name && m.params.len() == arity)
            .or_else(|| self.methods.iter().enumerate().find(|(_, m)| m.name == name))
    }

    /// Whether any method could be routed through a substitute.
    pub fn has_overridable_methods(&self) -> bool {
        self.methods.iter().any(MethodSignature::is_overridable)
    }
}
