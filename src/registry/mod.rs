//! Aspect registry.
//!
//! Holds every registered aspect, the global named-pointcut table and the
//! match cache, all inside one immutable [`Snapshot`] behind an
//! [`ArcSwap`]. Readers load the current snapshot without locking; every
//! mutation builds a complete replacement and installs it with
//! compare-and-swap, so a reader sees either the old table or the new one,
//! never a mix.
//!
//! The cache tiers belong to the snapshot. Installing a new snapshot is the
//! invalidation.

mod cache;


use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

pub use cache::{AdviceList, AdviceSet, CacheStats};

use crate::advice::{AdviceDescriptor, AdviceKind, Aspect, AspectId};
use crate::descriptor::{MethodSignature, TypeDescriptor};
use crate::pointcut::{evaluate, PointcutSyntaxError, PointcutTable, Scope};
use crate::proxy::TypePlan;
use cache::MatchCache;

/// Errors that can occur while registering aspects.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("aspect '{aspect}': invalid {element}: {source}")]
    InvalidPointcut {
        aspect: String,
        element: String,
        #[source]
        source: PointcutSyntaxError,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// One registered aspect with its compiled advice.
struct Registration {
    aspect: Arc<Aspect>,
    local: PointcutTable,
    advice: Vec<Arc<AdviceDescriptor>>,
}

/// Registered aspects plus the global pointcut table derived from them.
#[derive(Default, Clone)]
struct AspectTable {
    registrations: Vec<Arc<Registration>>,
    global: PointcutTable,
}

impl AspectTable {
    fn contains(&self, id: AspectId) -> bool {
        self.registrations.iter().any(|r| r.aspect.id() == id)
    }

    fn with(&self, registration: Arc<Registration>) -> Self {
        let mut next = self.clone();
        export_pointcuts(&mut next.global, &registration);
        next.registrations.push(registration);
        next
    }

    fn rebuilt(registrations: Vec<Arc<Registration>>) -> Self {
        let mut global = PointcutTable::new();
        for registration in &registrations {
            export_pointcuts(&mut global, registration);
        }
        Self {
            registrations,
            global,
        }
    }
}

/// Publish an aspect's named pointcuts under `aspect.name` and `global.name`.
fn export_pointcuts(global: &mut PointcutTable, registration: &Registration) {
    let aspect = registration.aspect.name();
    for (name, pointcut) in &registration.local {
        let qualified = format!("{aspect}.{name}");
        if global.contains_key(&qualified) {
            warn!(
                aspect = %aspect,
                pointcut = %name,
                "Named pointcut already exported by another aspect, replacing"
            );
        }
        global.insert(qualified, Arc::clone(pointcut));
        global.insert(format!("global.{name}"), Arc::clone(pointcut));
    }
}

struct Snapshot {
    generation: u64,
    table: Arc<AspectTable>,
    cache: MatchCache,
}

impl Snapshot {
    fn new(generation: u64, table: Arc<AspectTable>) -> Self {
        Self {
            generation,
            table,
            cache: MatchCache::default(),
        }
    }

    fn matching(&self, method: &MethodSignature, cached: bool) -> Vec<Arc<AdviceDescriptor>> {
        let mut matches = Vec::new();
        for registration in &self.table.registrations {
            let scope = Scope::new(&registration.local, &self.table.global);
            for advice in &registration.advice {
                let pointcut = advice.pointcut();
                let matched = if cached {
                    self.cache
                        .evaluation(pointcut.id(), method, || evaluate(pointcut, method, scope))
                } else {
                    evaluate(pointcut, method, scope)
                };
                if matched {
                    matches.push(Arc::clone(advice));
                }
            }
        }
        matches
    }

    fn advice_set(&self, method: &MethodSignature) -> Arc<AdviceSet> {
        self.cache.advice_set(method, || {
            let set = AdviceSet::from_matches(self.matching(method, true));
            debug!(
                method = %method,
                matched = set.len(),
                generation = self.generation,
                "Indexed advice for method"
            );
            set
        })
    }
}

/// Stores aspects and answers "which advice applies to this method".
pub struct Registry {
    snapshot: ArcSwap<Snapshot>,
    next_seq: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::new(0, Arc::default())),
            next_seq: AtomicU64::new(0),
        }
    }

    fn compile(&self, aspect: &Arc<Aspect>) -> Result<Registration> {
        let count = aspect.advice().len() as u64;
        let first_seq = self.next_seq.fetch_add(count, Ordering::Relaxed);
        let compiled = aspect
            .compile(first_seq)
            .map_err(|e| RegistryError::InvalidPointcut {
                aspect: aspect.name().to_string(),
                element: e.element,
                source: e.source,
            })?;
        Ok(Registration {
            aspect: Arc::clone(aspect),
            local: compiled.local,
            advice: compiled.advice.into_iter().map(Arc::new).collect(),
        })
    }

    /// Register an aspect.
    ///
    /// Registering an instance that is already present is a no-op. Pointcut
    /// syntax errors reject this aspect only; nothing is installed.
    pub fn register(&self, aspect: Arc<Aspect>) -> Result<()> {
        if self.snapshot.load().table.contains(aspect.id()) {
            debug!(aspect = %aspect.name(), "Aspect already registered, ignoring");
            return Ok(());
        }

        let registration = Arc::new(self.compile(&aspect)?);
        let mut duplicate = false;
        self.snapshot.rcu(|current| {
            duplicate = current.table.contains(aspect.id());
            if duplicate {
                return Arc::clone(current);
            }
            let table = current.table.with(Arc::clone(&registration));
            Arc::new(Snapshot::new(current.generation + 1, Arc::new(table)))
        });

        if duplicate {
            debug!(aspect = %aspect.name(), "Aspect already registered, ignoring");
        } else {
            info!(
                aspect = %aspect.name(),
                advice = registration.advice.len(),
                pointcuts = registration.local.len(),
                "Registered aspect"
            );
        }
        Ok(())
    }

    /// Replace every registered aspect at once.
    ///
    /// Each aspect is compiled on its own. One with an invalid pointcut is
    /// left out, logged and returned; the rest still replace the previous
    /// set. Concurrent readers see either the old set or the new one.
    #[must_use = "rejected aspects are only reported through the return value"]
    pub fn set_aspects(
        &self,
        aspects: impl IntoIterator<Item = Arc<Aspect>>,
    ) -> Vec<RegistryError> {
        let mut seen = HashSet::new();
        let mut registrations = Vec::new();
        let mut rejected = Vec::new();
        for aspect in aspects {
            if !seen.insert(aspect.id()) {
                continue;
            }
            match self.compile(&aspect) {
                Ok(registration) => registrations.push(Arc::new(registration)),
                Err(e) => {
                    warn!(aspect = %aspect.name(), error = %e, "Rejected aspect");
                    rejected.push(e);
                }
            }
        }

        let count = registrations.len();
        let table = Arc::new(AspectTable::rebuilt(registrations));
        self.replace_table(table);
        info!(aspects = count, rejected = rejected.len(), "Replaced aspect set");
        rejected
    }

    /// Remove every aspect.
    pub fn clear_aspects(&self) {
        self.replace_table(Arc::default());
        info!("Cleared all aspects");
    }

    /// Remove every aspect named `name`. Returns whether any was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.snapshot.rcu(|current| {
            let remaining: Vec<_> = current
                .table
                .registrations
                .iter()
                .filter(|r| r.aspect.name() != name)
                .cloned()
                .collect();
            removed = remaining.len() != current.table.registrations.len();
            if !removed {
                return Arc::clone(current);
            }
            let table = Arc::new(AspectTable::rebuilt(remaining));
            Arc::new(Snapshot::new(current.generation + 1, table))
        });
        if removed {
            info!(aspect = %name, "Unregistered aspect");
        }
        removed
    }

    /// Drop every cache tier, keeping the registered aspects.
    pub fn invalidate(&self) {
        self.snapshot.rcu(|current| {
            Arc::new(Snapshot::new(
                current.generation + 1,
                Arc::clone(&current.table),
            ))
        });
        debug!("Invalidated match cache");
    }

    fn replace_table(&self, table: Arc<AspectTable>) {
        self.snapshot.rcu(|current| {
            Arc::new(Snapshot::new(current.generation + 1, Arc::clone(&table)))
        });
    }

    /// Names of registered aspects, in registration order.
    pub fn aspects(&self) -> Vec<String> {
        self.snapshot
            .load()
            .table
            .registrations
            .iter()
            .map(|r| r.aspect.name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().table.registrations.is_empty()
    }

    /// Incremented by every mutation, including [`Registry::invalidate`].
    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation
    }

    /// Ordered advice of `kind` for `method`, from the cache.
    pub fn advices_for(&self, method: &MethodSignature, kind: AdviceKind) -> AdviceList {
        self.advice_set(method).list(kind)
    }

    /// Ordered advice of every kind for `method`, from the cache.
    pub fn advice_set(&self, method: &MethodSignature) -> Arc<AdviceSet> {
        self.snapshot.load().advice_set(method)
    }

    /// Ordered advice of `kind` for `method`, bypassing every cache tier.
    pub fn advices_for_uncached(
        &self,
        method: &MethodSignature,
        kind: AdviceKind,
    ) -> Vec<Arc<AdviceDescriptor>> {
        let snapshot = self.snapshot.load();
        let mut matches: Vec<_> = snapshot
            .matching(method, false)
            .into_iter()
            .filter(|a| a.kind() == kind)
            .collect();
        matches.sort_by_key(|a| a.sort_key());
        matches
    }

    /// Whether any advice of any kind applies to `method`.
    pub fn has_advice(&self, method: &MethodSignature) -> bool {
        !self.advice_set(method).is_empty()
    }

    /// Per-type routing plan, cached until the next mutation.
    pub fn plan_for(&self, descriptor: &TypeDescriptor) -> Arc<TypePlan> {
        let snapshot = self.snapshot.load();
        snapshot.cache.plan(descriptor, || {
            TypePlan::build(descriptor, snapshot.generation, |method| {
                !snapshot.advice_set(method).is_empty()
            })
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.snapshot.load().cache.stats()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("Registry")
            .field("generation", &snapshot.generation)
            .field("aspects", &snapshot.table.registrations.len())
            .field("global_pointcuts", &snapshot.table.global.len())
            .finish()
    }
}
