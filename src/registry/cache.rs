//! Match cache tiers.
//!
//! Every tier is a derived view of one registry snapshot and lives inside
//! it. Replacing the snapshot drops the tiers with it, so an entry can never
//! outlive the aspect table it was computed from.

use std::sync::Arc;

use dashmap::DashMap;

use crate::advice::{AdviceDescriptor, AdviceKind};
use crate::descriptor::{MethodSignature, TypeDescriptor};
use crate::pointcut::PointcutId;
use crate::proxy::TypePlan;

/// Ordered advice for one (method, kind) pair.
pub type AdviceList = Arc<[Arc<AdviceDescriptor>]>;

/// Ordered advice of every kind for one method.
#[derive(Debug, Clone)]
pub struct AdviceSet {
    lists: [AdviceList; 5],
}

fn slot(kind: AdviceKind) -> usize {
    match kind {
        AdviceKind::Before => 0,
        AdviceKind::After => 1,
        AdviceKind::Around => 2,
        AdviceKind::AfterReturning => 3,
        AdviceKind::AfterThrowing => 4,
    }
}

impl AdviceSet {
    /// Group advice by kind, each group sorted by `(order, seq)`.
    pub(crate) fn from_matches(matches: Vec<Arc<AdviceDescriptor>>) -> Self {
        let mut grouped: [Vec<Arc<AdviceDescriptor>>; 5] = Default::default();
        for advice in matches {
            grouped[slot(advice.kind())].push(advice);
        }
        let lists = grouped.map(|mut group| {
            group.sort_by_key(|a| a.sort_key());
            AdviceList::from(group)
        });
        Self { lists }
    }

    pub fn get(&self, kind: AdviceKind) -> &[Arc<AdviceDescriptor>] {
        &self.lists[slot(kind)]
    }

    pub fn list(&self, kind: AdviceKind) -> AdviceList {
        Arc::clone(&self.lists[slot(kind)])
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(|list| list.is_empty())
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(|list| list.len()).sum()
    }
}

/// Entry counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub evaluations: usize,
    pub indexed_methods: usize,
    pub type_plans: usize,
}

/// The three lazily populated tiers.
///
/// Lookups never hold a shard lock while computing a miss; two racing
/// writers compute the same value and the first insert wins.
#[derive(Default)]
pub(crate) struct MatchCache {
    evaluations: DashMap<(PointcutId, MethodSignature), bool>,
    index: DashMap<MethodSignature, Arc<AdviceSet>>,
    plans: DashMap<TypeDescriptor, Arc<TypePlan>>,
}

impl MatchCache {
    pub(crate) fn evaluation(
        &self,
        pointcut: PointcutId,
        method: &MethodSignature,
        compute: impl FnOnce() -> bool,
    ) -> bool {
        let key = (pointcut, method.clone());
        if let Some(hit) = self.evaluations.get(&key) {
            return *hit;
        }
        let matched = compute();
        *self.evaluations.entry(key).or_insert(matched)
    }

    pub(crate) fn advice_set(
        &self,
        method: &MethodSignature,
        compute: impl FnOnce() -> AdviceSet,
    ) -> Arc<AdviceSet> {
        if let Some(hit) = self.index.get(method) {
            return hit.value().clone();
        }
        let set = Arc::new(compute());
        self.index.entry(method.clone()).or_insert(set).value().clone()
    }

    /// Plans are keyed by the whole descriptor: routes are positional, so
    /// two types sharing a name must not share a plan.
    pub(crate) fn plan(
        &self,
        descriptor: &TypeDescriptor,
        compute: impl FnOnce() -> TypePlan,
    ) -> Arc<TypePlan> {
        if let Some(hit) = self.plans.get(descriptor) {
            return hit.value().clone();
        }
        let plan = Arc::new(compute());
        self.plans
            .entry(descriptor.clone())
            .or_insert(plan)
            .value()
            .clone()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            evaluations: self.evaluations.len(),
            indexed_methods: self.index.len(),
            type_plans: self.plans.len(),
        }
    }
}
