//! Rule storage seam and per-flush rule matching.
//!
//! Rule definitions live in external storage behind [`RuleStore`]. A
//! flush may process many events of the same `(action, object type)`
//! pair; [`RuleCache`] memoizes the store query per pair so storage is
//! hit at most once per pair per flush. The cache is created inside
//! one flush call and dropped with it, since rules may change between
//! flushes; it is never shared across threads.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{EventAction, EventRule, ObjectTypeId};

/// Read-only repository of event rule definitions.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Return the enabled rules applicable to `(object_type, action)`,
    /// i.e. those covering the object type whose trigger flag for the
    /// action is set.
    async fn rules_for(
        &self,
        object_type: &ObjectTypeId,
        action: EventAction,
    ) -> Result<Vec<EventRule>>;
}

/// In-memory rule store for tests and embedded deployments.
#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<EventRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_rule(&self, rule: EventRule) {
        self.rules.write().await.push(rule);
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn rules_for(
        &self,
        object_type: &ObjectTypeId,
        action: EventAction,
    ) -> Result<Vec<EventRule>> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|r| r.applies_to(object_type, action)).cloned().collect())
    }
}

/// Short-lived memoization of rule lookups for one flush.
///
/// Owned by a single flush invocation; not `Sync` by design.
pub struct RuleCache<'a> {
    store: &'a dyn RuleStore,
    cache: HashMap<(EventAction, ObjectTypeId), Arc<Vec<EventRule>>>,
}

impl<'a> RuleCache<'a> {
    pub fn new(store: &'a dyn RuleStore) -> Self {
        Self { store, cache: HashMap::new() }
    }

    /// Applicable rules for the pair, querying the store on first use.
    pub async fn rules_for(
        &mut self,
        object_type: &ObjectTypeId,
        action: EventAction,
    ) -> Result<Arc<Vec<EventRule>>> {
        let key = (action, object_type.clone());
        if let Some(rules) = self.cache.get(&key) {
            return Ok(rules.clone());
        }

        let rules = Arc::new(self.store.rules_for(object_type, action).await?);
        self.cache.insert(key, rules.clone());
        Ok(rules)
    }
}
