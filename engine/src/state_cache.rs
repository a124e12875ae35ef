//! Process-lifetime memo of configuration properties and namespace variables.
//!
//! Config is immutable once loaded, and the namespace variables looked up here
//! are function handles registered at start-up. Both are fetched at most once.
//! Values that do change go through a cache cell instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::Scheduler;
use relay_types::StateValue;

use crate::capability::{Scope, StateQuery};

pub struct StateCache {
    query: Arc<dyn StateQuery>,
    scheduler: Arc<Scheduler>,
    config: Mutex<HashMap<(String, String), StateValue>>,
    namespace: Mutex<HashMap<String, StateValue>>,
}

impl StateCache {
    pub fn new(query: Arc<dyn StateQuery>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            query,
            scheduler,
            config: Mutex::new(HashMap::new()),
            namespace: Mutex::new(HashMap::new()),
        }
    }

    /// A class property, or `default` when the class has no such entry.
    /// A miss memoizes the default.
    pub fn config_property(&self, class: &str, property: &str, default: StateValue) -> StateValue {
        self.scheduler
            .affinity()
            .check("StateCache::config_property");
        let key = (class.to_string(), property.to_string());
        if let Some(value) = self.config.lock().get(&key) {
            return value.clone();
        }

        let value = self.query.config_property(class, property);
        let value = if value.is_nil() { default } else { value };
        self.config.lock().insert(key, value.clone());
        value
    }

    pub fn namespace_variable(&self, name: &str) -> StateValue {
        self.scheduler
            .affinity()
            .check("StateCache::namespace_variable");
        if let Some(value) = self.namespace.lock().get(name) {
            return value.clone();
        }

        let value = self.query.variable(Scope::Namespace, name);
        if value.is_nil() {
            tracing::warn!(name, "namespace variable is unset; memoizing nil");
        }
        self.namespace
            .lock()
            .insert(name.to_string(), value.clone());
        value
    }
}
