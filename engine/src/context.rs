use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_config::RelaySettings;
use relay_core::{CachedValue, Clock, Scheduler, SystemClock};
use relay_types::StateValue;

use crate::capability::StateQuery;
use crate::state_cache::StateCache;

/// Everything records and the roster share.
///
/// Construct on the privileged thread: the scheduler binds to the thread that
/// creates it.
pub struct RelayContext {
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    query: Arc<dyn StateQuery>,
    cache: StateCache,
    settings: RelaySettings,
}

impl RelayContext {
    pub fn new(
        query: Arc<dyn StateQuery>,
        clock: Arc<dyn Clock>,
        settings: RelaySettings,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler::new());
        let cache = StateCache::new(Arc::clone(&query), Arc::clone(&scheduler));
        Arc::new(Self {
            scheduler,
            clock,
            query,
            cache,
            settings,
        })
    }

    pub fn with_system_clock(query: Arc<dyn StateQuery>, settings: RelaySettings) -> Arc<Self> {
        Self::new(query, Arc::new(SystemClock), settings)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn query(&self) -> &dyn StateQuery {
        &*self.query
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Call a namespace function by its variable name. An unset function
    /// yields `Nil`.
    pub fn call_function(&self, name: &str, args: &[StateValue]) -> StateValue {
        let code = self.cache.namespace_variable(name);
        if code.is_nil() {
            return StateValue::Nil;
        }
        self.query.call(&code, args)
    }

    pub fn cell<T>(
        &self,
        name: impl Into<String>,
        default: T,
        interval: Duration,
        update_fn: impl Fn() -> T + Send + Sync + 'static,
    ) -> Arc<CachedValue<T>>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        CachedValue::builder(name, default)
            .interval(interval)
            .build(&self.scheduler, Arc::clone(&self.clock), update_fn)
    }

    pub fn cell_guarded<T>(
        &self,
        name: impl Into<String>,
        default: T,
        interval: Duration,
        can_update: impl Fn() -> bool + Send + Sync + 'static,
        update_fn: impl Fn() -> T + Send + Sync + 'static,
    ) -> Arc<CachedValue<T>>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        CachedValue::builder(name, default)
            .interval(interval)
            .guard(can_update)
            .build(&self.scheduler, Arc::clone(&self.clock), update_fn)
    }
}

impl fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayContext")
            .field("scheduler", &self.scheduler)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
