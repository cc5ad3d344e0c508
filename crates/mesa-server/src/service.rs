use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mesa_core::engine::{AccessError, EffectiveAccess, PermissionEngine};
use mesa_core::model::{AccessWrite, Operation, PermissionMap, TenantId, UserId};
use mesa_core::{CacheConfig, Clock, DecisionCache, InvalidationScope, Lookup};
use mesa_storage::{AccessStore, Revision};
use tokio::task::JoinHandle;

use crate::adapter::StoreSource;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::metrics::Metrics;

/// Answers access queries for one store: resolution through the engine,
/// cached per (user, tenant), and invalidated by writes made through
/// [`AccessService::apply`].
pub struct AccessService<S: AccessStore> {
    store: Arc<S>,
    engine: PermissionEngine<StoreSource<S>>,
    cache: Option<Arc<DecisionCache>>,
    metrics: Arc<Metrics>,
}

impl<S: AccessStore> AccessService<S> {
    pub fn new(store: Arc<S>, store_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        let source = Arc::new(StoreSource::new(Arc::clone(&store), store_timeout));
        Self {
            store,
            engine: PermissionEngine::new(source, clock),
            cache: None,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Builds a service with the timeout and cache settings from `config`.
    pub fn from_config(
        store: Arc<S>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let service = Self::new(store, config.store_timeout(), clock).with_metrics(metrics);
        match config.to_cache_config() {
            Some(cache) => service.with_cache(cache),
            None => service,
        }
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(Arc::new(DecisionCache::new(config)));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn cache(&self) -> Option<&Arc<DecisionCache>> {
        self.cache.as_ref()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn has_access(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        module: &str,
        operation: Operation,
    ) -> Result<bool, ApiError> {
        self.metrics.record_check();
        let result = match self.load(user_id, tenant_id).await {
            Ok(access) => access.check(module, operation),
            Err(e) => Err(e),
        };
        let allowed = self.observe(result, user_id, tenant_id)?;
        self.metrics.record_decision(allowed);
        if !allowed {
            tracing::debug!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                module,
                operation = %operation,
                "access denied"
            );
        }
        Ok(allowed)
    }

    /// Like [`has_access`](Self::has_access), with a denial reported as
    /// [`AccessError::Forbidden`].
    pub async fn authorize(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        module: &str,
        operation: Operation,
    ) -> Result<(), ApiError> {
        self.metrics.record_check();
        let result = match self.load(user_id, tenant_id).await {
            Ok(access) => access.authorize(module, operation),
            Err(e) => Err(e),
        };
        match self.observe(result, user_id, tenant_id) {
            Ok(()) => {
                self.metrics.record_decision(true);
                Ok(())
            }
            Err(ApiError::Access(forbidden @ AccessError::Forbidden { .. })) => {
                self.metrics.record_decision(false);
                Err(forbidden.into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn effective_permissions(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<PermissionMap, ApiError> {
        Ok(self.resolve(user_id, tenant_id).await?.permissions().clone())
    }

    pub async fn resolve(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Arc<EffectiveAccess>, ApiError> {
        let result = self.load(user_id, tenant_id).await;
        self.observe(result, user_id, tenant_id)
    }

    /// Writes `writes` as one batch, then invalidates every cached decision
    /// the batch can affect. A failed batch invalidates too, since the store
    /// may have committed before reporting the failure.
    pub async fn apply(&self, writes: &[AccessWrite]) -> Result<Revision, ApiError> {
        let result = self.store.apply(writes).await;

        let scopes: HashSet<InvalidationScope> =
            writes.iter().map(AccessWrite::invalidation_scope).collect();
        for scope in scopes {
            self.invalidate(scope);
        }

        let revision = result?;
        tracing::info!(writes = writes.len(), revision = %revision, "applied access writes");
        Ok(revision)
    }

    /// For collaborators that change access records outside [`apply`](Self::apply).
    pub fn invalidate(&self, scope: InvalidationScope) {
        if let Some(cache) = &self.cache {
            cache.invalidate(scope);
            self.metrics.record_cache_invalidation();
        }
    }

    /// Periodically drops expired cache entries. Returns `None` when the
    /// cache is disabled.
    pub fn spawn_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let metrics = Arc::clone(&self.metrics);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired();
                metrics.record_cache_swept(removed);
            }
        }))
    }

    /// Starts the sweeper at the configured interval, if the config asks for one.
    pub fn start_sweeper(&self, config: &AppConfig) -> Option<JoinHandle<()>> {
        let every = config.sweep_interval()?;
        let handle = self.spawn_sweeper(every)?;
        tracing::debug!(interval_secs = every.as_secs(), "cache sweeper started");
        Some(handle)
    }

    async fn load(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Arc<EffectiveAccess>, AccessError> {
        let Some(cache) = &self.cache else {
            return self.engine.resolve(user_id, tenant_id).await.map(Arc::new);
        };

        match cache.lookup_at(user_id, tenant_id, self.engine.clock().now()) {
            Lookup::Hit(access) => {
                self.metrics.record_cache_hit();
                Ok(access)
            }
            Lookup::Miss(ticket) => {
                self.metrics.record_cache_miss();
                let access = Arc::new(self.engine.resolve(user_id, tenant_id).await?);
                cache.populate(ticket, Arc::clone(&access));
                Ok(access)
            }
        }
    }

    fn observe<T>(
        &self,
        result: Result<T, AccessError>,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<T, ApiError> {
        match result {
            Ok(value) => Ok(value),
            Err(AccessError::StoreUnavailable(reason)) => {
                self.metrics.record_store_unavailable();
                tracing::error!(
                    target: "mesa::authz",
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    reason = %reason,
                    "store unavailable, failing closed"
                );
                Err(AccessError::StoreUnavailable(reason).into())
            }
            Err(e) if e.is_not_found() => {
                self.metrics.record_not_found();
                tracing::debug!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "not found");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
