//! Per-(user, tenant) cache of resolved access.
//!
//! Every invalidation takes a fresh number from a global epoch counter and
//! records it against the scope it covers before removing entries. A miss
//! hands out a [`PopulationTicket`] stamped with the epoch at the time of the
//! miss; populating with that ticket is refused if any covering scope was
//! marked after it. The check and the insert happen under the entry's shard
//! lock, so a resolution that started before an invalidation can never leave
//! its result behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::engine::EffectiveAccess;
use crate::model::{TenantId, UserId};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Which cached decisions a change can affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationScope {
    UserInTenant { user_id: UserId, tenant_id: TenantId },
    User(UserId),
    Tenant(TenantId),
    All,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

type Key = (UserId, TenantId);

#[derive(Debug, Clone)]
struct CachedAccess {
    access: Arc<EffectiveAccess>,
    cached_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    epoch: u64,
    at: Instant,
}

/// Permission to store a freshly resolved value for one key.
#[derive(Debug)]
pub struct PopulationTicket {
    key: Key,
    epoch: u64,
    issued_at: Instant,
}

#[derive(Debug)]
pub enum Lookup {
    Hit(Arc<EffectiveAccess>),
    Miss(PopulationTicket),
}

pub struct DecisionCache {
    config: CacheConfig,
    entries: DashMap<Key, CachedAccess>,
    epoch: AtomicU64,
    pair_marks: DashMap<Key, Mark>,
    user_marks: DashMap<UserId, Mark>,
    tenant_marks: DashMap<TenantId, Mark>,
    global_mark: AtomicU64,
}

impl DecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            epoch: AtomicU64::new(0),
            pair_marks: DashMap::new(),
            user_marks: DashMap::new(),
            tenant_marks: DashMap::new(),
            global_mark: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, user_id: &UserId, tenant_id: &TenantId) -> Lookup {
        self.lookup_at(user_id, tenant_id, Utc::now())
    }

    /// Like [`lookup`](Self::lookup), with `now` deciding whether a cached
    /// value has outlived its [`EffectiveAccess::valid_until`].
    pub fn lookup_at(&self, user_id: &UserId, tenant_id: &TenantId, now: DateTime<Utc>) -> Lookup {
        let key = (*user_id, *tenant_id);
        // Take the epoch first: an invalidation landing after this point
        // bumps past it and blocks the ticket.
        let epoch = self.epoch.load(Ordering::SeqCst);
        let issued_at = Instant::now();
        let ttl = self.config.ttl;
        let fresh = |cached: &CachedAccess| {
            cached.cached_at.elapsed() < ttl && cached.access.is_current_at(now)
        };

        if let Some(entry) = self.entries.get(&key) {
            if fresh(&entry) {
                return Lookup::Hit(Arc::clone(&entry.access));
            }
            drop(entry);
            self.entries.remove_if(&key, |_, cached| !fresh(cached));
        }

        Lookup::Miss(PopulationTicket {
            key,
            epoch,
            issued_at,
        })
    }

    /// Stores `access` under the ticket's key unless an overlapping
    /// invalidation happened since the ticket was issued. Returns whether the
    /// value was stored.
    pub fn populate(&self, ticket: PopulationTicket, access: Arc<EffectiveAccess>) -> bool {
        if ticket.issued_at.elapsed() >= self.config.ttl {
            return false;
        }
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(&ticket.key)
        {
            tracing::debug!(
                max_entries = self.config.max_entries,
                "decision cache full, not admitting entry"
            );
            return false;
        }

        let entry = self.entries.entry(ticket.key);
        if self.invalidated_since(&ticket) {
            return false;
        }
        entry.insert(CachedAccess {
            access,
            cached_at: ticket.issued_at,
        });
        true
    }

    pub fn invalidate(&self, scope: InvalidationScope) {
        let mark = Mark {
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
            at: Instant::now(),
        };

        match scope {
            InvalidationScope::UserInTenant { user_id, tenant_id } => {
                let key = (user_id, tenant_id);
                record(&self.pair_marks, key, mark);
                self.entries.remove(&key);
            }
            InvalidationScope::User(user_id) => {
                record(&self.user_marks, user_id, mark);
                self.entries.retain(|(user, _), _| *user != user_id);
            }
            InvalidationScope::Tenant(tenant_id) => {
                record(&self.tenant_marks, tenant_id, mark);
                self.entries.retain(|(_, tenant), _| *tenant != tenant_id);
            }
            InvalidationScope::All => {
                self.global_mark.fetch_max(mark.epoch, Ordering::SeqCst);
                self.entries.clear();
            }
        }

        tracing::debug!(scope = ?scope, epoch = mark.epoch, "invalidated decision cache");
    }

    /// Drops expired entries and marks too old to block any live ticket.
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.cached_at.elapsed() < ttl);
        let removed = before.saturating_sub(self.entries.len());

        // Tickets older than the TTL are refused outright, so a mark older
        // than that can no longer matter.
        self.pair_marks.retain(|_, mark| mark.at.elapsed() < ttl);
        self.user_marks.retain(|_, mark| mark.at.elapsed() < ttl);
        self.tenant_marks.retain(|_, mark| mark.at.elapsed() < ttl);

        if removed > 0 {
            tracing::debug!(removed, "swept expired decision cache entries");
        }
        removed
    }

    fn invalidated_since(&self, ticket: &PopulationTicket) -> bool {
        let (user_id, tenant_id) = ticket.key;
        let newer = |mark: Option<u64>| mark.is_some_and(|epoch| epoch > ticket.epoch);

        self.global_mark.load(Ordering::SeqCst) > ticket.epoch
            || newer(self.pair_marks.get(&ticket.key).map(|m| m.epoch))
            || newer(self.user_marks.get(&user_id).map(|m| m.epoch))
            || newer(self.tenant_marks.get(&tenant_id).map(|m| m.epoch))
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn record<K: std::hash::Hash + Eq>(marks: &DashMap<K, Mark>, key: K, mark: Mark) {
    marks
        .entry(key)
        .and_modify(|existing| {
            if mark.epoch > existing.epoch {
                *existing = mark;
            }
        })
        .or_insert(mark);
}
