use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    checks: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    not_found: AtomicU64,
    store_unavailable: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_invalidations: AtomicU64,
    cache_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self, allowed: bool) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_unavailable(&self) {
        self.store_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_invalidation(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_swept(&self, entries: usize) {
        self.cache_swept
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn allowed(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }

    pub fn store_unavailable(&self) -> u64 {
        self.store_unavailable.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn cache_invalidations(&self) -> u64 {
        self.cache_invalidations.load(Ordering::Relaxed)
    }

    pub fn cache_swept(&self) -> u64 {
        self.cache_swept.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let counters = [
            ("mesa_checks_total", "Access checks answered or attempted.", self.checks()),
            ("mesa_checks_allowed_total", "Checks that allowed.", self.allowed()),
            ("mesa_checks_denied_total", "Checks that denied.", self.denied()),
            (
                "mesa_not_found_total",
                "Queries naming an unknown tenant, account or module.",
                self.not_found(),
            ),
            (
                "mesa_store_unavailable_total",
                "Queries failed closed because the store could not answer.",
                self.store_unavailable(),
            ),
            ("mesa_cache_hits_total", "Decision cache hits.", self.cache_hits()),
            ("mesa_cache_misses_total", "Decision cache misses.", self.cache_misses()),
            (
                "mesa_cache_invalidations_total",
                "Decision cache invalidations.",
                self.cache_invalidations(),
            ),
            (
                "mesa_cache_swept_total",
                "Expired decision cache entries swept.",
                self.cache_swept(),
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }
        output
    }
}
