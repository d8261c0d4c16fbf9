use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Metrics collector for observability
pub struct Metrics {
    /// Pre-trade captures applied
    pub captures_applied: AtomicU64,
    /// Fee recommendations above the payload floor
    pub fee_overrides: AtomicU64,
    /// Opportunities recorded by the pipeline
    pub opportunities_recorded: AtomicU64,
    /// Opportunities dropped as expired
    pub opportunities_expired: AtomicU64,
    /// Round trips completed and distributed
    pub executions_ok: AtomicU64,
    /// Claimed attempts unwound after a failure
    pub executions_failed: AtomicU64,
    /// Attempts rejected before any claim
    pub executions_rejected: AtomicU64,
    /// Profit distributions settled
    pub distributions: AtomicU64,
    /// Gated donation releases
    pub donations: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            captures_applied: AtomicU64::new(0),
            fee_overrides: AtomicU64::new(0),
            opportunities_recorded: AtomicU64::new(0),
            opportunities_expired: AtomicU64::new(0),
            executions_ok: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            executions_rejected: AtomicU64::new(0),
            distributions: AtomicU64::new(0),
            donations: AtomicU64::new(0),
        }
    }

    pub fn inc_captures_applied(&self) {
        self.captures_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fee_overrides(&self) {
        self.fee_overrides.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_opportunities_recorded(&self) {
        self.opportunities_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_opportunities_expired(&self) {
        self.opportunities_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_ok(&self) {
        self.executions_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_rejected(&self) {
        self.executions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_distributions(&self) {
        self.distributions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_donations(&self) {
        self.donations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics as a formatted string
    pub fn summary(&self) -> String {
        format!(
            r#"
=== RECOUP ENGINE STATUS ===
Captures: {} | Fee Overrides: {}
Opportunities: {} recorded / {} expired
Executions: {} ok / {} failed / {} rejected
Distributions: {} | Donations: {}
============================
"#,
            self.captures_applied.load(Ordering::Relaxed),
            self.fee_overrides.load(Ordering::Relaxed),
            self.opportunities_recorded.load(Ordering::Relaxed),
            self.opportunities_expired.load(Ordering::Relaxed),
            self.executions_ok.load(Ordering::Relaxed),
            self.executions_failed.load(Ordering::Relaxed),
            self.executions_rejected.load(Ordering::Relaxed),
            self.distributions.load(Ordering::Relaxed),
            self.donations.load(Ordering::Relaxed),
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        info!("{}", self.summary());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
