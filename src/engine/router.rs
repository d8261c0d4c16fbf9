//! Agent governance and failover
//!
//! The router owns one slot per decision category. The trade path only
//! ever reads the active binding; every mutation (hot swap, backup
//! arming, enable toggles, reputation failover) goes through owner-gated
//! operations. Reputation lookups run outside the slot lock so a slow
//! registry can never stall a trade.

use crate::clients::ReputationClient;
use crate::engine::access::AccessRegistry;
use crate::engine::agents::{BackrunAgent, CaptureAgent, FeeAgent};
use crate::error::{RecoupError, Result};
use alloy::primitives::{Address, I256};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Identities the default agents are registered under at construction.
pub const DEFAULT_CAPTURE_AGENT: Address = Address::with_last_byte(0x01);
pub const DEFAULT_FEE_AGENT: Address = Address::with_last_byte(0x02);
pub const DEFAULT_BACKRUN_AGENT: Address = Address::with_last_byte(0x03);

/// Shared ownership of a bound agent implementation.
pub type AgentHandle<T> = Arc<T>;

/// The three pluggable decision points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecisionCategory {
    Capture,
    Fee,
    Backrun,
}

impl DecisionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionCategory::Capture => "capture",
            DecisionCategory::Fee => "fee",
            DecisionCategory::Backrun => "backrun",
        }
    }

    pub fn all() -> [DecisionCategory; 3] {
        [
            DecisionCategory::Capture,
            DecisionCategory::Fee,
            DecisionCategory::Backrun,
        ]
    }
}

impl fmt::Display for DecisionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reputation-based failover settings for one category.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    /// Primary is considered failed strictly below this score (signed WAD)
    pub min_reputation_wad: I256,
    /// Observers whose attestations count for the summary
    pub observers: Vec<Address>,
    pub tag1: String,
    pub tag2: String,
    /// Master switch for automatic failover in this category
    pub enabled: bool,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            min_reputation_wad: I256::ZERO,
            observers: Vec::new(),
            tag1: String::new(),
            tag2: String::new(),
            enabled: false,
        }
    }
}

/// A bound agent implementation plus its registry identity.
pub struct AgentBinding<T: ?Sized> {
    pub address: Address,
    pub handle: AgentHandle<T>,
}

impl<T: ?Sized> Clone for AgentBinding<T> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            handle: self.handle.clone(),
        }
    }
}

/// Primary/backup pair for one decision category.
pub struct AgentSlot<T: ?Sized> {
    pub primary: Option<AgentBinding<T>>,
    pub backup: Option<AgentBinding<T>>,
    pub enabled: bool,
    pub switch: SwitchConfig,
}

impl<T: ?Sized> Default for AgentSlot<T> {
    fn default() -> Self {
        Self {
            primary: None,
            backup: None,
            enabled: true,
            switch: SwitchConfig::default(),
        }
    }
}

impl<T: ?Sized> AgentSlot<T> {
    fn active(&self) -> Option<AgentBinding<T>> {
        if self.enabled {
            self.primary.clone()
        } else {
            None
        }
    }

    fn primary_address(&self) -> Option<Address> {
        self.primary.as_ref().map(|binding| binding.address)
    }

    fn backup_address(&self) -> Option<Address> {
        self.backup.as_ref().map(|binding| binding.address)
    }
}

/// What `check_and_switch_if_below_threshold` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Backup promoted, old primary demoted to backup
    Switched,
    /// Reputation at or above the configured minimum
    AboveThreshold,
    /// Automatic failover disabled for the category
    SwitchingDisabled,
    /// No backup to promote
    NoBackup,
    /// Nothing bound as primary
    NoPrimary,
    /// The slot changed between the reputation read and the swap
    Preempted,
}

impl SwitchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchOutcome::Switched => "SWITCHED",
            SwitchOutcome::AboveThreshold => "ABOVE_THRESHOLD",
            SwitchOutcome::SwitchingDisabled => "SWITCHING_DISABLED",
            SwitchOutcome::NoBackup => "NO_BACKUP",
            SwitchOutcome::NoPrimary => "NO_PRIMARY",
            SwitchOutcome::Preempted => "PREEMPTED",
        }
    }
}

impl fmt::Display for SwitchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of one slot for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSlotStatus {
    pub category: DecisionCategory,
    pub primary: Option<Address>,
    pub backup: Option<Address>,
    pub enabled: bool,
    pub switch_enabled: bool,
}

/// Governed dispatch of decision categories to agent implementations.
pub struct AgentRouter {
    access: Arc<AccessRegistry>,
    reputation: Arc<dyn ReputationClient>,
    capture: RwLock<AgentSlot<dyn CaptureAgent>>,
    fee: RwLock<AgentSlot<dyn FeeAgent>>,
    backrun: RwLock<AgentSlot<dyn BackrunAgent>>,
}

impl AgentRouter {
    /// Router with empty slots; nothing dispatches until agents register.
    pub fn new(access: Arc<AccessRegistry>, reputation: Arc<dyn ReputationClient>) -> Self {
        Self {
            access,
            reputation,
            capture: RwLock::new(AgentSlot::default()),
            fee: RwLock::new(AgentSlot::default()),
            backrun: RwLock::new(AgentSlot::default()),
        }
    }

    /// Router with the given implementations pre-bound as primaries under
    /// the well-known default identities.
    pub fn with_defaults(
        access: Arc<AccessRegistry>,
        reputation: Arc<dyn ReputationClient>,
        capture: AgentHandle<dyn CaptureAgent>,
        fee: AgentHandle<dyn FeeAgent>,
        backrun: AgentHandle<dyn BackrunAgent>,
    ) -> Self {
        Self {
            access,
            reputation,
            capture: RwLock::new(AgentSlot {
                primary: Some(AgentBinding {
                    address: DEFAULT_CAPTURE_AGENT,
                    handle: capture,
                }),
                ..AgentSlot::default()
            }),
            fee: RwLock::new(AgentSlot {
                primary: Some(AgentBinding {
                    address: DEFAULT_FEE_AGENT,
                    handle: fee,
                }),
                ..AgentSlot::default()
            }),
            backrun: RwLock::new(AgentSlot {
                primary: Some(AgentBinding {
                    address: DEFAULT_BACKRUN_AGENT,
                    handle: backrun,
                }),
                ..AgentSlot::default()
            }),
        }
    }

    // =========================================================================
    // Hot path reads
    // =========================================================================

    pub async fn capture_agent(&self) -> Option<AgentBinding<dyn CaptureAgent>> {
        self.capture.read().await.active()
    }

    pub async fn fee_agent(&self) -> Option<AgentBinding<dyn FeeAgent>> {
        self.fee.read().await.active()
    }

    pub async fn backrun_agent(&self) -> Option<AgentBinding<dyn BackrunAgent>> {
        self.backrun.read().await.active()
    }

    // =========================================================================
    // Owner-gated governance
    // =========================================================================

    /// Bind a new primary. Takes effect on the very next decision; any
    /// in-flight decision finishes on the old binding.
    pub async fn register_capture_agent(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn CaptureAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_primary(&self.capture, DecisionCategory::Capture, address, handle).await
    }

    pub async fn register_fee_agent(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn FeeAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_primary(&self.fee, DecisionCategory::Fee, address, handle).await
    }

    pub async fn register_backrun_agent(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn BackrunAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_primary(&self.backrun, DecisionCategory::Backrun, address, handle).await
    }

    pub async fn set_capture_backup(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn CaptureAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_backup(&self.capture, DecisionCategory::Capture, address, handle).await
    }

    pub async fn set_fee_backup(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn FeeAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_backup(&self.fee, DecisionCategory::Fee, address, handle).await
    }

    pub async fn set_backrun_backup(
        &self,
        caller: Address,
        address: Address,
        handle: AgentHandle<dyn BackrunAgent>,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        Self::bind_backup(&self.backrun, DecisionCategory::Backrun, address, handle).await
    }

    /// Category kill switch; disabled slots dispatch nothing.
    pub async fn set_enabled(
        &self,
        caller: Address,
        category: DecisionCategory,
        enabled: bool,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        match category {
            DecisionCategory::Capture => self.capture.write().await.enabled = enabled,
            DecisionCategory::Fee => self.fee.write().await.enabled = enabled,
            DecisionCategory::Backrun => self.backrun.write().await.enabled = enabled,
        }
        info!(category = %category, enabled, "agent category toggled");
        Ok(())
    }

    pub async fn set_switch_config(
        &self,
        caller: Address,
        category: DecisionCategory,
        config: SwitchConfig,
    ) -> Result<()> {
        self.access.ensure_owner(caller)?;
        info!(
            category = %category,
            enabled = config.enabled,
            min_reputation = %config.min_reputation_wad,
            observers = config.observers.len(),
            "switch config updated"
        );
        match category {
            DecisionCategory::Capture => self.capture.write().await.switch = config,
            DecisionCategory::Fee => self.fee.write().await.switch = config,
            DecisionCategory::Backrun => self.backrun.write().await.switch = config,
        }
        Ok(())
    }

    /// Manual failover: swap primary and backup for the category.
    pub async fn switch_to_backup(&self, caller: Address, category: DecisionCategory) -> Result<()> {
        self.access.ensure_owner(caller)?;
        match category {
            DecisionCategory::Capture => Self::swap_bindings(&self.capture, category).await,
            DecisionCategory::Fee => Self::swap_bindings(&self.fee, category).await,
            DecisionCategory::Backrun => Self::swap_bindings(&self.backrun, category).await,
        }
    }

    /// Reputation-gated failover.
    ///
    /// The summary lookup runs without holding the slot lock; before
    /// swapping, the primary is re-verified so a governance action that
    /// raced the lookup turns this into a no-op.
    pub async fn check_and_switch_if_below_threshold(
        &self,
        caller: Address,
        category: DecisionCategory,
    ) -> Result<SwitchOutcome> {
        self.access.ensure_owner(caller)?;
        match category {
            DecisionCategory::Capture => self.check_slot(category, &self.capture).await,
            DecisionCategory::Fee => self.check_slot(category, &self.fee).await,
            DecisionCategory::Backrun => self.check_slot(category, &self.backrun).await,
        }
    }

    pub async fn status(&self, category: DecisionCategory) -> AgentSlotStatus {
        match category {
            DecisionCategory::Capture => Self::slot_status(&self.capture, category).await,
            DecisionCategory::Fee => Self::slot_status(&self.fee, category).await,
            DecisionCategory::Backrun => Self::slot_status(&self.backrun, category).await,
        }
    }

    // =========================================================================
    // Slot plumbing
    // =========================================================================

    async fn bind_primary<T: ?Sized>(
        slot: &RwLock<AgentSlot<T>>,
        category: DecisionCategory,
        address: Address,
        handle: AgentHandle<T>,
    ) -> Result<()> {
        if address == Address::ZERO {
            return Err(RecoupError::Validation(
                "agent address must not be zero".to_string(),
            ));
        }
        let mut guard = slot.write().await;
        let replaced = guard.primary_address();
        guard.primary = Some(AgentBinding { address, handle });
        info!(category = %category, agent = %address, ?replaced, "primary agent registered");
        Ok(())
    }

    async fn bind_backup<T: ?Sized>(
        slot: &RwLock<AgentSlot<T>>,
        category: DecisionCategory,
        address: Address,
        handle: AgentHandle<T>,
    ) -> Result<()> {
        if address == Address::ZERO {
            return Err(RecoupError::Validation(
                "agent address must not be zero".to_string(),
            ));
        }
        let mut guard = slot.write().await;
        guard.backup = Some(AgentBinding { address, handle });
        info!(category = %category, agent = %address, "backup agent armed");
        Ok(())
    }

    async fn swap_bindings<T: ?Sized>(
        slot: &RwLock<AgentSlot<T>>,
        category: DecisionCategory,
    ) -> Result<()> {
        let mut guard = slot.write().await;
        if guard.backup.is_none() {
            return Err(RecoupError::Validation(format!(
                "no backup agent bound for category {}",
                category
            )));
        }
        let slot_ref = &mut *guard;
        std::mem::swap(&mut slot_ref.primary, &mut slot_ref.backup);
        info!(
            category = %category,
            primary = ?guard.primary_address(),
            backup = ?guard.backup_address(),
            "manual failover executed"
        );
        Ok(())
    }

    async fn check_slot<T: ?Sized>(
        &self,
        category: DecisionCategory,
        slot: &RwLock<AgentSlot<T>>,
    ) -> Result<SwitchOutcome> {
        let (primary, config) = {
            let guard = slot.read().await;
            let Some(primary) = guard.primary_address() else {
                return Ok(SwitchOutcome::NoPrimary);
            };
            if !guard.switch.enabled {
                return Ok(SwitchOutcome::SwitchingDisabled);
            }
            if guard.backup.is_none() {
                return Ok(SwitchOutcome::NoBackup);
            }
            (primary, guard.switch.clone())
        };

        let summary = self
            .reputation
            .summary(primary, config.observers, config.tag1, config.tag2)
            .await?;
        let value = summary.value_wad();
        if value >= config.min_reputation_wad {
            debug!(
                category = %category,
                agent = %primary,
                value = %value,
                "reputation at or above threshold"
            );
            return Ok(SwitchOutcome::AboveThreshold);
        }

        let mut guard = slot.write().await;
        if guard.primary_address() != Some(primary) || guard.backup.is_none() {
            return Ok(SwitchOutcome::Preempted);
        }
        let slot_ref = &mut *guard;
        std::mem::swap(&mut slot_ref.primary, &mut slot_ref.backup);
        info!(
            category = %category,
            demoted = %primary,
            promoted = ?guard.primary_address(),
            value = %value,
            threshold = %config.min_reputation_wad,
            "reputation below threshold, backup promoted"
        );
        Ok(SwitchOutcome::Switched)
    }

    async fn slot_status<T: ?Sized>(
        slot: &RwLock<AgentSlot<T>>,
        category: DecisionCategory,
    ) -> AgentSlotStatus {
        let guard = slot.read().await;
        AgentSlotStatus {
            category,
            primary: guard.primary_address(),
            backup: guard.backup_address(),
            enabled: guard.enabled,
            switch_enabled: guard.switch.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sim::SimReputation;
    use crate::engine::agents::PreTradeContext;
    use crate::engine::divergence::AnalysisOutcome;
    use alloy::primitives::address;

    const OWNER: Address = address!("00000000000000000000000000000000000000aa");
    const PIPELINE: Address = address!("00000000000000000000000000000000000000bb");
    const STRANGER: Address = address!("00000000000000000000000000000000000000cc");

    const AGENT_A: Address = address!("00000000000000000000000000000000000000a1");
    const AGENT_B: Address = address!("00000000000000000000000000000000000000b1");

    struct StaticCapture(&'static str);

    impl CaptureAgent for StaticCapture {
        fn name(&self) -> &str {
            self.0
        }

        fn decide(&self, _ctx: &PreTradeContext) -> Result<AnalysisOutcome> {
            Ok(AnalysisOutcome::NoReference)
        }
    }

    fn neg_half_wad() -> I256 {
        I256::exp10(17) * I256::try_from(-5i64).unwrap()
    }

    fn test_router(default_score: I256) -> AgentRouter {
        let access = Arc::new(AccessRegistry::new(OWNER, PIPELINE, vec![]));
        let reputation = Arc::new(SimReputation::new(default_score));
        AgentRouter::new(access, reputation)
    }

    async fn bind_primary_and_backup(router: &AgentRouter) {
        router
            .register_capture_agent(OWNER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap();
        router
            .set_capture_backup(OWNER, AGENT_B, Arc::new(StaticCapture("b")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_is_owner_only_and_hot_swaps() {
        let router = test_router(I256::ZERO);

        let err = router
            .register_capture_agent(STRANGER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap_err();
        assert!(matches!(err, RecoupError::UnauthorizedCaller { .. }));
        assert!(router.capture_agent().await.is_none());

        router
            .register_capture_agent(OWNER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap();
        let active = router.capture_agent().await.unwrap();
        assert_eq!(active.address, AGENT_A);
        assert_eq!(active.handle.name(), "a");

        // Re-register replaces immediately
        router
            .register_capture_agent(OWNER, AGENT_B, Arc::new(StaticCapture("b")))
            .await
            .unwrap();
        assert_eq!(router.capture_agent().await.unwrap().address, AGENT_B);
    }

    #[tokio::test]
    async fn test_disabled_category_dispatches_nothing() {
        let router = test_router(I256::ZERO);
        router
            .register_capture_agent(OWNER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap();

        router
            .set_enabled(OWNER, DecisionCategory::Capture, false)
            .await
            .unwrap();
        assert!(router.capture_agent().await.is_none());

        router
            .set_enabled(OWNER, DecisionCategory::Capture, true)
            .await
            .unwrap();
        assert!(router.capture_agent().await.is_some());
    }

    #[tokio::test]
    async fn test_manual_switch_requires_backup() {
        let router = test_router(I256::ZERO);
        router
            .register_capture_agent(OWNER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap();

        assert!(router
            .switch_to_backup(OWNER, DecisionCategory::Capture)
            .await
            .is_err());

        router
            .set_capture_backup(OWNER, AGENT_B, Arc::new(StaticCapture("b")))
            .await
            .unwrap();
        router
            .switch_to_backup(OWNER, DecisionCategory::Capture)
            .await
            .unwrap();

        let status = router.status(DecisionCategory::Capture).await;
        assert_eq!(status.primary, Some(AGENT_B));
        assert_eq!(status.backup, Some(AGENT_A));
    }

    #[tokio::test]
    async fn test_reputation_switch_promotes_backup_once() {
        // Every agent scores -0.5 WAD unless overridden
        let router = test_router(neg_half_wad());
        bind_primary_and_backup(&router).await;
        router
            .set_switch_config(
                OWNER,
                DecisionCategory::Capture,
                SwitchConfig {
                    min_reputation_wad: I256::ZERO,
                    observers: vec![OWNER],
                    tag1: "correction".to_string(),
                    tag2: String::new(),
                    enabled: true,
                },
            )
            .await
            .unwrap();

        let outcome = router
            .check_and_switch_if_below_threshold(OWNER, DecisionCategory::Capture)
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);

        let status = router.status(DecisionCategory::Capture).await;
        assert_eq!(status.primary, Some(AGENT_B));
        assert_eq!(status.backup, Some(AGENT_A));
        assert_eq!(router.capture_agent().await.unwrap().handle.name(), "b");
    }

    #[tokio::test]
    async fn test_check_reports_noop_reasons() {
        let router = test_router(neg_half_wad());

        // Nothing bound yet
        assert_eq!(
            router
                .check_and_switch_if_below_threshold(OWNER, DecisionCategory::Capture)
                .await
                .unwrap(),
            SwitchOutcome::NoPrimary
        );

        router
            .register_capture_agent(OWNER, AGENT_A, Arc::new(StaticCapture("a")))
            .await
            .unwrap();
        assert_eq!(
            router
                .check_and_switch_if_below_threshold(OWNER, DecisionCategory::Capture)
                .await
                .unwrap(),
            SwitchOutcome::SwitchingDisabled
        );

        router
            .set_switch_config(
                OWNER,
                DecisionCategory::Capture,
                SwitchConfig {
                    enabled: true,
                    ..SwitchConfig::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            router
                .check_and_switch_if_below_threshold(OWNER, DecisionCategory::Capture)
                .await
                .unwrap(),
            SwitchOutcome::NoBackup
        );
    }

    #[tokio::test]
    async fn test_healthy_primary_is_left_alone() {
        // Healthy score for the primary only
        let reputation = SimReputation::new(neg_half_wad());
        reputation.set_score(AGENT_A, I256::exp10(18));
        let access = Arc::new(AccessRegistry::new(OWNER, PIPELINE, vec![]));
        let router = AgentRouter::new(access, Arc::new(reputation));
        bind_primary_and_backup(&router).await;
        router
            .set_switch_config(
                OWNER,
                DecisionCategory::Capture,
                SwitchConfig {
                    enabled: true,
                    ..SwitchConfig::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            router
                .check_and_switch_if_below_threshold(OWNER, DecisionCategory::Capture)
                .await
                .unwrap(),
            SwitchOutcome::AboveThreshold
        );
        assert_eq!(
            router.status(DecisionCategory::Capture).await.primary,
            Some(AGENT_A)
        );
    }
}
