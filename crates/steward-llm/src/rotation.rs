//! Credential rotation: slot health tracking, round-robin selection,
//! cooldown recovery, and retry backoff.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use steward_core::{StewardError, StewardResult};
use tracing::{debug, warn};

/// Configures retry and cooldown behaviour for a slot pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Maximum number of retries per completion call.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
    /// Whether to jitter each delay uniformly into `[d/2, d]`.
    pub jitter: bool,
    /// How long a rate-limited slot stays in cooldown.
    pub cooldown_seconds: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            jitter: true,
            cooldown_seconds: 60,
        }
    }
}

/// Health state of one rotation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Eligible for selection.
    Healthy,
    /// Rate-limited; recovers once the cooldown expires.
    Cooldown,
    /// Auth-rejected; never auto-recovers.
    Disabled,
}

/// One rotation-eligible credential unit.
#[derive(Debug, Clone)]
pub struct RotationSlot {
    /// Slot identifier (opaque to the manager; adapters map it back to a
    /// credential).
    pub id: String,
    /// Current health state.
    pub state: SlotState,
    /// The last error reported against this slot.
    pub last_error: Option<String>,
    /// When a cooldown expires, if in cooldown.
    pub cooldown_until: Option<Instant>,
    /// Selection weight; a slot appears `weight` times in the round-robin
    /// pool (minimum 1).
    pub weight: u32,
}

impl RotationSlot {
    /// Creates a healthy slot with weight 1.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SlotState::Healthy,
            last_error: None,
            cooldown_until: None,
            weight: 1,
        }
    }

    /// Sets the selection weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug)]
struct Inner {
    slots: Vec<RotationSlot>,
    rr_index: usize,
}

/// Tracks the health of a pool of interchangeable credentials for one
/// provider and selects among them round-robin.
///
/// All state transitions (selection with cooldown sweep, success and failure
/// reports) execute as one critical section per call, so a manager can be
/// shared across concurrent completions via `Arc`.
#[derive(Debug)]
pub struct RotationManager {
    policy: RotationPolicy,
    inner: Mutex<Inner>,
}

impl RotationManager {
    /// Creates an empty manager with the given policy.
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                rr_index: 0,
            }),
        }
    }

    /// The retry/cooldown policy in force.
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Adds a slot to the pool.
    pub fn add_slot(&self, slot: RotationSlot) {
        self.inner.lock().slots.push(slot);
    }

    /// Number of slots in the pool, regardless of state.
    pub fn slot_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Selects the next healthy slot.
    ///
    /// Expired cooldowns are swept back to healthy first; the pick is
    /// round-robin over the concatenation of each healthy slot's id repeated
    /// `weight` times. Fails with [`StewardError::NoAvailableSlot`] when the
    /// eligible pool is empty.
    pub fn select_slot(&self) -> StewardResult<RotationSlot> {
        let mut inner = self.inner.lock();

        let now = Instant::now();
        for slot in &mut inner.slots {
            if slot.state == SlotState::Cooldown
                && slot.cooldown_until.is_some_and(|until| now >= until)
            {
                debug!(slot = %slot.id, "cooldown expired, slot healthy again");
                slot.state = SlotState::Healthy;
                slot.cooldown_until = None;
                slot.last_error = None;
            }
        }

        let pool: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == SlotState::Healthy)
            .flat_map(|(i, slot)| std::iter::repeat(i).take(slot.weight.max(1) as usize))
            .collect();

        if pool.is_empty() {
            return Err(StewardError::NoAvailableSlot);
        }

        let picked = pool[inner.rr_index % pool.len()];
        inner.rr_index = inner.rr_index.wrapping_add(1);
        Ok(inner.slots[picked].clone())
    }

    /// Reports a successful call: the slot returns to healthy.
    pub fn report_success(&self, slot_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == slot_id) {
            slot.state = SlotState::Healthy;
            slot.last_error = None;
            slot.cooldown_until = None;
        }
    }

    /// Reports a rate-limit/quota failure: the slot enters cooldown until
    /// `now + cooldown_seconds`.
    pub fn report_rate_limit(&self, slot_id: &str, reason: Option<&str>) {
        let cooldown = std::time::Duration::from_secs(self.policy.cooldown_seconds);
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == slot_id) {
            warn!(slot = %slot.id, "rate limited, entering cooldown");
            slot.state = SlotState::Cooldown;
            slot.last_error = Some(reason.unwrap_or("rate_limit").to_string());
            slot.cooldown_until = Some(Instant::now() + cooldown);
        }
    }

    /// Reports an auth failure: the slot is disabled permanently.
    pub fn report_auth_error(&self, slot_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == slot_id) {
            warn!(slot = %slot.id, "auth rejected, slot disabled");
            slot.state = SlotState::Disabled;
            slot.last_error = Some("auth_error".to_string());
            slot.cooldown_until = None;
        }
    }

    /// Disables a slot manually.
    pub fn disable_slot(&self, slot_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == slot_id) {
            slot.state = SlotState::Disabled;
        }
    }

    /// A point-in-time copy of one slot, for observability and tests.
    pub fn snapshot(&self, slot_id: &str) -> Option<RotationSlot> {
        self.inner
            .lock()
            .slots
            .iter()
            .find(|s| s.id == slot_id)
            .cloned()
    }

    /// Sleeps for the backoff delay of the given attempt (1-based):
    /// `min(cap, base * 2^(attempt-1))` ms, jittered into `[d/2, d]` when
    /// the policy asks for it. The sole intentional suspension point of the
    /// rotation layer.
    pub async fn backoff(&self, attempt: u32) {
        let delay_ms = self.backoff_delay_ms(attempt);
        debug!(attempt, delay_ms, "backing off before retry");
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    }

    fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1);
        let base = self
            .policy
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.policy.backoff_max_ms);
        if self.policy.jitter && base > 0 {
            use rand::Rng;
            rand::rng().random_range(base / 2..=base)
        } else {
            base
        }
    }
}

impl Default for RotationManager {
    fn default() -> Self {
        Self::new(RotationPolicy::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn manager_with(ids: &[&str]) -> RotationManager {
        let manager = RotationManager::default();
        for id in ids {
            manager.add_slot(RotationSlot::new(*id));
        }
        manager
    }

    #[test]
    fn round_robin_over_healthy_slots() {
        let manager = manager_with(&["a", "b"]);
        assert_eq!(manager.select_slot().unwrap().id, "a");
        assert_eq!(manager.select_slot().unwrap().id, "b");
        assert_eq!(manager.select_slot().unwrap().id, "a");
    }

    #[test]
    fn weight_repeats_slot_in_pool() {
        let manager = RotationManager::default();
        manager.add_slot(RotationSlot::new("heavy").with_weight(2));
        manager.add_slot(RotationSlot::new("light"));

        let picks: Vec<String> = (0..3).map(|_| manager.select_slot().unwrap().id).collect();
        assert_eq!(picks, ["heavy", "heavy", "light"]);
    }

    #[test]
    fn rate_limit_moves_slot_to_cooldown() {
        let manager = manager_with(&["a", "b"]);
        manager.report_rate_limit("a", Some("429"));

        let snap = manager.snapshot("a").unwrap();
        assert_eq!(snap.state, SlotState::Cooldown);
        assert_eq!(snap.last_error.as_deref(), Some("429"));

        // Only b remains eligible.
        assert_eq!(manager.select_slot().unwrap().id, "b");
        assert_eq!(manager.select_slot().unwrap().id, "b");
    }

    #[test]
    fn expired_cooldown_is_swept_on_select() {
        let policy = RotationPolicy {
            cooldown_seconds: 0,
            ..RotationPolicy::default()
        };
        let manager = RotationManager::new(policy);
        manager.add_slot(RotationSlot::new("a"));
        manager.report_rate_limit("a", None);
        assert_eq!(manager.snapshot("a").unwrap().state, SlotState::Cooldown);

        // cooldown_seconds=0 expires immediately; select sweeps it back.
        let slot = manager.select_slot().unwrap();
        assert_eq!(slot.id, "a");
        assert_eq!(slot.state, SlotState::Healthy);
    }

    #[test]
    fn auth_error_disables_permanently() {
        let manager = manager_with(&["a"]);
        manager.report_auth_error("a");
        assert_eq!(manager.snapshot("a").unwrap().state, SlotState::Disabled);
        assert!(matches!(
            manager.select_slot(),
            Err(StewardError::NoAvailableSlot)
        ));

        // Disabled slots never auto-recover, even via report_success of
        // other slots or further selects.
        assert!(manager.select_slot().is_err());
    }

    #[test]
    fn success_restores_cooldown_slot() {
        let manager = manager_with(&["a"]);
        manager.report_rate_limit("a", None);
        manager.report_success("a");
        assert_eq!(manager.snapshot("a").unwrap().state, SlotState::Healthy);
    }

    #[test]
    fn empty_pool_fails_selection() {
        let manager = RotationManager::default();
        assert!(matches!(
            manager.select_slot(),
            Err(StewardError::NoAvailableSlot)
        ));
    }

    #[test]
    fn backoff_delay_is_capped_exponential() {
        let policy = RotationPolicy {
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            jitter: false,
            cooldown_seconds: 60,
        };
        let manager = RotationManager::new(policy);

        assert_eq!(manager.backoff_delay_ms(1), 500); // 500 * 2^0
        assert_eq!(manager.backoff_delay_ms(2), 1_000); // 500 * 2^1
        assert_eq!(manager.backoff_delay_ms(3), 2_000);
        assert_eq!(manager.backoff_delay_ms(4), 4_000);
        assert_eq!(manager.backoff_delay_ms(5), 8_000); // capped
        assert_eq!(manager.backoff_delay_ms(6), 8_000);
    }

    #[test]
    fn jittered_delay_stays_in_half_open_band() {
        let policy = RotationPolicy {
            jitter: true,
            backoff_base_ms: 1_000,
            backoff_max_ms: 8_000,
            ..RotationPolicy::default()
        };
        let manager = RotationManager::new(policy);
        for _ in 0..50 {
            let d = manager.backoff_delay_ms(2); // base delay 2000
            assert!((1_000..=2_000).contains(&d), "delay {d} out of band");
        }
    }
}
