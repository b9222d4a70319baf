use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use super::bus::EventBus;

/// How long after the end-of-roster reply presence joins are still treated
/// as pre-existing viewers rather than new arrivals.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(30);

/// Timed switch that keeps the join burst delivered right after entering a
/// channel from triggering audible greetings. Starts suppressed; opened
/// exactly once per session and never closed again.
#[derive(Clone)]
pub struct JoinBurstGate {
    suppressed: Arc<AtomicBool>,
}

impl JoinBurstGate {
    fn new() -> Self {
        Self {
            suppressed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Relaxed)
    }

    fn open(&self) {
        self.suppressed.store(false, Ordering::Relaxed);
    }
}

/// The viewers currently known in the channel. Owned by the ingestion task;
/// the display layer only ever sees sorted snapshots through the bus, and a
/// fresh registry is built per session so no state leaks across connects.
pub struct ViewerRegistry {
    viewers: BTreeSet<String>,
    gate: JoinBurstGate,
    bus: EventBus,
    timer_armed: bool,
}

impl ViewerRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            viewers: BTreeSet::new(),
            gate: JoinBurstGate::new(),
            bus,
            timer_armed: false,
        }
    }

    /// Add a viewer and publish the updated roster. Returns true when the
    /// name was not known yet. Idempotent.
    pub fn join(&mut self, user: &str) -> bool {
        let added = self.viewers.insert(user.to_lowercase());
        if added {
            debug!(%user, viewers = self.viewers.len(), "viewer joined");
        }
        self.publish_roster();
        added
    }

    /// Remove a viewer and publish the updated roster. Idempotent.
    pub fn part(&mut self, user: &str) {
        let removed = self.viewers.remove(&user.to_lowercase());
        if removed {
            debug!(%user, viewers = self.viewers.len(), "viewer left");
        }
        self.publish_roster();
    }

    /// A message author not seen before counts as an implicit join — some
    /// viewers are only knowable from their first chat line. Returns true
    /// when this was one.
    pub fn observe_sender(&mut self, user: &str) -> bool {
        if self.viewers.contains(&user.to_lowercase()) {
            return false;
        }
        self.join(user)
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Sorted snapshot of the current roster.
    pub fn snapshot(&self) -> Vec<String> {
        self.viewers.iter().cloned().collect()
    }

    pub fn is_suppressed(&self) -> bool {
        self.gate.is_suppressed()
    }

    /// Called on the end-of-roster reply: schedules the one-shot gate opening
    /// after `window`. Re-arming is a no-op — the gate opens once per session
    /// and stays open.
    pub fn arm_suppression_timer(&mut self, window: Duration) {
        if self.timer_armed {
            return;
        }
        self.timer_armed = true;
        let gate = self.gate.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            gate.open();
            info!("join burst window elapsed, greetings enabled");
            bus.status("Initial join period over. Greeter is now active!");
        });
    }

    fn publish_roster(&self) {
        self.bus.roster(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::UiEvent;

    fn registry() -> (ViewerRegistry, tokio::sync::mpsc::UnboundedReceiver<UiEvent>) {
        let (bus, rx) = EventBus::new();
        (ViewerRegistry::new(bus), rx)
    }

    #[tokio::test]
    async fn test_repeated_joins_count_distinct_names() {
        let (mut reg, _rx) = registry();
        for user in ["alice", "Alice", "bob", "ALICE", "bob"] {
            reg.join(user);
        }
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.snapshot(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_join_reports_new_names_only() {
        let (mut reg, _rx) = registry();
        assert!(reg.join("alice"));
        assert!(!reg.join("alice"));
        assert!(!reg.join("Alice"));
    }

    #[tokio::test]
    async fn test_part_is_idempotent() {
        let (mut reg, _rx) = registry();
        reg.join("alice");
        reg.part("alice");
        reg.part("alice");
        reg.part("never_joined");
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_observe_sender_implicit_join_once() {
        let (mut reg, _rx) = registry();
        assert!(reg.observe_sender("Carol"));
        assert!(!reg.observe_sender("carol"));
        assert!(!reg.observe_sender("Carol"));
        assert_eq!(reg.snapshot(), vec!["carol"]);
    }

    #[tokio::test]
    async fn test_every_membership_call_publishes_sorted_roster() {
        let (mut reg, mut rx) = registry();
        reg.join("zoe");
        reg.join("alice");
        reg.part("nobody");

        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::RosterUpdate(vec!["zoe".into()])
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::RosterUpdate(vec!["alice".into(), "zoe".into()])
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::RosterUpdate(vec!["alice".into(), "zoe".into()])
        );
    }

    #[tokio::test]
    async fn test_suppressed_until_timer_fires() {
        let (mut reg, _rx) = registry();
        assert!(reg.is_suppressed());
        reg.arm_suppression_timer(Duration::from_millis(10));
        assert!(reg.is_suppressed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reg.is_suppressed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_opens_after_full_window_and_reports() {
        let (bus, mut rx) = EventBus::new();
        let mut reg = ViewerRegistry::new(bus);
        reg.arm_suppression_timer(SUPPRESSION_WINDOW);

        tokio::time::sleep(SUPPRESSION_WINDOW - Duration::from_secs(1)).await;
        assert!(reg.is_suppressed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!reg.is_suppressed());
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::Status("Initial join period over. Greeter is now active!".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_is_a_no_op() {
        let (bus, mut rx) = EventBus::new();
        let mut reg = ViewerRegistry::new(bus);
        reg.arm_suppression_timer(Duration::from_secs(1));
        reg.arm_suppression_timer(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!reg.is_suppressed());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "gate must only report once");
    }
}
