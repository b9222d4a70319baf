use tokio::sync::mpsc;

use super::events::UiEvent;

/// Ordered, non-blocking conduit between the session workers and the UI
/// consumer. Cloneable; every producer holds its own handle. This channel is
/// the only way worker state reaches the display.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl EventBus {
    pub fn new() -> (EventBus, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventBus { tx }, rx)
    }

    /// Publish an event. A send failure means the consumer is gone
    /// (shutdown); it is ignored rather than propagated into the workers.
    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.publish(UiEvent::Status(text.into()));
    }

    pub fn chat_line(&self, text: impl Into<String>) {
        self.publish(UiEvent::ChatLine(text.into()));
    }

    pub fn roster(&self, viewers: Vec<String>) {
        self.publish(UiEvent::RosterUpdate(viewers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_publish_order() {
        let (bus, mut rx) = EventBus::new();
        bus.status("a");
        bus.chat_line("b");
        bus.roster(vec!["c".into()]);

        assert_eq!(rx.try_recv().unwrap(), UiEvent::Status("a".into()));
        assert_eq!(rx.try_recv().unwrap(), UiEvent::ChatLine("b".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::RosterUpdate(vec!["c".into()])
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_after_consumer_dropped_is_quiet() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        bus.status("nobody listening");
    }

    #[test]
    fn test_clones_feed_the_same_consumer() {
        let (bus, mut rx) = EventBus::new();
        let other = bus.clone();
        bus.status("one");
        other.status("two");
        assert_eq!(rx.try_recv().unwrap(), UiEvent::Status("one".into()));
        assert_eq!(rx.try_recv().unwrap(), UiEvent::Status("two".into()));
    }
}
