/// Event published for the display layer. Produced by the session workers,
/// drained in enqueue order by the single UI consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Connection/progress line for the status area.
    Status(String),
    /// One formatted chat line (`name: text`).
    ChatLine(String),
    /// Full roster snapshot, already sorted.
    RosterUpdate(Vec<String>),
}
