use super::*;

/// Pool-originated occurrences the coordinator subscribes to, replacing the
/// source's per-event callback plurality with a single tagged channel.
#[derive(Debug, Clone)]
pub enum Event {
    Connected,
    Subscribed { extranonce1: Extranonce, extranonce2_size: usize },
    Authorized(bool),
    Job(Notify),
    SetDifficulty(f64),
    SubmitResult { id: u64, accepted: bool },
    Disconnected,
}
