use crate::history::refresh::HistorySnapshot;

/// Response messages from background operations
pub enum ResponseMessage {
    HistoryLoaded {
        generation: u64,
        snapshot: HistorySnapshot,
    },
    RefreshCancelled {
        generation: u64,
    },
}

impl ResponseMessage {
    /// Refresh generation the message belongs to
    pub fn generation(&self) -> u64 {
        match self {
            ResponseMessage::HistoryLoaded { generation, .. }
            | ResponseMessage::RefreshCancelled { generation } => *generation,
        }
    }
}
