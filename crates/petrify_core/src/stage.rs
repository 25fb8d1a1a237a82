use std::fmt;

/// Lifecycle of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportStage {
    #[default]
    Idle,
    Preparing,
    Fetching,
    Copying,
    Archiving,
    Done,
    Failed,
}

/// Inputs that move an export run forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Start,
    Prepared,
    FetchesFinished,
    CopiesFinished,
    Archived,
    /// A run-level failure (staging dir or archive destination).
    Fatal,
}

impl ExportStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStage::Done | ExportStage::Failed)
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportStage::Idle => "idle",
            ExportStage::Preparing => "preparing",
            ExportStage::Fetching => "fetching",
            ExportStage::Copying => "copying",
            ExportStage::Archiving => "archiving",
            ExportStage::Done => "done",
            ExportStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Pure transition function. Returns `None` for an event the stage does not accept.
///
/// `Failed` is only reachable from `Preparing` and `Archiving`; item-level
/// fetch and copy failures never produce a `Fatal` event.
pub fn advance(stage: ExportStage, event: StageEvent) -> Option<ExportStage> {
    use ExportStage::*;
    use StageEvent::*;

    match (stage, event) {
        (Idle, Start) => Some(Preparing),
        (Preparing, Prepared) => Some(Fetching),
        (Preparing, Fatal) => Some(Failed),
        (Fetching, FetchesFinished) => Some(Copying),
        (Copying, CopiesFinished) => Some(Archiving),
        (Archiving, Archived) => Some(Done),
        (Archiving, Fatal) => Some(Failed),
        _ => None,
    }
}
