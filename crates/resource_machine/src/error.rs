use thiserror::Error;

/// Failures detected while binding a descriptor or talking to a running
/// interpreter. Service rejections are not engine errors; they travel through
/// the machine as events.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("machine '{machine}': initial state '{state}' is not defined")]
    UnknownInitialState { machine: String, state: String },
    #[error("machine '{machine}': state '{from}' targets undefined state '{target}'")]
    UnknownTarget {
        machine: String,
        from: String,
        target: String,
    },
    #[error("machine '{machine}': action '{action}' used in state '{state}' has no implementation")]
    MissingAction {
        machine: String,
        state: String,
        action: String,
    },
    #[error("machine '{machine}': guard '{guard}' used in state '{state}' has no implementation")]
    MissingGuard {
        machine: String,
        state: String,
        guard: String,
    },
    #[error("machine '{machine}': context defaults are malformed: {source}")]
    InvalidContext {
        machine: String,
        source: serde_json::Error,
    },
    #[error("machine '{0}' is stopped")]
    Stopped(String),
}
