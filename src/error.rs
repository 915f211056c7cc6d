use thiserror::Error;

/// Errors that abort assembly of a whole chapter.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no source images supplied")]
    EmptyInput,
    #[error("source image {index} has zero size ({width}x{height})")]
    EmptySource { index: usize, width: u32, height: u32 },
    #[error("offset table does not tile the canvas: {reason}")]
    InconsistentOffset { reason: String },
    #[error("invalid split plan: {reason}")]
    InvalidPlan { reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("coarse text detection failed: {0}")]
    CoarseDetection(String),
}

impl AssemblyError {
    pub(crate) fn offsets(reason: impl Into<String>) -> Self {
        AssemblyError::InconsistentOffset {
            reason: reason.into(),
        }
    }

    pub(crate) fn plan(reason: impl Into<String>) -> Self {
        AssemblyError::InvalidPlan {
            reason: reason.into(),
        }
    }
}

/// Failures confined to a single sub-panel. Siblings keep going.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PanelError {
    #[error("sub-panel {0} was cancelled")]
    Cancelled(usize),
    #[error("text detection failed on sub-panel {index}: {message}")]
    Detection { index: usize, message: String },
    #[error("worker for sub-panel {index} stopped: {message}")]
    Worker { index: usize, message: String },
    #[error("failed to persist sub-panel {index}: {message}")]
    Persist { index: usize, message: String },
    #[error("downstream stage failed on sub-panel {index}: {message}")]
    Downstream { index: usize, message: String },
}

impl PanelError {
    pub fn index(&self) -> usize {
        match self {
            PanelError::Cancelled(index) => *index,
            PanelError::Detection { index, .. }
            | PanelError::Worker { index, .. }
            | PanelError::Persist { index, .. }
            | PanelError::Downstream { index, .. } => *index,
        }
    }
}
