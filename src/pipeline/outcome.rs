use crate::error::{Error, Result};
use crate::pipeline::edge::{EdgeId, EdgeStats};
use crate::pipeline::stage::{StageId, StageKind, StageState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Building,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// The single terminal result of a run.
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    /// First stage failure; later failures during teardown are only logged.
    Failed {
        stage: StageId,
        name: String,
        cause: Error,
    },
    /// The caller's token fired before natural completion.
    Aborted { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub(crate) fn state(&self) -> PipelineState {
        match self {
            Self::Succeeded => PipelineState::Succeeded,
            Self::Failed { .. } => PipelineState::Failed,
            Self::Aborted { .. } => PipelineState::Aborted,
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Succeeded => Ok(()),
            Self::Failed { name, cause, .. } => Err(Error::stage_failure(name, cause)),
            Self::Aborted { reason } => Err(Error::Aborted { reason }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub id: StageId,
    pub name: String,
    pub kind: StageKind,
    pub state: StageState,
}

/// Everything known about a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub stages: Vec<StageReport>,
    pub edges: Vec<EdgeStats>,
}

impl RunReport {
    pub fn stage(&self, id: StageId) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeStats> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// `Ok(self)` on success, otherwise the outcome as an [`Error`].
    pub fn into_result(self) -> Result<Self> {
        let RunReport {
            outcome,
            stages,
            edges,
        } = self;
        outcome.into_result()?;
        Ok(RunReport {
            outcome: Outcome::Succeeded,
            stages,
            edges,
        })
    }
}
