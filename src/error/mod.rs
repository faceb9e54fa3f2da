use thiserror::Error;

use crate::pipeline::edge::EdgeId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("invalid pipeline graph: {message}")]
    Graph { message: String },

    #[error("stage `{stage}` error: {message}")]
    Stage { stage: String, message: String },

    /// Terminal outcome of a failed run: the failing stage and its cause.
    #[error("stage `{stage}` failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{edge} is closed")]
    EdgeClosed { edge: EdgeId },

    #[error("pipeline aborted by caller: {reason}")]
    Aborted { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "ndjson")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn stage_failure(stage: impl Into<String>, source: Error) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    pub fn is_edge_closed(&self) -> bool {
        matches!(self, Self::EdgeClosed { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
