use std::sync::{Arc, Mutex, MutexGuard};

use crate::pipeline::edge::{EdgeControl, EdgeId, EdgeStats};
use crate::pipeline::stage::{StageId, StageKind, StageState};

pub(crate) struct StageCell {
    pub(crate) id: StageId,
    pub(crate) name: String,
    pub(crate) kind: StageKind,
    state: Mutex<StageState>,
}

impl StageCell {
    pub(crate) fn new(id: StageId, name: String, kind: StageKind) -> Self {
        Self {
            id,
            name,
            kind,
            state: Mutex::new(StageState::Idle),
        }
    }

    pub(crate) fn state(&self) -> StageState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Terminal states are final; later transitions are ignored.
    pub(crate) fn set(&self, next: StageState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_terminal() {
            *state = next;
        }
    }
}

#[derive(Default)]
struct Registry {
    stages: Vec<Arc<StageCell>>,
    edges: Vec<Arc<dyn EdgeControl>>,
}

/// Read-only view of a pipeline that stays usable while it runs.
///
/// Clone it before calling `run` and query it from another task.
#[derive(Clone, Default)]
pub struct Monitor {
    registry: Arc<Mutex<Registry>>,
}

impl Monitor {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn register_stage(&self, cell: Arc<StageCell>) {
        self.lock().stages.push(cell);
    }

    pub(crate) fn register_edge(&self, edge: Arc<dyn EdgeControl>) {
        self.lock().edges.push(edge);
    }

    pub(crate) fn stage_cell(&self, id: StageId) -> Option<Arc<StageCell>> {
        self.lock().stages.get(id.0).cloned()
    }

    pub(crate) fn edge_controls(&self) -> Vec<Arc<dyn EdgeControl>> {
        self.lock().edges.clone()
    }

    pub(crate) fn stage_cells(&self) -> Vec<Arc<StageCell>> {
        self.lock().stages.clone()
    }

    pub fn stage_state(&self, id: StageId) -> Option<StageState> {
        self.stage_cell(id).map(|cell| cell.state())
    }

    pub fn edge_stats(&self, id: EdgeId) -> Option<EdgeStats> {
        self.lock().edges.get(id.0).map(|edge| edge.stats())
    }

    pub fn all_edge_stats(&self) -> Vec<EdgeStats> {
        self.lock().edges.iter().map(|edge| edge.stats()).collect()
    }
}
