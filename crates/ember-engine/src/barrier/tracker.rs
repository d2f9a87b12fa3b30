use std::collections::HashMap;

use thiserror::Error;

use crate::command::{CommandError, CommandPipeline};
use crate::hal::{Backend, GpuCommand, ResourceId, ResourceState};

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("{0} is not tracked")]
    Untracked(ResourceId),

    #[error("{resource} transition claims {claimed} but it is {recorded}")]
    StateMismatch {
        resource: ResourceId,
        claimed: ResourceState,
        recorded: ResourceState,
    },

    #[error("{resource} transition from {state} to itself")]
    Redundant {
        resource: ResourceId,
        state: ResourceState,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Per-resource usage state, as seen by the commands recorded so far.
#[derive(Debug, Default)]
pub struct BarrierTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl BarrierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `resource` in `state`, replacing any previous entry.
    pub fn register(&mut self, resource: ResourceId, state: ResourceState) {
        if let Some(previous) = self.states.insert(resource, state) {
            log::trace!("{resource} re-registered ({previous} -> {state})");
        }
    }

    pub fn forget(&mut self, resource: ResourceId) -> Option<ResourceState> {
        self.states.remove(&resource)
    }

    pub fn state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.states.get(&resource).copied()
    }

    /// Returns `true` when every tracked resource is in `state`.
    pub fn all_in(&self, state: ResourceState) -> bool {
        self.states.values().all(|s| *s == state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Records exactly one transition barrier into the open command list.
    ///
    /// The tracked state only changes when the barrier was recorded.
    pub fn transition<B: Backend>(
        &mut self,
        backend: &mut B,
        pipeline: &mut CommandPipeline,
        resource: ResourceId,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<(), BarrierError> {
        let recorded = self
            .state(resource)
            .ok_or(BarrierError::Untracked(resource))?;

        if recorded != from {
            return Err(BarrierError::StateMismatch {
                resource,
                claimed: from,
                recorded,
            });
        }
        if from == to {
            return Err(BarrierError::Redundant {
                resource,
                state: from,
            });
        }

        pipeline.record(
            backend,
            GpuCommand::Barrier {
                resource,
                before: from,
                after: to,
            },
        )?;

        self.states.insert(resource, to);
        log::trace!("{resource}: {from} -> {to}");
        Ok(())
    }
}
