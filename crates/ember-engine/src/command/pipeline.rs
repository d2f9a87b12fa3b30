use thiserror::Error;

use crate::hal::{
    AllocatorId, Backend, BackendError, CommandListId, DeviceId, GpuCommand, QueueId, QueueKind,
};
use crate::sync::FrameSynchronizer;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command list is already recording")]
    AlreadyRecording,

    #[error("command list is not recording")]
    NotRecording,

    #[error("command list must be closed before submission")]
    NotClosed,

    #[error("previous submission still executing (fence {pending}, completed {completed})")]
    InFlight { pending: u64, completed: u64 },

    #[error("previous submission was never fenced")]
    Unfenced,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    /// Closed with nothing to submit.
    Idle,
    Recording,
    /// Closed and ready for submission.
    Closed,
    Submitted,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Guard {
    None,
    Unfenced,
    Fenced(u64),
}

/// One command allocator and one reusable command list.
///
/// The pair is recycled only after the fence value guarding its last
/// submission has completed.
#[derive(Debug)]
pub struct CommandPipeline {
    allocator: AllocatorId,
    list: CommandListId,
    phase: Phase,
    guard: Guard,
}

impl CommandPipeline {
    pub fn create<B: Backend>(backend: &mut B, device: DeviceId) -> Result<Self, BackendError> {
        let allocator = backend.create_command_allocator(device, QueueKind::Direct)?;
        let list = backend.create_command_list(device, allocator)?;
        log::debug!("created command pipeline ({allocator}, {list})");

        Ok(Self {
            allocator,
            list,
            phase: Phase::Idle,
            guard: Guard::None,
        })
    }

    /// Recycles the allocator and reopens the list for recording.
    ///
    /// Rejected while the list is open, or while the previous submission has
    /// not been fenced and completed.
    pub fn reset<B: Backend>(
        &mut self,
        backend: &mut B,
        sync: &FrameSynchronizer,
    ) -> Result<(), CommandError> {
        if self.phase == Phase::Recording {
            return Err(CommandError::AlreadyRecording);
        }

        match self.guard {
            Guard::None => {}
            Guard::Unfenced => return Err(CommandError::Unfenced),
            Guard::Fenced(pending) => {
                let completed = sync.completed_value(backend)?;
                if completed < pending {
                    return Err(CommandError::InFlight { pending, completed });
                }
            }
        }

        backend.reset_command_allocator(self.allocator)?;
        backend.reset_command_list(self.list, self.allocator)?;

        self.phase = Phase::Recording;
        self.guard = Guard::None;
        Ok(())
    }

    pub fn record<B: Backend>(
        &mut self,
        backend: &mut B,
        command: GpuCommand,
    ) -> Result<(), CommandError> {
        if self.phase != Phase::Recording {
            return Err(CommandError::NotRecording);
        }
        backend.record(self.list, command)?;
        Ok(())
    }

    pub fn close<B: Backend>(&mut self, backend: &mut B) -> Result<(), CommandError> {
        if self.phase != Phase::Recording {
            return Err(CommandError::NotRecording);
        }
        backend.close_command_list(self.list)?;
        self.phase = Phase::Closed;
        Ok(())
    }

    pub fn submit<B: Backend>(&mut self, backend: &mut B, queue: QueueId) -> Result<(), CommandError> {
        if self.phase != Phase::Closed {
            return Err(CommandError::NotClosed);
        }
        backend.execute_command_list(queue, self.list)?;
        self.phase = Phase::Submitted;
        self.guard = Guard::Unfenced;
        Ok(())
    }

    /// Marks the last submission as complete once the fence reaches `value`.
    pub fn retire_after(&mut self, value: u64) {
        if self.guard == Guard::Unfenced {
            self.guard = Guard::Fenced(value);
        }
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }

    #[inline]
    pub fn list(&self) -> CommandListId {
        self.list
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coords::Viewport;
    use crate::hal::{DriverType, FeatureLevel, HeadlessBackend, HeadlessConfig};

    struct Rig {
        gpu: HeadlessBackend,
        queue: QueueId,
        sync: FrameSynchronizer,
        pipeline: CommandPipeline,
    }

    fn rig(latency: Duration) -> Rig {
        let mut gpu = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: latency,
            ..HeadlessConfig::default()
        });
        let device = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap();
        let queue = gpu.create_command_queue(device, QueueKind::Direct).unwrap();
        let sync = FrameSynchronizer::create(&mut gpu, device).unwrap();
        let pipeline = CommandPipeline::create(&mut gpu, device).unwrap();
        Rig {
            gpu,
            queue,
            sync,
            pipeline,
        }
    }

    fn submit_one(r: &mut Rig) -> u64 {
        r.pipeline.reset(&mut r.gpu, &r.sync).unwrap();
        r.pipeline
            .record(&mut r.gpu, GpuCommand::SetViewport(Viewport::new(8.0, 8.0)))
            .unwrap();
        r.pipeline.close(&mut r.gpu).unwrap();
        r.pipeline.submit(&mut r.gpu, r.queue).unwrap();
        let value = r.sync.signal(&mut r.gpu, r.queue).unwrap();
        r.pipeline.retire_after(value);
        value
    }

    // ── state cycle ───────────────────────────────────────────────────────

    #[test]
    fn double_reset_is_rejected() {
        let mut r = rig(Duration::ZERO);
        r.pipeline.reset(&mut r.gpu, &r.sync).unwrap();
        assert!(matches!(
            r.pipeline.reset(&mut r.gpu, &r.sync),
            Err(CommandError::AlreadyRecording)
        ));
        assert!(r.pipeline.is_recording());
    }

    #[test]
    fn record_requires_open_list() {
        let mut r = rig(Duration::ZERO);
        let err = r
            .pipeline
            .record(&mut r.gpu, GpuCommand::SetViewport(Viewport::new(1.0, 1.0)))
            .unwrap_err();
        assert!(matches!(err, CommandError::NotRecording));
        assert!(matches!(r.pipeline.close(&mut r.gpu), Err(CommandError::NotRecording)));
    }

    #[test]
    fn submit_requires_close() {
        let mut r = rig(Duration::ZERO);
        r.pipeline.reset(&mut r.gpu, &r.sync).unwrap();
        assert!(matches!(
            r.pipeline.submit(&mut r.gpu, r.queue),
            Err(CommandError::NotClosed)
        ));
    }

    // ── reuse guard ───────────────────────────────────────────────────────

    #[test]
    fn unfenced_submission_blocks_reset() {
        let mut r = rig(Duration::ZERO);
        r.pipeline.reset(&mut r.gpu, &r.sync).unwrap();
        r.pipeline.close(&mut r.gpu).unwrap();
        r.pipeline.submit(&mut r.gpu, r.queue).unwrap();
        assert!(matches!(
            r.pipeline.reset(&mut r.gpu, &r.sync),
            Err(CommandError::Unfenced)
        ));
    }

    #[test]
    fn reset_before_fence_completes_is_rejected() {
        let mut r = rig(Duration::from_millis(100));
        let value = submit_one(&mut r);

        assert!(matches!(
            r.pipeline.reset(&mut r.gpu, &r.sync),
            Err(CommandError::InFlight { pending, .. }) if pending == value
        ));

        r.sync.wait_until(&mut r.gpu, value).unwrap();
        r.pipeline.reset(&mut r.gpu, &r.sync).unwrap();
    }

    #[test]
    fn fenced_cycles_repeat() {
        let mut r = rig(Duration::ZERO);
        for _ in 0..4 {
            let value = submit_one(&mut r);
            r.sync.wait_until(&mut r.gpu, value).unwrap();
        }
        assert_eq!(r.sync.last_signaled(), 4);
    }
}
