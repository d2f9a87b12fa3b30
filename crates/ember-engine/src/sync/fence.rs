use crate::hal::{Backend, BackendError, BackendResult, DeviceId, FenceId, QueueId};

/// CPU/GPU synchronization through one monotonically increasing fence.
///
/// The value persists for the lifetime of the device; it is not reset on
/// swap-chain resize.
#[derive(Debug)]
pub struct FrameSynchronizer {
    fence: FenceId,
    value: u64,
}

impl FrameSynchronizer {
    pub fn create<B: Backend>(backend: &mut B, device: DeviceId) -> BackendResult<Self> {
        let fence = backend.create_fence(device, 0)?;
        log::debug!("created frame fence {fence}");
        Ok(Self { fence, value: 0 })
    }

    /// Increments the fence value and queues a signal of it on `queue`.
    ///
    /// The signal completes once every command submitted to `queue` before
    /// this call has finished executing.
    pub fn signal<B: Backend>(&mut self, backend: &mut B, queue: QueueId) -> BackendResult<u64> {
        let next = self.value + 1;
        backend.signal(queue, self.fence, next)?;
        self.value = next;
        log::trace!("{} signaled {next}", self.fence);
        Ok(next)
    }

    /// Blocks the calling thread until the fence reaches `value`. No timeout.
    ///
    /// Values that were never signaled are rejected rather than waited on.
    pub fn wait_until<B: Backend>(&self, backend: &mut B, value: u64) -> BackendResult<()> {
        if value > self.value {
            return Err(BackendError::InvalidState(format!(
                "wait for {} value {value} that was never signaled (last {})",
                self.fence, self.value
            )));
        }

        if backend.fence_completed_value(self.fence)? >= value {
            return Ok(());
        }

        backend.wait_for_fence(self.fence, value)
    }

    pub fn completed_value<B: Backend>(&self, backend: &mut B) -> BackendResult<u64> {
        backend.fence_completed_value(self.fence)
    }

    #[inline]
    pub fn last_signaled(&self) -> u64 {
        self.value
    }

    #[inline]
    pub fn fence(&self) -> FenceId {
        self.fence
    }

    /// Signals and waits: on return the queue is idle.
    pub fn drain<B: Backend>(&mut self, backend: &mut B, queue: QueueId) -> BackendResult<u64> {
        let value = self.signal(backend, queue)?;
        self.wait_until(backend, value)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hal::{DriverType, FeatureLevel, HeadlessBackend, HeadlessConfig, QueueKind};

    fn setup(latency: Duration) -> (HeadlessBackend, QueueId, FrameSynchronizer) {
        let mut gpu = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: latency,
            ..HeadlessConfig::default()
        });
        let device = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap();
        let queue = gpu.create_command_queue(device, QueueKind::Direct).unwrap();
        let sync = FrameSynchronizer::create(&mut gpu, device).unwrap();
        (gpu, queue, sync)
    }

    #[test]
    fn signaled_values_strictly_increase() {
        let (mut gpu, queue, mut sync) = setup(Duration::ZERO);
        let mut last = sync.last_signaled();
        for _ in 0..5 {
            let v = sync.signal(&mut gpu, queue).unwrap();
            assert!(v > last);
            last = v;
        }
        assert_eq!(sync.last_signaled(), 5);
    }

    #[test]
    fn wait_never_returns_early() {
        let (mut gpu, queue, mut sync) = setup(Duration::from_millis(20));
        for _ in 0..3 {
            let v = sync.signal(&mut gpu, queue).unwrap();
            sync.wait_until(&mut gpu, v).unwrap();
            assert!(sync.completed_value(&mut gpu).unwrap() >= v);
        }
    }

    #[test]
    fn unsignaled_value_is_rejected() {
        let (mut gpu, _queue, sync) = setup(Duration::ZERO);
        assert!(matches!(
            sync.wait_until(&mut gpu, 1),
            Err(BackendError::InvalidState(_))
        ));
    }

    #[test]
    fn drain_leaves_queue_idle() {
        let (mut gpu, queue, mut sync) = setup(Duration::from_millis(5));
        sync.signal(&mut gpu, queue).unwrap();
        let v = sync.drain(&mut gpu, queue).unwrap();
        assert_eq!(v, 2);
        assert_eq!(sync.completed_value(&mut gpu).unwrap(), 2);
    }
}
