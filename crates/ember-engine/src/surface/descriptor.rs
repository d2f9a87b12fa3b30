use crate::hal::{
    Backend, BackendResult, DescriptorHandle, DescriptorHeapInfo, DescriptorHeapKind, DeviceId,
};

/// A descriptor heap split into two banks that rebuilds alternate between.
///
/// Views written by one rebuild never share a handle with the views of the
/// rebuild before it, so a stale handle held across a resize cannot silently
/// resolve to a new resource.
#[derive(Debug)]
pub(crate) struct DescriptorBanks {
    heap: DescriptorHeapInfo,
    bank_size: u32,
    active: Option<u32>,
}

impl DescriptorBanks {
    pub(crate) fn create<B: Backend>(
        backend: &mut B,
        device: DeviceId,
        kind: DescriptorHeapKind,
        bank_size: u32,
    ) -> BackendResult<Self> {
        let heap = backend.create_descriptor_heap(device, kind, bank_size * 2)?;
        log::debug!(
            "created {kind:?} descriptor heap at {} ({} slots)",
            heap.base,
            heap.capacity
        );
        Ok(Self {
            heap,
            bank_size,
            active: None,
        })
    }

    /// Switches to the bank not used by the previous rebuild.
    pub(crate) fn rotate(&mut self) -> u32 {
        let next = match self.active {
            Some(0) => 1,
            _ => 0,
        };
        self.active = Some(next);
        next
    }

    /// Handle for `slot` in the active bank.
    pub(crate) fn handle(&self, slot: u32) -> Option<DescriptorHandle> {
        let bank = self.active?;
        if slot >= self.bank_size {
            return None;
        }
        self.heap.handle(bank * self.bank_size + slot)
    }
}
