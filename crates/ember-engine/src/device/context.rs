use crate::hal::{AdapterInfo, Backend, DeviceId, DriverType, FeatureLevel, QueueId, QueueKind};

use super::error::{DriverAttempt, RenderError};

/// Owns the logical device and the driver fallback policy.
///
/// Every other GPU object is created through the device this context holds.
#[derive(Debug)]
pub struct DeviceContext {
    device: DeviceId,
    info: AdapterInfo,
}

impl DeviceContext {
    /// Creates a device with the first driver option that succeeds.
    ///
    /// Options are tried in `driver_order` (hardware first, then software
    /// fallbacks). Fails only when every option fails; there is no retry
    /// beyond the list.
    pub fn create<B: Backend>(
        backend: &mut B,
        driver_order: &[DriverType],
        min_feature_level: FeatureLevel,
    ) -> Result<Self, RenderError> {
        let mut attempts = Vec::new();

        for &driver in driver_order {
            match backend.create_device(driver, min_feature_level) {
                Ok(device) => {
                    let info = backend
                        .adapter_info(device)
                        .map_err(RenderError::creation("device"))?;

                    log::info!(
                        "created {driver} device on {} ({}, feature level {})",
                        info.name,
                        info.backend,
                        info.feature_level
                    );

                    return Ok(Self { device, info });
                }
                Err(error) => {
                    log::warn!("{driver} device unavailable: {error}");
                    attempts.push(DriverAttempt { driver, error });
                }
            }
        }

        log::error!("device creation failed for every driver option");
        Err(RenderError::NoDevice { attempts })
    }

    pub fn create_command_queue<B: Backend>(
        &self,
        backend: &mut B,
        kind: QueueKind,
    ) -> Result<QueueId, RenderError> {
        backend
            .create_command_queue(self.device, kind)
            .map_err(RenderError::creation("command queue"))
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    #[inline]
    pub fn driver(&self) -> DriverType {
        self.info.driver
    }

    #[inline]
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{HeadlessBackend, HeadlessConfig};

    fn backend_without(drivers: &[DriverType]) -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig {
            unavailable_drivers: drivers.to_vec(),
            ..HeadlessConfig::default()
        })
    }

    #[test]
    fn hardware_is_preferred() {
        let mut gpu = HeadlessBackend::default();
        let ctx = DeviceContext::create(&mut gpu, &DriverType::DEFAULT_ORDER, FeatureLevel::Level11_0)
            .unwrap();
        assert_eq!(ctx.driver(), DriverType::Hardware);
    }

    #[test]
    fn software_fallback_is_silent() {
        let mut gpu = backend_without(&[DriverType::Hardware]);
        let ctx = DeviceContext::create(&mut gpu, &DriverType::DEFAULT_ORDER, FeatureLevel::Level11_0)
            .unwrap();
        assert_eq!(ctx.driver(), DriverType::Warp);
        assert_eq!(ctx.info().driver, DriverType::Warp);
    }

    #[test]
    fn every_option_failing_is_fatal() {
        let mut gpu = backend_without(&[DriverType::Hardware, DriverType::Warp]);
        let err = DeviceContext::create(&mut gpu, &DriverType::DEFAULT_ORDER, FeatureLevel::Level11_0)
            .unwrap_err();

        match err {
            RenderError::NoDevice { attempts } => {
                let tried: Vec<_> = attempts.iter().map(|a| a.driver).collect();
                assert_eq!(tried, vec![DriverType::Hardware, DriverType::Warp]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn queue_is_created_on_the_chosen_device() {
        let mut gpu = HeadlessBackend::default();
        let ctx = DeviceContext::create(&mut gpu, &[DriverType::Warp], FeatureLevel::Level11_0)
            .unwrap();
        assert!(ctx.create_command_queue(&mut gpu, QueueKind::Direct).is_ok());
    }
}
