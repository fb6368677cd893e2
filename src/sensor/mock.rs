use crate::error::AppError;
use crate::sensor::{
    DeviceHandle, DistanceMode, DriverCall, RangingDevice, RangingDeviceFactory, RangingResult,
    SensorRangeStatus,
};
use std::sync::{Arc, Mutex};

pub type CallLog = Arc<Mutex<Vec<DriverCall>>>;

/// Configuration values the device accepted, as seen from the bus side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedSettings {
    pub distance_mode: Option<DistanceMode>,
    pub timing_budget_ms: Option<u16>,
    pub inter_measurement_ms: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct MockDeviceBehavior {
    pub attach_ok: bool,
    /// `boot_state` reports booted starting with this poll (1-based).
    pub boot_on_poll: u32,
    /// `data_ready` reports ready on this poll after each interrupt clear (1-based).
    pub ready_on_poll: u32,
    pub failing_calls: Vec<DriverCall>,
    pub readings: Vec<RangingResult>,
}

impl MockDeviceBehavior {
    pub fn ok() -> Self {
        Self {
            attach_ok: true,
            boot_on_poll: 1,
            ready_on_poll: 1,
            failing_calls: Vec::new(),
            readings: Vec::new(),
        }
    }

    pub fn fail_attach() -> Self {
        Self {
            attach_ok: false,
            ..Self::ok()
        }
    }

    pub fn boots_on_poll(mut self, poll: u32) -> Self {
        self.boot_on_poll = poll;
        self
    }

    pub fn ready_on_poll(mut self, poll: u32) -> Self {
        self.ready_on_poll = poll;
        self
    }

    pub fn never_ready(self) -> Self {
        self.ready_on_poll(u32::MAX)
    }

    pub fn failing(mut self, call: DriverCall) -> Self {
        self.failing_calls.push(call);
        self
    }

    pub fn with_readings(mut self, readings: Vec<RangingResult>) -> Self {
        self.readings = readings;
        self
    }
}

/// Builds a reading with the given distance and status and fixed signal figures.
pub fn reading(distance_mm: u16, range_status: SensorRangeStatus) -> RangingResult {
    RangingResult {
        range_status,
        distance_mm,
        ambient: 3,
        signal_per_spad: 1200,
        spad_count: 16,
    }
}

pub struct MockDeviceFactory {
    behavior: MockDeviceBehavior,
    log: CallLog,
    applied: Arc<Mutex<AppliedSettings>>,
}

impl MockDeviceFactory {
    pub fn new(behavior: MockDeviceBehavior) -> Self {
        Self {
            behavior,
            log: Arc::new(Mutex::new(Vec::new())),
            applied: Arc::new(Mutex::new(AppliedSettings::default())),
        }
    }

    /// Shared handle on the ordered list of driver calls, including the attach.
    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        snapshot(&self.log)
    }

    pub fn applied(&self) -> AppliedSettings {
        self.applied
            .lock()
            .map(|applied| *applied)
            .unwrap_or_default()
    }
}

pub fn snapshot(log: &CallLog) -> Vec<DriverCall> {
    log.lock().map(|calls| calls.clone()).unwrap_or_default()
}

pub struct MockDevice {
    behavior: MockDeviceBehavior,
    log: CallLog,
    boot_polls: u32,
    ready_polls: u32,
    next_reading: usize,
    applied: Arc<Mutex<AppliedSettings>>,
}

impl MockDevice {
    fn call(&mut self, call: DriverCall) -> Result<(), AppError> {
        if let Ok(mut calls) = self.log.lock() {
            calls.push(call);
        }
        if self.behavior.failing_calls.contains(&call) {
            Err(AppError::Sensor(format!("mock {call} failed")))
        } else {
            Ok(())
        }
    }

    fn apply(&self, update: impl FnOnce(&mut AppliedSettings)) {
        if let Ok(mut applied) = self.applied.lock() {
            update(&mut applied);
        }
    }
}

impl RangingDevice for MockDevice {
    fn boot_state(&mut self) -> Result<bool, AppError> {
        self.call(DriverCall::BootState)?;
        self.boot_polls = self.boot_polls.saturating_add(1);
        Ok(self.boot_polls >= self.behavior.boot_on_poll)
    }

    fn sensor_init(&mut self) -> Result<(), AppError> {
        self.call(DriverCall::SensorInit)
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), AppError> {
        self.call(DriverCall::SetDistanceMode)?;
        self.apply(|applied| applied.distance_mode = Some(mode));
        Ok(())
    }

    fn set_timing_budget_ms(&mut self, budget_ms: u16) -> Result<(), AppError> {
        self.call(DriverCall::SetTimingBudget)?;
        self.apply(|applied| applied.timing_budget_ms = Some(budget_ms));
        Ok(())
    }

    fn set_inter_measurement_ms(&mut self, period_ms: u16) -> Result<(), AppError> {
        self.call(DriverCall::SetInterMeasurement)?;
        self.apply(|applied| applied.inter_measurement_ms = Some(period_ms));
        Ok(())
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        self.call(DriverCall::StartRanging)
    }

    fn stop_ranging(&mut self) -> Result<(), AppError> {
        self.call(DriverCall::StopRanging)
    }

    fn data_ready(&mut self) -> Result<bool, AppError> {
        self.call(DriverCall::DataReady)?;
        self.ready_polls = self.ready_polls.saturating_add(1);
        Ok(self.ready_polls >= self.behavior.ready_on_poll)
    }

    fn get_result(&mut self) -> Result<RangingResult, AppError> {
        self.call(DriverCall::GetResult)?;
        let result = if self.behavior.readings.is_empty() {
            reading(0, SensorRangeStatus::None)
        } else {
            self.behavior.readings[self.next_reading % self.behavior.readings.len()]
        };
        self.next_reading += 1;
        Ok(result)
    }

    fn clear_interrupt(&mut self) -> Result<(), AppError> {
        self.call(DriverCall::ClearInterrupt)?;
        self.ready_polls = 0;
        Ok(())
    }
}

impl RangingDeviceFactory for MockDeviceFactory {
    type Device = MockDevice;

    fn attach(&mut self, _handle: DeviceHandle) -> Result<Self::Device, AppError> {
        if let Ok(mut calls) = self.log.lock() {
            calls.push(DriverCall::AttachBus);
        }
        if !self.behavior.attach_ok {
            return Err(AppError::I2c("mock attach failed".to_string()));
        }
        Ok(MockDevice {
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
            boot_polls: 0,
            ready_polls: 0,
            next_reading: 0,
            applied: Arc::clone(&self.applied),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_state_reports_booted_on_configured_poll() -> Result<(), AppError> {
        let mut factory = MockDeviceFactory::new(MockDeviceBehavior::ok().boots_on_poll(3));
        let mut device = factory.attach(DeviceHandle::default())?;

        assert!(!device.boot_state()?);
        assert!(!device.boot_state()?);
        assert!(device.boot_state()?);
        Ok(())
    }

    #[test]
    fn data_ready_latches_until_interrupt_cleared() -> Result<(), AppError> {
        let mut factory = MockDeviceFactory::new(MockDeviceBehavior::ok().ready_on_poll(2));
        let mut device = factory.attach(DeviceHandle::default())?;

        assert!(!device.data_ready()?);
        assert!(device.data_ready()?);
        assert!(device.data_ready()?);
        device.clear_interrupt()?;
        assert!(!device.data_ready()?);
        Ok(())
    }

    #[test]
    fn get_result_cycles_through_readings() -> Result<(), AppError> {
        let behavior = MockDeviceBehavior::ok().with_readings(vec![
            reading(120, SensorRangeStatus::Valid),
            reading(340, SensorRangeStatus::SigmaFailure),
        ]);
        let mut factory = MockDeviceFactory::new(behavior);
        let mut device = factory.attach(DeviceHandle::default())?;

        assert_eq!(device.get_result()?.distance_mm, 120);
        assert_eq!(device.get_result()?.distance_mm, 340);
        assert_eq!(device.get_result()?.distance_mm, 120);
        Ok(())
    }

    #[test]
    fn failing_call_is_logged_and_returns_error() {
        let behavior = MockDeviceBehavior::ok().failing(DriverCall::SensorInit);
        let mut factory = MockDeviceFactory::new(behavior);
        let mut device = factory.attach(DeviceHandle::default()).expect("attach ok");

        let err = device.sensor_init().unwrap_err();

        assert_eq!(err.to_string(), "sensor error: mock sensor_init failed");
        assert_eq!(
            factory.calls(),
            vec![DriverCall::AttachBus, DriverCall::SensorInit]
        );
    }

    #[test]
    fn attach_can_fail() {
        let mut factory = MockDeviceFactory::new(MockDeviceBehavior::fail_attach());

        let err = factory.attach(DeviceHandle::default()).err().expect("attach fails");

        assert_eq!(err.to_string(), "i2c error: mock attach failed");
    }
}
