use crate::error::AppError;
use serde::Deserialize;
use std::fmt;

pub mod mock;
pub mod vl53l1x;

// VL53L1X default is 0x52 in 8-bit notation; use 0x29 for 7-bit addressing.
pub const DEFAULT_I2C_ADDRESS_7BIT: u8 = 0x29;
pub const DEFAULT_I2C_BUS: u8 = 1;
pub const I2C_7BIT_MAX: u8 = 0x77;

/// Identifies the ranging device on its bus. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    pub bus: u8,
    pub address: u8,
}

impl DeviceHandle {
    pub fn new(bus: u8, address: u8) -> Result<Self, AppError> {
        if address > I2C_7BIT_MAX {
            return Err(AppError::InvalidAddress(address));
        }
        Ok(Self { bus, address })
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        Self {
            bus: DEFAULT_I2C_BUS,
            address: DEFAULT_I2C_ADDRESS_7BIT,
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c-{}@{:#04x}", self.bus, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    Short,
    Long,
}

impl DistanceMode {
    /// Numeric mode as the ULD API numbers it (1 = short, 2 = long).
    pub fn code(self) -> u8 {
        match self {
            Self::Short => 1,
            Self::Long => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IoVoltage {
    #[serde(rename = "1v8")]
    Volt1_8,
    #[serde(rename = "2v8")]
    Volt2_8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRangeStatus {
    Valid,
    SigmaFailure,
    SignalFailure,
    MinRangeClipped,
    OutOfBounds,
    HardwareFailure,
    WrapCheckFail,
    Wraparound,
    ProcessingFailure,
    CrosstalkSignal,
    Synchronisation,
    MergedPulse,
    LackOfSignal,
    MinRangeFail,
    InvalidRange,
    None,
}

impl SensorRangeStatus {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Status code as printed in the report line. 255 means no status was produced.
    pub fn code(self) -> u8 {
        match self {
            Self::Valid => 0,
            Self::SigmaFailure => 1,
            Self::SignalFailure => 2,
            Self::MinRangeClipped => 3,
            Self::OutOfBounds => 4,
            Self::HardwareFailure => 5,
            Self::WrapCheckFail => 6,
            Self::Wraparound => 7,
            Self::ProcessingFailure => 8,
            Self::CrosstalkSignal => 9,
            Self::Synchronisation => 10,
            Self::MergedPulse => 11,
            Self::LackOfSignal => 12,
            Self::MinRangeFail => 13,
            Self::InvalidRange => 14,
            Self::None => 255,
        }
    }
}

/// One completed measurement as read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingResult {
    pub range_status: SensorRangeStatus,
    pub distance_mm: u16,
    pub ambient: u16,
    pub signal_per_spad: u16,
    pub spad_count: u16,
}

impl RangingResult {
    pub fn status_code(&self) -> u8 {
        self.range_status.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCall {
    AttachBus,
    BootState,
    SensorInit,
    SetDistanceMode,
    SetTimingBudget,
    SetInterMeasurement,
    StartRanging,
    DataReady,
    GetResult,
    ClearInterrupt,
    StopRanging,
}

impl DriverCall {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AttachBus => "attach_bus",
            Self::BootState => "boot_state",
            Self::SensorInit => "sensor_init",
            Self::SetDistanceMode => "set_distance_mode",
            Self::SetTimingBudget => "set_timing_budget_ms",
            Self::SetInterMeasurement => "set_inter_measurement_ms",
            Self::StartRanging => "start_ranging",
            Self::DataReady => "data_ready",
            Self::GetResult => "get_result",
            Self::ClearInterrupt => "clear_interrupt",
            Self::StopRanging => "stop_ranging",
        }
    }
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the session needs from an attached ranging device.
pub trait RangingDevice {
    /// Returns true once the device firmware has finished booting.
    fn boot_state(&mut self) -> Result<bool, AppError>;
    fn sensor_init(&mut self) -> Result<(), AppError>;
    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), AppError>;
    fn set_timing_budget_ms(&mut self, budget_ms: u16) -> Result<(), AppError>;
    fn set_inter_measurement_ms(&mut self, period_ms: u16) -> Result<(), AppError>;
    /// Start continuous ranging. Measurements then complete at the inter-measurement cadence.
    fn start_ranging(&mut self) -> Result<(), AppError>;
    fn stop_ranging(&mut self) -> Result<(), AppError>;
    fn data_ready(&mut self) -> Result<bool, AppError>;
    fn get_result(&mut self) -> Result<RangingResult, AppError>;
    /// Acknowledge the current measurement so the device can latch the next one.
    fn clear_interrupt(&mut self) -> Result<(), AppError>;
}

/// Attaches to the bus and hands out the device found at `handle`.
pub trait RangingDeviceFactory {
    type Device: RangingDevice;

    fn attach(&mut self, handle: DeviceHandle) -> Result<Self::Device, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_handle_rejects_address_outside_7bit_range() {
        let err = DeviceHandle::new(1, 0x78).unwrap_err();

        assert!(matches!(err, AppError::InvalidAddress(0x78)));
        assert_eq!(err.to_string(), "invalid I2C address: 0x78");
    }

    #[test]
    fn device_handle_displays_bus_and_address() {
        let handle = DeviceHandle::new(1, 0x29).expect("valid handle");

        assert_eq!(handle.to_string(), "i2c-1@0x29");
        assert_eq!(handle, DeviceHandle::default());
    }

    #[test]
    fn short_mode_is_mode_one() {
        assert_eq!(DistanceMode::Short.code(), 1);
        assert_eq!(DistanceMode::Long.code(), 2);
    }

    #[test]
    fn range_status_codes_match_report_values() {
        assert_eq!(SensorRangeStatus::Valid.code(), 0);
        assert_eq!(SensorRangeStatus::SignalFailure.code(), 2);
        assert_eq!(SensorRangeStatus::Wraparound.code(), 7);
        assert_eq!(SensorRangeStatus::None.code(), 255);
        assert!(SensorRangeStatus::Valid.is_valid());
        assert!(!SensorRangeStatus::OutOfBounds.is_valid());
    }
}
