use crate::error::AppError;
use crate::sensor::{
    DeviceHandle, DistanceMode, IoVoltage, RangingDevice, RangingDeviceFactory, RangingResult,
};

#[cfg(target_os = "linux")]
use crate::sensor::SensorRangeStatus;
#[cfg(target_os = "linux")]
use rppal::i2c::I2c;
#[cfg(target_os = "linux")]
use tracing::debug;
#[cfg(target_os = "linux")]
use vl53l1x_uld::{
    DistanceMode as UldDistanceMode, IOVoltage, RangeStatus as Vl53l1xRangeStatus, VL53L1X,
};

#[cfg(target_os = "linux")]
pub struct Vl53l1xFactory {
    io_voltage: IOVoltage,
}

#[cfg(target_os = "linux")]
impl Vl53l1xFactory {
    pub fn new(io_voltage: IoVoltage) -> Self {
        Self {
            io_voltage: match io_voltage {
                IoVoltage::Volt1_8 => IOVoltage::Volt1_8,
                IoVoltage::Volt2_8 => IOVoltage::Volt2_8,
            },
        }
    }
}

/// A VL53L1X reached through the Raspberry Pi I2C controller.
#[cfg(target_os = "linux")]
pub struct Vl53l1xDevice {
    driver: VL53L1X<I2c>,
    io_voltage: IOVoltage,
}

#[cfg(target_os = "linux")]
fn sensor_error(err: impl std::fmt::Debug) -> AppError {
    AppError::Sensor(format!("{err:?}"))
}

#[cfg(target_os = "linux")]
impl RangingDevice for Vl53l1xDevice {
    fn boot_state(&mut self) -> Result<bool, AppError> {
        self.driver.is_booted().map_err(sensor_error)
    }

    fn sensor_init(&mut self) -> Result<(), AppError> {
        self.driver.init(self.io_voltage).map_err(sensor_error)
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), AppError> {
        let mode = match mode {
            DistanceMode::Short => UldDistanceMode::Short,
            DistanceMode::Long => UldDistanceMode::Long,
        };
        self.driver.set_distance_mode(mode).map_err(sensor_error)
    }

    fn set_timing_budget_ms(&mut self, budget_ms: u16) -> Result<(), AppError> {
        self.driver
            .set_timing_budget_ms(budget_ms)
            .map_err(sensor_error)
    }

    fn set_inter_measurement_ms(&mut self, period_ms: u16) -> Result<(), AppError> {
        self.driver
            .set_inter_measurement_period_ms(period_ms)
            .map_err(sensor_error)
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        self.driver.start_ranging().map_err(sensor_error)
    }

    fn stop_ranging(&mut self) -> Result<(), AppError> {
        self.driver.stop_ranging().map_err(sensor_error)
    }

    fn data_ready(&mut self) -> Result<bool, AppError> {
        self.driver.is_data_ready().map_err(sensor_error)
    }

    fn get_result(&mut self) -> Result<RangingResult, AppError> {
        let result = self.driver.get_result().map_err(sensor_error)?;
        Ok(RangingResult {
            range_status: SensorRangeStatus::from(result.status),
            distance_mm: result.distance_mm,
            ambient: result.ambient,
            signal_per_spad: result.sig_per_spad,
            spad_count: result.spad_count,
        })
    }

    fn clear_interrupt(&mut self) -> Result<(), AppError> {
        self.driver
            .clear_interrupt()
            .map_err(|err| AppError::Sensor(format!("clear_interrupt: {err:?}")))
    }
}

#[cfg(target_os = "linux")]
impl RangingDeviceFactory for Vl53l1xFactory {
    type Device = Vl53l1xDevice;

    fn attach(&mut self, handle: DeviceHandle) -> Result<Self::Device, AppError> {
        let i2c = I2c::with_bus(handle.bus).map_err(|err| AppError::I2c(err.to_string()))?;
        debug!(%handle, "I2C bus opened");
        Ok(Vl53l1xDevice {
            driver: VL53L1X::new(i2c, handle.address),
            io_voltage: self.io_voltage,
        })
    }
}

#[cfg(target_os = "linux")]
impl From<Vl53l1xRangeStatus> for SensorRangeStatus {
    fn from(status: Vl53l1xRangeStatus) -> Self {
        match status {
            Vl53l1xRangeStatus::Valid => Self::Valid,
            Vl53l1xRangeStatus::SigmaFailure => Self::SigmaFailure,
            Vl53l1xRangeStatus::SignalFailure => Self::SignalFailure,
            Vl53l1xRangeStatus::MinRangeClipped => Self::MinRangeClipped,
            Vl53l1xRangeStatus::OutOfBounds => Self::OutOfBounds,
            Vl53l1xRangeStatus::HardwareFailure => Self::HardwareFailure,
            Vl53l1xRangeStatus::WrapCheckFail => Self::WrapCheckFail,
            Vl53l1xRangeStatus::Wraparound => Self::Wraparound,
            Vl53l1xRangeStatus::ProcessingFailure => Self::ProcessingFailure,
            Vl53l1xRangeStatus::CrosstalkSignal => Self::CrosstalkSignal,
            Vl53l1xRangeStatus::Synchronisation => Self::Synchronisation,
            Vl53l1xRangeStatus::MergedPulse => Self::MergedPulse,
            Vl53l1xRangeStatus::LackOfSignal => Self::LackOfSignal,
            Vl53l1xRangeStatus::MinRangeFail => Self::MinRangeFail,
            Vl53l1xRangeStatus::InvalidRange => Self::InvalidRange,
            Vl53l1xRangeStatus::None => Self::None,
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub struct Vl53l1xFactory;

#[cfg(not(target_os = "linux"))]
impl Vl53l1xFactory {
    pub fn new(_io_voltage: IoVoltage) -> Self {
        Self
    }
}

impl Default for Vl53l1xFactory {
    fn default() -> Self {
        Self::new(IoVoltage::Volt2_8)
    }
}

#[cfg(not(target_os = "linux"))]
pub enum Vl53l1xDevice {}

#[cfg(not(target_os = "linux"))]
impl RangingDevice for Vl53l1xDevice {
    fn boot_state(&mut self) -> Result<bool, AppError> {
        match *self {}
    }

    fn sensor_init(&mut self) -> Result<(), AppError> {
        match *self {}
    }

    fn set_distance_mode(&mut self, _mode: DistanceMode) -> Result<(), AppError> {
        match *self {}
    }

    fn set_timing_budget_ms(&mut self, _budget_ms: u16) -> Result<(), AppError> {
        match *self {}
    }

    fn set_inter_measurement_ms(&mut self, _period_ms: u16) -> Result<(), AppError> {
        match *self {}
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        match *self {}
    }

    fn stop_ranging(&mut self) -> Result<(), AppError> {
        match *self {}
    }

    fn data_ready(&mut self) -> Result<bool, AppError> {
        match *self {}
    }

    fn get_result(&mut self) -> Result<RangingResult, AppError> {
        match *self {}
    }

    fn clear_interrupt(&mut self) -> Result<(), AppError> {
        match *self {}
    }
}

#[cfg(not(target_os = "linux"))]
impl RangingDeviceFactory for Vl53l1xFactory {
    type Device = Vl53l1xDevice;

    fn attach(&mut self, _handle: DeviceHandle) -> Result<Self::Device, AppError> {
        Err(AppError::I2c(
            "VL53L1X driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}
