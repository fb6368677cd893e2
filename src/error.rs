use crate::sensor::DriverCall;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid I2C address: {0:#04x}")]
    InvalidAddress(u8),
    #[error("bus attach failed: {0}")]
    BusAttach(String),
    #[error("sensor did not report booted after {attempts} polls")]
    BootTimeout { attempts: u32 },
    #[error("{call} failed: {source}")]
    DriverCall {
        call: DriverCall,
        #[source]
        source: Box<AppError>,
    },
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("trigger input error: {0}")]
    Input(String),
    #[error("report output error: {0}")]
    Output(String),
    #[error("state lock poisoned")]
    StateLock,
}
