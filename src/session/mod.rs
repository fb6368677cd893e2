//! Drives one ranging device from bus attach through boot and configuration into
//! the trigger / wait-ready / fetch / report / clear cycle.

use crate::error::AppError;
use crate::report::ResultSink;
use crate::sensor::{DeviceHandle, DistanceMode, DriverCall, RangingDevice, RangingDeviceFactory};
use crate::state::{AppState, SessionPhase, StatusLedger};
use crate::trigger::TriggerSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

mod policy;

pub use policy::StatusPolicy;

pub const BOOT_POLL_INTERVAL: Duration = Duration::from_millis(2);
pub const DATA_READY_POLL: Duration = Duration::from_micros(1);
pub const DEFAULT_TIMING_BUDGET_MS: u16 = 100;
pub const DEFAULT_INTER_MEASUREMENT_MS: u16 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub handle: DeviceHandle,
    pub distance_mode: DistanceMode,
    pub timing_budget_ms: u16,
    pub inter_measurement_ms: u16,
    pub boot_poll_interval: Duration,
    /// `None` polls the boot state until the device answers, however long that takes.
    pub boot_timeout: Option<Duration>,
    pub data_ready_poll: Duration,
    pub status_policy: StatusPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handle: DeviceHandle::default(),
            distance_mode: DistanceMode::Short,
            timing_budget_ms: DEFAULT_TIMING_BUDGET_MS,
            inter_measurement_ms: DEFAULT_INTER_MEASUREMENT_MS,
            boot_poll_interval: BOOT_POLL_INTERVAL,
            boot_timeout: None,
            data_ready_poll: DATA_READY_POLL,
            status_policy: StatusPolicy::Accumulate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reports_emitted: u64,
    pub ledger: StatusLedger,
}

pub struct RangingSession<F> {
    factory: F,
    settings: SessionSettings,
    state: Arc<RwLock<AppState>>,
    stop: Arc<AtomicBool>,
    ledger: StatusLedger,
    reports_emitted: u64,
    first_measurement: bool,
}

impl<F> RangingSession<F>
where
    F: RangingDeviceFactory,
{
    pub fn new(
        factory: F,
        settings: SessionSettings,
        state: Arc<RwLock<AppState>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            factory,
            settings,
            state,
            stop,
            ledger: StatusLedger::default(),
            reports_emitted: 0,
            first_measurement: true,
        }
    }

    /// Run the session until the trigger source is exhausted, the stop flag is raised,
    /// or a fatal error occurs. Under normal operation on a device this never returns.
    pub fn run<T, S>(&mut self, trigger: &mut T, sink: &mut S) -> Result<SessionSummary, AppError>
    where
        T: TriggerSource,
        S: ResultSink,
    {
        let outcome = self.drive(trigger, sink);
        let phase = match &outcome {
            Ok(()) => SessionPhase::Stopped,
            Err(err) => {
                error!(device = %self.settings.handle, error = %err, "Ranging session failed");
                SessionPhase::Failed
            }
        };
        let published = self.set_phase(phase);
        outcome?;
        published?;

        info!(
            reports = self.reports_emitted,
            failed_calls = self.ledger.failed_calls(),
            "Ranging session stopped"
        );
        Ok(SessionSummary {
            reports_emitted: self.reports_emitted,
            ledger: self.ledger.clone(),
        })
    }

    fn drive<T, S>(&mut self, trigger: &mut T, sink: &mut S) -> Result<(), AppError>
    where
        T: TriggerSource,
        S: ResultSink,
    {
        self.set_phase(SessionPhase::Uninitialized)?;
        let handle = self.settings.handle;
        let mut device = self
            .factory
            .attach(handle)
            .map_err(|err| AppError::BusAttach(err.to_string()))?;
        info!(device = %handle, "Attached to ranging device");

        self.set_phase(SessionPhase::Booting)?;
        if !self.wait_for_boot(&mut device)? {
            return Ok(());
        }
        info!(device = %handle, "Sensor booted");

        self.set_phase(SessionPhase::Configuring)?;
        self.configure(&mut device)?;

        self.first_measurement = true;
        self.set_phase(SessionPhase::Ranging {
            first_measurement: true,
        })?;
        let outcome = self.measure_loop(&mut device, trigger, sink);

        // Leave the device idle whichever way the loop ended.
        let stopped = device.stop_ranging();
        let stop_outcome = self.check(DriverCall::StopRanging, stopped).map(|_| ());
        outcome.and(stop_outcome)
    }

    /// Poll the boot state at a fixed interval. Returns false when cancelled.
    fn wait_for_boot(&mut self, device: &mut F::Device) -> Result<bool, AppError> {
        self.polling(DriverCall::BootState, |session| {
            let started = Instant::now();
            let mut attempts: u32 = 0;
            let mut streak: u32 = 0;
            loop {
                if session.stop_requested() {
                    debug!(attempts, "Boot wait cancelled");
                    return Ok(false);
                }
                attempts = attempts.saturating_add(1);
                let booted = device.boot_state();
                if session.check_poll(DriverCall::BootState, booted, &mut streak)? == Some(true) {
                    debug!(attempts, "Boot state reported booted");
                    return Ok(true);
                }
                if let Some(timeout) = session.settings.boot_timeout
                    && started.elapsed() >= timeout
                {
                    return Err(AppError::BootTimeout { attempts });
                }
                std::thread::sleep(session.settings.boot_poll_interval);
            }
        })
    }

    fn configure(&mut self, device: &mut F::Device) -> Result<(), AppError> {
        let settings = self.settings.clone();

        let outcome = device.sensor_init();
        self.check(DriverCall::SensorInit, outcome)?;
        let outcome = device.set_distance_mode(settings.distance_mode);
        self.check(DriverCall::SetDistanceMode, outcome)?;
        let outcome = device.set_timing_budget_ms(settings.timing_budget_ms);
        self.check(DriverCall::SetTimingBudget, outcome)?;
        let outcome = device.set_inter_measurement_ms(settings.inter_measurement_ms);
        self.check(DriverCall::SetInterMeasurement, outcome)?;
        let outcome = device.start_ranging();
        self.check(DriverCall::StartRanging, outcome)?;

        if self.ledger.is_clean() {
            info!(
                distance_mode = settings.distance_mode.code(),
                timing_budget_ms = settings.timing_budget_ms,
                inter_measurement_ms = settings.inter_measurement_ms,
                "Sensor configured, ranging started"
            );
        } else {
            warn!(
                failed_calls = self.ledger.failed_calls(),
                "Sensor configuration finished with driver errors"
            );
        }
        Ok(())
    }

    fn measure_loop<T, S>(
        &mut self,
        device: &mut F::Device,
        trigger: &mut T,
        sink: &mut S,
    ) -> Result<(), AppError>
    where
        T: TriggerSource,
        S: ResultSink,
    {
        loop {
            if self.stop_requested() {
                return Ok(());
            }
            let Some(byte) = trigger.next_trigger()? else {
                debug!("No more triggers");
                return Ok(());
            };
            debug!(trigger = byte, "Report requested");

            if !self.wait_for_data_ready(device)? {
                return Ok(());
            }

            let fetched = device.get_result();
            if let Some(result) = self.check(DriverCall::GetResult, fetched)? {
                sink.emit(&result)?;
                self.reports_emitted = self.reports_emitted.saturating_add(1);
            }

            let cleared = device.clear_interrupt();
            self.check(DriverCall::ClearInterrupt, cleared)?;
            if self.first_measurement {
                // The first measurement after start needs a second clear.
                let cleared = device.clear_interrupt();
                self.check(DriverCall::ClearInterrupt, cleared)?;
                self.first_measurement = false;
                self.set_phase(SessionPhase::Ranging {
                    first_measurement: false,
                })?;
            }
        }
    }

    /// Spin on the data-ready flag. Returns false when cancelled.
    fn wait_for_data_ready(&mut self, device: &mut F::Device) -> Result<bool, AppError> {
        self.polling(DriverCall::DataReady, |session| {
            let mut streak: u32 = 0;
            loop {
                let ready = device.data_ready();
                if session.check_poll(DriverCall::DataReady, ready, &mut streak)? == Some(true) {
                    return Ok(true);
                }
                if session.stop_requested() {
                    debug!("Data-ready wait cancelled");
                    return Ok(false);
                }
                std::thread::sleep(session.settings.data_ready_poll);
            }
        })
    }

    /// Run a polling loop, then publish the ledger once if the loop recorded failures.
    fn polling<R>(
        &mut self,
        call: DriverCall,
        poll: impl FnOnce(&mut Self) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let failed_before = self.ledger.failed_calls();
        let outcome = poll(self);
        let failed = self.ledger.failed_calls() - failed_before;
        if failed > 0 {
            if failed > 1 {
                warn!(
                    call = %call,
                    failures = failed,
                    "Polling ended after repeated driver failures"
                );
            }
            self.publish_ledger()?;
        }
        outcome
    }

    /// Apply the status policy to a driver call outcome. `Ok(None)` means the call
    /// failed and was recorded without interrupting the session.
    fn check<V>(
        &mut self,
        call: DriverCall,
        outcome: Result<V, AppError>,
    ) -> Result<Option<V>, AppError> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(call = %call, error = %err, "Driver call failed");
                self.ledger.record(call, err.to_string());
                self.publish_ledger()?;
                self.apply_policy(call, err)
            }
        }
    }

    /// `check` for calls repeated by a polling loop. `streak` counts consecutive
    /// failures: only the first is logged at warn level and stored with its message.
    /// The ledger is left for `polling` to publish.
    fn check_poll<V>(
        &mut self,
        call: DriverCall,
        outcome: Result<V, AppError>,
        streak: &mut u32,
    ) -> Result<Option<V>, AppError> {
        match outcome {
            Ok(value) => {
                if *streak > 0 {
                    debug!(call = %call, failures = *streak, "Driver poll recovered");
                }
                *streak = 0;
                Ok(Some(value))
            }
            Err(err) => {
                *streak = streak.saturating_add(1);
                if *streak == 1 {
                    warn!(call = %call, error = %err, "Driver poll failed, retrying");
                    self.ledger.record(call, err.to_string());
                } else {
                    debug!(
                        call = %call,
                        error = %err,
                        failures = *streak,
                        "Driver poll failed again"
                    );
                    self.ledger.record_repeat();
                }
                self.apply_policy(call, err)
            }
        }
    }

    fn apply_policy<V>(&self, call: DriverCall, err: AppError) -> Result<Option<V>, AppError> {
        match self.settings.status_policy {
            StatusPolicy::Accumulate => Ok(None),
            StatusPolicy::FailFast => Err(AppError::DriverCall {
                call,
                source: Box::new(err),
            }),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn set_phase(&self, phase: SessionPhase) -> Result<(), AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_phase(phase);
        Ok(())
    }

    fn publish_ledger(&self) -> Result<(), AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_ledger(self.ledger.clone());
        Ok(())
    }
}
