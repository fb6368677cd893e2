use crate::sensor::{DriverCall, RangingResult};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Booting,
    Configuring,
    Ranging { first_measurement: bool },
    Stopped,
    Failed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Booting => "booting",
            Self::Configuring => "configuring",
            Self::Ranging { .. } => "ranging",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of driver calls that reported failure during the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLedger {
    failed_calls: u32,
    last_failure: Option<(DriverCall, String)>,
}

impl StatusLedger {
    pub fn record(&mut self, call: DriverCall, message: impl Into<String>) {
        self.failed_calls = self.failed_calls.saturating_add(1);
        self.last_failure = Some((call, message.into()));
    }

    /// Count another failure of the call recorded last, keeping its message.
    pub fn record_repeat(&mut self) {
        self.failed_calls = self.failed_calls.saturating_add(1);
    }

    pub fn failed_calls(&self) -> u32 {
        self.failed_calls
    }

    pub fn last_failure(&self) -> Option<(DriverCall, &str)> {
        self.last_failure
            .as_ref()
            .map(|(call, message)| (*call, message.as_str()))
    }

    pub fn is_clean(&self) -> bool {
        self.failed_calls == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestResult {
    pub result: RangingResult,
    pub timestamp: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    phase: SessionPhase,
    latest: Option<LatestResult>,
    reports_emitted: u64,
    ledger: StatusLedger,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            latest: None,
            reports_emitted: 0,
            ledger: StatusLedger::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub fn latest(&self) -> Option<&LatestResult> {
        self.latest.as_ref()
    }

    /// Replace the latest result and count it as reported. Older results are dropped.
    pub fn record_report(&mut self, latest: LatestResult) {
        self.latest = Some(latest);
        self.reports_emitted = self.reports_emitted.saturating_add(1);
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports_emitted
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    pub fn set_ledger(&mut self, ledger: StatusLedger) {
        self.ledger = ledger;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
