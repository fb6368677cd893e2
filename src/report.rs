use crate::error::AppError;
use crate::sensor::RangingResult;
use crate::state::{AppState, LatestResult};
use std::io::Write;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Destination for ranging results as they are reported.
pub trait ResultSink {
    fn emit(&mut self, result: &RangingResult) -> Result<(), AppError>;
}

/// Fan out every result to both sinks, in order.
impl<A: ResultSink, B: ResultSink> ResultSink for (A, B) {
    fn emit(&mut self, result: &RangingResult) -> Result<(), AppError> {
        self.0.emit(result)?;
        self.1.emit(result)
    }
}

pub fn format_result(result: &RangingResult) -> String {
    format!(
        "Status = {:2}, dist = {:5}, Ambient = {:2}, Signal = {:5}, #ofSpads = {:5}",
        result.status_code(),
        result.distance_mm,
        result.ambient,
        result.signal_per_spad,
        result.spad_count
    )
}

/// Writes one line per result and flushes so each report is visible immediately.
pub struct ConsoleSink<W> {
    writer: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ResultSink for ConsoleSink<W> {
    fn emit(&mut self, result: &RangingResult) -> Result<(), AppError> {
        writeln!(self.writer, "{}", format_result(result))
            .and_then(|()| self.writer.flush())
            .map_err(|err| AppError::Output(err.to_string()))
    }
}

/// Publishes each result as the latest one in shared state.
pub struct StateSink {
    state: Arc<RwLock<AppState>>,
}

impl StateSink {
    pub fn new(state: Arc<RwLock<AppState>>) -> Self {
        Self { state }
    }
}

impl ResultSink for StateSink {
    fn emit(&mut self, result: &RangingResult) -> Result<(), AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.record_report(LatestResult {
            result: *result,
            timestamp: SystemTime::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorRangeStatus;
    use crate::sensor::mock::reading;

    #[test]
    fn console_line_uses_fixed_width_fields() {
        let result = RangingResult {
            range_status: SensorRangeStatus::Valid,
            distance_mm: 1234,
            ambient: 7,
            signal_per_spad: 5120,
            spad_count: 212,
        };

        assert_eq!(
            format_result(&result),
            "Status =  0, dist =  1234, Ambient =  7, Signal =  5120, #ofSpads =   212"
        );
    }

    #[test]
    fn console_sink_writes_one_line_per_result() -> Result<(), AppError> {
        let mut sink = ConsoleSink::new(Vec::new());

        sink.emit(&reading(100, SensorRangeStatus::Valid))?;
        sink.emit(&reading(200, SensorRangeStatus::SignalFailure))?;

        let output = String::from_utf8(sink.into_inner()).expect("utf8 output");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Status =  0, dist =   100"));
        assert!(lines[1].starts_with("Status =  2, dist =   200"));
        Ok(())
    }

    #[test]
    fn paired_sinks_both_receive_result() -> Result<(), AppError> {
        let state = Arc::new(RwLock::new(AppState::new()));
        let mut sink = (
            ConsoleSink::new(Vec::new()),
            StateSink::new(Arc::clone(&state)),
        );

        sink.emit(&reading(420, SensorRangeStatus::Valid))?;

        let guard = state.read().map_err(|_| AppError::StateLock)?;
        assert_eq!(guard.reports_emitted(), 1);
        assert_eq!(guard.latest().map(|latest| latest.result.distance_mm), Some(420));
        drop(guard);
        let (console, _) = sink;
        assert_eq!(console.into_inner().iter().filter(|b| **b == b'\n').count(), 1);
        Ok(())
    }
}
