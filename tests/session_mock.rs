use ranging_sampler::error::AppError;
use ranging_sampler::report::{ConsoleSink, StateSink};
use ranging_sampler::sensor::mock::{MockDeviceBehavior, MockDeviceFactory, reading};
use ranging_sampler::sensor::{DriverCall, SensorRangeStatus};
use ranging_sampler::session::{RangingSession, SessionSettings};
use ranging_sampler::state::{AppState, SessionPhase};
use ranging_sampler::trigger::ReaderTrigger;
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[test]
fn console_session_prints_one_line_per_input_byte() -> Result<(), AppError> {
    let behavior = MockDeviceBehavior::ok()
        .boots_on_poll(2)
        .ready_on_poll(2)
        .with_readings(vec![
            reading(523, SensorRangeStatus::Valid),
            reading(1890, SensorRangeStatus::SigmaFailure),
        ]);
    let factory = MockDeviceFactory::new(behavior);
    let log = factory.log();
    let state = Arc::new(RwLock::new(AppState::new()));
    let settings = SessionSettings {
        boot_poll_interval: Duration::from_micros(10),
        ..SessionSettings::default()
    };
    let mut session = RangingSession::new(
        factory,
        settings,
        Arc::clone(&state),
        Arc::new(AtomicBool::new(false)),
    );
    // Two keypresses followed by end of input.
    let mut trigger = ReaderTrigger::new(Cursor::new(b"\n\n".to_vec()));
    let mut sink = (
        ConsoleSink::new(Vec::new()),
        StateSink::new(Arc::clone(&state)),
    );

    let summary = session.run(&mut trigger, &mut sink)?;

    let (console, _) = sink;
    let output = String::from_utf8(console.into_inner()).expect("utf8 output");
    assert_eq!(
        output,
        "Status =  0, dist =   523, Ambient =  3, Signal =  1200, #ofSpads =    16\n\
         Status =  1, dist =  1890, Ambient =  3, Signal =  1200, #ofSpads =    16\n"
    );
    assert_eq!(summary.reports_emitted, 2);
    assert!(summary.ledger.is_clean());

    let calls = ranging_sampler::sensor::mock::snapshot(&log);
    let clears = calls
        .iter()
        .filter(|call| **call == DriverCall::ClearInterrupt)
        .count();
    assert_eq!(clears, 3);

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.phase(), SessionPhase::Stopped);
    assert_eq!(guard.reports_emitted(), 2);
    assert_eq!(
        guard.latest().map(|latest| latest.result.distance_mm),
        Some(1890)
    );
    Ok(())
}
