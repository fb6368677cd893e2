use crate::error::AppError;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CANCEL_POLL: Duration = Duration::from_millis(50);

/// Source of report triggers. Each byte requests one ranging report.
pub trait TriggerSource {
    /// Block until the next trigger byte. `None` means no more triggers will arrive.
    fn next_trigger(&mut self) -> Result<Option<u8>, AppError>;
}

/// Reads trigger bytes one at a time from a blocking reader such as stdin.
pub struct ReaderTrigger<R> {
    reader: R,
}

impl<R: Read> ReaderTrigger<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> TriggerSource for ReaderTrigger<R> {
    fn next_trigger(&mut self) -> Result<Option<u8>, AppError> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(AppError::Input(err.to_string())),
            }
        }
    }
}

/// Receives trigger bytes from any number of producers and gives up when
/// the stop flag is raised or every sender is gone.
pub struct ChannelTrigger {
    receiver: Receiver<u8>,
    stop: Arc<AtomicBool>,
    cancel_poll: Duration,
}

impl ChannelTrigger {
    pub fn new(receiver: Receiver<u8>, stop: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            stop,
            cancel_poll: DEFAULT_CANCEL_POLL,
        }
    }
}

impl TriggerSource for ChannelTrigger {
    fn next_trigger(&mut self) -> Result<Option<u8>, AppError> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                debug!("Trigger wait cancelled");
                return Ok(None);
            }
            match self.receiver.recv_timeout(self.cancel_poll) {
                Ok(byte) => return Ok(Some(byte)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

/// Forward bytes from a blocking reader into a trigger channel on a detached thread.
///
/// The thread ends at end of input, on a read error, or once the receiving side is dropped.
pub fn spawn_reader_forwarder<R>(reader: R, sender: Sender<u8>) -> std::thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut source = ReaderTrigger::new(reader);
        loop {
            match source.next_trigger() {
                Ok(Some(byte)) => {
                    if sender.send(byte).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Trigger input closed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Trigger input failed");
                    break;
                }
            }
        }
    })
}
