//! Worker-side progress reporting
//!
//! The worker talks to its supervisor by printing protocol messages on
//! stdout, one JSON document per line. `Reporter` owns that stream and
//! tags every `Info` line with the package being built, which is also
//! what the server's log filter keys on.

use crate::build::protocol::WorkerMessage;
use std::fmt::Display;
use std::io::Write;
use std::sync::Mutex;

pub struct Reporter {
    package: String,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    /// Production reporter, writing to the real stdout
    pub fn stdout(package: &str) -> Self {
        Self::with_sink(package, Box::new(std::io::stdout()))
    }

    pub fn with_sink(package: &str, sink: Box<dyn Write + Send>) -> Self {
        Self {
            package: package.to_string(),
            sink: Mutex::new(sink),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Progress line, prefixed with the package tag
    pub fn info(&self, message: impl Display) {
        self.send(&WorkerMessage::Info {
            message: format!("[{}] {message}", self.package),
        });
    }

    /// Write one protocol message. Failures are swallowed: if stdout is
    /// gone the supervisor has already given up on this worker.
    pub fn send(&self, message: &WorkerMessage) {
        if let Ok(line) = serde_json::to_string(message) {
            let mut sink = self.sink.lock().unwrap();
            let _ = writeln!(sink, "{line}");
            let _ = sink.flush();
        }
    }
}
