use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;

use super::state::{PhaseStatus, ScanPhase, ScanStatus};
use crate::models::{HttpMethod, Signal};

/// Notifications pushed to observers while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    ScanStarted {
        scan_id: String,
        domain: String,
    },
    /// A phase changed status. `payload` carries phase-specific counts or the error text.
    Phase {
        phase: ScanPhase,
        status: PhaseStatus,
        payload: Value,
    },
    /// Fuzzing progress over parameters.
    Progress {
        processed: usize,
        total: usize,
    },
    VulnerabilityFound {
        url: String,
        parameter: String,
        method: HttpMethod,
        signals: Vec<Signal>,
    },
    ScanFinished {
        scan_id: String,
        status: ScanStatus,
        vulnerabilities: usize,
    },
}

pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

impl ScanObserver for mpsc::UnboundedSender<ScanEvent> {
    fn on_event(&self, event: &ScanEvent) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.send(event.clone());
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ScanEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ScanObserver for EventLog {
    fn on_event(&self, event: &ScanEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
    }
}
