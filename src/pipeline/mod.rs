pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod phase;
pub mod state;

pub use events::{EventLog, ScanEvent, ScanObserver};
pub use orchestrator::{required_tools, ScanOrchestrator};
pub use phase::PHASES;
pub use state::{PhaseRecord, PhaseStatus, ScanPhase, ScanReport, ScanStatus};
