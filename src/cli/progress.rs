use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::ScanConfig;
use crate::pipeline::phase::{display_name, planned_phases};
use crate::pipeline::{PhaseStatus, ScanEvent, ScanPhase, ScanStatus};
use crate::utils::formatting::format_duration;

/// Terminal progress for one scan, fed from the event channel.
pub struct ScanProgress {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    fuzz_bar: Option<ProgressBar>,
    vulnerabilities: usize,
    start_time: std::time::Instant,
}

impl ScanProgress {
    pub fn new(scan: &ScanConfig) -> Self {
        let multi = MultiProgress::new();
        let phase_count = planned_phases(scan).len() as u64;

        let phase_bar = multi.add(ProgressBar::new(phase_count));
        if let Ok(bar_style) = ProgressStyle::default_bar().template("  {bar:30.cyan/dark_gray} {pos}/{len} phases | {msg}") {
            phase_bar.set_style(bar_style.progress_chars("█▓░"));
        }
        phase_bar.set_message("Initializing scan...");

        Self { multi, phase_bar, fuzz_bar: None, vulnerabilities: 0, start_time: std::time::Instant::now() }
    }

    pub fn handle_event(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::ScanStarted { domain, .. } => {
                self.phase_bar.set_message(format!("Scanning {}", domain));
            }
            ScanEvent::Phase { phase, status, payload } => match status {
                PhaseStatus::Started => self.phase_bar.set_message(display_name(*phase)),
                PhaseStatus::InProgress => {}
                PhaseStatus::Completed => {
                    self.phase_bar.inc(1);
                    if *phase == ScanPhase::Fuzzing {
                        if let Some(bar) = self.fuzz_bar.take() {
                            bar.finish_and_clear();
                        }
                    }
                }
                PhaseStatus::Error => {
                    self.phase_bar.inc(1);
                    self.println(&format!(
                        "  {} {} failed: {}",
                        style("✗").red(),
                        display_name(*phase),
                        payload.as_str().unwrap_or("see logs")
                    ));
                }
            },
            ScanEvent::Progress { processed, total } => {
                let bar = self.fuzz_bar.get_or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new(*total as u64));
                    if let Ok(bar_style) = ProgressStyle::default_bar()
                        .template("    {spinner:.yellow} fuzzing {pos}/{len} parameters {wide_msg}")
                    {
                        bar.set_style(bar_style);
                    }
                    bar
                });
                bar.set_position(*processed as u64);
            }
            ScanEvent::VulnerabilityFound { url, parameter, method, .. } => {
                self.vulnerabilities += 1;
                self.println(&format!("  {} {} {} [{}]", style("!").yellow().bold(), method, url, parameter));
                if let Some(bar) = &self.fuzz_bar {
                    bar.set_message(format!("{} flagged", self.vulnerabilities));
                }
            }
            ScanEvent::ScanFinished { status, vulnerabilities, .. } => {
                if let Some(bar) = self.fuzz_bar.take() {
                    bar.finish_and_clear();
                }
                let elapsed = format_duration(self.start_time.elapsed().as_millis() as u64);
                let summary = format!("Scan {}: {} potential vulnerabilities | {}", status, vulnerabilities, elapsed);
                match status {
                    ScanStatus::Completed => self.phase_bar.finish_with_message(summary),
                    _ => self.phase_bar.abandon_with_message(summary),
                }
            }
        }
    }

    /// Print a line through the multi-progress (won't interfere with bars).
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}
