//! Terminal progress display for dump parsing.

use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use engine::{RunEvent, RunSink};

/// The bar renders only when stderr is attached to a terminal. For
/// non-interactive environments (CI, redirections), progress updates
/// are skipped to avoid noisy logs.
pub struct ProgressBar {
    total_lines: usize,
    lines_done: usize,
    configurations: usize,
    configurations_done: usize,
    width: usize,
    last_line_len: usize,
    min_interval: Duration,
    last_draw: Instant,
    start: Instant,
}

impl ProgressBar {
    /// Returns `None` when stderr is not a terminal.
    pub fn new() -> Option<Self> {
        if !io::stderr().is_terminal() {
            return None;
        }
        Some(Self::detached())
    }

    fn detached() -> Self {
        let start = Instant::now();
        Self {
            total_lines: 0,
            lines_done: 0,
            configurations: 0,
            configurations_done: 0,
            width: 28,
            last_line_len: 0,
            min_interval: Duration::from_millis(75),
            last_draw: start,
            start,
        }
    }

    /// Adds the lines of a newly started configuration.
    pub fn extend_total(&mut self, lines: usize) {
        self.total_lines += lines;
        self.configurations += 1;
        self.draw(true);
        self.relax_throttle();
    }

    /// Marks `count` dump lines as parsed. Redraws are throttled.
    pub fn increment_lines(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.lines_done = (self.lines_done + count).min(self.total_lines);
        self.draw(false);
    }

    pub fn finish_configuration(&mut self) {
        self.configurations_done = (self.configurations_done + 1).min(self.configurations);
        self.draw(true);
    }

    /// Forces a final draw and moves the cursor to the next line.
    pub fn finish(&mut self) {
        self.lines_done = self.total_lines;
        self.draw(true);
        let _ = writeln!(io::stderr());
        self.last_line_len = 0;
    }

    fn message(&self, percent: f64, eta: &str) -> String {
        let filled = ((self.width as f64) * percent).round() as usize;
        let filled = filled.min(self.width);
        let bar = format!(
            "{}{}",
            "█".repeat(filled),
            "░".repeat(self.width.saturating_sub(filled))
        );
        format!(
            "▸ Parse progress |{bar}| {:6.2}% | lines {}/{} | configurations {}/{} | ETA {eta}",
            percent * 100.0,
            self.lines_done,
            self.total_lines,
            self.configurations_done,
            self.configurations,
        )
    }

    fn percent(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.lines_done as f64 / self.total_lines as f64).clamp(0.0, 1.0)
    }

    fn draw(&mut self, force: bool) {
        let now = Instant::now();
        if !force
            && self.last_line_len != 0
            && now.duration_since(self.last_draw) < self.min_interval
        {
            return;
        }
        self.last_draw = now;

        let eta = self.estimate_eta().unwrap_or_else(|| "--:--".to_string());
        let message = self.message(self.percent(), &eta);
        let padding = " ".repeat(self.last_line_len.saturating_sub(message.len()));
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r{message}{padding}");
        let _ = stderr.flush();
        self.last_line_len = message.len();
    }

    fn relax_throttle(&mut self) {
        if let Some(adjusted) = self.last_draw.checked_sub(self.min_interval) {
            self.last_draw = adjusted;
        }
    }

    fn estimate_eta(&self) -> Option<String> {
        if self.lines_done == 0 {
            return None;
        }
        if self.lines_done >= self.total_lines {
            return Some("00:00".to_string());
        }
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed < f64::EPSILON {
            return None;
        }
        let rate = self.lines_done as f64 / elapsed;
        let remaining = (self.total_lines - self.lines_done) as f64 / rate;
        Some(format_duration(Duration::from_secs_f64(remaining)))
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[derive(Default)]
struct SinkState {
    bar: Option<ProgressBar>,
    /// Total and last reported line count per configuration.
    seen: HashMap<String, (usize, usize)>,
}

/// Feeds run events of every configuration into one shared bar. Clones
/// share the bar, so one can be installed as the run sink and the other
/// kept to finish the display.
#[derive(Clone)]
pub struct ProgressSink {
    state: Arc<Mutex<SinkState>>,
}

impl ProgressSink {
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                bar,
                seen: HashMap::new(),
            })),
        }
    }

    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = state.bar.as_mut() {
            bar.finish();
        }
    }
}

impl RunSink for ProgressSink {
    fn event(&self, event: RunEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let SinkState { bar, seen } = &mut *state;
        let Some(bar) = bar.as_mut() else {
            return;
        };
        match event {
            RunEvent::Started {
                configuration,
                total_lines,
            } => {
                seen.insert(configuration, (total_lines, 0));
                bar.extend_total(total_lines);
            }
            RunEvent::Progress {
                configuration,
                lines,
            } => {
                let (_, last) = seen.entry(configuration).or_default();
                bar.increment_lines(lines.saturating_sub(*last));
                *last = lines;
            }
            RunEvent::Finished { configuration, .. } => {
                if let Some((total, last)) = seen.remove(&configuration) {
                    bar.increment_lines(total.saturating_sub(last));
                }
                bar.finish_configuration();
            }
        }
    }
}
