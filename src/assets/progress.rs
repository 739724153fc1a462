use std::io::IsTerminal;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::info;

/// Byte counts for one download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub finished: bool,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.downloaded as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// Receives download progress. Implementations must not assume a terminal.
pub trait ProgressSink: Send + Sync {
    fn start(&self, label: &str, total: Option<u64>);
    fn advance(&self, downloaded: u64);
    fn finish(&self);
}

/// Picks a bar for interactive stderr, periodic log lines otherwise.
pub fn for_environment(log_every_bytes: u64) -> Box<dyn ProgressSink> {
    if std::io::stderr().is_terminal() {
        Box::new(BarProgress::new())
    } else {
        Box::new(LogProgress::new(log_every_bytes))
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _downloaded: u64) {}
    fn finish(&self) {}
}

pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                {
                    bar.set_style(style.progress_chars("#>-"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} {bytes}") {
                    bar.set_style(style);
                }
                bar
            }
        };
        bar.set_message(label.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn advance(&self, downloaded: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(downloaded);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish();
            }
        }
    }
}

/// Logs one line per `every` bytes; used when stderr is not a terminal.
pub struct LogProgress {
    every: u64,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    label: String,
    total: Option<u64>,
    last_logged: u64,
    downloaded: u64,
}

impl LogProgress {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            state: Mutex::new(LogState::default()),
        }
    }
}

impl ProgressSink for LogProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        if let Ok(mut state) = self.state.lock() {
            *state = LogState {
                label: label.to_string(),
                total,
                ..LogState::default()
            };
        }
    }

    fn advance(&self, downloaded: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.downloaded = downloaded;
            if downloaded - state.last_logged >= self.every {
                state.last_logged = downloaded;
                match state.total {
                    Some(total) => info!("{}: {}/{} bytes", state.label, downloaded, total),
                    None => info!("{}: {} bytes", state.label, downloaded),
                }
            }
        }
    }

    fn finish(&self) {
        if let Ok(state) = self.state.lock() {
            info!("{}: done ({} bytes)", state.label, state.downloaded);
        }
    }
}

/// Publishes progress on a watch channel for programmatic subscribers.
pub struct WatchProgress {
    tx: watch::Sender<DownloadProgress>,
}

impl WatchProgress {
    pub fn channel() -> (Self, watch::Receiver<DownloadProgress>) {
        let (tx, rx) = watch::channel(DownloadProgress::default());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgress {
    fn start(&self, _label: &str, total: Option<u64>) {
        self.tx.send_replace(DownloadProgress {
            downloaded: 0,
            total,
            finished: false,
        });
    }

    fn advance(&self, downloaded: u64) {
        self.tx.send_modify(|p| p.downloaded = downloaded);
    }

    fn finish(&self) {
        self.tx.send_modify(|p| p.finished = true);
    }
}
