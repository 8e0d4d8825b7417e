use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::transport::CycleStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Status line for detection cycles: a spinner on a terminal, plain lines otherwise.
pub struct CycleDisplay {
    pretty: bool,
    current: Option<CycleGuard>,
}

impl CycleDisplay {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            };
        Self {
            pretty,
            current: None,
        }
    }

    pub fn update(&mut self, status: CycleStatus) {
        match status {
            CycleStatus::Searching => {
                if let Some(previous) = self.current.take() {
                    previous.finish("superseded");
                }
                self.current = Some(CycleGuard::start(self.pretty));
            }
            CycleStatus::Rejected => {
                if let Some(current) = &self.current {
                    current.note("batch rejected, still SEARCHING...");
                } else {
                    eprintln!("batch rejected");
                }
            }
            CycleStatus::Found(n) => self.finish(&format!("{n} objects")),
            CycleStatus::NoResult => self.finish("NO RESULT"),
        }
    }

    fn finish(&mut self, message: &str) {
        match self.current.take() {
            Some(guard) => guard.finish(message),
            None => eprintln!("{message}"),
        }
    }
}

struct CycleGuard {
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl CycleGuard {
    fn start(pretty: bool) -> Self {
        let spinner = if pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message("SEARCHING...");
            Some(spinner)
        } else {
            eprintln!("==> SEARCHING...");
            None
        };
        Self {
            start: Instant::now(),
            spinner,
        }
    }

    fn note(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => eprintln!("    {message}"),
        }
    }

    fn finish(self, message: &str) {
        let line = format!("✔ {} ({})", message, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_mode_parses_flags() {
        assert_eq!(UiMode::parse(Some("plain")), UiMode::Plain);
        assert_eq!(UiMode::parse(Some("pretty")), UiMode::Pretty);
        assert_eq!(UiMode::parse(None), UiMode::Auto);
    }

    #[test]
    fn plain_display_tracks_cycles() {
        let mut display = CycleDisplay::new(UiMode::Auto, false);
        display.update(CycleStatus::Searching);
        assert!(display.current.is_some());
        display.update(CycleStatus::Rejected);
        assert!(display.current.is_some());
        display.update(CycleStatus::NoResult);
        assert!(display.current.is_none());
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
