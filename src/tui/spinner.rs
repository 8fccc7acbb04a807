//! Activity spinner for long-running research

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A spinner shown while waiting on the research agent
pub struct ResearchSpinner {
    bar: ProgressBar,
    active: bool,
}

impl ResearchSpinner {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&[
                "\u{2800}", "\u{2801}", "\u{2803}", "\u{2807}", "\u{280f}",
                "\u{281f}", "\u{283f}", "\u{287f}", "\u{28ff}", "\u{28fe}",
                "\u{28fc}", "\u{28f8}", "\u{28f0}", "\u{28e0}", "\u{28c0}",
                "\u{2880}", "\u{2800}",
            ]);
        bar.set_style(style);
        Self { bar, active: false }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, msg: &str) {
        self.bar.set_message(msg.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.active = true;
    }

    /// Replace the message, starting the spinner if needed
    pub fn update(&mut self, msg: &str) {
        if self.active {
            self.bar.set_message(msg.to_string());
        } else {
            self.start(msg);
        }
    }

    /// Print a line above the spinner without corrupting it
    pub fn println(&self, line: &str) {
        if self.active {
            self.bar.println(line);
        } else {
            println!("{}", line);
        }
    }

    /// Stop and clear the spinner
    pub fn stop(&mut self) {
        if self.active {
            self.bar.finish_and_clear();
            self.active = false;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for ResearchSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResearchSpinner {
    fn drop(&mut self) {
        self.stop();
    }
}
