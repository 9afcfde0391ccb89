//! Transient status line on stderr

use std::io::{self, IsTerminal, Write};
use std::time::Instant;

/// Shows what a long call is doing; silent when stderr is not a terminal.
pub struct StatusLine {
    enabled: bool,
    started: Instant,
}

impl StatusLine {
    pub fn start(message: &str) -> Self {
        let line = Self {
            enabled: io::stderr().is_terminal(),
            started: Instant::now(),
        };
        line.set_message(message);
        line
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            eprint!("\r{:<60}", msg);
            io::stderr().flush().ok();
        }
    }

    /// Clear the line and report the elapsed time when verbose.
    pub fn finish(self, verbose: bool) {
        if self.enabled {
            eprint!("\r{:<60}\r", "");
            if verbose {
                eprintln!("({:.1}s)", self.started.elapsed().as_secs_f64());
            }
            io::stderr().flush().ok();
        }
    }
}
