//! Presenting outcomes to the user.

use std::io::{Stdout, Write};
use std::iter::zip;

use colored::{ColoredString, Colorize};
use colourado::{Color, ColorPalette, PaletteType};

use crate::host::HostTarget;
use crate::worker::ExecutionOutcome;

/// Receives every outcome as soon as the dispatcher sees it.
pub trait Reporter: Send {
    fn report(&mut self, outcome: &ExecutionOutcome);

    /// Called once when fail-fast ends the run, right after `failed` was reported.
    fn aborting(&mut self, _failed: &ExecutionOutcome) {}
}

/// Prints outcomes as text. Output is green on success and red on failure, and every host
/// gets its own label color.
pub struct ConsoleReporter<W = Stdout> {
    writer: W,
    color: bool,
    labels: Vec<ColoredString>,
}

impl ConsoleReporter<Stdout> {
    pub fn new(hosts: &[HostTarget], color: bool) -> Self {
        Self::with_writer(std::io::stdout(), hosts, color)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn with_writer(writer: W, hosts: &[HostTarget], color: bool) -> Self {
        let color = color && !cfg!(windows);
        let labels = if color {
            let palette = ColorPalette::new(hosts.len().max(1) as u32, PaletteType::Pastel, false);
            zip(hosts, palette.colors)
                .map(|(host, color)| prettify(host, color))
                .collect()
        } else {
            hosts.iter().map(|host| host.to_string().normal()).collect()
        };
        Self {
            writer,
            color,
            labels,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn label(&self, outcome: &ExecutionOutcome) -> ColoredString {
        match self.labels.get(outcome.host_index) {
            Some(label) => label.clone(),
            None => outcome.host.to_string().normal(),
        }
    }

    fn write_outcome(&mut self, outcome: &ExecutionOutcome) -> std::io::Result<()> {
        let label = self.label(outcome);
        let body = match &outcome.failure {
            None => {
                writeln!(
                    self.writer,
                    "[*] Execution of `{}` on {} succeeded:",
                    outcome.command, label
                )?;
                if self.color {
                    outcome.truncated_output.green()
                } else {
                    outcome.truncated_output.normal()
                }
            }
            Some(error) => {
                writeln!(
                    self.writer,
                    "[X] Execution of `{}` on {} failed. Error message: {}",
                    outcome.command, label, error
                )?;
                if self.color {
                    outcome.truncated_output.red()
                } else {
                    outcome.truncated_output.normal()
                }
            }
        };
        if !outcome.truncated_output.is_empty() {
            writeln!(self.writer, "{}", body)?;
        }
        self.writer.flush()
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&mut self, outcome: &ExecutionOutcome) {
        if let Err(e) = self.write_outcome(outcome) {
            tracing::error!("Failed to write outcome: {}", e);
        }
    }

    fn aborting(&mut self, failed: &ExecutionOutcome) {
        let message = format!(
            "[X] Aborting: `{}` failed on {} and --fail is set. Commands still running elsewhere are abandoned.",
            failed.command, failed.host
        );
        let message = if self.color {
            message.yellow()
        } else {
            message.normal()
        };
        if let Err(e) = writeln!(self.writer, "{}", message).and_then(|_| self.writer.flush()) {
            tracing::error!("Failed to write abort notice: {}", e);
        }
    }
}

/// Colors the `user@host:port` label with one palette color.
fn prettify(host: &HostTarget, color: Color) -> ColoredString {
    let r = (color.red * 255.0) as u8;
    let g = (color.green * 255.0) as u8;
    let b = (color.blue * 255.0) as u8;
    host.to_string().truecolor(r, g, b)
}
