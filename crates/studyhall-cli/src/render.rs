//! Line-oriented rendering of the session view.
//!
//! The terminal is a scrolling log, not a screen, so [`Renderer`] prints
//! only what changed since the previous render: connection indicator
//! changes, new chat lines, a new call banner, a new status message. When
//! the log is replaced rather than extended (history arrived after lines
//! were already printed), it is printed again in full under a separator.

use std::{io::Write, ops::Add, time::Duration};

use studyhall_app::{App, ConnectionIndicator};
use studyhall_client::ChatLogEntry;

/// Incremental printer for one user's view.
#[derive(Debug)]
pub struct Renderer {
    self_email: String,
    started: bool,
    /// Log entries printed since the last replacement.
    shown: usize,
    /// [`App::log_replacements`] at the last render.
    replacements: u64,
    indicator: ConnectionIndicator,
    banner: Option<String>,
    status: Option<String>,
}

impl Renderer {
    /// Renderer for the user identified by `self_email`.
    pub fn new(self_email: impl Into<String>) -> Self {
        Self {
            self_email: self_email.into(),
            started: false,
            shown: 0,
            replacements: 0,
            indicator: ConnectionIndicator::Disconnected,
            banner: None,
            status: None,
        }
    }

    /// Print whatever changed in `app` since the last call.
    pub fn render<W, I>(&mut self, out: &mut W, app: &App<I>) -> std::io::Result<()>
    where
        W: Write,
        I: Copy + Ord + Add<Duration, Output = I>,
    {
        if !self.started {
            self.started = true;
            writeln!(out, "Study group {}", app.group())?;
            writeln!(
                out,
                "Type to chat. /call starts a video call, /history reloads, /quit leaves."
            )?;
        }

        if app.indicator() != self.indicator {
            self.indicator = app.indicator();
            writeln!(out, "* {}", self.indicator.label())?;
        }

        let log = app.log();
        let replaced = app.log_replacements() != self.replacements || log.len() < self.shown;
        if replaced {
            self.replacements = app.log_replacements();
            if self.shown > 0 {
                writeln!(out, "-- chat history --")?;
            }
            self.shown = 0;
        }
        for entry in log.iter().skip(self.shown) {
            writeln!(out, "{}", self.format_entry(entry))?;
        }
        self.shown = log.len();

        let banner = app.call_banner().map(|banner| banner.message.clone());
        if banner != self.banner {
            if let Some(message) = &banner {
                writeln!(out, "*** {message} (type /call to join) ***")?;
            }
            self.banner = banner;
        }

        let status = app.status_message().map(str::to_string);
        if status != self.status {
            if let Some(message) = &status {
                writeln!(out, "! {message}")?;
            }
            self.status = status;
        }

        out.flush()
    }

    /// One chat line: `[HH:MM] name: content`, own messages marked.
    pub fn format_entry(&self, entry: &ChatLogEntry) -> String {
        let time = entry.timestamp.format("%H:%M");
        if entry.is_from(&self.self_email) {
            format!("[{time}] {} (you): {}", entry.sender_name, entry.content)
        } else {
            format!("[{time}] {}: {}", entry.sender_name, entry.content)
        }
    }
}
