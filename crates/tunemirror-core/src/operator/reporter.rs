//! User-facing action lines.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::Error;

const LABEL_WIDTH: usize = 10;

/// Writes one line per action, and error reports, to injected sinks.
///
/// Each report is written under the sink's lock in a single call, so lines
/// from concurrent jobs never interleave.
pub struct Reporter {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
    prefixes: Vec<PathBuf>,
    verbose: bool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("prefixes", &self.prefixes)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Report to arbitrary sinks.
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
            prefixes: Vec::new(),
            verbose: false,
        }
    }

    /// Report to stdout and stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Show paths below `prefix` relative to it.
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Also report files that are already current.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// An action on a destination path, such as `cp:`.
    pub fn action(&self, label: &str, path: &Path) {
        let line = format!(
            "{label:<width$}{}\n",
            self.display(path),
            width = LABEL_WIDTH
        );
        write_locked(&self.out, &line);
    }

    /// A destination that is already current. Shown only when verbose.
    pub fn ok(&self, path: &Path) {
        if self.verbose {
            self.action("ok:", path);
        }
    }

    /// A failure, with the encoder output if there is any.
    pub fn problem(&self, label: &str, err: &Error) {
        let mut text = format!(
            "{label:<width$}{}\n",
            self.strip_all(&err.to_string()),
            width = LABEL_WIDTH
        );
        if let Some(output) = err.output()
            && !output.is_empty()
        {
            text.push_str("output:\n");
            text.push_str(output);
            if !output.ends_with('\n') {
                text.push('\n');
            }
        }
        write_locked(&self.err, &text);
    }

    fn display(&self, path: &Path) -> String {
        self.prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix).ok())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn strip_all(&self, message: &str) -> String {
        self.prefixes.iter().fold(message.to_string(), |msg, prefix| {
            let mut prefix = prefix.display().to_string();
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            msg.replace(&prefix, "")
        })
    }
}

fn write_locked(sink: &Mutex<Box<dyn Write + Send>>, text: &str) {
    let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
    // Write failures are ignored.
    let _ = sink.write_all(text.as_bytes());
    let _ = sink.flush();
}
