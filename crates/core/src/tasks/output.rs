//! The single writer for job output.
//!
//! Every line produced by a job goes through [`OutputSink`]. By default a
//! job's lines are held back and written in one piece when it exits, so
//! concurrent jobs never interleave. With `interlaced` they are written as
//! they arrive.

use crate::config::Presentation;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

/// Prefix glyph of verbose lines.
pub const MARKER: &str = "➤";

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Source pipe.
    pub stream: Stream,
    /// Content without the trailing newline.
    pub text: String,
}

/// Formats a duration as `1m 2s`, `3s 45ms` or `12ms`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let minutes = total_ms / 60_000;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{seconds}s {millis}ms")
    } else {
        format!("{millis}ms")
    }
}

/// Writes job output to a stdout and a stderr writer.
#[derive(Debug)]
pub struct OutputSink<O: Write, E: Write> {
    out: O,
    err: E,
    presentation: Presentation,
    captured: HashMap<usize, Vec<OutputLine>>,
}

impl<O: Write, E: Write> OutputSink<O, E> {
    /// Creates a sink writing to `out` and `err`.
    pub fn new(out: O, err: E, presentation: Presentation) -> Self {
        Self {
            out,
            err,
            presentation,
            captured: HashMap::new(),
        }
    }

    fn write_line(&mut self, workspace: &str, stream: Stream, text: &str) -> io::Result<()> {
        let writer: &mut dyn Write = match stream {
            Stream::Stdout => &mut self.out,
            Stream::Stderr => &mut self.err,
        };
        if self.presentation.verbose {
            writeln!(writer, "{MARKER} [{workspace}]: {text}")
        } else {
            writeln!(writer, "{text}")
        }
    }

    /// A job was dispatched.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn job_started(&mut self, job: usize, workspace: &str) -> io::Result<()> {
        self.captured.entry(job).or_default();
        if self.presentation.verbose {
            self.write_line(workspace, Stream::Stdout, "Process started")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// A job produced a line.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn line(&mut self, job: usize, workspace: &str, stream: Stream, text: String) -> io::Result<()> {
        if self.presentation.interlaced {
            self.write_line(workspace, stream, &text)?;
            match stream {
                Stream::Stdout => self.out.flush()?,
                Stream::Stderr => self.err.flush()?,
            }
        }
        self.captured
            .entry(job)
            .or_default()
            .push(OutputLine { stream, text });
        Ok(())
    }

    /// A job exited. Writes its held-back lines and returns everything it
    /// produced.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn job_finished(
        &mut self,
        job: usize,
        workspace: &str,
        exit_code: i32,
        duration: Duration,
    ) -> io::Result<Vec<OutputLine>> {
        let lines = self.captured.remove(&job).unwrap_or_default();
        if !self.presentation.interlaced {
            for line in &lines {
                self.write_line(workspace, line.stream, &line.text)?;
            }
        }
        if self.presentation.verbose {
            let message = format!(
                "Process exited (exit code {exit_code}), completed in {}",
                format_duration(duration)
            );
            self.write_line(workspace, Stream::Stdout, &message)?;
        }
        self.out.flush()?;
        self.err.flush()?;
        Ok(lines)
    }

    /// A job was held back because a dependency failed.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn job_skipped(&mut self, workspace: &str) -> io::Result<()> {
        if self.presentation.verbose {
            self.write_line(workspace, Stream::Stderr, "Skipped, a dependency failed")?;
        }
        Ok(())
    }

    /// Writes the terminal line.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn done(&mut self, elapsed: Duration) -> io::Result<()> {
        if self.presentation.verbose {
            writeln!(self.out, "{MARKER} Done in {}", format_duration(elapsed))?;
        } else {
            writeln!(self.out, "Done")?;
        }
        self.out.flush()
    }

    /// Returns the writers.
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(verbose: bool, interlaced: bool) -> OutputSink<Vec<u8>, Vec<u8>> {
        OutputSink::new(Vec::new(), Vec::new(), Presentation { verbose, interlaced })
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_buffered_output_is_grouped_per_job() {
        let mut sink = sink(false, false);
        sink.job_started(0, "a").unwrap();
        sink.job_started(1, "b").unwrap();
        sink.line(0, "a", Stream::Stdout, "a1".into()).unwrap();
        sink.line(1, "b", Stream::Stdout, "b1".into()).unwrap();
        sink.line(0, "a", Stream::Stdout, "a2".into()).unwrap();
        sink.job_finished(1, "b", 0, Duration::ZERO).unwrap();
        let captured = sink.job_finished(0, "a", 0, Duration::ZERO).unwrap();
        sink.done(Duration::ZERO).unwrap();

        assert_eq!(captured.len(), 2);
        let (out, err) = sink.into_inner();
        assert_eq!(text(&out), "b1\na1\na2\nDone\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_interlaced_output_is_immediate() {
        let mut sink = sink(false, true);
        sink.job_started(0, "a").unwrap();
        sink.job_started(1, "b").unwrap();
        sink.line(0, "a", Stream::Stdout, "a1".into()).unwrap();
        sink.line(1, "b", Stream::Stdout, "b1".into()).unwrap();
        sink.line(0, "a", Stream::Stdout, "a2".into()).unwrap();
        sink.job_finished(0, "a", 0, Duration::ZERO).unwrap();
        sink.job_finished(1, "b", 0, Duration::ZERO).unwrap();

        let (out, _) = sink.into_inner();
        assert_eq!(text(&out), "a1\nb1\na2\n");
    }

    #[test]
    fn test_verbose_prefixes_and_lifecycle_lines() {
        let mut sink = sink(true, false);
        sink.job_started(0, "workspace-a").unwrap();
        sink.line(0, "workspace-a", Stream::Stderr, "oops".into()).unwrap();
        sink.line(0, "workspace-a", Stream::Stdout, "Test Workspace A".into()).unwrap();
        sink.job_finished(0, "workspace-a", 1, Duration::from_millis(1500)).unwrap();
        sink.done(Duration::from_millis(12)).unwrap();

        let (out, err) = sink.into_inner();
        assert_eq!(
            text(&out),
            "➤ [workspace-a]: Process started\n\
             ➤ [workspace-a]: Test Workspace A\n\
             ➤ [workspace-a]: Process exited (exit code 1), completed in 1s 500ms\n\
             ➤ Done in 12ms\n"
        );
        assert_eq!(text(&err), "➤ [workspace-a]: oops\n");
    }

    #[test]
    fn test_non_verbose_has_no_glyphs() {
        let mut sink = sink(false, false);
        sink.job_started(0, "a").unwrap();
        sink.job_skipped("b").unwrap();
        sink.line(0, "a", Stream::Stdout, "hello".into()).unwrap();
        sink.job_finished(0, "a", 0, Duration::ZERO).unwrap();
        sink.done(Duration::ZERO).unwrap();

        let (out, err) = sink.into_inner();
        assert!(!text(&out).contains(MARKER));
        assert!(err.is_empty());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(12)), "12ms");
        assert_eq!(format_duration(Duration::from_millis(3045)), "3s 45ms");
        assert_eq!(format_duration(Duration::from_secs(62)), "1m 2s");
    }
}
