//! Renders counter snapshots in the Prometheus text format (version 0.0.4).

use crate::registry::CounterSample;
use std::borrow::Cow;
use std::fmt::Write;

/// Content type advertised for scrape responses.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a snapshot as one HELP/TYPE/value block per counter.
///
/// An empty snapshot renders as an empty string.
pub fn render(samples: &[CounterSample]) -> String {
    let mut out = String::with_capacity(samples.len() * 96);
    render_into(&mut out, samples);
    out
}

/// Append the rendered snapshot to `out`.
pub fn render_into(out: &mut String, samples: &[CounterSample]) {
    for sample in samples {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "# HELP {} {}", sample.name, escape_help(&sample.help));
        let _ = writeln!(out, "# TYPE {} counter", sample.name);
        let _ = writeln!(out, "{} {}", sample.name, sample.value);
    }
}

/// HELP lines escape backslash and line feed.
fn escape_help(help: &str) -> Cow<'_, str> {
    if !help.contains(['\\', '\n']) {
        return Cow::Borrowed(help);
    }
    let mut escaped = String::with_capacity(help.len() + 8);
    for c in help.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
