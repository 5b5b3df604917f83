// SPDX-License-Identifier: MIT OR Apache-2.0
//! Terminal rendering of [`SykliError`] (§7): a bordered block with the
//! stable error code, task/step/command context, a truncated output tail,
//! and `help:`/`note:` lines, plus a one-line compact form for `--verbose`
//! off.

use sykli_error::SykliError;

const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Render `error` as a multi-line bordered diagnostic. `color` toggles ANSI
/// escapes (disabled by `--no-color` or a non-tty stdout).
pub fn render(error: &SykliError, color: bool) -> String {
    let (red, bold, dim, reset) = if color { (RED, BOLD, DIM, RESET) } else { ("", "", "", "") };
    let mut out = String::new();

    out.push_str(&format!("{red}{bold}error[{}]{reset}: {}\n", error.code, error.message));

    if let Some(task) = &error.task {
        out.push_str(&format!("  {dim}task:{reset}    {task}\n"));
    }
    if let Some(step) = &error.step {
        out.push_str(&format!("  {dim}step:{reset}    {step}\n"));
    }
    if let Some(command) = &error.command {
        out.push_str(&format!("  {dim}command:{reset} {command}\n"));
    }

    if let Some(output) = &error.output {
        out.push_str(&format!("  {dim}output:{reset}\n"));
        for line in &output.lines {
            out.push_str(&format!("    {line}\n"));
        }
        if output.truncated {
            out.push_str(&format!("    {dim}... output truncated{reset}\n"));
        }
    }

    for note in &error.notes {
        out.push_str(&format!("  {dim}note:{reset} {note}\n"));
    }
    for help in &error.help {
        out.push_str(&format!("  {dim}help:{reset} {help}\n"));
    }

    out
}

/// A single-line rendering for non-verbose runs.
pub fn render_compact(error: &SykliError, color: bool) -> String {
    if color {
        format!("{RED}{}{RESET}", error.to_compact_string())
    } else {
        error.to_compact_string()
    }
}
