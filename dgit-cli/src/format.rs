//! Console layout for `log`, `global-log` and `status`.

use chrono::{DateTime, Local};
use dgit_core::{Commit, Status};
use std::fmt::Write;

/// Timestamp as `Thu Jan 1 00:00:00 1970 +0000`, in local time.
pub fn format_date(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string(),
        None => timestamp.to_string(),
    }
}

/// One log entry, followed by a blank line.
pub fn log_entry(commit: &Commit, abbrev_len: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===");
    let _ = writeln!(out, "commit {}", commit.id());
    if commit.is_merge() {
        let parents: Vec<String> = commit.parents().iter().map(|p| p.short(abbrev_len)).collect();
        let _ = writeln!(out, "Merge: {}", parents.join(" "));
    }
    let _ = writeln!(out, "Date: {}", format_date(commit.timestamp()));
    let _ = writeln!(out, "{}", commit.message());
    let _ = writeln!(out);
    out
}

pub fn status_report(status: &Status) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Branches ===");
    for branch in &status.branches {
        let marker = if *branch == status.head { "*" } else { "" };
        let _ = writeln!(out, "{}{}", marker, branch);
    }
    section(&mut out, "Staged Files", status.staged.iter());
    section(&mut out, "Removed Files", status.removed.iter());
    section(
        &mut out,
        "Modifications Not Staged For Commit",
        status.unstaged.iter().map(|(name, kind)| format!("{} ({})", name, kind)),
    );
    section(&mut out, "Untracked Files", status.untracked.iter());
    out
}

fn section<T: std::fmt::Display>(out: &mut String, title: &str, lines: impl Iterator<Item = T>) {
    let _ = writeln!(out);
    let _ = writeln!(out, "=== {} ===", title);
    for line in lines {
        let _ = writeln!(out, "{}", line);
    }
}
