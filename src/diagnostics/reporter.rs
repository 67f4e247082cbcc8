//! Emission of findings and action errors after a run.
//!
//! Findings are printed only for root actions; errors are printed for
//! every action. Text output de-duplicates findings by resolved position
//! so a source file shared by several root packages (a library and its
//! test variant) reports each finding once. The structured form keeps one
//! entry per package id, so shared files appear under each package.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::diagnostics::{position_string, FileCache};
use crate::graph::{postorder, Action};
use crate::model::Session;

#[derive(Clone, Copy, Debug, Default)]
pub struct ReportOptions {
    /// Emit the structured JSON tree instead of text.
    pub json: bool,
    /// Show the offending line plus this many lines of context.
    pub context_lines: Option<usize>,
}

#[derive(Serialize)]
struct JsonFinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    position: String,
    message: String,
}

#[derive(Serialize)]
struct JsonError {
    error: String,
}

/// Print findings for root actions and errors for all actions.
pub fn report(
    session: &Session,
    files: &FileCache,
    roots: &[Arc<Action>],
    opts: ReportOptions,
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> io::Result<()> {
    let actions = postorder(roots);
    if opts.json {
        report_json(session, files, &actions, out)
    } else {
        report_text(files, &actions, opts, out, err_out)
    }
}

fn report_text(
    files: &FileCache,
    actions: &[Arc<Action>],
    opts: ReportOptions,
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> io::Result<()> {
    let mut seen: HashSet<(String, &'static str, Option<String>, String)> = HashSet::new();
    for action in actions {
        let Some(result) = action.result() else { continue };
        if let Some(error) = &result.error {
            writeln!(err_out, "{}: {error}", action.analysis.name())?;
            continue;
        }
        if !action.is_root() {
            continue;
        }
        for finding in &result.findings {
            let position = position_string(files, finding.span);
            let key = (
                position.clone(),
                action.analysis.name(),
                finding.category.clone(),
                finding.message.clone(),
            );
            if !seen.insert(key) {
                continue;
            }

            let class = match &finding.category {
                Some(category) => format!("{}.{category}", action.analysis.name()),
                None => action.analysis.name().to_string(),
            };
            writeln!(out, "{position}: [{class}] {}", finding.message)?;

            if let Some(context) = opts.context_lines {
                write_context(files, finding.span, context, out)?;
            }
        }
    }
    Ok(())
}

fn write_context(
    files: &FileCache,
    span: crate::diagnostics::Span,
    context: usize,
    out: &mut dyn Write,
) -> io::Result<()> {
    let Some(file) = files.get(span.file_id) else {
        return Ok(());
    };
    let Some(line_col) = file.line_col(span.start) else {
        return Ok(());
    };
    let first = line_col.line.saturating_sub(context).max(1);
    let last = (line_col.line + context).min(file.line_count());
    for line in first..=last {
        if let Some(text) = file.line(line) {
            write!(out, "{line}\t{text}")?;
            if !text.ends_with('\n') {
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

fn report_json(
    session: &Session,
    files: &FileCache,
    actions: &[Arc<Action>],
    out: &mut dyn Write,
) -> io::Result<()> {
    // package id -> analysis name -> findings or failure
    let mut tree: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    for action in actions {
        let Some(result) = action.result() else { continue };
        let pkg_id = session.pkg(action.pkg).id.clone();
        if let Some(error) = &result.error {
            let value = serde_json::to_value(JsonError {
                error: error.to_string(),
            })
            .map_err(io::Error::other)?;
            tree.entry(pkg_id)
                .or_default()
                .insert(action.analysis.name().to_string(), value);
        } else if action.is_root() && !result.findings.is_empty() {
            let findings: Vec<JsonFinding> = result
                .findings
                .iter()
                .map(|finding| JsonFinding {
                    category: finding.category.clone(),
                    position: position_string(files, finding.span),
                    message: finding.message.clone(),
                })
                .collect();
            let value = serde_json::to_value(findings).map_err(io::Error::other)?;
            tree.entry(pkg_id)
                .or_default()
                .insert(action.analysis.name().to_string(), value);
        }
    }
    let rendered = serde_json::to_string_pretty(&tree).map_err(io::Error::other)?;
    writeln!(out, "{rendered}")
}

/// Print the per-action duration table for the `t` debug letter: slowest
/// first, cut off once 90% of the total is accounted for.
pub fn report_timing(
    session: &Session,
    roots: &[Arc<Action>],
    err_out: &mut dyn Write,
) -> io::Result<()> {
    let mut timed: Vec<(Duration, String)> = postorder(roots)
        .iter()
        .filter_map(|action| {
            let duration = action.result()?.duration?;
            Some((duration, action.label(session)))
        })
        .collect();
    let total: Duration = timed.iter().map(|(d, _)| *d).sum();
    timed.sort_by(|a, b| b.0.cmp(&a.0));

    let mut sum = Duration::ZERO;
    for (duration, label) in timed {
        writeln!(err_out, "{duration:?}\t{label}")?;
        sum += duration;
        if sum * 10 >= total * 9 {
            break;
        }
    }
    Ok(())
}
