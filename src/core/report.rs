//! `report export`: renders a previously-emitted envelope JSON file as
//! either pretty JSON or a bounded Markdown summary. Markdown rendering
//! is intentionally thin — the full report-authoring tool is an external
//! collaborator (spec §1) — so this only bounds and formats what the
//! envelope already carries, reusing the same preview helpers the CLI
//! uses for terminal output.

use std::path::Path;

use crate::core::envelope::Envelope;
use crate::core::error::UnityToolError;
use crate::core::output::preview_messages;

#[derive(Debug, Clone, Copy)]
pub enum ReportFormat {
    Json,
    Markdown,
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub md_max_usages: Option<usize>,
    pub md_omit_usages: bool,
    pub md_max_steps: Option<usize>,
    pub md_omit_steps: bool,
}

const DEFAULT_MAX_USAGES: usize = 20;
const DEFAULT_MAX_STEPS: usize = 20;

fn diagnostic_lines(envelope: &Envelope) -> Vec<String> {
    envelope
        .diagnostics
        .iter()
        .map(|d| {
            if d.code.is_empty() {
                format!("{} — {} ({})", d.path, d.detail, d.location)
            } else {
                format!("[{}] {} — {} ({})", d.code, d.path, d.detail, d.location)
            }
        })
        .collect()
}

/// `data.diff` or `data.ops`, each rendered as one line, if present.
fn step_lines(envelope: &Envelope) -> Vec<String> {
    let array = envelope
        .data
        .get("diff")
        .or_else(|| envelope.data.get("ops"))
        .and_then(|v| v.as_array());
    match array {
        Some(items) => items.iter().map(|v| v.to_string()).collect(),
        None => Vec::new(),
    }
}

pub fn render_markdown(envelope: &Envelope, options: &ReportOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Report: {}\n\n", envelope.code));
    out.push_str(&format!(
        "- **success**: {}\n- **severity**: {}\n- **message**: {}\n\n",
        envelope.success, envelope.severity, envelope.message
    ));

    if !options.md_omit_usages {
        let lines = diagnostic_lines(envelope);
        let max = options.md_max_usages.unwrap_or(DEFAULT_MAX_USAGES);
        out.push_str("## Diagnostics\n\n");
        if lines.is_empty() {
            out.push_str("_none_\n\n");
        } else {
            out.push_str(&preview_messages(&lines, max, 200));
            out.push_str("\n\n");
        }
    }

    if !options.md_omit_steps {
        let lines = step_lines(envelope);
        let max = options.md_max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        out.push_str("## Steps\n\n");
        if lines.is_empty() {
            out.push_str("_none_\n");
        } else {
            out.push_str(&preview_messages(&lines, max, 200));
            out.push('\n');
        }
    }

    out
}

pub fn export_report(
    input_path: &Path,
    format: ReportFormat,
    out_path: &Path,
    options: &ReportOptions,
) -> Result<(), UnityToolError> {
    let content = std::fs::read_to_string(input_path)?;
    let envelope: Envelope = serde_json::from_str(&content)?;

    let rendered = match format {
        ReportFormat::Json => serde_json::to_string_pretty(&envelope)?,
        ReportFormat::Markdown => render_markdown(&envelope, options),
    };
    std::fs::write(out_path, rendered)?;
    Ok(())
}
