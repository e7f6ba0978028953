//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans,
//! provisioning reports and exports in text or JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::graph::{NodeStatus, PlannedNode, ProvisionReport};
use crate::stack::ExportedValue;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Physical Name")]
    physical_name: String,
    #[tabled(rename = "Depends On")]
    depends_on: String,
}

/// Report row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Export row for table display.
#[derive(Tabled)]
struct ExportRow {
    #[tabled(rename = "Export")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Export entry for JSON output, masked unless plaintext was requested.
#[derive(Serialize)]
struct ExportJson<'a> {
    name: &'a str,
    value: &'a str,
    sensitive: bool,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the resource plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &[PlannedNode]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &[PlannedNode]) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\nResource plan ({} resources)\n", plan.len());

        let rows: Vec<PlanRow> = plan
            .iter()
            .enumerate()
            .map(|(i, node)| PlanRow {
                index: i + 1,
                resource: node.logical_name.clone(),
                kind: node.kind.to_string(),
                physical_name: node.physical_name.clone(),
                depends_on: if node.depends_on.is_empty() {
                    String::from("-")
                } else {
                    node.depends_on.join(", ")
                },
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    /// Formats a provisioning report for display.
    #[must_use]
    pub fn format_report(&self, report: &ProvisionReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &ProvisionReport) -> String {
        let mut output = String::new();

        let rows: Vec<OutcomeRow> = report
            .outcomes
            .iter()
            .map(|outcome| OutcomeRow {
                resource: outcome.logical_name.clone(),
                kind: outcome.kind.to_string(),
                status: match outcome.status {
                    NodeStatus::Created => "created".green().to_string(),
                    NodeStatus::Failed => "failed".red().to_string(),
                    NodeStatus::Skipped => "skipped".yellow().to_string(),
                },
                detail: outcome
                    .error
                    .clone()
                    .or_else(|| {
                        outcome
                            .upstream
                            .as_ref()
                            .map(|up| format!("upstream: {up}"))
                    })
                    .unwrap_or_else(|| String::from("-")),
            })
            .collect();

        output.push('\n');
        output.push_str(&Table::new(rows).to_string());

        let _ = write!(
            output,
            "\n\n{} created, {} failed, {} skipped\n",
            report.created().to_string().green(),
            report.failed().to_string().red(),
            report.skipped().to_string().yellow()
        );
        output
    }

    /// Formats resolved exports for display.
    ///
    /// Sensitive values are masked unless `show_secrets` is set; this
    /// applies to the JSON form as well.
    #[must_use]
    pub fn format_exports(&self, exports: &[ExportedValue], show_secrets: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<ExportJson<'_>> = exports
                    .iter()
                    .map(|export| ExportJson {
                        name: &export.name,
                        value: if show_secrets {
                            &export.value
                        } else {
                            export.display_value()
                        },
                        sensitive: export.sensitive,
                    })
                    .collect();
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<ExportRow> = exports
                    .iter()
                    .map(|export| ExportRow {
                        name: export.name.clone(),
                        value: if show_secrets {
                            export.value.clone()
                        } else {
                            export.display_value().to_string()
                        },
                    })
                    .collect();

                let mut output = String::from("\nStack exports\n");
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => format!("{{\"status\": \"ok\", \"message\": \"{message}\"}}"),
            OutputFormat::Text => format!("{} {message}", "✓".green()),
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => format!("{{\"status\": \"error\", \"message\": \"{message}\"}}"),
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exports() -> Vec<ExportedValue> {
        vec![
            ExportedValue {
                name: String::from("resourceGroupName"),
                value: String::from("ehz-dev-velero-backups"),
                sensitive: false,
            },
            ExportedValue {
                name: String::from("servicePrincipalPassword"),
                value: String::from("hunter2"),
                sensitive: true,
            },
        ]
    }

    #[test]
    fn sensitive_exports_are_masked_in_both_formats() {
        let text = OutputFormatter::new(OutputFormat::Text).format_exports(&exports(), false);
        assert!(text.contains("ehz-dev-velero-backups"));
        assert!(!text.contains("hunter2"));

        let json = OutputFormatter::new(OutputFormat::Json).format_exports(&exports(), false);
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"sensitive\": true"));
    }

    #[test]
    fn show_secrets_reveals_sensitive_exports() {
        let text = OutputFormatter::new(OutputFormat::Text).format_exports(&exports(), true);
        assert!(text.contains("hunter2"));
    }
}
