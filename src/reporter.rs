use crate::catalog::{Diagnostic, HostScope};
use crate::entities::EntityKind;
use crate::models::{DiagnosticReport, HealthReport, ReportStatus};
use clap::ValueEnum;
use itertools::Itertools;
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum ReporterError {
    #[snafu(display("Failed to write output: {}", source))]
    OutputError { source: std::io::Error },
}

type Result<T, E = ReporterError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Markdown formatted report
    Markdown,
    /// JSON formatted report
    Json,
    /// Plain text summary
    Text,
}

/// One row of the offline diagnostic listing.
#[derive(Debug, Serialize)]
struct CatalogEntry {
    name: &'static str,
    description: &'static str,
    entity: EntityKind,
    scope: HostScope,
}

pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn report(&self, report: &HealthReport) -> Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render(&mut handle, report)
    }

    pub fn render<W: Write>(&self, out: &mut W, report: &HealthReport) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.render_markdown(out, report),
            ReportFormat::Json => write_json(out, report),
            ReportFormat::Text => self.render_text(out, report),
        }
    }

    /// Lists every registered diagnostic without touching a database.
    pub fn report_catalog(&self) -> Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_catalog(&mut handle)
    }

    pub fn render_catalog<W: Write>(&self, out: &mut W) -> Result<()> {
        let entries: Vec<CatalogEntry> = Diagnostic::all()
            .map(|d| CatalogEntry {
                name: d.name(),
                description: d.description(),
                entity: d.entity_kind(),
                scope: d.host_scope(),
            })
            .collect();

        match self.format {
            ReportFormat::Json => write_json(out, &entries),
            ReportFormat::Markdown => {
                writeln!(out, "| Diagnostic | Result | Scope | Description |").context(OutputSnafu)?;
                writeln!(out, "|------------|--------|-------|-------------|").context(OutputSnafu)?;
                for entry in &entries {
                    writeln!(
                        out,
                        "| {} | {} | {} | {} |",
                        entry.name,
                        entry.entity.as_str(),
                        scope_label(entry.scope),
                        entry.description
                    )
                    .context(OutputSnafu)?;
                }
                Ok(())
            }
            ReportFormat::Text => {
                for entry in &entries {
                    writeln!(
                        out,
                        "{:<42} {:<22} {}",
                        entry.name,
                        entry.entity.as_str(),
                        scope_label(entry.scope)
                    )
                    .context(OutputSnafu)?;
                }
                Ok(())
            }
        }
    }

    fn render_markdown<W: Write>(&self, out: &mut W, report: &HealthReport) -> Result<()> {
        match &report.cluster {
            Some(name) => writeln!(out, "# PostgreSQL Health Report: {}\n", name),
            None => writeln!(out, "# PostgreSQL Health Report\n"),
        }
        .context(OutputSnafu)?;

        writeln!(out, "## Cluster\n").context(OutputSnafu)?;
        writeln!(out, "- **Schema**: {}", report.schema).context(OutputSnafu)?;
        for member in &report.members {
            writeln!(out, "- **{}**: {}", member.host, member.role.as_str()).context(OutputSnafu)?;
        }
        if report.replica_only {
            writeln!(
                out,
                "\n> **Replica-only mode**: no primary was reachable, every answer comes from a replica."
            )
            .context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        writeln!(out, "## Summary\n").context(OutputSnafu)?;
        writeln!(
            out,
            "Found **{}** item(s) across {} diagnostics:",
            report.total_findings(),
            report.reports.len()
        )
        .context(OutputSnafu)?;
        writeln!(out).context(OutputSnafu)?;
        for status in [ReportStatus::Ok, ReportStatus::Degraded, ReportStatus::Failed] {
            let count = report.count_by_status(status);
            if count > 0 {
                writeln!(out, "- **{}**: {} diagnostic(s)", status.as_str(), count)
                    .context(OutputSnafu)?;
            }
        }
        writeln!(out).context(OutputSnafu)?;

        writeln!(out, "| Diagnostic | Status | Findings |").context(OutputSnafu)?;
        writeln!(out, "|------------|--------|----------|").context(OutputSnafu)?;
        for diagnostic in &report.reports {
            let findings = match diagnostic.status {
                ReportStatus::Failed => "-".to_string(),
                _ => diagnostic.count().to_string(),
            };
            writeln!(
                out,
                "| {} | {} | {} |",
                diagnostic.diagnostic,
                self.format_status_badge(diagnostic.status),
                findings
            )
            .context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        for diagnostic in report.reports.iter().filter(|r| needs_detail(r)) {
            self.write_diagnostic_markdown(out, diagnostic)?;
        }

        Ok(())
    }

    fn write_diagnostic_markdown<W: Write>(
        &self,
        out: &mut W,
        diagnostic: &DiagnosticReport,
    ) -> Result<()> {
        writeln!(
            out,
            "### {} {}\n",
            diagnostic.diagnostic,
            self.format_status_badge(diagnostic.status)
        )
        .context(OutputSnafu)?;
        writeln!(out, "There are {}:\n", diagnostic.description).context(OutputSnafu)?;
        for finding in &diagnostic.findings {
            writeln!(out, "- `{}`", finding).context(OutputSnafu)?;
        }
        if !diagnostic.failed_hosts.is_empty() {
            writeln!(
                out,
                "\n**Hosts without an answer**: {}",
                diagnostic.failed_hosts.iter().join(", ")
            )
            .context(OutputSnafu)?;
        }
        if let Some(error) = &diagnostic.error {
            writeln!(out, "\n**Error**: {}", error).context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;
        Ok(())
    }

    fn format_status_badge(&self, status: ReportStatus) -> &'static str {
        match status {
            ReportStatus::Ok => "![OK](https://img.shields.io/badge/OK-green)",
            ReportStatus::Degraded => "![DEGRADED](https://img.shields.io/badge/DEGRADED-orange)",
            ReportStatus::Failed => "![FAILED](https://img.shields.io/badge/FAILED-red)",
        }
    }

    fn render_text<W: Write>(&self, out: &mut W, report: &HealthReport) -> Result<()> {
        let title = match &report.cluster {
            Some(name) => format!("PostgreSQL Health Report: {}", name),
            None => "PostgreSQL Health Report".to_string(),
        };
        writeln!(out, "{}", title).context(OutputSnafu)?;
        writeln!(out, "{}\n", "=".repeat(title.len())).context(OutputSnafu)?;

        writeln!(out, "Schema: {}", report.schema).context(OutputSnafu)?;
        for member in &report.members {
            writeln!(out, "  {:<11} {}", member.role.as_str(), member.host).context(OutputSnafu)?;
        }
        if report.replica_only {
            writeln!(out, "  replica-only mode: no primary reachable").context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        for diagnostic in &report.reports {
            writeln!(out, "{}", diagnostic.log_line()).context(OutputSnafu)?;
            if !needs_detail(diagnostic) {
                continue;
            }
            for finding in &diagnostic.findings {
                writeln!(out, "    {}", finding).context(OutputSnafu)?;
            }
            if !diagnostic.failed_hosts.is_empty() {
                writeln!(
                    out,
                    "    [{}] no answer from {}",
                    self.format_status_text(diagnostic.status),
                    diagnostic.failed_hosts.iter().join(", ")
                )
                .context(OutputSnafu)?;
            }
        }

        Ok(())
    }

    fn format_status_text(&self, status: ReportStatus) -> &str {
        match status {
            ReportStatus::Ok => "OK",
            ReportStatus::Degraded => "PART",
            ReportStatus::Failed => "FAIL",
        }
    }
}

fn needs_detail(report: &DiagnosticReport) -> bool {
    !report.findings.is_empty() || report.status != ReportStatus::Ok
}

fn scope_label(scope: HostScope) -> &'static str {
    match scope {
        HostScope::Invariant => "primary",
        HostScope::Variant(crate::catalog::MergeRule::MaxObserved) => "all hosts (max)",
        HostScope::Variant(crate::catalog::MergeRule::Union) => "all hosts (union)",
    }
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .context(OutputSnafu)?;
    writeln!(out, "{}", json).context(OutputSnafu)
}
