//! HTML bodies for run notifications.

use askama::Template;
use chrono::{DateTime, Local};

use crate::utils::errors::Result;

const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Data shown in a success report. Only lives for one notification.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timestamp: DateTime<Local>,
    pub host: String,
    pub bundle_name: String,
    pub vault_archive_id: Option<String>,
    pub disk_usage: Option<String>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    host: &'a str,
    time: String,
    bundle_name: &'a str,
    vault_archive_id: Option<&'a str>,
    disk_usage: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "failure.html")]
struct FailureTemplate<'a> {
    host: &'a str,
    time: String,
    error: &'a str,
}

pub fn render_report(report: &RunReport) -> Result<String> {
    let template = ReportTemplate {
        host: &report.host,
        time: report.timestamp.format(REPORT_TIME_FORMAT).to_string(),
        bundle_name: &report.bundle_name,
        vault_archive_id: report.vault_archive_id.as_deref(),
        disk_usage: report.disk_usage.as_deref(),
    };
    Ok(template.render()?)
}

pub fn render_failure(host: &str, timestamp: DateTime<Local>, error: &str) -> Result<String> {
    let template = FailureTemplate {
        host,
        time: timestamp.format(REPORT_TIME_FORMAT).to_string(),
        error,
    };
    Ok(template.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report() -> RunReport {
        RunReport {
            timestamp: Local.with_ymd_and_hms(2026, 10, 16, 2, 30, 0).unwrap(),
            host: "backup-host".to_string(),
            bundle_name: "backup_202610160230.zip".to_string(),
            vault_archive_id: None,
            disk_usage: None,
        }
    }

    #[test]
    fn test_render_minimal_report() {
        let html = render_report(&report()).unwrap();

        assert!(html.contains("[backup-host]"));
        assert!(html.contains("<b>Backup time</b>: 2026-10-16 02:30"));
        assert!(html.contains("<b>Backup file</b>: backup_202610160230.zip"));
        assert!(!html.contains("Disk usage"));
        assert!(!html.contains("Vault"));
    }

    #[test]
    fn test_render_with_diagnostics_escapes_text() {
        let mut report = report();
        report.disk_usage = Some("/dev/sda1  50G  <full> & more".to_string());
        report.host = "<script>".to_string();
        report.vault_archive_id = Some("etag-1".to_string());

        let html = render_report(&report).unwrap();

        assert!(html.contains("50G  &lt;full&gt; &amp; more</pre>"));
        assert!(!html.contains("<full>"));
        assert!(html.contains("<b>Vault archive id</b>: etag-1"));
        assert!(html.contains("[&lt;script&gt;]"));
    }

    #[test]
    fn test_render_failure() {
        let html = render_failure(
            "backup-host",
            Local.with_ymd_and_hms(2026, 10, 16, 2, 30, 0).unwrap(),
            "Packager `7z` exited with exit status: 2 <stderr>",
        )
        .unwrap();
        assert!(html.contains("FAILED"));
        assert!(html.contains("Packager `7z` exited with exit status: 2 &lt;stderr&gt;"));
        assert!(html.contains("[backup-host]"));
    }
}
