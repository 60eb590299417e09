//! Line commands typed at the lost & found kiosk.
//!
//! ```text
//! lost  <subject> | <location> | <contact> [| <description> [| <photo path>]]
//! found <subject> | <location> | <contact> [| <description> [| <photo path>]]
//! list
//! help
//! quit
//! ```

use std::path::PathBuf;

use lf_core::ReportType;
use lf_services::RawReportFields;

pub const HELP: &str = "\
Commands:
  lost  <subject> | <location> | <contact> [| <description> [| <photo path>]]
  found <subject> | <location> | <contact> [| <description> [| <photo path>]]
  retry   resubmit the kept form after a failed write
  list    show all reports
  help    show this text
  quit    leave";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Report {
        fields: RawReportFields,
        photo: Option<PathBuf>,
    },
    Retry,
    List,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => Ok(Command::List),
        "help" | "?" | "" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "retry" => Ok(Command::Retry),
        other => {
            let report_type =
                ReportType::parse(other).ok_or_else(|| format!("unknown command: {other}"))?;
            Ok(parse_report(report_type, rest))
        }
    }
}

/// Missing parts become empty fields so validation can name them.
fn parse_report(report_type: ReportType, rest: &str) -> Command {
    let mut parts = rest.split('|').map(str::trim);
    let mut next = || parts.next().unwrap_or_default().to_string();

    let fields = RawReportFields {
        report_type,
        subject_name: next(),
        location: next(),
        contact: next(),
        description: next(),
        photo: None,
    };
    let photo = Some(next()).filter(|p| !p.is_empty()).map(PathBuf::from);

    Command::Report { fields, photo }
}
