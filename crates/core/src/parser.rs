//! Tabular input parsing.
//!
//! Turns CSV text into ordered [`IssueRecord`]s. Headers are matched
//! case-insensitively; every row problem is collected so the operator sees
//! all of them at once instead of fixing the file one error at a time.

use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::errors::ParseError;
use crate::models::IssueRecord;

/// Columns every input must have, in the order they are reported.
const REQUIRED_COLUMNS: &[&str] = &["team", "project", "title", "summary"];

/// Accepted alternative headers for the summary column.
const SUMMARY_ALIASES: &[&str] = &["summary", "description", "body"];

/// Translate a delimiter argument into the byte the reader wants.
///
/// Accepts any single ASCII character, plus `\t` and `tab` for tabs.
pub fn parse_delimiter(raw: &str) -> Result<u8, ParseError> {
    match raw {
        "\\t" | "tab" | "\t" => return Ok(b'\t'),
        _ => {}
    }
    let bytes = raw.as_bytes();
    if bytes.len() == 1 && bytes[0].is_ascii() {
        Ok(bytes[0])
    } else {
        Err(ParseError::InvalidDelimiter(raw.to_string()))
    }
}

/// Column indices resolved from the header row.
struct Columns {
    team: usize,
    project: usize,
    title: usize,
    summary: usize,
    template: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ParseError::MissingHeader);
        }
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            // First occurrence wins on duplicate headers.
            index.entry(header.trim().to_lowercase()).or_insert(i);
        }

        let summary = SUMMARY_ALIASES.iter().find_map(|alias| index.get(*alias).copied());
        let lookup = |name: &str| -> Option<usize> {
            if name == "summary" {
                summary
            } else {
                index.get(name).copied()
            }
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| lookup(name).is_none())
            .collect();
        if !missing.is_empty() {
            let available: Vec<&str> = headers.iter().map(str::trim).collect();
            return Err(ParseError::MissingColumns {
                missing: missing.join(", "),
                available: available.join(", "),
            });
        }

        // Every required column was checked above.
        let required = |name: &str| lookup(name).unwrap_or_default();
        Ok(Self {
            team: required("team"),
            project: required("project"),
            title: required("title"),
            summary: required("summary"),
            template: index.get("template").copied(),
        })
    }
}

/// Parse CSV `text` into issue records.
///
/// Completely empty rows are skipped. Record positions count the accepted
/// rows from 1; error messages cite file rows, with the header as row 1.
pub fn parse_records(text: &str, delimiter: u8) -> Result<Vec<IssueRecord>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns = Columns::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);

        if row.iter().all(str::is_empty) {
            continue;
        }

        let cell = |i: usize| row.get(i).unwrap_or("").to_string();
        let team = cell(columns.team);
        let project = cell(columns.project);
        let title = cell(columns.title);
        let body = cell(columns.summary);

        let mut row_ok = true;
        for (field, value) in [("team", &team), ("project", &project), ("title", &title), ("summary", &body)] {
            if value.is_empty() {
                errors.push(format!("Row {}: field '{}' cannot be empty", line, field));
                row_ok = false;
            }
        }
        if !row_ok {
            continue;
        }

        let template = columns
            .template
            .map(cell)
            .filter(|t| !t.is_empty());

        records.push(IssueRecord {
            position: records.len() + 1,
            team,
            project,
            title,
            body,
            template,
        });
    }

    if !errors.is_empty() {
        return Err(ParseError::InvalidRows(errors));
    }
    if records.is_empty() {
        return Err(ParseError::NoRecords);
    }
    debug!(count = records.len(), "parsed issue records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_rows() {
        let text = "team,project,title,summary\n\
                    Backend,Payments,Fix refund,Refunds fail on retry\n\
                    Mobile,App,Dark mode,Add a dark theme\n";
        let records = parse_records(text, b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].position, 1);
        assert_eq!(records[0].team, "Backend");
        assert_eq!(records[1].title, "Dark mode");
        assert_eq!(records[1].body, "Add a dark theme");
        assert!(records[1].template.is_none());
    }

    #[test]
    fn test_headers_case_insensitive_with_aliases() {
        let text = " Team ,PROJECT,Title,Description,Template,Owner\n\
                    Backend,Payments,T1,B1,Bug Template,alice\n\
                    Backend,Payments,T2,B2,,bob\n";
        let records = parse_records(text, b',').unwrap();
        assert_eq!(records[0].body, "B1");
        assert_eq!(records[0].template.as_deref(), Some("Bug Template"));
        assert_eq!(records[1].template, None);
    }

    #[test]
    fn test_quoted_fields_keep_delimiters_and_newlines() {
        let text = "team,project,title,summary\n\
                    Backend,Payments,\"Refunds, partial\",\"line one\nline two\"\n";
        let records = parse_records(text, b',').unwrap();
        assert_eq!(records[0].title, "Refunds, partial");
        assert_eq!(records[0].body, "line one\nline two");
    }

    #[test]
    fn test_empty_rows_are_skipped() {
        let text = "team,project,title,summary\n\
                    ,,,\n\
                    Backend,Payments,T1,B1\n\
                    \n\
                    Backend,Payments,T2,B2\n";
        let records = parse_records(text, b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position, 2);
    }

    #[test]
    fn test_row_errors_are_aggregated() {
        let text = "team,project,title,summary\n\
                    Backend,Payments,,B1\n\
                    Backend,Payments,T2,B2\n\
                    ,Payments,T3,B3\n";
        match parse_records(text, b',') {
            Err(ParseError::InvalidRows(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0], "Row 2: field 'title' cannot be empty");
                assert_eq!(errors[1], "Row 4: field 'team' cannot be empty");
            }
            other => panic!("expected row errors, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_columns_lists_available() {
        let text = "team,title,notes\nBackend,T1,n\n";
        match parse_records(text, b',') {
            Err(ParseError::MissingColumns { missing, available }) => {
                assert_eq!(missing, "project, summary");
                assert_eq!(available, "team, title, notes");
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_header_only_input() {
        assert!(matches!(parse_records("   \n", b','), Err(ParseError::Empty)));
        assert!(matches!(
            parse_records("team,project,title,summary\n", b','),
            Err(ParseError::NoRecords)
        ));
    }

    #[test]
    fn test_semicolon_and_tab_delimiters() {
        let text = "team;project;title;summary\nBackend;Payments;T1;B1\n";
        assert_eq!(parse_records(text, b';').unwrap().len(), 1);

        let tab = parse_delimiter("\\t").unwrap();
        let text = "team\tproject\ttitle\tsummary\nBackend\tPayments\tT1\tB1\n";
        assert_eq!(parse_records(text, tab).unwrap()[0].project, "Payments");
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert!(matches!(parse_delimiter(",,"), Err(ParseError::InvalidDelimiter(_))));
        assert!(matches!(parse_delimiter("é"), Err(ParseError::InvalidDelimiter(_))));
        assert!(parse_delimiter("").is_err());
    }
}
