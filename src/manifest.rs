//! Append-only audit ledger, one CSV file per `(date, version)` pair

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fixed column order of the ledger
pub const COLUMNS: [&str; 15] = [
    "Timestamp",
    "Version",
    "Mode",
    "Flow/Set Name",
    "Step/Index",
    "Page Name",
    "Login State",
    "Language",
    "Hostname",
    "URL",
    "URL Path",
    "PNG Filename",
    "PDF Filename",
    "Description",
    "Duplicate",
];

/// One audit record per capture. Empty strings mean "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub timestamp: String,
    pub version: String,
    pub mode: String,
    pub flow_or_set_name: String,
    pub step_or_index: String,
    pub page_name: String,
    pub login_state: String,
    pub language: String,
    pub hostname: String,
    pub url: String,
    pub url_path: String,
    pub png_filename: String,
    pub pdf_filename: String,
    pub description: String,
    pub duplicate: bool,
}

impl ManifestRow {
    fn fields(&self) -> [&str; 15] {
        [
            &self.timestamp,
            &self.version,
            &self.mode,
            &self.flow_or_set_name,
            &self.step_or_index,
            &self.page_name,
            &self.login_state,
            &self.language,
            &self.hostname,
            &self.url,
            &self.url_path,
            &self.png_filename,
            &self.pdf_filename,
            &self.description,
            if self.duplicate { "true" } else { "false" },
        ]
    }

    /// Encode as one CSV line, without the trailing newline
    pub fn encode(&self) -> String {
        encode_record(&self.fields())
    }

    fn from_record(record: Vec<String>) -> Result<Self> {
        if record.len() != COLUMNS.len() {
            return Err(Error::Other(format!(
                "manifest row has {} columns, expected {}",
                record.len(),
                COLUMNS.len()
            )));
        }
        let mut it = record.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Ok(Self {
            timestamp: next(),
            version: next(),
            mode: next(),
            flow_or_set_name: next(),
            step_or_index: next(),
            page_name: next(),
            login_state: next(),
            language: next(),
            hostname: next(),
            url: next(),
            url_path: next(),
            png_filename: next(),
            pdf_filename: next(),
            description: next(),
            duplicate: next() == "true",
        })
    }

    fn produced(&self, filename: &str) -> bool {
        self.pdf_filename == filename || self.png_filename == filename
    }
}

/// Quote a value when it contains a comma, quote or line break
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn encode_record(fields: &[&str]) -> String {
    fields.iter().map(|f| escape_field(f)).collect::<Vec<_>>().join(",")
}

/// Parse CSV text into records. Quoted fields may span lines.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// In-memory ledger for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a ledger previously produced by [`Manifest::to_csv`]
    pub fn parse(text: &str) -> Result<Self> {
        let mut records = parse_records(text).into_iter().peekable();
        if let Some(first) = records.peek() {
            if first.iter().map(String::as_str).eq(COLUMNS.iter().copied()) {
                records.next();
            }
        }
        let rows = records
            .filter(|r| !(r.len() == 1 && r[0].is_empty()))
            .map(ManifestRow::from_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn append(&mut self, row: ManifestRow) {
        self.rows.push(row);
    }

    /// Whether a capture of `url` is already recorded
    pub fn contains_url(&self, url: &str) -> bool {
        self.rows.iter().any(|r| r.url == url)
    }

    /// Replace the most recent row that produced `prior_filename`
    pub fn edit_last(&mut self, prior_filename: &str, row: ManifestRow) -> Result<()> {
        let slot = self
            .rows
            .iter_mut()
            .rev()
            .find(|r| r.produced(prior_filename))
            .ok_or_else(|| Error::Other(format!("no manifest row produced {}", prior_filename)))?;
        *slot = row;
        Ok(())
    }

    /// Header plus one newline-terminated line per row
    pub fn to_csv(&self) -> String {
        let mut out = encode_record(&COLUMNS);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.encode());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, pdf: &str) -> ManifestRow {
        ManifestRow {
            timestamp: "2026-02-09 10:00:00".into(),
            version: "v3.12.0".into(),
            mode: "Flow".into(),
            url: url.into(),
            pdf_filename: pdf.into(),
            ..Default::default()
        }
    }

    #[test]
    fn description_with_comma_and_quotes_round_trips() {
        let original = "Refund, 30 days \"guaranteed\"";
        let mut r = row("https://a.test/", "a.pdf");
        r.description = original.into();
        let line = r.encode();
        assert!(line.contains("\"Refund, 30 days \"\"guaranteed\"\"\""));
        let parsed = parse_records(&line);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0][13], original);
    }

    #[test]
    fn quote_inside_unquoted_field_is_literal() {
        let parsed = parse_records("a\"b,c\n\"x,y\",z\n");
        assert_eq!(parsed, vec![vec!["a\"b".to_string(), "c".to_string()], vec!["x,y".to_string(), "z".to_string()]]);
    }

    #[test]
    fn row_encodes_fifteen_columns_and_bool_literal() {
        let mut r = row("https://a.test/", "a.pdf");
        r.duplicate = true;
        let parsed = parse_records(&r.encode());
        assert_eq!(parsed[0].len(), 15);
        assert_eq!(parsed[0][14], "true");
        assert_eq!(parsed[0][1], "v3.12.0");
        assert_eq!(parsed[0][3], "");
    }

    #[test]
    fn multiline_value_survives_ledger_round_trip() {
        let mut m = Manifest::new();
        let mut r = row("https://a.test/x", "x.pdf");
        r.description = "line one\nline two".into();
        m.append(r);
        m.append(row("https://a.test/y", "y.pdf"));
        let csv = m.to_csv();
        assert!(csv.ends_with('\n'));
        let back = Manifest::parse(&csv).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn edit_last_replaces_most_recent_match() {
        let mut m = Manifest::new();
        m.append(row("https://a.test/1", "same.pdf"));
        m.append(row("https://a.test/2", "same.pdf"));
        m.append(row("https://a.test/3", "other.pdf"));
        m.edit_last("same.pdf", row("https://a.test/edited", "new.pdf")).unwrap();
        assert_eq!(m.rows()[0].url, "https://a.test/1");
        assert_eq!(m.rows()[1].url, "https://a.test/edited");
        assert_eq!(m.rows()[2].url, "https://a.test/3");
        assert!(m.edit_last("missing.pdf", row("u", "p")).is_err());
    }

    #[test]
    fn duplicate_detection_by_url() {
        let mut m = Manifest::new();
        m.append(row("https://a.test/1", "a.pdf"));
        assert!(m.contains_url("https://a.test/1"));
        assert!(!m.contains_url("https://a.test/2"));
    }

    #[test]
    fn parse_rejects_wrong_column_count() {
        assert!(Manifest::parse("a,b,c\n").is_err());
    }
}
