use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static FILENAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{2})[-_]([0-9]{2})[-_]([0-9]{2,4})").expect("filename date pattern is valid")
});

pub fn is_xls_file(name: &str) -> bool {
    name.to_lowercase().ends_with(".xls")
}

/// Base name of an uploaded file, dropping any client-side directories.
pub fn base_name(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

/// `PDFS_<stem>.zip`, or `PDFS_COBRANZA.zip` when there is no usable name.
pub fn build_zip_name(file_name: Option<&str>) -> String {
    let stem = file_name
        .map(base_name)
        .filter(|n| !n.is_empty())
        .map(|n| {
            Path::new(n)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(n)
                .to_string()
        });
    match stem {
        Some(stem) => format!("PDFS_{stem}.zip"),
        None => "PDFS_COBRANZA.zip".to_string(),
    }
}

/// Infers the report date from names like `COBRANZA_14-03-25.xls`.
pub fn parse_date_from_filename(name: &str) -> Option<NaiveDate> {
    let caps = FILENAME_DATE.captures(name)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let raw_year = &caps[3];
    let year: i32 = if raw_year.len() == 2 {
        format!("20{raw_year}").parse().ok()?
    } else {
        raw_year.parse().ok()?
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses a form date in `YYYY-MM-DD` form.
pub fn parse_form_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Name of the merged workbook handed back to the user.
pub fn merge_download_name(source_name: Option<&str>, hdr_date: Option<NaiveDate>) -> String {
    if let Some(name) = source_name.map(base_name).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match hdr_date {
        Some(date) => format!("COBRANZA_{}.xls", date.format("%d-%m-%y")),
        None => "COBRANZA.xls".to_string(),
    }
}
