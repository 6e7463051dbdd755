//! Total conversions from heterogeneous spreadsheet cell values into
//! canonical typed values. Malformed input degrades to a safe default;
//! nothing here returns an error.

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use rand::Rng;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Prefix of codes synthesized for rows whose student code cell is empty.
pub const SYNTHESIZED_CODE_PREFIX: &str = "AUTO-";

/// Day zero of the spreadsheet serial-date epoch.
const SERIAL_DATE_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial values outside this window are treated as stray numbers, not
/// dates (10_000 ≈ 1927, 80_000 ≈ 2119).
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 10_000.0..=80_000.0;

/// Uppercased first alphanumeric token of a compound cell. Shared by the
/// student-code and receipt-number normalizers: historical sheets pack two
/// values into one cell separated by `/`.
fn alphanumeric_first_token(raw: &str) -> String {
    let first = raw.split('/').next().unwrap_or("");
    first
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Canonical student code ("carnet"). An empty cell synthesizes a unique
/// placeholder code instead of failing the row.
pub fn normalize_student_code(raw: &str) -> String {
    let code = alphanumeric_first_token(raw);
    if code.is_empty() {
        synthesize_student_code()
    } else {
        code
    }
}

fn synthesize_student_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{SYNTHESIZED_CODE_PREFIX}{suffix}")
}

/// Display amount to integer cents. Strips currency symbols and thousands
/// separators; a non-numeric remainder parses as 0.
pub fn normalize_amount(raw: &str) -> i64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, 'Q' | 'q' | '$' | ',' | ' '))
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => (value * 100.0).round() as i64,
        _ => 0,
    }
}

/// Receipt number ("boleta"). Compound cells like `545109 / 1740192` keep
/// only the first token; non-alphanumerics are stripped. Idempotent.
pub fn normalize_receipt_number(raw: &str) -> String {
    alphanumeric_first_token(raw)
}

/// Payment date with a caller-supplied fallback; the import passes the job's
/// "today" so an unparseable cell never aborts the row.
pub fn normalize_payment_date(raw: &str, fallback: NaiveDate) -> NaiveDate {
    parse_source_date(raw).unwrap_or(fallback)
}

/// Parse a spreadsheet date cell: serial-date numbers or common string
/// formats.
pub fn parse_source_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d/%m/%y",
        "%Y-%m-%d %H:%M:%S",
    ];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    if let Ok(serial) = trimmed.parse::<f64>() {
        if SERIAL_DATE_RANGE.contains(&serial) {
            let (year, month, day) = SERIAL_DATE_EPOCH;
            let epoch = NaiveDate::from_ymd_opt(year, month, day)?;
            return epoch.checked_add_signed(Duration::days(serial.trunc() as i64));
        }
    }

    None
}

/// Optional "start month" cell: `2022-01`, `01/2022`, or any full date,
/// anchored to the first of its month.
pub fn parse_start_month(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let dashed = trimmed.replace('/', "-");
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{dashed}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("01-{dashed}"), "%d-%m-%Y") {
        return Some(date);
    }

    parse_source_date(trimmed).and_then(|date| date.with_day(1))
}

/// Canonical bank label. Trims, collapses whitespace, uppercases, then maps
/// known synonyms onto one label.
pub fn normalize_bank_name(raw: &str) -> String {
    let cleaned = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();

    match bank_alias_map().get(cleaned.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => cleaned,
    }
}

static BANK_ALIAS_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn bank_alias_map() -> &'static HashMap<&'static str, &'static str> {
    BANK_ALIAS_MAP.get_or_init(|| {
        const ALIASES: &[(&str, &str)] = &[
            ("BI", "BANCO INDUSTRIAL"),
            ("INDUSTRIAL", "BANCO INDUSTRIAL"),
            ("BANCO INDUSTRIAL S.A.", "BANCO INDUSTRIAL"),
            ("RURAL", "BANRURAL"),
            ("BANCO DE DESARROLLO RURAL", "BANRURAL"),
            ("G&T", "G&T CONTINENTAL"),
            ("GYT", "G&T CONTINENTAL"),
            ("BANCO G&T CONTINENTAL", "G&T CONTINENTAL"),
            ("BANCO AGROMERCANTIL", "BAM"),
            ("AGROMERCANTIL", "BAM"),
            ("BANCO DE LOS TRABAJADORES", "BANTRAB"),
            ("PROMERICA", "BANCO PROMERICA"),
        ];

        ALIASES.iter().copied().collect()
    })
}
