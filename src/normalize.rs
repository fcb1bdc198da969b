// 🧮 Value Normalizers - display, edit and import forms per field kind
//
// Every function here is total. Malformed input degrades to an empty or
// zero form, never to an error, so bad source data shows up as visibly
// empty fields instead of failed imports.

use crate::schema::{CodeFormat, FieldKind};
use crate::value::{number_text, FieldValue};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Excel serials at or below this are ambiguous (the 1900 leap-year bug)
pub const SERIAL_DATE_THRESHOLD: f64 = 59.0;

/// Highest serial Excel accepts (9999-12-31)
const MAX_SERIAL: f64 = 2_958_465.0;

// ============================================================================
// LOCALE
// ============================================================================

/// Display conventions (pt-BR by default)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    pub date_separator: char,
    pub decimal_separator: char,
    pub currency_prefix: String,
}

impl Default for Locale {
    fn default() -> Self {
        Locale {
            date_separator: '/',
            decimal_separator: ',',
            currency_prefix: "US$".to_string(),
        }
    }
}

impl Locale {
    fn decimal(&self, fixed: String) -> String {
        fixed.replacen('.', &self.decimal_separator.to_string(), 1)
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Read-only form shown in the catalog table
pub fn display_value(kind: FieldKind, value: &FieldValue, locale: &Locale) -> String {
    match kind {
        FieldKind::Code(format) => format_code(value, format),
        FieldKind::Date => display_date(value, locale),
        FieldKind::Currency => display_currency(value, locale),
        FieldKind::Percentage | FieldKind::Plain => value.as_text().into_owned(),
    }
}

/// Form pre-filled into an edit control
pub fn edit_value(kind: FieldKind, value: &FieldValue) -> String {
    match kind {
        FieldKind::Date => edit_date(value),
        _ => value.as_text().into_owned(),
    }
}

/// Storage form applied while importing a spreadsheet cell
pub fn normalize_import(kind: FieldKind, value: FieldValue, locale: &Locale) -> FieldValue {
    match kind {
        FieldKind::Percentage => normalize_percentage(value, locale),
        FieldKind::Currency => normalize_currency_input(value),
        _ => value,
    }
}

// ============================================================================
// CODES
// ============================================================================

/// Pad to the code width and insert group separators ("1012100" → "0101.21.00")
pub fn format_code(value: &FieldValue, format: CodeFormat) -> String {
    if value.is_falsy() {
        return String::new();
    }

    let digits = strip_code(&value.as_text());
    let padded = format!("{:0>width$}", digits, width = format.width);
    let padded = &padded[..format.width];

    let mut out = String::with_capacity(format.width + format.groups.len());
    let mut start = 0;
    for (idx, len) in format.groups.iter().enumerate() {
        if idx > 0 {
            out.push(format.separator);
        }
        out.push_str(&padded[start..start + len]);
        start += len;
    }
    out
}

/// Keep only ASCII digits
pub fn strip_code(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ============================================================================
// DATES
// ============================================================================

/// Excel 1900-system serial → calendar day (fraction = time of day, dropped)
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Resolve any supported date encoding to a calendar day
///
/// Order: serial (number or numeric text above the threshold), then
/// month/day/year slash text, then ISO and long textual forms.
pub fn resolve_date(value: &FieldValue) -> Option<NaiveDate> {
    if value.is_falsy() {
        return None;
    }

    if let Some(serial) = numeric(value) {
        if serial > SERIAL_DATE_THRESHOLD {
            return serial_to_date(serial);
        }
    }

    let text = value.as_text();
    let text = text.trim();

    if text.contains('/') {
        if let Some(date) = parse_month_day_year(text) {
            return Some(date);
        }
    }

    parse_date_text(text)
}

/// "dd/mm/yyyy" with the locale separator, empty when unresolvable
pub fn display_date(value: &FieldValue, locale: &Locale) -> String {
    match resolve_date(value) {
        Some(date) => {
            let sep = locale.date_separator;
            date.format(&format!("%d{sep}%m{sep}%Y")).to_string()
        }
        None => String::new(),
    }
}

/// "yyyy-mm-dd" for a date input control, empty when unresolvable
pub fn edit_date(value: &FieldValue) -> String {
    resolve_date(value)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Inverse of `display_date`
pub fn parse_display_date(text: &str, locale: &Locale) -> Option<NaiveDate> {
    let sep = locale.date_separator;
    NaiveDate::parse_from_str(text.trim(), &format!("%d{sep}%m{sep}%Y")).ok()
}

/// Inverse of `edit_date`
pub fn parse_edit_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn numeric(value: &FieldValue) -> Option<f64> {
    let n = match value {
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
    };
    n.is_finite().then_some(n)
}

fn parse_month_day_year(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let month: u32 = parts[0].trim().parse().ok()?;
    let day: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;
    // Two-digit years are ambiguous
    if year < 100 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d %B %Y",
        "%d %b %Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%B %d %Y",
        "%b %d %Y",
    ];
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc().date());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

// ============================================================================
// PERCENTAGES
// ============================================================================

/// Import form of a percentage cell
///
/// Numbers below 1 are fractions (0.15 → "15,00%"); numbers from 1 up are
/// already percentages (15 → "15%"). Text gains a decimal comma and a
/// trailing marker unless it already carries one.
pub fn normalize_percentage(value: FieldValue, locale: &Locale) -> FieldValue {
    match value {
        FieldValue::Number(n) => {
            let body = if n < 1.0 {
                locale.decimal(fixed2(n * 100.0))
            } else {
                locale.decimal(number_text(n))
            };
            FieldValue::Text(format!("{body}%"))
        }
        FieldValue::Text(s) if s.trim().is_empty() => FieldValue::empty(),
        FieldValue::Text(s) if s.contains('%') => FieldValue::Text(s),
        FieldValue::Text(s) => FieldValue::Text(format!("{}%", locale.decimal(s))),
    }
}

// ============================================================================
// CURRENCY
// ============================================================================

/// Import form of a currency cell: decimal comma → dot, nothing validated
pub fn normalize_currency_input(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(s) => FieldValue::Text(s.replacen(',', ".", 1)),
        number => number,
    }
}

/// "US$ 12,50"; anything empty or non-numeric shows as "US$ 0,00"
pub fn display_currency(value: &FieldValue, locale: &Locale) -> String {
    let amount = match value {
        _ if value.is_falsy() => 0.0,
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => parse_float_prefix(&s.replacen(',', ".", 1)).unwrap_or(0.0),
    };
    let amount = if amount.is_finite() { amount } else { 0.0 };

    format!(
        "{} {}",
        locale.currency_prefix,
        locale.decimal(fixed2(amount))
    )
}

/// Two decimals, exact ties rounded away from zero (0.125 → "0.13")
///
/// `{:.2}` breaks exact ties to even. Only odd multiples of 1/8 sit exactly
/// halfway at two decimals; everything else already formats correctly.
fn fixed2(x: f64) -> String {
    let eighths = x * 8.0;
    if eighths.fract() == 0.0 && eighths % 2.0 != 0.0 {
        return format!("{:.2}", (x * 100.0).round() / 100.0);
    }
    format!("{:.2}", x)
}

/// Longest leading decimal literal ("12.5kg" → 12.5, "abc" → None)
fn parse_float_prefix(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }

    // Exponent only counts when digits follow it
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt_br() -> Locale {
        Locale::default()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::text(s)
    }

    // ------------------------------------------------------------------ codes

    #[test]
    fn test_format_ncm_pads_and_groups() {
        assert_eq!(format_code(&text("1012100"), CodeFormat::NCM), "0101.21.00");
        assert_eq!(format_code(&text("0101.21.00"), CodeFormat::NCM), "0101.21.00");
        assert_eq!(format_code(&FieldValue::Number(84713012.0), CodeFormat::NCM), "8471.30.12");
        assert_eq!(format_code(&text("12"), CodeFormat::NCM), "0000.00.12");
    }

    #[test]
    fn test_format_cest_groups() {
        assert_eq!(format_code(&text("2800100"), CodeFormat::CEST), "28.001.00");
        assert_eq!(format_code(&text("100100"), CodeFormat::CEST), "01.001.00");
    }

    #[test]
    fn test_format_code_empty_inputs() {
        assert_eq!(format_code(&text(""), CodeFormat::NCM), "");
        assert_eq!(format_code(&FieldValue::Number(0.0), CodeFormat::NCM), "");
        // Non-empty text without digits still pads
        assert_eq!(format_code(&text("abc"), CodeFormat::NCM), "0000.00.00");
    }

    #[test]
    fn test_format_code_keeps_first_width_digits() {
        assert_eq!(format_code(&text("123456789"), CodeFormat::NCM), "1234.56.78");
    }

    #[test]
    fn test_format_code_idempotent_modulo_separators() {
        for raw in ["1", "12", "1234", "1012100", "84713012", "8471.30.12", "00000001"] {
            let once = format_code(&text(raw), CodeFormat::NCM);
            let twice = format_code(&text(&strip_code(&once)), CodeFormat::NCM);
            assert_eq!(once, twice, "not idempotent for {raw}");
            assert_eq!(strip_code(&once).len(), 8);
        }
    }

    // ------------------------------------------------------------------ dates

    #[test]
    fn test_serial_to_date() {
        assert_eq!(serial_to_date(45000.0), NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(serial_to_date(45000.75), NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(serial_to_date(61.0), NaiveDate::from_ymd_opt(1900, 3, 1));
        assert_eq!(serial_to_date(f64::NAN), None);
        assert_eq!(serial_to_date(1e12), None);
    }

    #[test]
    fn test_display_and_edit_from_serial() {
        let serial = FieldValue::Number(45000.0);
        assert_eq!(display_date(&serial, &pt_br()), "15/03/2023");
        assert_eq!(edit_date(&serial), "2023-03-15");

        // Numeric text takes the serial path too
        assert_eq!(display_date(&text("45000"), &pt_br()), "15/03/2023");
    }

    #[test]
    fn test_slash_text_is_month_day_year() {
        assert_eq!(display_date(&text("3/15/2023"), &pt_br()), "15/03/2023");
        assert_eq!(edit_date(&text("3/5/2023")), "2023-03-05");
    }

    #[test]
    fn test_two_digit_year_is_rejected() {
        assert_eq!(resolve_date(&text("3/15/23")), None);
        assert_eq!(display_date(&text("3/15/23"), &pt_br()), "");
        assert_eq!(edit_date(&text("1/2/99")), "");
        assert_eq!(edit_date(&text("1/2/0100")), "0100-01-02");
    }

    #[test]
    fn test_other_text_forms() {
        assert_eq!(edit_date(&text("2023-03-15")), "2023-03-15");
        assert_eq!(edit_date(&text("2023-03-15T10:30:00Z")), "2023-03-15");
        assert_eq!(edit_date(&text("2023/03/15")), "2023-03-15");
        assert_eq!(edit_date(&text("March 15, 2023")), "2023-03-15");
    }

    #[test]
    fn test_invalid_dates_are_empty() {
        for bad in ["", "not a date", "13/45/2023", "1/2"] {
            assert_eq!(display_date(&text(bad), &pt_br()), "", "display of {bad:?}");
            assert_eq!(edit_date(&text(bad)), "", "edit of {bad:?}");
        }
        assert_eq!(display_date(&FieldValue::Number(0.0), &pt_br()), "");
    }

    #[test]
    fn test_small_serials_follow_text_path() {
        // 30 is not a serial date and "30" is not a date string
        assert_eq!(display_date(&FieldValue::Number(30.0), &pt_br()), "");
        assert_eq!(display_date(&FieldValue::Number(59.0), &pt_br()), "");
        assert_eq!(edit_date(&text("59")), "");
    }

    #[test]
    fn test_date_round_trip_through_display_and_edit_forms() {
        let locale = pt_br();
        for serial in [60.5, 366.0, 25569.0, 36526.0, 45000.0, 45291.99, 2_958_465.0] {
            let value = FieldValue::Number(serial);
            let expected = serial_to_date(serial);
            assert!(expected.is_some());
            assert_eq!(parse_display_date(&display_date(&value, &locale), &locale), expected);
            assert_eq!(parse_edit_date(&edit_date(&value)), expected);
        }
    }

    #[test]
    fn test_display_date_custom_separator() {
        let locale = Locale {
            date_separator: '.',
            ..Locale::default()
        };
        assert_eq!(display_date(&FieldValue::Number(45000.0), &locale), "15.03.2023");
        assert_eq!(
            parse_display_date("15.03.2023", &locale),
            NaiveDate::from_ymd_opt(2023, 3, 15)
        );
    }

    // ------------------------------------------------------------ percentages

    #[test]
    fn test_percentage_fraction_is_scaled() {
        assert_eq!(normalize_percentage(FieldValue::Number(0.15), &pt_br()), text("15,00%"));
        assert_eq!(normalize_percentage(FieldValue::Number(0.0), &pt_br()), text("0,00%"));
        assert_eq!(normalize_percentage(FieldValue::Number(0.035), &pt_br()), text("3,50%"));
    }

    #[test]
    fn test_percentage_whole_number_is_kept() {
        assert_eq!(normalize_percentage(FieldValue::Number(15.0), &pt_br()), text("15%"));
        assert_eq!(normalize_percentage(FieldValue::Number(12.5), &pt_br()), text("12,5%"));
        assert_eq!(normalize_percentage(FieldValue::Number(1.0), &pt_br()), text("1%"));
    }

    #[test]
    fn test_percentage_text_forms() {
        assert_eq!(normalize_percentage(text("7.6"), &pt_br()), text("7,6%"));
        assert_eq!(normalize_percentage(text("18"), &pt_br()), text("18%"));
        assert_eq!(normalize_percentage(text("9,25%"), &pt_br()), text("9,25%"));
        assert_eq!(normalize_percentage(text(""), &pt_br()), text(""));
        assert_eq!(normalize_percentage(text("  "), &pt_br()), text(""));
    }

    #[test]
    fn test_percentage_is_idempotent() {
        let once = normalize_percentage(FieldValue::Number(0.15), &pt_br());
        let twice = normalize_percentage(once.clone(), &pt_br());
        assert_eq!(once, twice);
    }

    // --------------------------------------------------------------- currency

    #[test]
    fn test_display_currency() {
        let locale = pt_br();
        assert_eq!(display_currency(&text(""), &locale), "US$ 0,00");
        assert_eq!(display_currency(&text("12,5"), &locale), "US$ 12,50");
        assert_eq!(display_currency(&text("12.5"), &locale), "US$ 12,50");
        assert_eq!(display_currency(&text("abc"), &locale), "US$ 0,00");
        assert_eq!(display_currency(&text("3.2kg"), &locale), "US$ 3,20");
        assert_eq!(display_currency(&FieldValue::Number(7.0), &locale), "US$ 7,00");
        assert_eq!(display_currency(&FieldValue::Number(0.0), &locale), "US$ 0,00");
    }

    #[test]
    fn test_two_decimal_ties_round_up() {
        let locale = pt_br();
        assert_eq!(display_currency(&text("1,125"), &locale), "US$ 1,13");
        assert_eq!(display_currency(&text("0,125"), &locale), "US$ 0,13");
        assert_eq!(display_currency(&FieldValue::Number(2.375), &locale), "US$ 2,38");
        assert_eq!(display_currency(&FieldValue::Number(-1.125), &locale), "US$ -1,13");
        // 2.675 is stored just below the tie
        assert_eq!(display_currency(&text("2,675"), &locale), "US$ 2,67");
        assert_eq!(display_currency(&text("0,25"), &locale), "US$ 0,25");

        assert_eq!(
            normalize_percentage(FieldValue::Number(0.00125), &locale),
            text("0,13%")
        );
        assert_eq!(fixed2(0.125), "0.13");
        assert_eq!(fixed2(12.5), "12.50");
    }

    #[test]
    fn test_currency_input_swaps_comma() {
        assert_eq!(normalize_currency_input(text("12,5")), text("12.5"));
        assert_eq!(normalize_currency_input(text("n/a")), text("n/a"));
        assert_eq!(
            normalize_currency_input(FieldValue::Number(3.5)),
            FieldValue::Number(3.5)
        );
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float_prefix("  42"), Some(42.0));
        assert_eq!(parse_float_prefix("-1.5e2x"), Some(-150.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("7."), Some(7.0));
        assert_eq!(parse_float_prefix("1e"), Some(1.0));
        assert_eq!(parse_float_prefix("."), None);
        assert_eq!(parse_float_prefix("-"), None);
        assert_eq!(parse_float_prefix("US$ 3"), None);
    }

    // --------------------------------------------------------------- dispatch

    #[test]
    fn test_display_value_dispatch() {
        let locale = pt_br();
        assert_eq!(
            display_value(FieldKind::Code(CodeFormat::NCM), &text("1012100"), &locale),
            "0101.21.00"
        );
        assert_eq!(display_value(FieldKind::Percentage, &text("5,00%"), &locale), "5,00%");
        assert_eq!(display_value(FieldKind::Currency, &text(""), &locale), "US$ 0,00");
        assert_eq!(display_value(FieldKind::Plain, &FieldValue::Number(3.0), &locale), "3");
        assert_eq!(edit_value(FieldKind::Date, &FieldValue::Number(45000.0)), "2023-03-15");
        assert_eq!(edit_value(FieldKind::Percentage, &text("5%")), "5%");
    }
}
