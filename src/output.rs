//! Interpretation of measurement data blocks read back from the instrument.

use crate::{Error, Result};
use crate::setup::Format;

/// Measured data as named columns of rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    /// Column names; empty for formats without a header.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Series {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index).copied()).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of reading back a test.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Series(Series),
    /// Data that could not be parsed, as received.
    Raw(String),
    /// Data in one of the binary formats, undecoded.
    Binary(Vec<u8>),
}

impl Output {
    pub fn series(&self) -> Option<&Series> {
        match self {
            Self::Series(series) => Some(series),
            _ => None,
        }
    }
}

/// Strips the status/channel/type prefix the instrument may put before each value, e.g.
/// `NAI` in `NAI+1.000E-03`.
fn split_prefix(field: &str) -> (&str, &str) {
    let split = field.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(field.len());
    field.split_at(split)
}

/// Whether `field` reads as a data value: a number, bare or after a three letter prefix.
/// Header names such as `EV+001` carry a two letter prefix and do not qualify.
pub(crate) fn is_value(field: &str) -> bool {
    let (prefix, number) = split_prefix(field.trim());
    matches!(prefix.len(), 0 | 3) && number.parse::<f64>().is_ok()
}

fn parse_value(field: &str) -> Result<f64> {
    let (_, number) = split_prefix(field.trim());
    number.parse::<f64>()
        .map_err(|_| Error::UnparsableOutput(format!("bad value {:?}", field)))
}

/// Turns a header field into a column name, dropping a trailing sign-and-digits artifact such
/// as the `+001` in `EV+001`.
fn column_name(field: &str) -> String {
    let field = field.trim();
    let trimmed = field.trim_end_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.strip_suffix(['+', '-']).unwrap_or(trimmed);
    if trimmed.is_empty() { field.to_owned() } else { trimmed.to_owned() }
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(str::trim).filter(|field| !field.is_empty())
}

/// Number of data values in an ASCII block, not counting header names.
pub(crate) fn count_values(raw: &str) -> usize {
    raw.lines().flat_map(fields).filter(|field| is_value(field)).count()
}

/// Parses an ASCII data block read in `format`.
pub fn parse(format: Format, raw: &str) -> Result<Series> {
    if format.is_binary() {
        return Err(Error::UnparsableOutput(format!("{:?} is a binary format", format)))
    }
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty()).peekable();
    let mut columns = Vec::new();
    if format.has_header() {
        if let Some(first) = lines.peek() {
            if !fields(first).all(is_value) {
                columns = fields(first).map(column_name).collect();
                lines.next();
            } else {
                // no header line; name the columns after the prefix of each value
                columns = fields(first)
                    .map(|field| {
                        let (prefix, _) = split_prefix(field);
                        match prefix.len() {
                            3 => prefix[1..].to_owned(),
                            _ => prefix.to_owned(),
                        }
                    })
                    .collect();
                if columns.iter().any(String::is_empty) {
                    columns.clear();
                }
            }
        }
    }

    let mut rows = Vec::new();
    if columns.is_empty() {
        for line in lines {
            for field in fields(line) {
                rows.push(vec![parse_value(field)?]);
            }
        }
    } else if format.is_comma_terminated() {
        let values = lines
            .flat_map(fields)
            .map(parse_value)
            .collect::<Result<Vec<_>>>()?;
        if values.len() % columns.len() != 0 {
            return Err(Error::UnparsableOutput(format!(
                "{} values do not fill rows of {} columns", values.len(), columns.len())))
        }
        rows.extend(values.chunks(columns.len()).map(<[f64]>::to_vec));
    } else {
        for line in lines {
            let row = fields(line).map(parse_value).collect::<Result<Vec<_>>>()?;
            if row.len() != columns.len() {
                return Err(Error::UnparsableOutput(format!(
                    "row {:?} does not have {} columns", line, columns.len())))
            }
            rows.push(row);
        }
    }
    Ok(Series { columns, rows })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_comma() {
        let series = parse(Format::Ascii12HeaderComma, "EV,EI\r\n+1.0E+00,+2.0E-03\r\n").unwrap();
        assert_eq!(series.columns, ["EV", "EI"]);
        assert_eq!(series.rows, [[1.0, 0.002]]);
    }

    #[test]
    fn test_header_artifacts() {
        let series = parse(Format::Ascii13Header, "EV+001,EI-02\r\n1,2\r\n3,4\r\n").unwrap();
        assert_eq!(series.columns, ["EV", "EI"]);
        assert_eq!(series.column("EI"), Some(vec![2.0, 4.0]));
        assert_eq!(series.column("XX"), None);
    }

    #[test]
    fn test_header_with_numeric_suffix() {
        let raw = "EV+001,EI-02\r\n+1.0E+00,+2.0E-03\r\n+2.0E+00,+4.0E-03\r\n";
        let series = parse(Format::Ascii12Header, raw).unwrap();
        assert_eq!(series.columns, ["EV", "EI"]);
        assert_eq!(series.rows, [[1.0, 0.002], [2.0, 0.004]]);
        assert!(!is_value("EV+001"));
        assert!(is_value("NAI+1.000E-06"));
        assert!(is_value("-2"));
        assert_eq!(count_values(raw), 4);
    }

    #[test]
    fn test_value_prefixes() {
        let raw = "NAI+1.000E-06,NAV+2.000E+00\r\nNAI+2.000E-06,NAV+4.000E+00\r\n";
        let series = parse(Format::Ascii12Header, raw).unwrap();
        assert_eq!(series.columns, ["AI", "AV"]);
        assert_eq!(series.rows, [[1e-6, 2.0], [2e-6, 4.0]]);
    }

    #[test]
    fn test_no_header() {
        let series = parse(Format::Ascii13, "+1.0E-03\r\n+2.0E-03,+3.0E-03\r\n").unwrap();
        assert!(series.columns.is_empty());
        assert_eq!(series.rows, [[1e-3], [2e-3], [3e-3]]);
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse(Format::Ascii13Header, "EV,EI\r\n1,bogus\r\n"),
                         Err(Error::UnparsableOutput(_))));
        assert!(matches!(parse(Format::Ascii13Header, "EV,EI\r\n1\r\n"),
                         Err(Error::UnparsableOutput(_))));
        assert!(matches!(parse(Format::Ascii12HeaderComma, "EV,EI\r\n1,2,3\r\n"),
                         Err(Error::UnparsableOutput(_))));
        assert!(matches!(parse(Format::Binary4, ""), Err(Error::UnparsableOutput(_))));
    }

    #[test]
    fn test_empty() {
        assert!(parse(Format::Ascii12Header, "").unwrap().is_empty());
    }
}
