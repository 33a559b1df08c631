//! Implements the §6 collaborator contracts (meter CSV export, building-
//! energy-model API records) the dispatch core never calls into directly —
//! only the CLI front and test fixtures depend on this module.

use chrono::{Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::io::{BufRead, BufReader};
use thiserror::Error;

use crate::site_series::LoadSeries;

const METER_HEADER_PREFIX: &str = "TYPE,DATE,START TIME,END TIME,USAGE (kWh),COST,NOTES";
const DEFAULT_VALUE_COLUMN: &str = "USAGE (kWh)";

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("could not read meter export: {0}")]
    Io(#[from] std::io::Error),
    #[error("meter export header row not found (expected a line starting with `{METER_HEADER_PREFIX}`)")]
    MissingHeader,
    #[error("csv parsing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("requested value column `{0}` not present in meter export")]
    MissingColumn(String),
    #[error("could not parse timestamp `{0}`")]
    Timestamp(String),
    #[error("could not parse numeric value `{0}`")]
    Value(String),
    #[error("meter export contains no usable rows")]
    Empty,
}

/// Parses a utility meter CSV export into an hourly [`LoadSeries`].
///
/// Skips informational metadata lines preceding the header row beginning
/// with `TYPE,DATE,START TIME,END TIME,USAGE (kWh),COST,NOTES`. Timestamps
/// are built from `DATE` + `START TIME`, localized to `tz`; rows landing on
/// a DST-ambiguous or nonexistent local instant are dropped. `value_column`
/// selects the numeric column (`USAGE (kWh)` by default); a leading currency
/// symbol on the value is stripped before parsing. The result is trimmed to
/// the trailing one year of data if it spans more.
pub fn parse_meter_csv(
    path: &std::path::Path,
    tz: Tz,
    value_column: Option<&str>,
) -> Result<LoadSeries, IngestionError> {
    let value_column = value_column.unwrap_or(DEFAULT_VALUE_COLUMN);
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);

    let header_line = find_header_line(&mut reader)?;
    let headers: Vec<String> = header_line.split(',').map(|s| s.trim().to_string()).collect();
    let date_idx = headers.iter().position(|h| h == "DATE").ok_or(IngestionError::MissingHeader)?;
    let start_idx = headers
        .iter()
        .position(|h| h == "START TIME")
        .ok_or(IngestionError::MissingHeader)?;
    let value_idx = headers
        .iter()
        .position(|h| h == value_column)
        .ok_or_else(|| IngestionError::MissingColumn(value_column.to_string()))?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut index = Vec::new();
    let mut load_kwh = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let Some(date) = record.get(date_idx) else { continue };
        let Some(start) = record.get(start_idx) else { continue };
        let Some(raw_value) = record.get(value_idx) else { continue };

        let Some(ts) = localize(date, start, &tz) else { continue };
        let Ok(value) = parse_numeric(raw_value) else { continue };

        index.push(ts);
        load_kwh.push(value);
    }

    if index.is_empty() {
        return Err(IngestionError::Empty);
    }

    trim_to_trailing_year(&mut index, &mut load_kwh);

    Ok(LoadSeries::new(index, load_kwh))
}

fn find_header_line(reader: &mut impl BufRead) -> Result<String, IngestionError> {
    for line in reader.lines() {
        let line = line?;
        if line.starts_with(METER_HEADER_PREFIX) {
            return Ok(line);
        }
    }
    Err(IngestionError::MissingHeader)
}

fn localize(date: &str, start_time: &str, tz: &Tz) -> Option<chrono::DateTime<Tz>> {
    let combined = format!("{} {}", date.trim(), start_time.trim());
    let naive = parse_naive_datetime(&combined)?;
    tz.from_local_datetime(&naive).single()
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%m/%d/%Y %H:%M", "%m/%d/%Y %I:%M %p", "%Y-%m-%d %H:%M"];
    FORMATS.iter().find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_numeric(raw: &str) -> Result<f64, IngestionError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse::<f64>()
        .map_err(|_| IngestionError::Value(raw.to_string()))
}

fn trim_to_trailing_year(index: &mut Vec<chrono::DateTime<Tz>>, load_kwh: &mut Vec<f64>) {
    let Some(&last) = index.last() else { return };
    let cutoff = last - Duration::days(365);
    if index.first().map(|&first| first >= cutoff).unwrap_or(true) {
        return;
    }
    let keep_from = index.partition_point(|&t| t < cutoff);
    *index = index.split_off(keep_from);
    *load_kwh = load_kwh.split_off(keep_from);
}

/// A single interval record from the building-energy-model API contract.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BemIntervalRecord {
    pub from_datetime: chrono::DateTime<chrono::Utc>,
    #[allow(dead_code)]
    pub to_datetime: chrono::DateTime<chrono::Utc>,
    pub variable: String,
    pub value: f64,
}

/// Converts building-energy-model interval records into a [`LoadSeries`],
/// keeping only `consumption.electricity` rows and localizing to `tz`.
pub fn load_series_from_bem_records(
    records: &[BemIntervalRecord],
    tz: Tz,
) -> LoadSeries {
    let mut rows: Vec<(chrono::DateTime<Tz>, f64)> = records
        .iter()
        .filter(|r| r.variable == "consumption.electricity")
        .map(|r| (r.from_datetime.with_timezone(&tz), r.value))
        .collect();
    rows.sort_by_key(|(t, _)| *t);

    let index = rows.iter().map(|(t, _)| *t).collect();
    let load_kwh = rows.iter().map(|(_, v)| *v).collect();
    LoadSeries::new(index, load_kwh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::America::Los_Angeles;
    use std::io::Write;

    #[test]
    fn parses_standard_meter_export() {
        let mut file = tempfile_with_contents(
            "Account Number,1234\n\
             Service Address,123 Main St\n\
             TYPE,DATE,START TIME,END TIME,USAGE (kWh),COST,NOTES\n\
             Electric usage,01/01/2023,00:00,01:00,1.234,$0.49,\n\
             Electric usage,01/01/2023,01:00,02:00,0.876,$0.35,\n",
        );
        let series = parse_meter_csv(file.path(), Los_Angeles, None).unwrap();
        assert_eq!(series.index.len(), 2);
        assert!((series.load_kwh[0] - 1.234).abs() < 1e-9);
        file.close_and_discard();
    }

    #[test]
    fn strips_currency_symbol_on_alternate_column() {
        let mut file = tempfile_with_contents(
            "TYPE,DATE,START TIME,END TIME,USAGE (kWh),COST,NOTES\n\
             Electric usage,01/01/2023,00:00,01:00,1.234,$0.49,\n",
        );
        let series = parse_meter_csv(file.path(), Los_Angeles, Some("COST")).unwrap();
        assert!((series.load_kwh[0] - 0.49).abs() < 1e-9);
        file.close_and_discard();
    }

    #[test]
    fn missing_header_is_an_error() {
        let mut file = tempfile_with_contents("not,a,meter,export\n1,2,3,4\n");
        assert!(parse_meter_csv(file.path(), Los_Angeles, None).is_err());
        file.close_and_discard();
    }

    #[test]
    fn bem_records_keep_only_consumption_electricity() {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let records = vec![
            BemIntervalRecord {
                from_datetime: t0,
                to_datetime: t0 + Duration::hours(1),
                variable: "consumption.electricity".to_string(),
                value: 1.5,
            },
            BemIntervalRecord {
                from_datetime: t0,
                to_datetime: t0 + Duration::hours(1),
                variable: "grid.electricity.import".to_string(),
                value: 1.2,
            },
        ];
        let series = load_series_from_bem_records(&records, Los_Angeles);
        assert_eq!(series.index.len(), 1);
        assert!((series.load_kwh[0] - 1.5).abs() < 1e-9);
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn path(&self) -> &std::path::Path {
            &self.path
        }
        fn close_and_discard(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with_contents(contents: &str) -> TempFile {
        let path = std::env::temp_dir().join(format!(
            "mygrid_dispatch_test_{}_{}.csv",
            std::process::id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TempFile { path }
    }
}
