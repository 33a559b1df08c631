use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

/// The reference year `S_ref` is anchored on: a leap year, used when `L.index`
/// itself contains a Feb-29.
const REF_LEAP_YEAR: i32 = 2020;
/// Target year when `L.index` ends on Dec-31 (no leap day present).
const REF_SHIFT_TARGET_DEC31: i32 = 2019;
/// Target year when `L.index` ends after February but not on Dec-31.
const REF_SHIFT_TARGET_LATE: i32 = 2021;
/// Target year for any other case (ends in January or February).
const REF_SHIFT_TARGET_EARLY: i32 = 2019;

#[derive(Debug, Error)]
pub enum SiteSeriesError {
    #[error("load series is empty")]
    EmptyLoadSeries,
    #[error("solar reference series is empty")]
    EmptySolarReference,
    #[error("load series contains a negative value at index {0}")]
    NegativeLoad(usize),
}

/// Hourly energy consumed during the hour ending at each timestamp, in kWh.
#[derive(Debug, Clone)]
pub struct LoadSeries {
    pub index: Vec<DateTime<Tz>>,
    pub load_kwh: Vec<f64>,
}

impl LoadSeries {
    pub fn new(index: Vec<DateTime<Tz>>, load_kwh: Vec<f64>) -> Self {
        Self { index, load_kwh }
    }

    fn validate(&self) -> Result<(), SiteSeriesError> {
        if self.index.is_empty() {
            return Err(SiteSeriesError::EmptyLoadSeries);
        }
        if let Some(i) = self.load_kwh.iter().position(|&v| v < 0.0) {
            return Err(SiteSeriesError::NegativeLoad(i));
        }
        Ok(())
    }
}

/// Per-kW-installed AC solar output, in kWh/kW, keyed by a reference index
/// spanning at least one full non-leap-year (and the leap year it straddles).
#[derive(Debug, Clone)]
pub struct SolarReference {
    pub index: Vec<DateTime<Tz>>,
    pub kwh_per_kw: Vec<f64>,
}

impl SolarReference {
    pub fn new(index: Vec<DateTime<Tz>>, kwh_per_kw: Vec<f64>) -> Self {
        Self { index, kwh_per_kw }
    }
}

/// `(load, solar)` table aligned on the load index.
#[derive(Debug, Clone)]
pub struct SiteSeries {
    pub index: Vec<DateTime<Tz>>,
    pub load_kwh: Vec<f64>,
    pub solar_kwh: Vec<f64>,
}

/// Aligns a solar reference series onto a load index and scales it by the
/// installed solar size, producing the `(load, solar)` table the dispatch
/// solvers consume.
///
/// See the shift-year heuristic below: the leap-day branch is unambiguous,
/// the remaining three branches mirror the source's month/day heuristic with
/// logical (not bitwise) conjunction.
pub fn align_site_series(
    load: &LoadSeries,
    solar_ref: &SolarReference,
    solar_size_kw: f64,
) -> Result<SiteSeries, SiteSeriesError> {
    load.validate()?;
    if solar_ref.index.is_empty() {
        return Err(SiteSeriesError::EmptySolarReference);
    }

    let shift = shift_years(load);
    let shifted = shift_and_resample(solar_ref, shift);

    let mut solar_kwh = Vec::with_capacity(load.index.len());
    for t in &load.index {
        let hour = t.duration_trunc_hours();
        let value = lookup_with_ffill(&shifted, hour);
        solar_kwh.push(solar_size_kw * value);
    }

    Ok(SiteSeries {
        index: load.index.clone(),
        load_kwh: load.load_kwh.clone(),
        solar_kwh,
    })
}

/// Computes the year offset to translate `solar_ref`'s index onto `load`'s
/// calendar positions, following the source's four-way heuristic.
fn shift_years(load: &LoadSeries) -> i32 {
    let leap_day_year = load.index.iter().find_map(|t| {
        if t.month() == 2 && t.day() == 29 {
            Some(t.year())
        } else {
            None
        }
    });

    if let Some(y_l) = leap_day_year {
        return REF_LEAP_YEAR - y_l;
    }

    let end = load.index.last().expect("validated non-empty");
    if end.month() == 12 && end.day() == 31 {
        REF_SHIFT_TARGET_DEC31 - end.year()
    } else if end.month() > 2 {
        REF_SHIFT_TARGET_LATE - end.year()
    } else {
        REF_SHIFT_TARGET_EARLY - end.year()
    }
}

/// Translates `solar_ref`'s index by `shift` years (performed in UTC),
/// resamples to the hourly grid with right-closed last-sample semantics, and
/// forward-fills the small night-time gaps a DST shift can introduce.
fn shift_and_resample(solar_ref: &SolarReference, shift: i32) -> HashMap<DateTime<Tz>, f64> {
    let mut by_hour: HashMap<DateTime<Tz>, f64> = HashMap::with_capacity(solar_ref.index.len());

    for (t, &value) in solar_ref.index.iter().zip(solar_ref.kwh_per_kw.iter()) {
        let utc = t.with_timezone(&chrono_tz::UTC);
        let shifted_naive = shift_naive_date(utc.date_naive(), shift);
        let Some(shifted_utc) = chrono_tz::UTC
            .from_local_datetime(&shifted_naive.and_time(utc.time()))
            .single()
        else {
            continue;
        };
        let shifted = shifted_utc.with_timezone(&t.timezone());
        let hour = shifted.duration_trunc_hours();
        // last-sample wins: source index is chronological, so a later
        // occurrence overwrites an earlier one landing on the same hour.
        by_hour.insert(hour, value);
    }

    by_hour
}

/// Shifts a calendar date by whole years. The source translates the
/// reference index with `index - DateOffset(years=shift_by_yrs)`, i.e. the
/// target year is `old_year - shift`, not `+ shift`. Feb-29 shifted into a
/// non-leap target year clamps back to Feb-28, matching `dateutil`'s
/// relativedelta behavior the source relies on.
fn shift_naive_date(date: NaiveDate, shift: i32) -> NaiveDate {
    let target_year = date.year() - shift;
    date.with_year(target_year)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(target_year, 2, 28).expect("valid date"))
}

/// Looks up `hour` in the shifted map, forward-filling up to a two-hour gap
/// (the largest a spring-forward DST transition can introduce) before
/// defaulting to zero, per the left-join default in the alignment contract.
fn lookup_with_ffill(by_hour: &HashMap<DateTime<Tz>, f64>, hour: DateTime<Tz>) -> f64 {
    for back in 0..=2 {
        let candidate = hour - Duration::hours(back);
        if let Some(&v) = by_hour.get(&candidate) {
            return v;
        }
    }
    0.0
}

trait DurationTruncHours {
    fn duration_trunc_hours(self) -> Self;
}

impl DurationTruncHours for DateTime<Tz> {
    fn duration_trunc_hours(self) -> Self {
        let naive = self.naive_local();
        let truncated = NaiveDate::from_ymd_opt(naive.year(), naive.month(), naive.day())
            .expect("valid date")
            .and_time(NaiveTime::from_hms_opt(naive.hour(), 0, 0).expect("valid time"));
        self.timezone()
            .from_local_datetime(&truncated)
            .single()
            .unwrap_or(self)
    }
}

use chrono::Timelike;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    fn hourly_index(tz: Tz, start: (i32, u32, u32), hours: usize) -> Vec<DateTime<Tz>> {
        let start = tz
            .with_ymd_and_hms(start.0, start.1, start.2, 0, 0, 0)
            .single()
            .unwrap();
        (0..hours).map(|h| start + Duration::hours(h as i64)).collect()
    }

    #[test]
    fn non_leap_year_alignment_preserves_length_and_nonnull() {
        let tz = Los_Angeles;
        let load_index = hourly_index(tz, (2023, 1, 1), 24 * 365);
        let load = LoadSeries::new(load_index.clone(), vec![1.0; load_index.len()]);

        let ref_index = hourly_index(tz, (2019, 1, 1), 24 * 365 * 3);
        let solar_ref = SolarReference::new(ref_index.clone(), vec![0.5; ref_index.len()]);

        let site = align_site_series(&load, &solar_ref, 1.0).unwrap();
        assert_eq!(site.index.len(), load_index.len());
        assert!(site.solar_kwh.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn leap_day_pulls_from_reference_leap_year() {
        let tz = Los_Angeles;
        let load_index = hourly_index(tz, (2024, 2, 28), 48);
        let load = LoadSeries::new(load_index.clone(), vec![1.0; load_index.len()]);

        let ref_index = hourly_index(tz, (2019, 1, 1), 24 * 365 * 3);
        let mut kwh_per_kw = vec![0.1; ref_index.len()];
        // Mark Feb-29 2020 in the reference distinctly so we can trace it.
        for (i, t) in ref_index.iter().enumerate() {
            if t.year() == 2020 && t.month() == 2 && t.day() == 29 {
                kwh_per_kw[i] = 9.0;
            }
        }
        let solar_ref = SolarReference::new(ref_index, kwh_per_kw);

        let site = align_site_series(&load, &solar_ref, 1.0).unwrap();
        assert_eq!(site.index.len(), 48);
        let feb29_pos = load_index
            .iter()
            .position(|t| t.month() == 2 && t.day() == 29)
            .expect("load index contains Feb-29");
        assert!((site.solar_kwh[feb29_pos] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_load() {
        let tz = Los_Angeles;
        let load_index = hourly_index(tz, (2023, 1, 1), 2);
        let load = LoadSeries::new(load_index.clone(), vec![-1.0, 1.0]);
        let ref_index = hourly_index(tz, (2019, 1, 1), 24);
        let solar_ref = SolarReference::new(ref_index.clone(), vec![0.0; ref_index.len()]);
        assert!(align_site_series(&load, &solar_ref, 1.0).is_err());
    }
}
