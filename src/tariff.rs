use chrono::{DateTime, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TariffError {
    #[error("tariff index is empty")]
    EmptyIndex,
    #[error("sell price {sell} exceeds buy price {buy} at index {index}")]
    InvalidSchedule { index: usize, buy: f64, sell: f64 },
}

/// A two-tier time-of-use schedule, parameterized over peak/off-peak buy and
/// sell prices and the local civil-time windows the peak tier applies in.
/// Window boundaries are inclusive at both ends.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TariffSchedule {
    pub peak_buy: f64,
    pub offpeak_buy: f64,
    pub peak_buy_start: NaiveTimeHm,
    pub peak_buy_end: NaiveTimeHm,
    pub peak_sell: f64,
    pub offpeak_sell: f64,
    pub peak_sell_start: NaiveTimeHm,
    pub peak_sell_end: NaiveTimeHm,
}

/// `HH:MM` wrapper so a `TariffSchedule` can be deserialized straight out of
/// TOML (`serde`'s `NaiveTime` support expects a different string format).
#[derive(Debug, Clone, Copy)]
pub struct NaiveTimeHm(pub NaiveTime);

impl<'de> Deserialize<'de> for NaiveTimeHm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .map(NaiveTimeHm)
            .map_err(serde::de::Error::custom)
    }
}

impl Default for TariffSchedule {
    /// The domain default two-tier schedule tests check against.
    fn default() -> Self {
        TariffSchedule {
            peak_buy: 0.52,
            offpeak_buy: 0.40,
            peak_buy_start: NaiveTimeHm(NaiveTime::from_hms_opt(16, 0, 0).unwrap()),
            peak_buy_end: NaiveTimeHm(NaiveTime::from_hms_opt(21, 0, 0).unwrap()),
            peak_sell: 0.08,
            offpeak_sell: 0.05,
            peak_sell_start: NaiveTimeHm(NaiveTime::from_hms_opt(15, 0, 0).unwrap()),
            peak_sell_end: NaiveTimeHm(NaiveTime::from_hms_opt(20, 0, 0).unwrap()),
        }
    }
}

/// Per-hour `(buy, sell)` prices keyed by the same index as a `SiteSeries`.
#[derive(Debug, Clone)]
pub struct TariffTable {
    pub index: Vec<DateTime<Tz>>,
    pub buy: Vec<f64>,
    pub sell: Vec<f64>,
}

/// Builds a tariff table over `index` under `schedule`.
pub fn build_tariff(
    index: &[DateTime<Tz>],
    schedule: &TariffSchedule,
) -> Result<TariffTable, TariffError> {
    if index.is_empty() {
        return Err(TariffError::EmptyIndex);
    }

    let mut buy = Vec::with_capacity(index.len());
    let mut sell = Vec::with_capacity(index.len());

    for t in index {
        let tod = t.time();
        let b = if in_window(tod, schedule.peak_buy_start.0, schedule.peak_buy_end.0) {
            schedule.peak_buy
        } else {
            schedule.offpeak_buy
        };
        let s = if in_window(tod, schedule.peak_sell_start.0, schedule.peak_sell_end.0) {
            schedule.peak_sell
        } else {
            schedule.offpeak_sell
        };
        buy.push(b);
        sell.push(s);
    }

    for (i, (&b, &s)) in buy.iter().zip(sell.iter()).enumerate() {
        if s > b {
            return Err(TariffError::InvalidSchedule {
                index: i,
                buy: b,
                sell: s,
            });
        }
    }

    Ok(TariffTable {
        index: index.to_vec(),
        buy,
        sell,
    })
}

fn in_window(tod: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    tod >= start && tod <= end
}
