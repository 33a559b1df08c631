//! Cost-optimal one-year dispatch scheduling for a behind-the-meter
//! solar + battery + load site under a time-of-use tariff.
//!
//! The core is the [`dispatch`] module: given an aligned [`site_series::SiteSeries`]
//! and a [`tariff::TariffTable`], it solves a linear program for the per-hour
//! battery and grid power that minimizes total grid cost. [`greedy`] provides a
//! non-optimizing causal fallback with the same interface. [`site_series`] and
//! [`tariff`] prepare the two inputs the solver depends on; [`cost`] turns any
//! resulting grid-power series back into a daily cost figure.

pub mod battery;
pub mod config;
pub mod cost;
pub mod dispatch;
pub mod greedy;
pub mod ingestion;
pub mod logging;
pub mod site_series;
pub mod tariff;

pub use battery::BatteryParameters;
pub use cost::daily_cost;
pub use dispatch::{dispatch_lp, DispatchError, Schedule};
pub use greedy::dispatch_greedy;
pub use site_series::{align_site_series, LoadSeries, SiteSeries, SolarReference};
pub use tariff::{build_tariff, TariffSchedule, TariffTable};
