// Charger utilization: per-record rates, quarterly rollup and yearly growth.
//
// A record's rate is the average energy dispensed per day divided by the
// theoretical daily maximum of the station's connectors of that type
// (`connector_count * capacity_per_session`). Stations installed mid-quarter
// have their average scaled back up to a full-quarter projection first.

use crate::error::{ReportError, Result};
use crate::quarter::{label_year, Quarter, FALLBACK_QUARTER_DAYS};
use crate::types::{ChargerType, Station, UsageRecord};
use crate::util::mean_opt;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

pub const DEFAULT_AC_CAPACITY: u32 = 7;
pub const DEFAULT_DC_CAPACITY: u32 = 30;
pub const MIN_CAPACITY: u32 = 1;
pub const MAX_CAPACITY: u32 = 99;

/// Max energy (kWh) one charging session can deliver, per charger type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct UtilizationConfig {
    pub ac_capacity: u32,
    pub dc_capacity: u32,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        UtilizationConfig {
            ac_capacity: DEFAULT_AC_CAPACITY,
            dc_capacity: DEFAULT_DC_CAPACITY,
        }
    }
}

impl UtilizationConfig {
    pub fn new(ac_capacity: u32, dc_capacity: u32) -> Result<Self> {
        let config = UtilizationConfig {
            ac_capacity,
            dc_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (label, value) in [("ac_capacity", self.ac_capacity), ("dc_capacity", self.dc_capacity)] {
            if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&value) {
                return Err(ReportError::InvalidParameter(format!(
                    "{} must be between {} and {}, got {}",
                    label, MIN_CAPACITY, MAX_CAPACITY, value
                )));
            }
        }
        Ok(())
    }

    pub fn capacity(&self, charger_type: ChargerType) -> u32 {
        match charger_type {
            ChargerType::Ac => self.ac_capacity,
            ChargerType::Dc => self.dc_capacity,
        }
    }
}

/// A usage record with its computed rate and the intermediate values that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub station_id: String,
    pub quarter: String,
    pub charger_type: ChargerType,
    pub quarter_days: i64,
    pub actual_days: i64,
    pub adjusted_avg: Option<f64>,
    /// `None` when the average is missing or the station has no connectors of
    /// this type.
    pub rate: Option<f64>,
}

/// Returns `(quarter_days, actual_days)`.
///
/// A malformed quarter label gives `(91, 91)`. The installation date only
/// shortens the quarter when it falls inside it.
pub fn operating_days(quarter: &str, installation_date: Option<NaiveDate>) -> (i64, i64) {
    let Some((q, quarter_days, end)) =
        Quarter::parse(quarter).and_then(|q| Some((q, q.days()?, q.end()?)))
    else {
        debug!(quarter, "unparseable quarter label, assuming {} days", FALLBACK_QUARTER_DAYS);
        return (FALLBACK_QUARTER_DAYS, FALLBACK_QUARTER_DAYS);
    };
    let actual_days = match installation_date {
        Some(installed) if q.contains(installed) => (end - installed).num_days() + 1,
        _ => quarter_days,
    };
    (quarter_days, actual_days)
}

/// Evaluate one usage record against its station.
///
/// A station whose installation date could not be parsed gets the same
/// `(91, 91)` fallback as a malformed quarter label.
pub fn evaluate(record: &UsageRecord, station: &Station, config: &UtilizationConfig) -> RateRecord {
    let (quarter_days, actual_days) = if station.installation_date_unparseable {
        (FALLBACK_QUARTER_DAYS, FALLBACK_QUARTER_DAYS)
    } else {
        operating_days(&record.quarter, station.installation_date)
    };
    let adjusted_avg = record.avg_energy_per_day.map(|avg| {
        if actual_days == quarter_days {
            avg
        } else {
            avg * quarter_days as f64 / actual_days as f64
        }
    });

    let connectors = station.connector_count(record.charger_type);
    let theoretical_max = connectors as f64 * config.capacity(record.charger_type) as f64;
    let rate = match adjusted_avg {
        Some(avg) if connectors > 0 => Some(avg / theoretical_max),
        _ => None,
    };

    RateRecord {
        station_id: record.station_id.clone(),
        quarter: record.quarter.clone(),
        charger_type: record.charger_type,
        quarter_days,
        actual_days,
        adjusted_avg,
        rate,
    }
}

/// Utilization rate of one record, or `None` when it is undefined.
pub fn compute_rate(record: &UsageRecord, station: &Station, config: &UtilizationConfig) -> Option<f64> {
    evaluate(record, station, config).rate
}

/// Evaluate every usage record whose station is known, in input order.
pub fn compute_rates(
    usage: &[UsageRecord],
    stations: &[Station],
    config: &UtilizationConfig,
) -> Vec<RateRecord> {
    let by_id: HashMap<&str, &Station> = stations
        .iter()
        .map(|s| (s.station_id.as_str(), s))
        .collect();

    let mut unknown = 0usize;
    let rates: Vec<RateRecord> = usage
        .iter()
        .filter_map(|record| match by_id.get(record.station_id.as_str()) {
            Some(station) => Some(evaluate(record, station, config)),
            None => {
                unknown += 1;
                None
            }
        })
        .collect();
    if unknown > 0 {
        debug!(unknown, "usage records skipped: station not in station table");
    }
    rates
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuarterlyUtilization {
    pub quarter: String,
    pub ac: Option<f64>,
    pub dc: Option<f64>,
    /// Year-over-year growth (percent) of the quarter's year, repeated on
    /// every row of that year.
    pub ac_growth: Option<f64>,
    pub dc_growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuarterlyTable {
    pub rows: Vec<QuarterlyUtilization>,
    /// Whether any AC/DC record survived the station filter.
    pub has_ac: bool,
    pub has_dc: bool,
}

/// Mean rate per quarter and charger type over `station_set` (all stations
/// when `None`), sorted by quarter, with the yearly growth overlay attached.
pub fn rollup(rates: &[RateRecord], station_set: Option<&HashSet<String>>) -> QuarterlyTable {
    let mut groups: BTreeMap<&str, HashMap<ChargerType, Vec<f64>>> = BTreeMap::new();
    let mut types_seen: HashSet<ChargerType> = HashSet::new();

    for r in rates {
        if station_set.is_some_and(|set| !set.contains(&r.station_id)) {
            continue;
        }
        types_seen.insert(r.charger_type);
        let by_type = groups.entry(r.quarter.as_str()).or_default();
        let values = by_type.entry(r.charger_type).or_default();
        if let Some(rate) = r.rate {
            values.push(rate);
        }
    }

    let mut rows: Vec<QuarterlyUtilization> = groups
        .into_iter()
        .map(|(quarter, by_type)| {
            let mean_of = |t: ChargerType| by_type.get(&t).and_then(|v| mean_opt(v));
            QuarterlyUtilization {
                quarter: quarter.to_string(),
                ac: mean_of(ChargerType::Ac),
                dc: mean_of(ChargerType::Dc),
                ac_growth: None,
                dc_growth: None,
            }
        })
        .collect();

    let ac_growth = yearly_growth(&rows, |row| row.ac);
    let dc_growth = yearly_growth(&rows, |row| row.dc);
    for row in &mut rows {
        if let Some(year) = label_year(&row.quarter) {
            row.ac_growth = ac_growth.get(&year).copied().flatten();
            row.dc_growth = dc_growth.get(&year).copied().flatten();
        }
    }

    QuarterlyTable {
        rows,
        has_ac: types_seen.contains(&ChargerType::Ac),
        has_dc: types_seen.contains(&ChargerType::Dc),
    }
}

/// Growth (percent) of each year's mean quarterly rate against the previous
/// year in the series. The first year, and any year following one with no
/// data or a zero mean, has no figure.
pub fn yearly_growth<F>(rows: &[QuarterlyUtilization], value: F) -> BTreeMap<i32, Option<f64>>
where
    F: Fn(&QuarterlyUtilization) -> Option<f64>,
{
    let mut per_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let Some(year) = label_year(&row.quarter) else {
            continue;
        };
        let values = per_year.entry(year).or_default();
        if let Some(v) = value(row) {
            values.push(v);
        }
    }

    let mut growth = BTreeMap::new();
    let mut previous: Option<Option<f64>> = None;
    for (year, values) in per_year {
        let mean = mean_opt(&values);
        let change = match (previous, mean) {
            (Some(Some(prev)), Some(cur)) if prev != 0.0 => Some((cur - prev) / prev * 100.0),
            _ => None,
        };
        growth.insert(year, change);
        previous = Some(mean);
    }
    growth
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn station(id: &str, ac: u32, dc: u32, installed: Option<NaiveDate>) -> Station {
        Station {
            station_id: id.to_string(),
            name: id.to_string(),
            latitude: 25.0,
            longitude: 121.0,
            ac_count: ac,
            dc_count: dc,
            installation_date: installed,
            installation_date_unparseable: false,
            city: None,
            area_type: None,
            project_type: None,
        }
    }

    fn usage(id: &str, quarter: &str, t: ChargerType, avg: Option<f64>) -> UsageRecord {
        UsageRecord {
            station_id: id.to_string(),
            quarter: quarter.to_string(),
            charger_type: t,
            avg_energy_per_day: avg,
        }
    }

    fn rate(id: &str, quarter: &str, t: ChargerType, value: Option<f64>) -> RateRecord {
        RateRecord {
            station_id: id.to_string(),
            quarter: quarter.to_string(),
            charger_type: t,
            quarter_days: 91,
            actual_days: 91,
            adjusted_avg: value,
            rate: value,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn config_bounds() {
        assert_eq!(UtilizationConfig::default(), UtilizationConfig { ac_capacity: 7, dc_capacity: 30 });
        assert!(UtilizationConfig::new(1, 99).is_ok());
        assert!(matches!(UtilizationConfig::new(0, 30), Err(ReportError::InvalidParameter(_))));
        assert!(UtilizationConfig::new(7, 100).is_err());
    }

    #[test]
    fn full_quarter_ac_rate() {
        let s = station("S1", 2, 0, None);
        let u = usage("S1", "2024-Q1", ChargerType::Ac, Some(10.0));
        let r = evaluate(&u, &s, &UtilizationConfig::default());
        assert_eq!(r.quarter_days, 91);
        assert_eq!(r.actual_days, 91);
        assert_relative_eq!(r.adjusted_avg.unwrap(), 10.0);
        assert_relative_eq!(r.rate.unwrap(), 10.0 / 14.0);
    }

    #[test]
    fn dc_rate_uses_dc_capacity() {
        let s = station("S1", 2, 1, None);
        let u = usage("S1", "2024-Q2", ChargerType::Dc, Some(15.0));
        let config = UtilizationConfig::new(7, 50).unwrap();
        assert_relative_eq!(compute_rate(&u, &s, &config).unwrap(), 0.3);
    }

    #[test]
    fn mid_quarter_installation_scales_average() {
        // 2023-Q3 runs Jul 1 - Sep 30 (92 days); installed Sep 1 leaves 30 days.
        let s = station("S1", 1, 0, Some(ymd(2023, 9, 1)));
        let u = usage("S1", "2023-Q3", ChargerType::Ac, Some(3.0));
        let r = evaluate(&u, &s, &UtilizationConfig::default());
        assert_eq!(r.quarter_days, 92);
        assert_eq!(r.actual_days, 30);
        assert_relative_eq!(r.adjusted_avg.unwrap(), 3.0 * 92.0 / 30.0);
        assert_relative_eq!(r.rate.unwrap(), 3.0 * 92.0 / 30.0 / 7.0);
    }

    #[test]
    fn installation_on_last_day_counts_one_day() {
        assert_eq!(operating_days("2024-Q4", Some(ymd(2024, 12, 31))), (92, 1));
    }

    #[test]
    fn installation_outside_quarter_is_ignored() {
        assert_eq!(operating_days("2024-Q2", Some(ymd(2024, 7, 15))), (91, 91));
        assert_eq!(operating_days("2024-Q2", Some(ymd(2020, 1, 1))), (91, 91));
        assert_eq!(operating_days("2024-Q2", None), (91, 91));
    }

    #[test]
    fn malformed_quarter_falls_back_to_91_days() {
        // A bad label still yields a rate.
        assert_eq!(operating_days("2024-Q7", Some(ymd(2024, 1, 10))), (91, 91));
        assert_eq!(operating_days("garbage", None), (91, 91));
        let s = station("S1", 1, 0, None);
        let u = usage("S1", "Q1/2024", ChargerType::Ac, Some(7.0));
        assert_relative_eq!(compute_rate(&u, &s, &UtilizationConfig::default()).unwrap(), 1.0);
    }

    #[test]
    fn unparseable_installation_date_falls_back_to_91_days() {
        let mut s = station("S1", 1, 0, None);
        s.installation_date_unparseable = true;
        // 2023-Q3 has 92 days, but the fallback wins.
        let u = usage("S1", "2023-Q3", ChargerType::Ac, Some(3.5));
        let r = evaluate(&u, &s, &UtilizationConfig::default());
        assert_eq!((r.quarter_days, r.actual_days), (91, 91));
        assert_relative_eq!(r.adjusted_avg.unwrap(), 3.5);
        assert_relative_eq!(r.rate.unwrap(), 0.5);

        s.installation_date_unparseable = false;
        let r = evaluate(&u, &s, &UtilizationConfig::default());
        assert_eq!((r.quarter_days, r.actual_days), (92, 92));
    }

    #[test]
    fn zero_connectors_is_undefined_not_zero() {
        let s = station("S1", 0, 2, None);
        let u = usage("S1", "2024-Q1", ChargerType::Ac, Some(10.0));
        assert_eq!(compute_rate(&u, &s, &UtilizationConfig::default()), None);
    }

    #[test]
    fn missing_average_is_undefined() {
        let s = station("S1", 2, 2, None);
        let u = usage("S1", "2024-Q1", ChargerType::Dc, None);
        let r = evaluate(&u, &s, &UtilizationConfig::default());
        assert_eq!(r.adjusted_avg, None);
        assert_eq!(r.rate, None);
    }

    #[test]
    fn compute_rates_skips_unknown_stations() {
        let stations = vec![station("S1", 1, 1, None)];
        let usage = vec![
            usage("S1", "2024-Q1", ChargerType::Ac, Some(1.0)),
            usage("GHOST", "2024-Q1", ChargerType::Ac, Some(1.0)),
            usage("S1", "2024-Q1", ChargerType::Dc, Some(3.0)),
        ];
        let rates = compute_rates(&usage, &stations, &UtilizationConfig::default());
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[1].charger_type, ChargerType::Dc);
        assert_relative_eq!(rates[1].rate.unwrap(), 0.1);
    }

    #[test]
    fn rollup_means_sorts_and_ignores_undefined() {
        let rates = vec![
            rate("S2", "2024-Q2", ChargerType::Ac, Some(0.4)),
            rate("S1", "2024-Q1", ChargerType::Ac, Some(0.2)),
            rate("S2", "2024-Q1", ChargerType::Ac, Some(0.6)),
            rate("S3", "2024-Q1", ChargerType::Ac, None),
        ];
        let table = rollup(&rates, None);
        assert!(table.has_ac);
        assert!(!table.has_dc);
        let quarters: Vec<&str> = table.rows.iter().map(|r| r.quarter.as_str()).collect();
        assert_eq!(quarters, vec!["2024-Q1", "2024-Q2"]);
        assert_relative_eq!(table.rows[0].ac.unwrap(), 0.4, epsilon = 1e-12);
        assert_eq!(table.rows[0].dc, None);
        assert_relative_eq!(table.rows[1].ac.unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn rollup_respects_station_set() {
        let rates = vec![
            rate("S1", "2024-Q1", ChargerType::Ac, Some(0.2)),
            rate("S2", "2024-Q1", ChargerType::Dc, Some(0.8)),
        ];
        let set: HashSet<String> = ["S2".to_string()].into_iter().collect();
        let table = rollup(&rates, Some(&set));
        assert!(!table.has_ac);
        assert!(table.has_dc);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].ac, None);
        assert_relative_eq!(table.rows[0].dc.unwrap(), 0.8);
    }

    #[test]
    fn empty_station_set_selects_nothing() {
        let rates = vec![
            rate("S1", "2024-Q1", ChargerType::Ac, Some(0.2)),
            rate("S2", "2024-Q1", ChargerType::Dc, Some(0.8)),
        ];
        let table = rollup(&rates, Some(&HashSet::new()));
        assert!(table.rows.is_empty());
        assert!(!table.has_ac && !table.has_dc);
    }

    #[test]
    fn rollup_of_nothing_is_empty() {
        let table = rollup(&[], None);
        assert!(table.rows.is_empty());
        assert!(!table.has_ac && !table.has_dc);
    }

    #[test]
    fn growth_between_years_is_broadcast() {
        let rates = vec![
            rate("S1", "2024-Q1", ChargerType::Ac, Some(0.5)),
            rate("S1", "2025-Q1", ChargerType::Ac, Some(0.75)),
            rate("S1", "2025-Q2", ChargerType::Ac, Some(0.75)),
        ];
        let table = rollup(&rates, None);
        assert_eq!(table.rows[0].ac_growth, None);
        assert_relative_eq!(table.rows[1].ac_growth.unwrap(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(table.rows[2].ac_growth.unwrap(), 50.0, epsilon = 1e-9);
        assert_eq!(table.rows[1].dc_growth, None);
    }

    #[test]
    fn growth_uses_mean_of_quarterly_rates() {
        let rates = vec![
            rate("S1", "2023-Q1", ChargerType::Dc, Some(0.2)),
            rate("S1", "2023-Q2", ChargerType::Dc, Some(0.4)),
            rate("S1", "2024-Q1", ChargerType::Dc, Some(0.15)),
        ];
        let table = rollup(&rates, None);
        assert_relative_eq!(table.rows[2].dc_growth.unwrap(), -50.0, epsilon = 1e-9);
    }

    #[test]
    fn growth_after_zero_mean_is_undefined() {
        let rates = vec![
            rate("S1", "2023-Q1", ChargerType::Ac, Some(0.0)),
            rate("S1", "2024-Q1", ChargerType::Ac, Some(0.5)),
        ];
        let table = rollup(&rates, None);
        assert_eq!(table.rows[1].ac_growth, None);
    }

    fn arb_quarter() -> impl Strategy<Value = Quarter> {
        (2015i32..2035, 1u32..=4).prop_map(|(year, number)| Quarter { year, number })
    }

    proptest! {
        #[test]
        fn prop_zero_connectors_never_rate(
            q in arb_quarter(),
            avg in 0.0f64..500.0,
            ac in 1u32..99,
            dc in 1u32..99,
        ) {
            let s = station("S", 0, 0, None);
            let config = UtilizationConfig::new(ac, dc).unwrap();
            for t in [ChargerType::Ac, ChargerType::Dc] {
                let u = usage("S", &q.to_string(), t, Some(avg));
                prop_assert_eq!(compute_rate(&u, &s, &config), None);
            }
        }

        #[test]
        fn prop_full_quarter_is_unadjusted(q in arb_quarter(), avg in 0.0f64..500.0) {
            let s = station("S", 3, 0, None);
            let u = usage("S", &q.to_string(), ChargerType::Ac, Some(avg));
            let r = evaluate(&u, &s, &UtilizationConfig::default());
            prop_assert_eq!(r.quarter_days, r.actual_days);
            prop_assert_eq!(r.adjusted_avg, Some(avg));
        }

        #[test]
        fn prop_installed_at_quarter_start_is_full(q in arb_quarter()) {
            let (quarter_days, actual_days) = operating_days(&q.to_string(), q.start());
            prop_assert_eq!(quarter_days, actual_days);
        }

        #[test]
        fn prop_first_year_has_no_growth(
            values in prop::collection::vec((arb_quarter(), 0.01f64..3.0), 1..20),
        ) {
            let rates: Vec<RateRecord> = values
                .iter()
                .map(|(q, v)| rate("S", &q.to_string(), ChargerType::Ac, Some(*v)))
                .collect();
            let table = rollup(&rates, None);
            let first_year = label_year(&table.rows[0].quarter).unwrap();
            for row in table.rows.iter().filter(|r| label_year(&r.quarter) == Some(first_year)) {
                prop_assert_eq!(row.ac_growth, None);
            }
        }
    }
}
