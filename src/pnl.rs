// Monthly profit-and-loss monitoring per station.

use crate::types::{PnlRecord, PnlSummary, COST_ITEMS};
use crate::util::round_to;
use std::collections::{BTreeMap, BTreeSet};

/// How many stations each side of the cost-efficiency ranking shows.
pub const EFFICIENCY_RANK_SIZE: usize = 5;

/// Length of the utilization and turnover leaderboards.
pub const TOP_RANK_SIZE: usize = 10;

/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PnlFilter {
    pub manager: Option<String>,
    pub month: Option<String>,
    pub operation_type: Option<String>,
}

impl PnlFilter {
    pub fn matches(&self, r: &PnlRecord) -> bool {
        self.manager.as_ref().map_or(true, |m| *m == r.manager)
            && self.month.as_ref().map_or(true, |m| *m == r.month)
            && self.operation_type.as_ref().map_or(true, |t| *t == r.operation_type)
    }

    pub fn apply<'a>(&self, records: &'a [PnlRecord]) -> Vec<&'a PnlRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Distinct, sorted values of one field; used to offer filter choices.
pub fn distinct<F>(records: &[PnlRecord], field: F) -> Vec<String>
where
    F: Fn(&PnlRecord) -> &str,
{
    records
        .iter()
        .map(|r| field(r).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn totals(records: &[&PnlRecord]) -> PnlSummary {
    PnlSummary {
        station_count: records.len(),
        total_revenue: records.iter().map(|r| r.revenue).sum(),
        total_cost: records.iter().map(|r| r.cost).sum(),
        total_profit: records.iter().map(|r| r.profit).sum(),
        loss_making_stations: records.iter().filter(|r| r.profit < 0.0).count(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationSummary {
    pub operation_type: String,
    pub stations: usize,
    pub total_profit: f64,
}

/// Station count and total profit per operation type, ordered by type.
pub fn operation_summary(records: &[&PnlRecord]) -> Vec<OperationSummary> {
    let mut map: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for r in records {
        let e = map.entry(r.operation_type.as_str()).or_insert((0, 0.0));
        e.0 += 1;
        e.1 += r.profit;
    }
    map.into_iter()
        .map(|(operation_type, (stations, total_profit))| OperationSummary {
            operation_type: operation_type.to_string(),
            stations,
            total_profit,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostShare {
    pub item: &'static str,
    pub total: f64,
    /// Percent of all listed cost items, one decimal.
    pub share_pct: f64,
}

/// Totals per cost item, skipping items with no positive total.
pub fn cost_breakdown(records: &[&PnlRecord]) -> Vec<CostShare> {
    let totals: Vec<(&'static str, f64)> = COST_ITEMS
        .iter()
        .enumerate()
        .map(|(i, item)| (*item, records.iter().map(|r| r.cost_items[i]).sum::<f64>()))
        .filter(|(_, total)| *total > 0.0)
        .collect();
    let grand_total: f64 = totals.iter().map(|(_, t)| t).sum();

    totals
        .into_iter()
        .map(|(item, total)| CostShare {
            item,
            total,
            share_pct: round_to(total / grand_total * 100.0, 1),
        })
        .collect()
}

pub fn cost_per_kwh(r: &PnlRecord) -> Option<f64> {
    (r.total_kwh > 0.0).then(|| r.cost / r.total_kwh)
}

/// Profit over revenue, taken from the sheet when it carries one; undefined
/// for stations without revenue.
pub fn profit_margin(r: &PnlRecord) -> Option<f64> {
    r.profit_rate
        .or_else(|| (r.revenue != 0.0).then(|| r.profit / r.revenue))
}

pub fn failure_rate(r: &PnlRecord) -> Option<f64> {
    (r.total_charges > 0).then(|| r.failed_charges as f64 / r.total_charges as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostEfficiency<'a> {
    /// Lowest cost per kWh first.
    pub best: Vec<(&'a PnlRecord, f64)>,
    /// Highest cost per kWh first.
    pub worst: Vec<(&'a PnlRecord, f64)>,
}

/// Rank stations that dispensed energy by cost per kWh.
pub fn cost_efficiency<'a>(records: &[&'a PnlRecord]) -> CostEfficiency<'a> {
    let mut ranked: Vec<(&'a PnlRecord, f64)> = records
        .iter()
        .filter_map(|r| cost_per_kwh(r).filter(|c| *c > 0.0).map(|c| (*r, c)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let best = ranked.iter().take(EFFICIENCY_RANK_SIZE).cloned().collect();
    let worst = ranked.iter().rev().take(EFFICIENCY_RANK_SIZE).cloned().collect();
    CostEfficiency { best, worst }
}

/// The `n` records with the highest `value`, highest first. Records without
/// a value are left out; ties keep sheet order.
pub fn top_by<'a, F>(records: &[&'a PnlRecord], value: F, n: usize) -> Vec<(&'a PnlRecord, f64)>
where
    F: Fn(&PnlRecord) -> Option<f64>,
{
    let mut ranked: Vec<(&'a PnlRecord, f64)> = records
        .iter()
        .filter_map(|r| value(r).map(|v| (*r, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(n);
    ranked
}
