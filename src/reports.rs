// Turns computed tables into display/export rows.
//
// Numbers are rounded and formatted here; undefined values render as blank
// cells so they never show up as 0 or inf.
use crate::geo::NearbyStation;
use crate::pnl::{failure_rate, profit_margin, CostEfficiency, CostShare, OperationSummary};
use crate::types::{
    CostBreakdownRow, CostEfficiencyRow, NearbyRow, OperationSummaryRow, PnlRecord, RankingRow,
    RateRow, StationPnlRow, TextTable,
};
use crate::util::{format_number, format_opt, round_to};
use crate::utilization::{QuarterlyTable, RateRecord};

pub fn nearby_rows(nearby: &[NearbyStation<'_>]) -> Vec<NearbyRow> {
    nearby
        .iter()
        .map(|n| NearbyRow {
            station_id: n.station.station_id.clone(),
            name: n.station.name.clone(),
            latitude: n.station.latitude,
            longitude: n.station.longitude,
            ac_count: n.station.ac_count,
            dc_count: n.station.dc_count,
            distance_km: format_number(n.distance_km, 2),
        })
        .collect()
}

pub fn rate_rows(rates: &[RateRecord]) -> Vec<RateRow> {
    rates
        .iter()
        .map(|r| RateRow {
            station_id: r.station_id.clone(),
            quarter: r.quarter.clone(),
            charger_type: r.charger_type.to_string(),
            quarter_days: r.quarter_days,
            actual_days: r.actual_days,
            adjusted_avg: format_opt(r.adjusted_avg, 2),
            rate: format_opt(r.rate.map(|v| round_to(v, 2)), 2),
        })
        .collect()
}

/// Quarterly utilization with growth columns. An AC or DC column (and its
/// growth column) appears only when that charger type occurs in the data.
pub fn quarterly_table(table: &QuarterlyTable) -> TextTable {
    let mut headers = vec!["Quarter".to_string()];
    if table.has_ac {
        headers.push("AC".to_string());
    }
    if table.has_dc {
        headers.push("DC".to_string());
    }
    if table.has_ac {
        headers.push("AC_YoY%".to_string());
    }
    if table.has_dc {
        headers.push("DC_YoY%".to_string());
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.quarter.clone()];
            if table.has_ac {
                cells.push(format_opt(row.ac.map(|v| round_to(v, 2)), 2));
            }
            if table.has_dc {
                cells.push(format_opt(row.dc.map(|v| round_to(v, 2)), 2));
            }
            if table.has_ac {
                cells.push(format_opt(row.ac_growth, 2));
            }
            if table.has_dc {
                cells.push(format_opt(row.dc_growth, 2));
            }
            cells
        })
        .collect();

    TextTable { headers, rows }
}

pub fn operation_rows(summary: &[OperationSummary]) -> Vec<OperationSummaryRow> {
    summary
        .iter()
        .map(|s| OperationSummaryRow {
            operation_type: s.operation_type.clone(),
            stations: s.stations,
            total_profit: format_number(s.total_profit, 0),
        })
        .collect()
}

pub fn cost_breakdown_rows(items: &[CostShare]) -> Vec<CostBreakdownRow> {
    items
        .iter()
        .map(|c| CostBreakdownRow {
            item: c.item.to_string(),
            total: format_number(c.total, 0),
            share_pct: format!("{:.1}", c.share_pct),
        })
        .collect()
}

/// Per-station operating and financial figures; ratios are shown in percent.
pub fn station_pnl_rows(records: &[&PnlRecord]) -> Vec<StationPnlRow> {
    records
        .iter()
        .map(|r| StationPnlRow {
            station_id: r.station_id.clone(),
            name: r.name.clone(),
            operation_type: r.operation_type.clone(),
            spec: r.spec.clone().unwrap_or_default(),
            poi: r.poi.clone().unwrap_or_default(),
            start_date: r.start_date.map(|d| d.to_string()).unwrap_or_default(),
            connectors: r.connectors,
            total_kwh: format_number(r.total_kwh, 1),
            successful_charges: r.successful_charges,
            failed_charges: r.failed_charges,
            revenue: format_number(r.revenue, 0),
            cost: format_number(r.cost, 0),
            profit: format_number(r.profit, 0),
            profit_margin_pct: format_opt(profit_margin(r).map(|m| m * 100.0), 2),
            failure_rate_pct: format_opt(failure_rate(r).map(|f| f * 100.0), 2),
            utilization_pct: format_opt(r.utilization.map(|u| u * 100.0), 2),
            turnover_pct: format_opt(r.turnover.map(|t| t * 100.0), 2),
        })
        .collect()
}

/// Leaderboard rows for one metric; `ranked` comes from `pnl::top_by`.
pub fn ranking_rows(metric: &str, ranked: &[(&PnlRecord, f64)]) -> Vec<RankingRow> {
    ranked
        .iter()
        .enumerate()
        .map(|(i, (record, value))| RankingRow {
            metric: metric.to_string(),
            rank: i + 1,
            station_id: record.station_id.clone(),
            name: record.name.clone(),
            value_pct: format_number(value * 100.0, 2),
        })
        .collect()
}

pub fn cost_efficiency_rows(ranking: &CostEfficiency<'_>) -> Vec<CostEfficiencyRow> {
    let best = ranking.best.iter().map(|r| ("Best", r));
    let worst = ranking.worst.iter().map(|r| ("Worst", r));
    best.chain(worst)
        .map(|(group, (record, cost))| CostEfficiencyRow {
            group: group.to_string(),
            station_id: record.station_id.clone(),
            name: record.name.clone(),
            cost_per_kwh: format_number(*cost, 2),
        })
        .collect()
}
