use crate::error::Result;
use crate::geo::is_valid_coordinate;
use crate::quarter::Quarter;
use crate::types::{
    ChargerType, PnlRecord, RawPnlRow, RawStationRow, RawUsageRow, Station, UsageRecord,
};
use crate::util::{clean_text, parse_count_safe, parse_date_safe, parse_f64_safe};
use csv::{ReaderBuilder, Trim};
use encoding_rs::{BIG5, GBK, UTF_8};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub source: String,
    /// The file did not exist; the table is empty.
    pub missing: bool,
    /// Name of the encoding the file was decoded with.
    pub encoding: &'static str,
    /// No supported encoding fit; undecodable bytes were replaced.
    pub lossy_decoding: bool,
    pub total_rows: usize,
    pub kept_rows: usize,
    pub dropped_rows: usize,
    pub defaulted_fields: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
    pub lossy: bool,
}

/// Decode raw file bytes. A UTF-8 BOM is stripped and strict UTF-8 tried
/// first, then Big5 and GBK without replacement. Only when all of them fail
/// is the input decoded lossily as UTF-8.
pub fn decode_text(bytes: Vec<u8>) -> Decoded {
    let bytes = if bytes.starts_with(UTF8_BOM) {
        bytes[UTF8_BOM.len()..].to_vec()
    } else {
        bytes
    };
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => {
            return Decoded {
                text,
                encoding: UTF_8.name(),
                lossy: false,
            }
        }
        Err(e) => e.into_bytes(),
    };

    // Sheets exported from Excel in Taiwan are usually Big5 (CP950).
    for encoding in [BIG5, GBK] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&bytes) {
            return Decoded {
                text: text.into_owned(),
                encoding: encoding.name(),
                lossy: false,
            };
        }
    }
    Decoded {
        text: String::from_utf8_lossy(&bytes).into_owned(),
        encoding: UTF_8.name(),
        lossy: true,
    }
}

/// Read and decode a CSV source. A missing file yields `Ok(None)` so callers
/// can return an empty table.
fn read_source(path: &Path, report: &mut LoadReport) -> Result<Option<String>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "input file not found, using empty table");
            report.missing = true;
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let decoded = decode_text(bytes);
    if decoded.lossy {
        warn!(path = %path.display(), "input matches no supported encoding, undecodable bytes replaced");
    } else if decoded.encoding != UTF_8.name() {
        info!(path = %path.display(), encoding = decoded.encoding, "decoded legacy encoding");
    }
    report.encoding = decoded.encoding;
    report.lossy_decoding = decoded.lossy;
    Ok(Some(decoded.text))
}

/// Deserialize every row, counting rows that do not even fit the raw shape.
fn raw_rows<T: DeserializeOwned>(text: &str, report: &mut LoadReport) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    // Header problems are fatal; row problems are not.
    rdr.headers()?;
    let mut rows = Vec::new();
    for result in rdr.deserialize::<T>() {
        report.total_rows += 1;
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!(error = %e, "skipping malformed CSV row");
                report.dropped_rows += 1;
            }
        }
    }
    Ok(rows)
}

fn finish(report: &mut LoadReport, kept: usize) {
    report.kept_rows = kept;
    info!(
        source = %report.source,
        total = report.total_rows,
        kept = report.kept_rows,
        dropped = report.dropped_rows,
        defaulted = report.defaulted_fields,
        "loaded"
    );
}

pub fn load_stations(path: &Path) -> Result<(Vec<Station>, LoadReport)> {
    let mut report = LoadReport {
        source: path.display().to_string(),
        ..Default::default()
    };
    let Some(text) = read_source(path, &mut report)? else {
        return Ok((Vec::new(), report));
    };
    let stations = clean_stations(raw_rows::<RawStationRow>(&text, &mut report)?, &mut report);
    finish(&mut report, stations.len());
    Ok((stations, report))
}

fn clean_stations(rows: Vec<RawStationRow>, report: &mut LoadReport) -> Vec<Station> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stations = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(station_id) = clean_text(row.station_id) else {
            report.dropped_rows += 1;
            continue;
        };
        let coords = (
            parse_f64_safe(row.latitude.as_deref()),
            parse_f64_safe(row.longitude.as_deref()),
        );
        let (latitude, longitude) = match coords {
            (Some(lat), Some(lon)) if is_valid_coordinate(lat, lon) => (lat, lon),
            _ => {
                debug!(station_id = %station_id, "dropping station with invalid coordinates");
                report.dropped_rows += 1;
                continue;
            }
        };
        if !seen.insert(station_id.clone()) {
            debug!(station_id = %station_id, "dropping duplicate station id");
            report.dropped_rows += 1;
            continue;
        }

        let mut count = |raw: Option<&str>| match parse_count_safe(raw) {
            Some(n) => n,
            None => {
                // Negative or fractional counts land here too.
                report.defaulted_fields += 1;
                0
            }
        };
        let ac_count = count(row.ac_count.as_deref());
        let dc_count = count(row.dc_count.as_deref());

        let installation_date = parse_date_safe(row.installation_date.as_deref());
        let installation_date_unparseable =
            installation_date.is_none() && clean_text(row.installation_date.clone()).is_some();
        if installation_date_unparseable {
            debug!(station_id = %station_id, "unparseable installation date");
            report.defaulted_fields += 1;
        }

        stations.push(Station {
            name: clean_text(row.name).unwrap_or_else(|| station_id.clone()),
            station_id,
            latitude,
            longitude,
            ac_count,
            dc_count,
            installation_date,
            installation_date_unparseable,
            city: clean_text(row.city),
            area_type: clean_text(row.area_type),
            project_type: clean_text(row.project_type),
        });
    }
    stations
}

pub fn load_usage(path: &Path) -> Result<(Vec<UsageRecord>, LoadReport)> {
    let mut report = LoadReport {
        source: path.display().to_string(),
        ..Default::default()
    };
    let Some(text) = read_source(path, &mut report)? else {
        return Ok((Vec::new(), report));
    };
    let records = clean_usage(raw_rows::<RawUsageRow>(&text, &mut report)?, &mut report);
    finish(&mut report, records.len());
    Ok((records, report))
}

fn clean_usage(rows: Vec<RawUsageRow>, report: &mut LoadReport) -> Vec<UsageRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let station_id = clean_text(row.station);
        let quarter = clean_text(row.quarter);
        let charger_type = row.charger_type.as_deref().and_then(ChargerType::parse);
        let (Some(station_id), Some(quarter), Some(charger_type)) = (station_id, quarter, charger_type)
        else {
            report.dropped_rows += 1;
            continue;
        };

        let avg_energy_per_day = match parse_f64_safe(row.avg_degree_per_day.as_deref()) {
            Some(v) if v >= 0.0 => Some(v),
            _ => {
                report.defaulted_fields += 1;
                None
            }
        };

        // `2024-q1` and `2024-Q1` must land in the same rollup group.
        let quarter = Quarter::parse(&quarter).map_or(quarter, |q| q.to_string());

        records.push(UsageRecord {
            station_id,
            quarter,
            charger_type,
            avg_energy_per_day,
        });
    }
    records
}

pub fn load_pnl(path: &Path) -> Result<(Vec<PnlRecord>, LoadReport)> {
    let mut report = LoadReport {
        source: path.display().to_string(),
        ..Default::default()
    };
    let Some(text) = read_source(path, &mut report)? else {
        return Ok((Vec::new(), report));
    };
    let records = clean_pnl(raw_rows::<RawPnlRow>(&text, &mut report)?, &mut report);
    finish(&mut report, records.len());
    Ok((records, report))
}

fn clean_pnl(rows: Vec<RawPnlRow>, report: &mut LoadReport) -> Vec<PnlRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let required = (
            clean_text(row.month),
            clean_text(row.manager),
            clean_text(row.station_id),
            clean_text(row.name),
            parse_f64_safe(row.revenue.as_deref()),
            parse_f64_safe(row.cost.as_deref()),
            parse_f64_safe(row.profit.as_deref()),
        );
        let (Some(month), Some(manager), Some(station_id), Some(name), Some(revenue), Some(cost), Some(profit)) =
            required
        else {
            report.dropped_rows += 1;
            continue;
        };

        let mut amount = |raw: &Option<String>| match raw.as_deref().map(str::trim) {
            None | Some("") => 0.0,
            Some(s) => parse_f64_safe(Some(s)).unwrap_or_else(|| {
                report.defaulted_fields += 1;
                0.0
            }),
        };
        let total_kwh = amount(&row.total_kwh);
        let ac_kwh = amount(&row.ac_kwh);
        let dc_kwh = amount(&row.dc_kwh);
        let cost_items = [
            amount(&row.shared_allocation),
            amount(&row.electricity_share),
            amount(&row.equipment_amortization),
            amount(&row.rent),
            amount(&row.monitoring),
            amount(&row.insurance),
            amount(&row.dispatch),
            amount(&row.materials),
            amount(&row.other_cost),
            amount(&row.tender_cost),
        ];
        // Optional figures. The sheet writes `inf` for a ratio over zero revenue.
        let mut optional = |raw: &Option<String>| match raw.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => {
                let value = parse_f64_safe(Some(s));
                let infinite = s
                    .trim_start_matches(|c: char| c == '-' || c == '+')
                    .eq_ignore_ascii_case("inf");
                if value.is_none() && !infinite {
                    report.defaulted_fields += 1;
                }
                value
            }
        };
        let station_power_kw = optional(&row.station_power_kw);
        let utilization = optional(&row.utilization);
        let turnover = optional(&row.turnover);
        let profit_rate = optional(&row.profit_rate);

        let mut count = |raw: &Option<String>| match raw.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(s) => parse_count_safe(Some(s)).unwrap_or_else(|| {
                report.defaulted_fields += 1;
                0
            }),
        };

        records.push(PnlRecord {
            month,
            manager,
            station_id,
            name,
            operation_type: clean_text(row.operation_type).unwrap_or_else(|| "Unspecified".to_string()),
            spec: clean_text(row.spec),
            poi: clean_text(row.poi),
            start_date: parse_date_safe(row.start_date.as_deref()),
            connectors: count(&row.connectors),
            station_power_kw,
            total_kwh,
            ac_kwh,
            dc_kwh,
            total_charges: count(&row.total_charges),
            successful_charges: count(&row.successful_charges),
            failed_charges: count(&row.failed_charges),
            revenue,
            cost,
            profit,
            cost_items,
            utilization,
            turnover,
            profit_rate,
        });
    }
    records
}
