use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChargerType {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
}

impl ChargerType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AC" => Some(ChargerType::Ac),
            "DC" => Some(ChargerType::Dc),
            _ => None,
        }
    }
}

impl fmt::Display for ChargerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerType::Ac => f.write_str("AC"),
            ChargerType::Dc => f.write_str("DC"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawStationRow {
    #[serde(rename = "station_id", alias = "StationID", alias = "Station")]
    pub station_id: Option<String>,
    #[serde(rename = "name", alias = "Name")]
    pub name: Option<String>,
    #[serde(rename = "latitude", alias = "Latitude", alias = "lat")]
    pub latitude: Option<String>,
    #[serde(rename = "longitude", alias = "Longitude", alias = "lon", alias = "lng")]
    pub longitude: Option<String>,
    #[serde(rename = "ac_count", alias = "AC")]
    pub ac_count: Option<String>,
    #[serde(rename = "dc_count", alias = "DC")]
    pub dc_count: Option<String>,
    #[serde(rename = "installation_date", alias = "InstallationDate")]
    pub installation_date: Option<String>,
    #[serde(rename = "city", alias = "City")]
    pub city: Option<String>,
    #[serde(rename = "area_type", alias = "AreaType")]
    pub area_type: Option<String>,
    #[serde(rename = "project_type", alias = "ProjectType")]
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub station_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub ac_count: u32,
    pub dc_count: u32,
    pub installation_date: Option<NaiveDate>,
    /// A date was given but could not be parsed.
    pub installation_date_unparseable: bool,
    pub city: Option<String>,
    pub area_type: Option<String>,
    pub project_type: Option<String>,
}

impl Station {
    pub fn connector_count(&self, charger_type: ChargerType) -> u32 {
        match charger_type {
            ChargerType::Ac => self.ac_count,
            ChargerType::Dc => self.dc_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawUsageRow {
    #[serde(rename = "Station", alias = "station_id")]
    pub station: Option<String>,
    #[serde(rename = "Quarter", alias = "quarter")]
    pub quarter: Option<String>,
    #[serde(rename = "ChargerType", alias = "charger_type")]
    pub charger_type: Option<String>,
    #[serde(rename = "Avg_Degree_Per_Day", alias = "avg_energy_per_day")]
    pub avg_degree_per_day: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub station_id: String,
    /// Kept as text: a malformed label still gets a rate via the 91-day fallback.
    pub quarter: String,
    pub charger_type: ChargerType,
    /// kWh per day; `None` makes the record's rate undefined.
    pub avg_energy_per_day: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RawPnlRow {
    #[serde(rename = "Month", alias = "月份")]
    pub month: Option<String>,
    #[serde(rename = "Manager", alias = "負責人")]
    pub manager: Option<String>,
    #[serde(rename = "StationID", alias = "站ID")]
    pub station_id: Option<String>,
    #[serde(rename = "OperationType", alias = "經營類型")]
    pub operation_type: Option<String>,
    #[serde(rename = "Spec", alias = "站點規格")]
    pub spec: Option<String>,
    #[serde(rename = "POI")]
    pub poi: Option<String>,
    #[serde(rename = "StartDate", alias = "啟用日期")]
    pub start_date: Option<String>,
    #[serde(rename = "Name", alias = "名稱")]
    pub name: Option<String>,
    #[serde(rename = "Connectors", alias = "充電槍數")]
    pub connectors: Option<String>,
    #[serde(rename = "StationPowerKw", alias = "全站功率")]
    pub station_power_kw: Option<String>,
    #[serde(rename = "TotalKwh", alias = "總充電度數")]
    pub total_kwh: Option<String>,
    #[serde(rename = "AcKwh", alias = "AC度數")]
    pub ac_kwh: Option<String>,
    #[serde(rename = "DcKwh", alias = "DC度數")]
    pub dc_kwh: Option<String>,
    #[serde(rename = "TotalCharges", alias = "總充電次數")]
    pub total_charges: Option<String>,
    #[serde(rename = "SuccessfulCharges", alias = "成功充電次數")]
    pub successful_charges: Option<String>,
    #[serde(rename = "FailedCharges", alias = "失敗充電次數")]
    pub failed_charges: Option<String>,
    #[serde(rename = "Revenue", alias = "認列收入")]
    pub revenue: Option<String>,
    #[serde(rename = "Cost", alias = "認列成本")]
    pub cost: Option<String>,
    #[serde(rename = "Profit", alias = "損益")]
    pub profit: Option<String>,
    #[serde(rename = "SharedAllocation", alias = "共同分攤")]
    pub shared_allocation: Option<String>,
    #[serde(rename = "ElectricityShare", alias = "電費分潤成本")]
    pub electricity_share: Option<String>,
    #[serde(rename = "EquipmentAmortization", alias = "設備攤提")]
    pub equipment_amortization: Option<String>,
    #[serde(rename = "Rent", alias = "租金")]
    pub rent: Option<String>,
    #[serde(rename = "Monitoring", alias = "監視系統費")]
    pub monitoring: Option<String>,
    #[serde(rename = "Insurance", alias = "保險費")]
    pub insurance: Option<String>,
    #[serde(rename = "Dispatch", alias = "派工費用")]
    pub dispatch: Option<String>,
    #[serde(rename = "Materials", alias = "領料/設備")]
    pub materials: Option<String>,
    #[serde(rename = "OtherCost", alias = "其他成本")]
    pub other_cost: Option<String>,
    #[serde(rename = "TenderCost", alias = "標案成本")]
    pub tender_cost: Option<String>,
    #[serde(rename = "Utilization", alias = "稼動率")]
    pub utilization: Option<String>,
    #[serde(rename = "Turnover", alias = "周轉率")]
    pub turnover: Option<String>,
    #[serde(rename = "ProfitRate", alias = "損益率")]
    pub profit_rate: Option<String>,
}

/// Cost line items of a monthly P&L sheet, in display order.
pub const COST_ITEMS: [&str; 10] = [
    "SharedAllocation",
    "ElectricityShare",
    "EquipmentAmortization",
    "Rent",
    "Monitoring",
    "Insurance",
    "Dispatch",
    "Materials",
    "OtherCost",
    "TenderCost",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PnlRecord {
    pub month: String,
    pub manager: String,
    pub station_id: String,
    pub name: String,
    pub operation_type: String,
    pub spec: Option<String>,
    pub poi: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub connectors: u32,
    pub station_power_kw: Option<f64>,
    pub total_kwh: f64,
    pub ac_kwh: f64,
    pub dc_kwh: f64,
    pub total_charges: u32,
    pub successful_charges: u32,
    pub failed_charges: u32,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    /// Indexed like [`COST_ITEMS`].
    pub cost_items: [f64; 10],
    /// Ratios as exported in the sheet (1.0 = 100%); blank or `inf` is `None`.
    pub utilization: Option<f64>,
    pub turnover: Option<f64>,
    pub profit_rate: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct NearbyRow {
    #[serde(rename = "StationID")]
    #[tabled(rename = "StationID")]
    pub station_id: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "Latitude")]
    #[tabled(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    #[tabled(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "AC")]
    #[tabled(rename = "AC")]
    pub ac_count: u32,
    #[serde(rename = "DC")]
    #[tabled(rename = "DC")]
    pub dc_count: u32,
    #[serde(rename = "DistanceKm")]
    #[tabled(rename = "DistanceKm")]
    pub distance_km: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RateRow {
    #[serde(rename = "Station")]
    #[tabled(rename = "Station")]
    pub station_id: String,
    #[serde(rename = "Quarter")]
    #[tabled(rename = "Quarter")]
    pub quarter: String,
    #[serde(rename = "ChargerType")]
    #[tabled(rename = "ChargerType")]
    pub charger_type: String,
    #[serde(rename = "QuarterDays")]
    #[tabled(rename = "QuarterDays")]
    pub quarter_days: i64,
    #[serde(rename = "ActualDays")]
    #[tabled(rename = "ActualDays")]
    pub actual_days: i64,
    #[serde(rename = "AdjustedAvg")]
    #[tabled(rename = "AdjustedAvg")]
    pub adjusted_avg: String,
    #[serde(rename = "UtilizationRate")]
    #[tabled(rename = "UtilizationRate")]
    pub rate: String,
}

/// A table whose columns are only known at run time (e.g. the quarterly
/// utilization table, which has an AC/DC column only when that type occurs).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct OperationSummaryRow {
    #[serde(rename = "OperationType")]
    #[tabled(rename = "OperationType")]
    pub operation_type: String,
    #[serde(rename = "Stations")]
    #[tabled(rename = "Stations")]
    pub stations: usize,
    #[serde(rename = "TotalProfit")]
    #[tabled(rename = "TotalProfit")]
    pub total_profit: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CostBreakdownRow {
    #[serde(rename = "CostItem")]
    #[tabled(rename = "CostItem")]
    pub item: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "SharePct")]
    #[tabled(rename = "SharePct")]
    pub share_pct: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CostEfficiencyRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "StationID")]
    #[tabled(rename = "StationID")]
    pub station_id: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "CostPerKwh")]
    #[tabled(rename = "CostPerKwh")]
    pub cost_per_kwh: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StationPnlRow {
    #[serde(rename = "StationID")]
    #[tabled(rename = "StationID")]
    pub station_id: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "OperationType")]
    #[tabled(rename = "OperationType")]
    pub operation_type: String,
    #[serde(rename = "Spec")]
    #[tabled(rename = "Spec")]
    pub spec: String,
    #[serde(rename = "POI")]
    #[tabled(rename = "POI")]
    pub poi: String,
    #[serde(rename = "StartDate")]
    #[tabled(rename = "StartDate")]
    pub start_date: String,
    #[serde(rename = "Connectors")]
    #[tabled(rename = "Connectors")]
    pub connectors: u32,
    #[serde(rename = "TotalKwh")]
    #[tabled(rename = "TotalKwh")]
    pub total_kwh: String,
    #[serde(rename = "SuccessfulCharges")]
    #[tabled(rename = "SuccessfulCharges")]
    pub successful_charges: u32,
    #[serde(rename = "FailedCharges")]
    #[tabled(rename = "FailedCharges")]
    pub failed_charges: u32,
    #[serde(rename = "Revenue")]
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[serde(rename = "Cost")]
    #[tabled(rename = "Cost")]
    pub cost: String,
    #[serde(rename = "Profit")]
    #[tabled(rename = "Profit")]
    pub profit: String,
    #[serde(rename = "ProfitMarginPct")]
    #[tabled(rename = "ProfitMarginPct")]
    pub profit_margin_pct: String,
    #[serde(rename = "FailureRatePct")]
    #[tabled(rename = "FailureRatePct")]
    pub failure_rate_pct: String,
    #[serde(rename = "UtilizationPct")]
    #[tabled(rename = "UtilizationPct")]
    pub utilization_pct: String,
    #[serde(rename = "TurnoverPct")]
    #[tabled(rename = "TurnoverPct")]
    pub turnover_pct: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RankingRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "StationID")]
    #[tabled(rename = "StationID")]
    pub station_id: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "ValuePct")]
    #[tabled(rename = "ValuePct")]
    pub value_pct: String,
}

#[derive(Debug, Serialize)]
pub struct PnlSummary {
    pub station_count: usize,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    pub loss_making_stations: usize,
}
