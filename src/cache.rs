// Memoization of proximity and utilization results.
//
// Tables are identified by a generation number that moves forward every
// time they are (re)loaded; every tunable is part of the key.

use crate::geo::{nearby_indices, NearbyStation};
use crate::types::{Station, UsageRecord};
use crate::utilization::{compute_rates, rollup, QuarterlyTable, RateRecord, UtilizationConfig};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::debug;

/// Per-map entry limit. A full map is cleared before the next insert.
pub const MAX_ENTRIES: usize = 64;

fn insert_bounded<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, value: V) {
    if map.len() >= MAX_ENTRIES {
        debug!(entries = map.len(), "result cache full, clearing");
        map.clear();
    }
    map.insert(key, value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ProximityKey {
    lat_bits: u64,
    lon_bits: u64,
    radius_bits: u64,
    stations_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RatesKey {
    config: UtilizationConfig,
    stations_generation: u64,
    usage_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RollupKey {
    rates: RatesKey,
    /// Sorted; `None` means every station.
    station_set: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    stations_generation: u64,
    usage_generation: u64,
    /// Station indices and distances, so entries do not borrow the table.
    proximity: HashMap<ProximityKey, Vec<(usize, f64)>>,
    rates: HashMap<RatesKey, Vec<RateRecord>>,
    rollups: HashMap<RollupKey, QuarterlyTable>,
    pub hits: usize,
    pub misses: usize,
}

impl ResultCache {
    /// Call after the station table is replaced.
    pub fn stations_reloaded(&mut self) {
        self.stations_generation += 1;
        self.proximity.clear();
        self.rates.clear();
        self.rollups.clear();
    }

    /// Call after the usage log is replaced.
    pub fn usage_reloaded(&mut self) {
        self.usage_generation += 1;
        self.rates.clear();
        self.rollups.clear();
    }

    pub fn nearby<'a>(
        &mut self,
        stations: &'a [Station],
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Vec<NearbyStation<'a>> {
        let key = ProximityKey {
            lat_bits: lat.to_bits(),
            lon_bits: lon.to_bits(),
            radius_bits: radius_km.to_bits(),
            stations_generation: self.stations_generation,
        };
        if let Some(hit) = self.proximity.get(&key) {
            self.hits += 1;
            debug!(lat, lon, radius_km, "proximity cache hit");
            return hit
                .iter()
                .filter_map(|&(i, distance_km)| {
                    stations.get(i).map(|station| NearbyStation { station, distance_km })
                })
                .collect();
        }

        self.misses += 1;
        let indexed = nearby_indices(lat, lon, stations, radius_km);
        let result = indexed
            .iter()
            .map(|&(i, distance_km)| NearbyStation {
                station: &stations[i],
                distance_km,
            })
            .collect();
        insert_bounded(&mut self.proximity, key, indexed);
        result
    }

    /// Per-record rates and the quarterly rollup for `station_set`.
    pub fn utilization(
        &mut self,
        usage: &[UsageRecord],
        stations: &[Station],
        config: &UtilizationConfig,
        station_set: Option<&HashSet<String>>,
    ) -> (Vec<RateRecord>, QuarterlyTable) {
        let rates_key = RatesKey {
            config: *config,
            stations_generation: self.stations_generation,
            usage_generation: self.usage_generation,
        };
        let rollup_key = RollupKey {
            rates: rates_key,
            station_set: station_set.map(|set| {
                let mut ids: Vec<String> = set.iter().cloned().collect();
                ids.sort();
                ids
            }),
        };

        let rates = match self.rates.get(&rates_key) {
            Some(rates) => {
                self.hits += 1;
                rates.clone()
            }
            None => {
                self.misses += 1;
                let rates = compute_rates(usage, stations, config);
                insert_bounded(&mut self.rates, rates_key, rates.clone());
                rates
            }
        };

        let table = match self.rollups.get(&rollup_key) {
            Some(table) => {
                self.hits += 1;
                table.clone()
            }
            None => {
                self.misses += 1;
                let table = rollup(&rates, station_set);
                insert_bounded(&mut self.rollups, rollup_key, table.clone());
                table
            }
        };
        (rates, table)
    }
}
