//! Storm event catalog loaded from NOAA-style storm location tables
//!
//! The table is CSV with a header row. Column names are matched
//! case-insensitively; only `EVENT_ID`, `LOCATION` and `YEARMONTH` are
//! required. Extra columns are ignored.
//!
//! NOAA location tables carry one row per `LOCATION_INDEX`, so an event id
//! may repeat. Event ids stay unique in the catalog: later rows for an id are
//! folded into its first row and only contribute their coordinates, which
//! count towards the first row's location.

use crate::error::{PipelineError, PipelineResult};
use crate::heatmap::HeatPoint;
use crate::source::{fetch_bytes, DataSource, FetchOptions};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{info, warn};

/// Column holding the event identifier
pub const COLUMN_EVENT_ID: &str = "EVENT_ID";
/// Column holding the location name
pub const COLUMN_LOCATION: &str = "LOCATION";
/// Column holding the `YYYYMM` period token
pub const COLUMN_YEAR_MONTH: &str = "YEARMONTH";
/// Optional latitude column
pub const COLUMN_LATITUDE: &str = "LATITUDE";
/// Optional longitude column
pub const COLUMN_LONGITUDE: &str = "LONGITUDE";

/// Selector label shown for an event: `"{event_id} - {location} ({year_month})"`
pub fn event_label(event_id: &str, location: &str, year_month: &str) -> String {
    format!("{event_id} - {location} ({year_month})")
}

/// A single storm record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StormEvent {
    event_id: String,
    location: String,
    year_month: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    label: String,
    /// Points of later rows folded into this event
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extra_points: Vec<HeatPoint>,
}

impl StormEvent {
    /// Create an event; the label is derived from the identifying fields
    pub fn new(
        event_id: impl Into<String>,
        location: impl Into<String>,
        year_month: impl Into<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Self {
        let event_id = event_id.into();
        let location = location.into();
        let year_month = year_month.into();
        let label = event_label(&event_id, &location, &year_month);
        Self {
            event_id,
            location,
            year_month,
            latitude: latitude.filter(|v| v.is_finite()),
            longitude: longitude.filter(|v| v.is_finite()),
            label,
            extra_points: Vec::new(),
        }
    }

    /// Unique event identifier
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Location name, exactly as recorded
    pub fn location(&self) -> &str {
        &self.location
    }

    /// `YYYYMM` period token
    pub fn year_month(&self) -> &str {
        &self.year_month
    }

    /// Latitude in degrees, if recorded
    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    /// Longitude in degrees, if recorded
    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// Display label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Heat point for this event when both coordinates are present
    pub fn heat_point(&self) -> Option<HeatPoint> {
        HeatPoint::new(self.latitude?, self.longitude?)
    }

    /// Every recorded point of the event: its own, then those of folded rows
    pub fn heat_points(&self) -> impl Iterator<Item = HeatPoint> + '_ {
        self.heat_point()
            .into_iter()
            .chain(self.extra_points.iter().copied())
    }
}

/// Ordered storm events with location indexes
#[derive(Debug, Clone, Serialize)]
pub struct StormCatalog {
    events: Vec<StormEvent>,
    /// Event indices per exact location, in catalog order
    #[serde(skip)]
    by_location: FxHashMap<String, Vec<usize>>,
    /// Distinct locations, case-insensitively sorted
    #[serde(skip)]
    sorted_locations: Vec<String>,
}

fn case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

impl StormCatalog {
    /// Build a catalog from rows in their original order
    ///
    /// Rows repeating an `event_id` are folded into the first row with that id.
    pub fn from_events(origin: &str, rows: Vec<StormEvent>) -> Self {
        let mut events: Vec<StormEvent> = Vec::with_capacity(rows.len());
        let mut by_id: FxHashMap<String, usize> = FxHashMap::default();
        let mut by_location: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut folded = 0usize;

        for row in rows {
            match by_id.entry(row.event_id.clone()) {
                Entry::Occupied(slot) => {
                    let first = &mut events[*slot.get()];
                    first.extra_points.extend(row.heat_point());
                    folded += 1;
                }
                Entry::Vacant(slot) => {
                    let i = events.len();
                    slot.insert(i);
                    by_location.entry(row.location.clone()).or_default().push(i);
                    events.push(row);
                }
            }
        }

        if folded > 0 {
            warn!(
                source = origin,
                folded, "Repeated storm event rows folded into their first occurrence"
            );
        }

        let mut sorted_locations: Vec<String> = by_location.keys().cloned().collect();
        sorted_locations.sort_by(|a, b| case_insensitive(a, b));

        Self {
            events,
            by_location,
            sorted_locations,
        }
    }

    /// Number of distinct events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the catalog holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in catalog order
    pub fn iter(&self) -> std::slice::Iter<'_, StormEvent> {
        self.events.iter()
    }

    /// Distinct locations, sorted ignoring case
    pub fn locations(&self) -> &[String] {
        &self.sorted_locations
    }

    /// Events whose location equals `location` exactly, in catalog order
    ///
    /// An unknown location yields an empty list.
    pub fn events_for(&self, location: &str) -> Vec<&StormEvent> {
        self.by_location
            .get(location)
            .map(|indices| indices.iter().map(|&i| &self.events[i]).collect())
            .unwrap_or_default()
    }

    /// The event of `location` carrying `label`
    ///
    /// # Errors
    /// Returns `NotFound` if no event of that location has the label, which
    /// typically means the selection is stale.
    pub fn event_by_label(&self, location: &str, label: &str) -> PipelineResult<&StormEvent> {
        self.events_for(location)
            .into_iter()
            .find(|e| e.label == label)
            .ok_or_else(|| PipelineError::NotFound {
                what: "label",
                location: location.to_string(),
                key: label.to_string(),
            })
    }

    /// The event of `location` with `event_id`
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not belong to that location.
    pub fn event_by_id(&self, location: &str, event_id: &str) -> PipelineResult<&StormEvent> {
        self.events_for(location)
            .into_iter()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| PipelineError::NotFound {
                what: "event id",
                location: location.to_string(),
                key: event_id.to_string(),
            })
    }

    /// Heat points of every event with both coordinates
    pub fn spatial_points(&self) -> impl Iterator<Item = HeatPoint> + '_ {
        self.events.iter().flat_map(StormEvent::heat_points)
    }

    /// Heat points of the events recorded at `location`
    pub fn spatial_points_for<'a>(
        &'a self,
        location: &'a str,
    ) -> impl Iterator<Item = HeatPoint> + 'a {
        self.events
            .iter()
            .filter(move |e| e.location == location)
            .flat_map(StormEvent::heat_points)
    }
}

impl<'a> IntoIterator for &'a StormCatalog {
    type Item = &'a StormEvent;
    type IntoIter = std::slice::Iter<'a, StormEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Positions of the columns the loader reads
struct ColumnIndex {
    event_id: usize,
    location: usize,
    year_month: usize,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

impl ColumnIndex {
    fn resolve(origin: &str, headers: &csv::StringRecord) -> PipelineResult<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                PipelineError::schema(origin, format!("missing required column {name}"))
            })
        };

        Ok(Self {
            event_id: require(COLUMN_EVENT_ID)?,
            location: require(COLUMN_LOCATION)?,
            year_month: require(COLUMN_YEAR_MONTH)?,
            latitude: find(COLUMN_LATITUDE),
            longitude: find(COLUMN_LONGITUDE),
        })
    }
}

/// Parse an optional coordinate cell; blanks, `NaN` and junk read as absent
fn coordinate(cell: Option<&str>) -> Result<Option<f64>, String> {
    let Some(text) = cell.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(text.to_string()),
    }
}

/// Parse a storm table held in memory
///
/// # Errors
/// Returns `DataUnavailable` for malformed CSV and `SchemaError` for a missing
/// required column or a blank required cell.
pub fn parse_catalog(origin: &str, bytes: &[u8]) -> PipelineResult<StormCatalog> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::unavailable(origin, format!("invalid CSV header: {e}")))?
        .clone();
    let columns = ColumnIndex::resolve(origin, &headers)?;

    let mut events = Vec::new();
    let mut discarded_coordinates = 0usize;

    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| PipelineError::unavailable(origin, format!("invalid CSV: {e}")))?;
        // Header is line 1
        let line = i + 2;

        let required = |index: usize, name: &str| {
            // Kept verbatim so locations and labels match the source text
            record
                .get(index)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    PipelineError::schema(origin, format!("line {line}: {name} is blank"))
                })
        };
        let event_id = required(columns.event_id, COLUMN_EVENT_ID)?;
        let location = required(columns.location, COLUMN_LOCATION)?;
        let year_month = required(columns.year_month, COLUMN_YEAR_MONTH)?;

        let mut optional = |index: Option<usize>| {
            coordinate(index.and_then(|i| record.get(i))).unwrap_or_else(|_| {
                discarded_coordinates += 1;
                None
            })
        };
        let latitude = optional(columns.latitude);
        let longitude = optional(columns.longitude);

        events.push(StormEvent::new(
            event_id, location, year_month, latitude, longitude,
        ));
    }

    if discarded_coordinates > 0 {
        warn!(
            source = origin,
            discarded_coordinates, "Unparseable storm coordinates treated as missing"
        );
    }

    Ok(StormCatalog::from_events(origin, events))
}

/// Fetch and parse a storm table
///
/// # Errors
/// Returns `DataUnavailable` if the source cannot be read and `SchemaError`
/// if required columns or values are missing.
pub fn load_catalog(source: &DataSource, options: &FetchOptions) -> PipelineResult<StormCatalog> {
    let origin = source.origin();
    let bytes = fetch_bytes(source, options)?;
    let catalog = parse_catalog(&origin, &bytes)?;
    info!(
        source = %origin,
        events = catalog.len(),
        locations = catalog.locations().len(),
        "Loaded storm catalog"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const STORMS: &str = "\
YEARMONTH,EPISODE_ID,EVENT_ID,LOCATION_INDEX,LOCATION,LATITUDE,LONGITUDE
202401,100,1,1,Norfolk,36.9,-76.2
202402,101,2,1,Norfolk,,
202403,102,3,1,chesapeake,36.7,-76.3
202404,103,4,1,Virginia Beach,36.85,-75.98
202405,104,5,1,Chesapeake,NaN,-76.25
";

    fn catalog() -> StormCatalog {
        parse_catalog("test", STORMS.as_bytes()).unwrap()
    }

    #[test]
    fn test_label_format() {
        assert_eq!(event_label("1", "Norfolk", "202401"), "1 - Norfolk (202401)");
        let event = StormEvent::new("7", "Hampton", "202312", None, None);
        assert_eq!(event.label(), "7 - Hampton (202312)");
    }

    #[test]
    fn test_locations_sorted_ignoring_case() {
        let catalog = catalog();
        assert_eq!(
            catalog.locations(),
            &["Chesapeake", "chesapeake", "Norfolk", "Virginia Beach"]
        );
    }

    #[test]
    fn test_events_for_exact_match_in_order() {
        let catalog = catalog();
        let norfolk = catalog.events_for("Norfolk");
        assert_eq!(norfolk.len(), 2);
        assert_eq!(norfolk[0].event_id(), "1");
        assert_eq!(norfolk[1].event_id(), "2");

        // Case matters for filtering
        let lower = catalog.events_for("chesapeake");
        assert_eq!(lower.len(), 1);
        assert_eq!(lower[0].event_id(), "3");

        assert!(catalog.events_for("Portsmouth").is_empty());
    }

    #[test]
    fn test_event_lookup_by_label_and_id() {
        let catalog = catalog();
        let event = catalog
            .event_by_label("Norfolk", "2 - Norfolk (202402)")
            .unwrap();
        assert_eq!(event.event_id(), "2");
        assert_eq!(event.latitude(), None);

        let event = catalog.event_by_id("Virginia Beach", "4").unwrap();
        assert_eq!(event.year_month(), "202404");
    }

    #[test]
    fn test_stale_label_not_found() {
        let catalog = catalog();
        let err = catalog
            .event_by_label("Chesapeake", "1 - Norfolk (202401)")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = catalog.event_by_id("Norfolk", "4").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_spatial_points_skip_missing_coordinates() {
        let catalog = catalog();
        let points: Vec<HeatPoint> = catalog.spatial_points().collect();
        assert_eq!(points.len(), 3);
        assert!(points.contains(&HeatPoint::new(36.9, -76.2).unwrap()));

        let norfolk: Vec<HeatPoint> = catalog.spatial_points_for("Norfolk").collect();
        assert_eq!(norfolk.len(), 1);
    }

    #[test]
    fn test_missing_required_column() {
        let table = "EVENT_ID,LOCATION,LATITUDE,LONGITUDE\n1,Norfolk,36.9,-76.2\n";
        let err = parse_catalog("test", table.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert!(err.to_string().contains(COLUMN_YEAR_MONTH));
    }

    #[test]
    fn test_coordinate_columns_optional() {
        let table = "event_id,location,yearmonth\n1,Norfolk,202401\n";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.spatial_points().count(), 0);
    }

    #[test]
    fn test_blank_required_cell() {
        let table = "EVENT_ID,LOCATION,YEARMONTH\n1,,202401\n";
        let err = parse_catalog("test", table.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_location_index_rows_fold_into_one_event() {
        let table = "\
EVENT_ID,LOCATION_INDEX,LOCATION,YEARMONTH,LATITUDE,LONGITUDE
10,1,Norfolk,202401,36.9,-76.2
10,2,Norfolk,202401,36.95,-76.25
10,3,Norfolk,202401,,
";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.events_for("Norfolk").len(), 1);

        let event = catalog
            .event_by_label("Norfolk", "10 - Norfolk (202401)")
            .unwrap();
        assert_eq!(event.latitude(), Some(36.9));
        assert_eq!(event.heat_points().count(), 2);

        assert_eq!(catalog.spatial_points().count(), 2);
        assert_eq!(catalog.spatial_points_for("Norfolk").count(), 2);
    }

    #[test]
    fn test_event_id_stays_unique_across_locations() {
        let table = "\
EVENT_ID,LOCATION,YEARMONTH,LATITUDE,LONGITUDE
1,Norfolk,202401,36.9,-76.2
1,Portsmouth,202401,36.83,-76.3
";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.locations(), &["Norfolk"]);
        assert!(catalog.event_by_id("Portsmouth", "1").is_err());
        assert_eq!(catalog.spatial_points_for("Norfolk").count(), 2);
    }

    #[test]
    fn test_required_cells_kept_verbatim() {
        let table = "EVENT_ID,LOCATION,YEARMONTH\n7, Norfolk ,202401\n";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert_eq!(catalog.locations(), &[" Norfolk "]);
        assert!(catalog
            .event_by_label(" Norfolk ", "7 -  Norfolk  (202401)")
            .is_ok());
        assert!(catalog.events_for("Norfolk").is_empty());
    }

    #[test]
    fn test_whitespace_only_required_cell_is_blank() {
        let table = "EVENT_ID,LOCATION,YEARMONTH\n1,   ,202401\n";
        let err = parse_catalog("test", table.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
    }

    #[test]
    fn test_unparseable_coordinate_is_missing() {
        let table = "EVENT_ID,LOCATION,YEARMONTH,LATITUDE,LONGITUDE\n1,Norfolk,202401,north,-76.2\n";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert_eq!(catalog.events_for("Norfolk")[0].latitude(), None);
        assert_eq!(catalog.spatial_points().count(), 0);
    }

    #[test]
    fn test_empty_table_is_empty_catalog() {
        let table = "EVENT_ID,LOCATION,YEARMONTH\n";
        let catalog = parse_catalog("test", table.as_bytes()).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.locations().is_empty());
    }
}
