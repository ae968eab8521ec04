// Data models and fetching for the Paris districts / Île-de-France transit map
//
// Data sources:
// - Paris arrondissements (GeoJSON + CSV): https://opendata.paris.fr/explore/dataset/arrondissements/
// - IDFM stops and lines (CSV): https://data.iledefrance-mobilites.fr/explore/dataset/arrets-lignes/

use geojson::{FeatureCollection, GeoJson};
use log::{debug, info, warn};
use reqwest::blocking;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

// ============================================================================
// Data Structures
// ============================================================================

/// Transport mode as published by IDFM, mapped to its French display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Metro,
    RegionalRail,
    LocalTrain,
    Tramway,
    Bus,
    RailShuttle,
    RapidTransit,
    Funicular,
    Unrecognized(String),
}

impl TransportMode {
    pub fn from_source(code: &str) -> Self {
        match code {
            "Metro" => TransportMode::Metro,
            "regionalRail" => TransportMode::RegionalRail,
            "LocalTrain" => TransportMode::LocalTrain,
            "Tramway" => TransportMode::Tramway,
            "Bus" => TransportMode::Bus,
            "RailShuttle" => TransportMode::RailShuttle,
            "RapidTransit" => TransportMode::RapidTransit,
            "Funicular" => TransportMode::Funicular,
            other => TransportMode::Unrecognized(other.to_string()),
        }
    }

    /// Display label, `None` for codes outside the known vocabulary.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            TransportMode::Metro => Some("Métro"),
            TransportMode::RegionalRail => Some("TER"),
            TransportMode::LocalTrain => Some("Transilien"),
            TransportMode::Tramway => Some("Tramway"),
            TransportMode::Bus => Some("Bus"),
            TransportMode::RailShuttle => Some("Navette ferroviaire"),
            TransportMode::RapidTransit => Some("RER"),
            TransportMode::Funicular => Some("Funiculaire"),
            TransportMode::Unrecognized(_) => None,
        }
    }
}

/// One Paris arrondissement.
#[derive(Debug, Clone, PartialEq)]
pub struct District {
    pub numero: u32,
    /// Common name, e.g. "1er Ardt".
    pub nom_1: String,
    /// Official name, e.g. "Louvre".
    pub nom_2: String,
    pub label: String,
}

impl District {
    pub fn new(numero: u32, nom_1: String, nom_2: String) -> Self {
        let label = Self::derive_label(&nom_1, &nom_2);
        District {
            numero,
            nom_1,
            nom_2,
            label,
        }
    }

    pub fn derive_label(nom_1: &str, nom_2: &str) -> String {
        format!("{} ({})", nom_1.replace("Ardt", "Arrondissement"), nom_2)
    }
}

/// One stop/route pair from the IDFM dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StationStop {
    pub mode: TransportMode,
    pub route_long_name: String,
    pub stop_name: String,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub line_label: Option<String>,
    pub hover_info: Option<String>,
}

impl StationStop {
    pub fn new(
        mode: TransportMode,
        route_long_name: String,
        stop_name: String,
        stop_lat: Option<f64>,
        stop_lon: Option<f64>,
    ) -> Self {
        let line_label = mode
            .label()
            .map(|label| format!("{} {}", label, route_long_name));
        let hover_info = line_label
            .as_ref()
            .map(|line| format!("{} - {}", line, stop_name));

        StationStop {
            mode,
            route_long_name,
            stop_name,
            stop_lat,
            stop_lon,
            line_label,
            hover_info,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.stop_lat?, self.stop_lon?))
    }

    /// RER A or Métro 1.
    pub fn is_featured(&self) -> bool {
        matches!(
            (&self.mode, self.route_long_name.as_str()),
            (TransportMode::RapidTransit, "A") | (TransportMode::Metro, "1")
        )
    }
}

#[derive(Debug, Deserialize)]
struct DistrictRecord {
    c_ar: u32,
    l_aroff: String,
    l_ar: String,
}

#[derive(Debug, Deserialize)]
struct StopRecord {
    mode: String,
    route_long_name: String,
    stop_name: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    stop_lat: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    stop_lon: Option<f64>,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum PTMError {
    NetworkError(String),
    ParseError(String),
    SchemaError(String),
    RenderError(String),
    FileError(String),
}

impl std::fmt::Display for PTMError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PTMError::NetworkError(e) => write!(f, "Network error: {}", e),
            PTMError::ParseError(e) => write!(f, "Parse error: {}", e),
            PTMError::SchemaError(e) => write!(f, "Schema error: {}", e),
            PTMError::RenderError(e) => write!(f, "Render error: {}", e),
            PTMError::FileError(e) => write!(f, "File error: {}", e),
        }
    }
}

impl std::error::Error for PTMError {}

pub type Result<T> = std::result::Result<T, PTMError>;

// ============================================================================
// Main Implementation
// ============================================================================

pub struct PTMModels;

impl PTMModels {
    pub const DISTRICTS_GEOJSON_URL: &'static str = "https://opendata.paris.fr/explore/dataset/arrondissements/download/?format=geojson&timezone=Europe/Berlin&lang=fr";
    pub const DISTRICTS_CSV_URL: &'static str = "https://opendata.paris.fr/explore/dataset/arrondissements/download/?format=csv&timezone=Europe/Berlin&lang=fr";
    pub const TRANSIT_CSV_URL: &'static str = "https://data.iledefrance-mobilites.fr/explore/dataset/arrets-lignes/download/?format=csv&timezone=Europe/Berlin&lang=fr";

    const DISTRICT_COLUMNS: [&'static str; 3] = ["c_ar", "l_aroff", "l_ar"];
    const STOP_COLUMNS: [&'static str; 5] =
        ["mode", "route_long_name", "stop_name", "stop_lat", "stop_lon"];

    /// Feature property holding the district number in the GeoJSON document.
    pub const GEOMETRY_KEY: &'static str = "c_ar";

    pub fn http_client(timeout: Option<Duration>) -> Result<blocking::Client> {
        blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PTMError::NetworkError(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn fetch_district_geojson(client: &blocking::Client, url: &str) -> Result<FeatureCollection> {
        info!("Fetching district boundaries (GeoJSON)...");
        let body = Self::fetch_text(client, url, "district boundaries")?;
        let collection = Self::parse_district_geojson(&body)?;
        info!("✓ Loaded {} district features", collection.features.len());
        Ok(collection)
    }

    pub fn fetch_districts(client: &blocking::Client, url: &str) -> Result<Vec<District>> {
        info!("Fetching district attributes (CSV)...");
        let body = Self::fetch_text(client, url, "district attributes")?;
        let districts = Self::parse_districts(&body)?;
        info!("✓ Loaded {} districts", districts.len());
        Ok(districts)
    }

    pub fn fetch_transit_stops(client: &blocking::Client, url: &str) -> Result<Vec<StationStop>> {
        info!("Fetching IDFM stops and lines (CSV)...");
        let body = Self::fetch_text(client, url, "transit stops")?;
        let stops = Self::parse_transit_stops(&body)?;
        info!("✓ Loaded {} stop/route rows", stops.len());
        Ok(stops)
    }

    pub fn fetch_plotlyjs(client: &blocking::Client, url: &str) -> Result<String> {
        info!("Fetching plotly.js bundle from {}...", url);
        let bundle = Self::fetch_text(client, url, "plotly.js bundle")?;
        debug!("plotly.js bundle is {} KB", bundle.len() / 1024);
        Ok(bundle)
    }

    fn fetch_text(client: &blocking::Client, url: &str, what: &str) -> Result<String> {
        let response = client.get(url).send().map_err(|e| {
            PTMError::NetworkError(format!(
                "Failed to fetch {}: {}. Check your internet connection.",
                what, e
            ))
        })?;

        if !response.status().is_success() {
            return Err(PTMError::NetworkError(format!(
                "{} endpoint returned error: {}",
                what,
                response.status()
            )));
        }

        response
            .text()
            .map_err(|e| PTMError::NetworkError(format!("Failed to read {} response: {}", what, e)))
    }

    pub fn parse_district_geojson(body: &str) -> Result<FeatureCollection> {
        let geojson: GeoJson = body
            .parse()
            .map_err(|e| PTMError::ParseError(format!("Invalid GeoJSON response: {}", e)))?;

        FeatureCollection::try_from(geojson).map_err(|e| {
            PTMError::ParseError(format!("District GeoJSON is not a FeatureCollection: {}", e))
        })
    }

    /// Keeps `c_ar`, `l_aroff` and `l_ar`, sorted by district number.
    pub fn parse_districts(body: &str) -> Result<Vec<District>> {
        let mut reader = Self::csv_reader(body);
        Self::check_schema("arrondissements", &mut reader, &Self::DISTRICT_COLUMNS)?;

        let mut districts = reader
            .deserialize::<DistrictRecord>()
            .map(|record| {
                record
                    .map(|r| District::new(r.c_ar, r.l_ar, r.l_aroff))
                    .map_err(|e| PTMError::ParseError(format!("Invalid district row: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        districts.sort_by_key(|d| d.numero);
        Ok(districts)
    }

    pub fn parse_transit_stops(body: &str) -> Result<Vec<StationStop>> {
        let mut reader = Self::csv_reader(body);
        Self::check_schema("arrets-lignes", &mut reader, &Self::STOP_COLUMNS)?;

        let stops = reader
            .deserialize::<StopRecord>()
            .map(|record| {
                record
                    .map(|r| {
                        StationStop::new(
                            TransportMode::from_source(&r.mode),
                            r.route_long_name,
                            r.stop_name,
                            r.stop_lat,
                            r.stop_lon,
                        )
                    })
                    .map_err(|e| PTMError::ParseError(format!("Invalid stop row: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let unrecognized: BTreeSet<&str> = stops
            .iter()
            .filter_map(|stop| match &stop.mode {
                TransportMode::Unrecognized(code) => Some(code.as_str()),
                _ => None,
            })
            .collect();
        if !unrecognized.is_empty() {
            warn!(
                "⚠️  Unrecognized transport mode(s) left without label: {:?}",
                unrecognized
            );
        }

        Ok(stops)
    }

    pub fn featured_stations(stops: Vec<StationStop>) -> Vec<StationStop> {
        stops.into_iter().filter(|stop| stop.is_featured()).collect()
    }

    /// District numbers with no feature keyed by `c_ar` in the geometry.
    pub fn missing_geometries(districts: &[District], geometry: &FeatureCollection) -> Vec<u32> {
        let keys: HashSet<u32> = geometry
            .features
            .iter()
            .filter_map(|feature| feature.property(Self::GEOMETRY_KEY))
            .filter_map(Self::property_as_numero)
            .collect();

        districts
            .iter()
            .map(|d| d.numero)
            .filter(|numero| !keys.contains(numero))
            .collect()
    }

    fn property_as_numero(value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn csv_reader(body: &str) -> csv::Reader<&[u8]> {
        let body = body.strip_prefix('\u{feff}').unwrap_or(body);
        csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::Headers)
            .from_reader(body.as_bytes())
    }

    fn check_schema(dataset: &str, reader: &mut csv::Reader<&[u8]>, expected: &[&str]) -> Result<()> {
        let headers = reader.headers().map_err(|e| {
            PTMError::ParseError(format!("Failed to read {} CSV header: {}", dataset, e))
        })?;

        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|h| h == *column))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PTMError::SchemaError(format!(
                "{} dataset is missing expected column(s): {}",
                dataset,
                missing.join(", ")
            )))
        }
    }
}
