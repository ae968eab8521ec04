// Command-line configuration for the Paris transit map
use crate::ptm_models::PTMModels;
use crate::ptm_views::PTMViews;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "paris-transit-map",
    about = "Render Paris arrondissements with RER A and Métro 1 stations to an interactive HTML map"
)]
pub struct Args {
    /// Output HTML file, overwritten if it exists
    #[arg(long, default_value = "paris_map.html")]
    pub output: PathBuf,

    /// HTTP request timeout in seconds (no timeout when omitted)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Embed plotly.js in the page or load it from the CDN
    #[arg(long, value_enum, default_value_t = PlotlyJsMode::Inline)]
    pub plotlyjs: PlotlyJsMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PlotlyJsMode {
    Inline,
    Cdn,
}

/// Endpoints the pipeline reads from.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSources {
    pub districts_geojson: String,
    pub districts_csv: String,
    pub transit_csv: String,
    pub plotlyjs: String,
}

impl Default for DataSources {
    fn default() -> Self {
        DataSources {
            districts_geojson: PTMModels::DISTRICTS_GEOJSON_URL.to_string(),
            districts_csv: PTMModels::DISTRICTS_CSV_URL.to_string(),
            transit_csv: PTMModels::TRANSIT_CSV_URL.to_string(),
            plotlyjs: PTMViews::PLOTLYJS_CDN_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PTMConfig {
    pub output: PathBuf,
    pub timeout: Option<Duration>,
    pub plotlyjs: PlotlyJsMode,
    pub sources: DataSources,
}

impl Default for PTMConfig {
    fn default() -> Self {
        PTMConfig {
            output: PathBuf::from("paris_map.html"),
            timeout: None,
            plotlyjs: PlotlyJsMode::Inline,
            sources: DataSources::default(),
        }
    }
}

impl From<Args> for PTMConfig {
    fn from(args: Args) -> Self {
        PTMConfig {
            output: args.output,
            timeout: args.timeout_secs.map(Duration::from_secs),
            plotlyjs: args.plotlyjs,
            sources: DataSources::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bare_run() {
        let args = Args::try_parse_from(["paris-transit-map"]).unwrap();
        assert_eq!(PTMConfig::from(args), PTMConfig::default());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "paris-transit-map",
            "--output",
            "out/map.html",
            "--timeout-secs",
            "20",
            "--plotlyjs",
            "cdn",
        ])
        .unwrap();
        let config = PTMConfig::from(args);

        assert_eq!(config.output, PathBuf::from("out/map.html"));
        assert_eq!(config.timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.plotlyjs, PlotlyJsMode::Cdn);
    }

    #[test]
    fn test_rejects_unknown_plotlyjs_mode() {
        assert!(Args::try_parse_from(["paris-transit-map", "--plotlyjs", "bundle"]).is_err());
    }
}
