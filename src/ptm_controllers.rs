// Controllers for the Paris transit map pipeline
use crate::ptm_config::{PTMConfig, PlotlyJsMode};
use crate::ptm_models::{District, PTMModels, Result, StationStop};
use crate::ptm_views::{Figure, PTMViews, PlotlySource};
use geojson::FeatureCollection;
use log::{info, warn};
use reqwest::blocking;
use std::path::{Path, PathBuf};

pub struct PTMControllers;

impl PTMControllers {
    /// Fetch, filter, build and write the map. Returns the output path.
    pub fn run(config: &PTMConfig) -> Result<PathBuf> {
        let client = PTMModels::http_client(config.timeout)?;

        let stops = PTMModels::fetch_transit_stops(&client, &config.sources.transit_csv)?;
        let stations = PTMModels::featured_stations(stops);
        if stations.is_empty() {
            warn!("⚠️  No RER A or Métro 1 station found, the map will only show districts");
        } else {
            info!("✓ Kept {} RER A / Métro 1 station rows", stations.len());
        }

        let geometry = PTMModels::fetch_district_geojson(&client, &config.sources.districts_geojson)?;
        let districts = PTMModels::fetch_districts(&client, &config.sources.districts_csv)?;
        let figure = Self::build_map(&stations, &districts, &geometry)?;

        let plotly = Self::resolve_plotly_source(&client, config.plotlyjs, &config.sources.plotlyjs);
        Self::emit(&figure, &plotly, &config.output)?;

        Ok(config.output.clone())
    }

    /// Choropleth of `districts` with the stations overlaid.
    pub fn build_map(
        stations: &[StationStop],
        districts: &[District],
        geometry: &FeatureCollection,
    ) -> Result<Figure> {
        let choropleth = PTMViews::build_choropleth(districts, geometry)?;
        let scatter = PTMViews::build_scatter(stations);
        info!(
            "Combining {} district trace(s) with {} station trace(s)",
            choropleth.traces().len(),
            scatter.traces().len()
        );
        Ok(PTMViews::combine(choropleth, scatter))
    }

    pub fn emit(figure: &Figure, plotly: &PlotlySource, output: &Path) -> Result<()> {
        let html = PTMViews::render_html(figure, plotly)?;
        PTMViews::write_html(output, &html)?;
        info!("✓ Map written to {} ({} KB)", output.display(), html.len() / 1024);
        Ok(())
    }

    /// Inline bundle when it can be downloaded, otherwise a reference to `url`.
    fn resolve_plotly_source(client: &blocking::Client, mode: PlotlyJsMode, url: &str) -> PlotlySource {
        match mode {
            PlotlyJsMode::Inline => match PTMModels::fetch_plotlyjs(client, url) {
                Ok(bundle) => PlotlySource::Inline(bundle),
                Err(e) => {
                    warn!("⚠️  {}; the map will load plotly.js from {}", e, url);
                    PlotlySource::Cdn(url.to_string())
                }
            },
            PlotlyJsMode::Cdn => PlotlySource::Cdn(url.to_string()),
        }
    }
}
