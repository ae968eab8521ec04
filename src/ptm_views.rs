// Figure construction and HTML rendering for the Paris transit map
use crate::ptm_models::{District, PTMError, PTMModels, Result, StationStop};
use geojson::FeatureCollection;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// Figure Model (serialized as plotly.js traces and layout)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Trace {
    #[serde(rename = "choroplethmapbox")]
    Choropleth(ChoroplethTrace),
    #[serde(rename = "scattermapbox")]
    Scatter(ScatterTrace),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    pub name: String,
    pub legendgroup: String,
    pub showlegend: bool,
    pub geojson: Value,
    pub featureidkey: String,
    pub locations: Vec<u32>,
    pub z: Vec<f64>,
    pub colorscale: Vec<(f64, String)>,
    pub showscale: bool,
    pub hovertext: Vec<String>,
    pub hovertemplate: String,
    pub marker: ChoroplethMarker,
    pub subplot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethMarker {
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterTrace {
    pub name: String,
    pub legendgroup: String,
    pub showlegend: bool,
    pub mode: String,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub hovertext: Vec<String>,
    pub hovertemplate: String,
    pub marker: ScatterMarker,
    pub subplot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterMarker {
    pub color: String,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub mapbox: MapboxLayout,
    pub margin: Margin,
    pub showlegend: bool,
    pub legend: Legend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapboxLayout {
    pub center: MapCenter,
    pub zoom: f64,
    pub style: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapCenter {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: LegendTitle,
    pub tracegrouporder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendTitle {
    pub text: String,
}

impl Layout {
    fn map(legend_title: &str) -> Self {
        Layout {
            mapbox: MapboxLayout {
                center: PTMViews::MAP_CENTER,
                zoom: PTMViews::MAP_ZOOM,
                style: PTMViews::MAP_STYLE.to_string(),
            },
            margin: Margin { r: 0, t: 0, l: 0, b: 0 },
            showlegend: true,
            legend: Legend {
                title: LegendTitle {
                    text: legend_title.to_string(),
                },
                tracegrouporder: "normal".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    pub fn add_trace(&mut self, trace: Trace) {
        self.data.push(trace);
    }

    pub fn traces(&self) -> &[Trace] {
        &self.data
    }
}

/// Where the rendered page loads plotly.js from.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotlySource {
    Inline(String),
    Cdn(String),
}

// ============================================================================
// Builders
// ============================================================================

pub struct PTMViews;

impl PTMViews {
    pub const MAP_CENTER: MapCenter = MapCenter {
        lat: 48.8566,
        lon: 2.3522,
    };
    pub const MAP_ZOOM: f64 = 11.0;
    pub const MAP_STYLE: &'static str = "open-street-map";
    pub const PLOTLYJS_CDN_URL: &'static str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

    const DISTRICT_OPACITY: f64 = 0.5;
    const STATION_MARKER_SIZE: f64 = 10.0;
    const HOVER_TEMPLATE: &'static str = "<b>%{hovertext}</b><extra></extra>";
    const FIGURE_DIV_ID: &'static str = "paris-map";

    /// Plotly's default qualitative sequence.
    const PALETTE: [&'static str; 10] = [
        "#636efa", "#EF553B", "#00cc96", "#ab63fa", "#FFA15A",
        "#19d3f3", "#FF6692", "#B6E880", "#FF97FF", "#FECB52",
    ];

    fn palette_color(index: usize) -> String {
        Self::PALETTE[index % Self::PALETTE.len()].to_string()
    }

    /// One trace per distinct district label, coloured categorically.
    pub fn build_choropleth(districts: &[District], geometry: &FeatureCollection) -> Result<Figure> {
        let missing = PTMModels::missing_geometries(districts, geometry);
        if !missing.is_empty() {
            warn!(
                "⚠️  No geometry for district(s) {:?}, they will not be drawn",
                missing
            );
        }

        let geojson = serde_json::to_value(geometry)
            .map_err(|e| PTMError::RenderError(format!("Failed to serialize geometry: {}", e)))?;

        let data = Self::group_by_label(districts, |d| Some(d.label.as_str()))
            .into_iter()
            .enumerate()
            .map(|(i, (label, members))| {
                let color = Self::palette_color(i);
                Trace::Choropleth(ChoroplethTrace {
                    name: label.to_string(),
                    legendgroup: label.to_string(),
                    showlegend: true,
                    geojson: geojson.clone(),
                    featureidkey: format!("properties.{}", PTMModels::GEOMETRY_KEY),
                    locations: members.iter().map(|d| d.numero).collect(),
                    z: vec![1.0; members.len()],
                    colorscale: vec![(0.0, color.clone()), (1.0, color)],
                    showscale: false,
                    hovertext: vec![label.to_string(); members.len()],
                    hovertemplate: Self::HOVER_TEMPLATE.to_string(),
                    marker: ChoroplethMarker {
                        opacity: Self::DISTRICT_OPACITY,
                    },
                    subplot: "mapbox".to_string(),
                })
            })
            .collect();

        Ok(Figure {
            data,
            layout: Layout::map("Information"),
        })
    }

    /// One trace per distinct line label. Stations without a label or
    /// without coordinates contribute no point.
    pub fn build_scatter(stations: &[StationStop]) -> Figure {
        let unplaced = stations.iter().filter(|s| s.coordinates().is_none()).count();
        if unplaced > 0 {
            warn!("⚠️  {} station row(s) have no coordinates", unplaced);
        }

        let data = Self::group_by_label(stations, |s| s.line_label.as_deref())
            .into_iter()
            .enumerate()
            .map(|(i, (label, members))| {
                let mut lat = Vec::with_capacity(members.len());
                let mut lon = Vec::with_capacity(members.len());
                let mut hovertext = Vec::with_capacity(members.len());

                for station in members {
                    if let Some((stop_lat, stop_lon)) = station.coordinates() {
                        lat.push(stop_lat);
                        lon.push(stop_lon);
                        hovertext.push(station.hover_info.clone().unwrap_or_default());
                    }
                }
                debug!("{}: {} point(s)", label, lat.len());

                Trace::Scatter(ScatterTrace {
                    name: label.to_string(),
                    legendgroup: label.to_string(),
                    showlegend: true,
                    mode: "markers".to_string(),
                    lat,
                    lon,
                    hovertext,
                    hovertemplate: Self::HOVER_TEMPLATE.to_string(),
                    marker: ScatterMarker {
                        color: Self::palette_color(i),
                        size: Self::STATION_MARKER_SIZE,
                    },
                    subplot: "mapbox".to_string(),
                })
            })
            .collect();

        Figure {
            data,
            layout: Layout::map("nom"),
        }
    }

    /// Appends every overlay trace onto `base`; the overlay layout is dropped.
    pub fn combine(mut base: Figure, overlay: Figure) -> Figure {
        for trace in overlay.data {
            base.add_trace(trace);
        }
        base
    }

    pub fn render_html(figure: &Figure, plotly: &PlotlySource) -> Result<String> {
        let data = Self::script_safe_json(&figure.data)?;
        let layout = Self::script_safe_json(&figure.layout)?;

        let plotly_script = match plotly {
            PlotlySource::Inline(bundle) => {
                format!("<script type=\"text/javascript\">{}</script>", bundle)
            }
            PlotlySource::Cdn(url) => {
                format!("<script src=\"{}\" charset=\"utf-8\"></script>", url)
            }
        };

        Ok(format!(
            r#"<html>
<head><meta charset="utf-8" /></head>
<body>
    <div>
        <script type="text/javascript">window.PlotlyConfig = {{MathJaxConfig: 'local'}};</script>
        {plotly_script}
        <div id="{div_id}" class="plotly-graph-div" style="height:100%; width:100%;"></div>
        <script type="text/javascript">
            window.PLOTLYENV = window.PLOTLYENV || {{}};
            if (document.getElementById("{div_id}")) {{
                Plotly.newPlot("{div_id}", {data}, {layout}, {{"responsive": true}});
            }}
        </script>
    </div>
</body>
</html>
"#,
            plotly_script = plotly_script,
            div_id = Self::FIGURE_DIV_ID,
            data = data,
            layout = layout,
        ))
    }

    /// Overwrites `path`.
    pub fn write_html(path: &Path, html: &str) -> Result<()> {
        fs::write(path, html).map_err(|e| {
            PTMError::FileError(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    fn script_safe_json<T: Serialize>(value: &T) -> Result<String> {
        let json = serde_json::to_string(value)
            .map_err(|e| PTMError::RenderError(format!("Failed to serialize figure: {}", e)))?;
        Ok(json.replace("</", "<\\/"))
    }

    /// Groups items by label, keeping first-appearance order. Unlabelled
    /// items are skipped.
    fn group_by_label<'a, T, F>(items: &'a [T], label_of: F) -> Vec<(&'a str, Vec<&'a T>)>
    where
        F: Fn(&'a T) -> Option<&'a str>,
    {
        let mut index: HashMap<&'a str, usize> = HashMap::new();
        let mut groups: Vec<(&'a str, Vec<&'a T>)> = Vec::new();

        for item in items {
            let Some(label) = label_of(item) else {
                continue;
            };
            match index.get(label) {
                Some(&i) => groups[i].1.push(item),
                None => {
                    index.insert(label, groups.len());
                    groups.push((label, vec![item]));
                }
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptm_models::TransportMode;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"c_ar": 1},
             "geometry": {"type": "Point", "coordinates": [2.336, 48.862]}},
            {"type": "Feature", "properties": {"c_ar": 2},
             "geometry": {"type": "Point", "coordinates": [2.342, 48.868]}}
        ]
    }"#;

    fn districts() -> Vec<District> {
        vec![
            District::new(1, "1er Ardt".to_string(), "Louvre".to_string()),
            District::new(2, "2ème Ardt".to_string(), "Bourse".to_string()),
        ]
    }

    fn station(mode: &str, route: &str, name: &str, lat: f64, lon: f64) -> StationStop {
        StationStop::new(
            TransportMode::from_source(mode),
            route.to_string(),
            name.to_string(),
            Some(lat),
            Some(lon),
        )
    }

    fn stations() -> Vec<StationStop> {
        vec![
            station("RapidTransit", "A", "Nation", 48.848, 2.396),
            station("Metro", "1", "Bastille", 48.853, 2.369),
            station("RapidTransit", "A", "Auber", 48.872, 2.330),
        ]
    }

    fn geometry() -> FeatureCollection {
        PTMModels::parse_district_geojson(GEOJSON).unwrap()
    }

    #[test]
    fn test_build_choropleth() {
        let figure = PTMViews::build_choropleth(&districts(), &geometry()).unwrap();
        assert_eq!(figure.traces().len(), 2);

        match &figure.traces()[0] {
            Trace::Choropleth(trace) => {
                assert_eq!(trace.name, "1er Arrondissement (Louvre)");
                assert_eq!(trace.locations, vec![1]);
                assert_eq!(trace.featureidkey, "properties.c_ar");
                assert_eq!(trace.hovertext, vec!["1er Arrondissement (Louvre)".to_string()]);
                assert_eq!(trace.marker.opacity, 0.5);
                assert!(!trace.showscale);
                assert_eq!(trace.colorscale[0].1, "#636efa");
            }
            other => panic!("expected choropleth trace, got {:?}", other),
        }

        assert_eq!(figure.layout.mapbox.center, MapCenter { lat: 48.8566, lon: 2.3522 });
        assert_eq!(figure.layout.mapbox.zoom, 11.0);
        assert_eq!(figure.layout.mapbox.style, "open-street-map");
        assert_eq!(figure.layout.margin, Margin { r: 0, t: 0, l: 0, b: 0 });
        assert!(figure.layout.showlegend);
    }

    #[test]
    fn test_build_scatter_groups_by_line() {
        let figure = PTMViews::build_scatter(&stations());
        assert_eq!(figure.traces().len(), 2);

        match &figure.traces()[0] {
            Trace::Scatter(trace) => {
                assert_eq!(trace.name, "RER A");
                assert_eq!(trace.lat, vec![48.848, 48.872]);
                assert_eq!(trace.lon, vec![2.396, 2.330]);
                assert_eq!(trace.hovertext, vec!["RER A - Nation", "RER A - Auber"]);
                assert_eq!(trace.marker.size, 10.0);
                assert_eq!(trace.mode, "markers");
            }
            other => panic!("expected scatter trace, got {:?}", other),
        }
        match &figure.traces()[1] {
            Trace::Scatter(trace) => {
                assert_eq!(trace.name, "Métro 1");
                assert_eq!(trace.marker.color, "#EF553B");
            }
            other => panic!("expected scatter trace, got {:?}", other),
        }
    }

    #[test]
    fn test_build_scatter_skips_unplaced_and_unlabelled() {
        let rows = vec![
            station("Ferry", "1", "Quai", 48.85, 2.35),
            StationStop::new(TransportMode::Metro, "1".to_string(), "Nulle part".to_string(), None, None),
            station("Metro", "1", "Bastille", 48.853, 2.369),
        ];

        let figure = PTMViews::build_scatter(&rows);
        assert_eq!(figure.traces().len(), 1);
        match &figure.traces()[0] {
            Trace::Scatter(trace) => {
                assert_eq!(trace.lat, vec![48.853]);
                assert_eq!(trace.hovertext, vec!["Métro 1 - Bastille"]);
            }
            other => panic!("expected scatter trace, got {:?}", other),
        }
    }

    #[test]
    fn test_combine_keeps_every_trace() {
        let base = PTMViews::build_choropleth(&districts(), &geometry()).unwrap();
        let overlay = PTMViews::build_scatter(&stations());
        let (base_count, overlay_count) = (base.traces().len(), overlay.traces().len());
        let expected_tail = overlay.data.clone();

        let combined = PTMViews::combine(base.clone(), overlay);
        assert_eq!(combined.traces().len(), base_count + overlay_count);
        assert_eq!(&combined.data[..base_count], base.traces());
        assert_eq!(&combined.data[base_count..], expected_tail.as_slice());
        assert_eq!(combined.layout, base.layout);
    }

    #[test]
    fn test_combine_with_empty_scatter() {
        let base = PTMViews::build_choropleth(&districts(), &geometry()).unwrap();
        let overlay = PTMViews::build_scatter(&[]);
        assert!(overlay.traces().is_empty());

        let combined = PTMViews::combine(base.clone(), overlay);
        assert_eq!(combined, base);
    }

    #[test]
    fn test_render_html_is_deterministic() {
        let figure = PTMViews::combine(
            PTMViews::build_choropleth(&districts(), &geometry()).unwrap(),
            PTMViews::build_scatter(&stations()),
        );
        let source = PlotlySource::Cdn(PTMViews::PLOTLYJS_CDN_URL.to_string());

        let first = PTMViews::render_html(&figure, &source).unwrap();
        let second = PTMViews::render_html(&figure, &source).unwrap();
        assert_eq!(first, second);

        assert!(first.contains(r#"<script src="https://cdn.plot.ly/plotly-2.35.2.min.js""#));
        assert!(first.contains(r#""type":"choroplethmapbox""#));
        assert!(first.contains(r#""type":"scattermapbox""#));
        assert!(first.contains(r#""style":"open-street-map""#));
        assert!(first.contains("Plotly.newPlot(\"paris-map\""));
    }

    #[test]
    fn test_render_html_inline_and_escaped() {
        let rows = vec![station("Metro", "1", "</script><b>", 48.85, 2.35)];
        let figure = PTMViews::build_scatter(&rows);
        let source = PlotlySource::Inline("var Plotly = {};".to_string());

        let html = PTMViews::render_html(&figure, &source).unwrap();
        assert!(html.contains("<script type=\"text/javascript\">var Plotly = {};</script>"));
        assert!(html.contains(r"<\/script><b>"));
        assert!(!html.contains("Bastille"));
        assert_eq!(html.matches("</script>").count(), 3);
    }
}
