use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Nested layout and trace attributes that accept Plotly's `a_b` shorthand
/// for `{a: {b: ..}}`.
const CONTAINERS: &[&str] = &[
    "xaxis",
    "yaxis",
    "zaxis",
    "scene",
    "legend",
    "font",
    "margin",
    "marker",
    "line",
    "title",
    "hoverlabel",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Scatter,
    Bar,
    Surface,
}

/// Values along one axis of a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series {
    Numbers(Vec<f64>),
    Labels(Vec<String>),
}

impl Series {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numbers(values) => values.len(),
            Self::Labels(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self::Numbers(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: TraceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Json>,
}

impl Trace {
    #[must_use]
    pub fn new(kind: TraceKind) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            z: None,
            mode: None,
            name: None,
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn xy(kind: TraceKind, x: impl Into<Series>, y: impl Into<Series>) -> Self {
        let mut trace = Self::new(kind);
        trace.x = Some(x.into());
        trace.y = Some(y.into());
        trace
    }

    #[must_use]
    pub fn mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set an attribute, expanding `marker_color` style keys.
    pub fn set(&mut self, key: &str, value: Json) {
        set_nested(&mut self.attributes, key, value);
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: Json) -> Self {
        self.set(key, value);
        self
    }

    /// Number of plotted points: the longest axis, or the grid size for
    /// surfaces.
    #[must_use]
    pub fn point_count(&self) -> usize {
        let axes = [&self.x, &self.y]
            .into_iter()
            .flatten()
            .map(Series::len)
            .max()
            .unwrap_or(0);
        let grid = self
            .z
            .as_ref()
            .map_or(0, |rows| rows.iter().map(Vec::len).sum());
        axes.max(grid)
    }
}

/// A Plotly figure: traces plus a free-form layout object.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Map<String, Json>,
}

impl Figure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.data.push(trace);
        self
    }

    pub fn add_trace(&mut self, trace: Trace) {
        self.data.push(trace);
    }

    /// Merge layout attributes; `xaxis_title` style keys are expanded and
    /// plain string titles become `{text: ..}`.
    pub fn update_layout(&mut self, key: &str, value: Json) {
        set_nested(&mut self.layout, key, value);
    }

    #[must_use]
    pub fn with_layout(mut self, key: &str, value: Json) -> Self {
        self.update_layout(key, value);
        self
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.layout.get("title")?.get("text")?.as_str()
    }

    /// Plotted points across every trace.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.data.iter().map(Trace::point_count).sum()
    }
}

fn set_nested(target: &mut Map<String, Json>, key: &str, value: Json) {
    if let Some((head, rest)) = key.split_once('_') {
        if CONTAINERS.contains(&head) && !rest.is_empty() {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if !slot.is_object() {
                let previous = slot.take();
                *slot = Json::Object(Map::new());
                if head == "title" {
                    if let Some(map) = slot.as_object_mut() {
                        map.insert("text".to_string(), previous);
                    }
                }
            }
            if let Some(map) = slot.as_object_mut() {
                set_nested(map, rest, value);
            }
            return;
        }
    }

    let value = match (key, value) {
        ("title", Json::String(text)) => {
            let mut title = Map::new();
            title.insert("text".to_string(), Json::String(text));
            Json::Object(title)
        }
        (_, Json::Object(map)) => {
            let mut nested = match target.remove(key) {
                Some(Json::Object(existing)) => existing,
                _ => Map::new(),
            };
            for (k, v) in map {
                set_nested(&mut nested, &k, v);
            }
            Json::Object(nested)
        }
        (_, value) => value,
    };
    target.insert(key.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layout_shorthand_expands() {
        let mut figure = Figure::new();
        figure.update_layout("title", json!("Poisson"));
        figure.update_layout("xaxis_title", json!("k"));
        figure.update_layout("yaxis", json!({"title": "P(X=k)", "range": [0, 1]}));

        assert_eq!(figure.title(), Some("Poisson"));
        assert_eq!(
            serde_json::to_value(&figure.layout).unwrap(),
            json!({
                "title": {"text": "Poisson"},
                "xaxis": {"title": {"text": "k"}},
                "yaxis": {"title": {"text": "P(X=k)"}, "range": [0, 1]},
            })
        );
    }

    #[test]
    fn counts_points_across_traces() {
        let figure = Figure::new()
            .with_trace(Trace::xy(TraceKind::Scatter, vec![0.0, 1.0], vec![0.0, 1.0]))
            .with_trace(Trace::xy(TraceKind::Bar, vec![0.0, 1.0, 2.0], vec![1.0, 1.0, 1.0]));
        assert_eq!(figure.point_count(), 5);
    }

    #[test]
    fn trace_serializes_like_plotly() {
        let trace = Trace::xy(TraceKind::Bar, vec![1.0], vec![2.0])
            .name("PMF")
            .with("marker_color", json!("teal"));
        assert_eq!(
            serde_json::to_value(&trace).unwrap(),
            json!({"type": "bar", "x": [1.0], "y": [2.0], "name": "PMF", "marker": {"color": "teal"}})
        );
    }
}
