use crate::{
    program::{Figure, Series, Trace, TraceKind},
    stats, Artifact, BetaParams, BinomialParams, ChartType, ConceptPlot, Library, MatrixParams,
    NormalParams, RateParams, RenderError, UniformParams, ValidatedSpec,
};
use serde_json::json;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.31.1.min.js";
const THREE_CDN: &str = "https://unpkg.com/three@0.158.0/build/three.min.js";
const VIZ_DIV: &str = r#"<div id="viz"></div>"#;
const NEW_PLOT: &str = "Plotly.newPlot(";
/// Largest k plotted for a discrete distribution.
const MAX_SUPPORT: f64 = 2000.0;

const PAGE_STYLE: &str = "body{font-family:'Noto Sans SC',sans-serif;background:linear-gradient(135deg,#4A65F6,#6C8BFA);margin:0;color:#1f2937;}\
#wrap{max-width:980px;margin:24px auto;background:#fff;border-radius:16px;box-shadow:0 12px 24px rgba(0,0,0,.08);padding:16px;}\
h1{font-size:20px;margin:0 0 12px;}#viz{height:540px;border:1px dashed #e5e7eb;border-radius:12px;background:#fff}";

/// Render a validated spec into a standalone HTML page.
pub fn render(spec: &ValidatedSpec) -> Result<Artifact, RenderError> {
    let markup = match spec.library {
        Library::Plotly => plotly_page(&spec.title, &figure_for(spec)),
        Library::Threejs => threejs_page(&spec.title),
    };
    check_anchors(&markup, spec.library)?;
    Ok(Artifact::new(markup, spec.concept()))
}

/// Every page needs a `<title>` and the `viz` mount point; Plotly pages
/// must also draw into it.
pub(crate) fn check_anchors(markup: &str, library: Library) -> Result<(), RenderError> {
    if !markup.contains("<title>") {
        return Err(RenderError { anchor: "<title>" });
    }
    if !markup.contains(VIZ_DIV) {
        return Err(RenderError { anchor: VIZ_DIV });
    }
    if library == Library::Plotly && !markup.contains(NEW_PLOT) {
        return Err(RenderError { anchor: NEW_PLOT });
    }
    Ok(())
}

fn page(title: &str, scripts: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html><html lang=\"zh-CN\"><head><meta charset=\"UTF-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{title}</title>\
<link href=\"https://fonts.googleapis.com/css2?family=Noto+Sans+SC:wght@400;600;700&display=swap\" rel=\"stylesheet\">\
<style>{PAGE_STYLE}</style></head>\
<body><div id=\"wrap\"><h1>{title}</h1>{VIZ_DIV}</div>{scripts}</body></html>"
    )
}

/// A page that draws `figure` with Plotly.
pub(crate) fn plotly_page(title: &str, figure: &Figure) -> String {
    let figure = match serde_json::to_string(figure) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(error = %err, "figure did not serialize, drawing an empty plot");
            r#"{"data":[],"layout":{}}"#.to_string()
        }
    };
    // keep `</script>` inside string data from closing the tag
    let figure = figure.replace("</", "<\\/");
    page(
        title,
        &format!(
            "<script src=\"{PLOTLY_CDN}\"></script>\
<script>const figure={figure};\
{NEW_PLOT}'viz',figure.data,figure.layout,{{responsive:true,displayModeBar:true}});</script>"
        ),
    )
}

fn threejs_page(title: &str) -> String {
    page(
        title,
        &format!(
            "<script src=\"{THREE_CDN}\"></script>\
<script>const mount=document.getElementById('viz');\
const scene=new THREE.Scene();\
const camera=new THREE.PerspectiveCamera(75,mount.clientWidth/mount.clientHeight,0.1,1000);\
const renderer=new THREE.WebGLRenderer({{antialias:true}});\
renderer.setSize(mount.clientWidth,mount.clientHeight);mount.appendChild(renderer.domElement);\
const cube=new THREE.Mesh(new THREE.BoxGeometry(),new THREE.MeshNormalMaterial());scene.add(cube);\
camera.position.z=3;\
function animate(){{requestAnimationFrame(animate);cube.rotation.x+=0.01;cube.rotation.y+=0.01;renderer.render(scene,camera);}}\
animate();</script>"
        ),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn figure_for(spec: &ValidatedSpec) -> Figure {
    if spec.chart_type == ChartType::Surface3d {
        return surface();
    }

    let (figure, x_title, y_title) = match &spec.plot {
        ConceptPlot::Normal(NormalParams { mu, sigma }) => (
            continuous(
                spec.chart_type,
                (mu - 4.0 * sigma, mu + 4.0 * sigma),
                |x| stats::normal_pdf(x, *mu, *sigma),
                |x| stats::normal_cdf(x, *mu, *sigma),
            ),
            "x",
            "density",
        ),
        ConceptPlot::Beta(BetaParams { alpha, beta }) => {
            let pdf = |x| stats::beta_pdf(x, *alpha, *beta);
            (
                continuous(spec.chart_type, (0.0, 1.0), pdf, |x| {
                    integrate(pdf, 0.0, x)
                }),
                "x",
                "density",
            )
        }
        ConceptPlot::Exponential(RateParams { lambda }) => (
            continuous(
                spec.chart_type,
                (0.0, 5.0 / lambda),
                |x| stats::exponential_pdf(x, *lambda),
                |x| 1.0 - (-lambda * x).exp(),
            ),
            "x",
            "density",
        ),
        ConceptPlot::Uniform(UniformParams { a, b }) => {
            let pad = (b - a) * 0.25;
            (
                continuous(
                    spec.chart_type,
                    (a - pad, b + pad),
                    |x| stats::uniform_pdf(x, *a, *b),
                    |x| ((x - a) / (b - a)).clamp(0.0, 1.0),
                ),
                "x",
                "density",
            )
        }
        ConceptPlot::Poisson(RateParams { lambda }) => {
            let upper = (lambda + 4.0 * lambda.sqrt()).ceil().max(10.0);
            (
                discrete(spec.chart_type, upper, |k| stats::poisson_pmf(k, *lambda)),
                "k",
                "P(X=k)",
            )
        }
        ConceptPlot::Binomial(BinomialParams { n, p }) => {
            let n = f64::from(*n);
            (
                discrete(spec.chart_type, n, |k| stats::binomial_pmf(k, n, *p)),
                "k",
                "P(X=k)",
            )
        }
        ConceptPlot::MatrixTransform(MatrixParams { matrix }) => (matrix_grid(matrix), "x", "y"),
        ConceptPlot::Generic { .. } => (generic_line(spec.chart_type), "x", "y"),
    };

    figure
        .with_layout("title", json!(spec.title))
        .with_layout("xaxis_title", json!(x_title))
        .with_layout("yaxis_title", json!(y_title))
        .with_layout("template", json!("plotly_white"))
}

fn continuous(
    chart_type: ChartType,
    (start, stop): (f64, f64),
    pdf: impl Fn(f64) -> f64,
    cdf: impl Fn(f64) -> f64,
) -> Figure {
    let trace = match chart_type {
        ChartType::Cdf => {
            let x = stats::linspace(start, stop, 161);
            let y = x.iter().map(|v| cdf(*v)).collect::<Vec<_>>();
            Trace::xy(TraceKind::Scatter, x, y).mode("lines").name("cdf")
        }
        ChartType::Hist | ChartType::Bar | ChartType::Pmf => {
            let width = (stop - start) / 30.0;
            let x = stats::linspace(start + width / 2.0, stop - width / 2.0, 30);
            let y = x.iter().map(|v| pdf(*v)).collect::<Vec<_>>();
            Trace::xy(TraceKind::Bar, x, y).name("density")
        }
        ChartType::Scatter => {
            let x = stats::linspace(start, stop, 61);
            let y = x.iter().map(|v| pdf(*v)).collect::<Vec<_>>();
            Trace::xy(TraceKind::Scatter, x, y).mode("markers").name("pdf")
        }
        ChartType::Pdf | ChartType::Line | ChartType::Surface3d => {
            let x = stats::linspace(start, stop, 161);
            let y = x.iter().map(|v| pdf(*v)).collect::<Vec<_>>();
            Trace::xy(TraceKind::Scatter, x, y)
                .mode("lines")
                .name("pdf")
                .with("line", json!({"color": "#4A65F6"}))
        }
    };
    Figure::new().with_trace(trace)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn discrete(chart_type: ChartType, upper: f64, pmf: impl Fn(f64) -> f64) -> Figure {
    let upper = upper.min(MAX_SUPPORT);
    let k = stats::linspace(0.0, upper, (upper as usize).saturating_add(1));
    let p = k.iter().map(|v| pmf(*v)).collect::<Vec<_>>();
    let trace = match chart_type {
        ChartType::Cdf => {
            let mut total = 0.0;
            let cumulative = p
                .iter()
                .map(|v| {
                    total += v;
                    total.min(1.0)
                })
                .collect::<Vec<_>>();
            Trace::xy(TraceKind::Scatter, k, cumulative)
                .mode("lines")
                .name("cdf")
                .with("line", json!({"shape": "hv"}))
        }
        ChartType::Line | ChartType::Scatter | ChartType::Pdf => {
            Trace::xy(TraceKind::Scatter, k, p).mode("lines+markers").name("pmf")
        }
        ChartType::Pmf | ChartType::Bar | ChartType::Hist | ChartType::Surface3d => {
            Trace::xy(TraceKind::Bar, k, p)
                .name("pmf")
                .with("marker", json!({"color": "#4A65F6"}))
        }
    };
    Figure::new().with_trace(trace)
}

/// Unit grid before and after applying the 2x2 matrix.
fn matrix_grid(matrix: &[[f64; 2]; 2]) -> Figure {
    let axis = stats::linspace(-1.0, 1.0, 9);
    let (mut xs, mut ys) = (Vec::new(), Vec::new());
    for x in &axis {
        for y in &axis {
            xs.push(*x);
            ys.push(*y);
        }
    }
    let tx = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| matrix[0][0] * x + matrix[0][1] * y)
        .collect::<Vec<_>>();
    let ty = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| matrix[1][0] * x + matrix[1][1] * y)
        .collect::<Vec<_>>();

    Figure::new()
        .with_trace(
            Trace::xy(TraceKind::Scatter, xs, ys)
                .mode("markers")
                .name("original")
                .with("marker", json!({"color": "#9CA3AF"})),
        )
        .with_trace(
            Trace::xy(TraceKind::Scatter, tx, ty)
                .mode("markers")
                .name("transformed")
                .with("marker", json!({"color": "#4A65F6"})),
        )
        .with_layout("yaxis", json!({"scaleanchor": "x"}))
}

fn generic_line(chart_type: ChartType) -> Figure {
    let x = stats::linspace(0.0, 10.0, 101);
    let y = x.iter().map(|v| v.sin()).collect::<Vec<_>>();
    let trace = match chart_type {
        ChartType::Bar | ChartType::Hist | ChartType::Pmf => Trace::xy(TraceKind::Bar, x, y),
        ChartType::Scatter => Trace::xy(TraceKind::Scatter, x, y).mode("markers"),
        _ => Trace::xy(TraceKind::Scatter, x, y)
            .mode("lines")
            .with("line", json!({"color": "#6C8BFA"})),
    };
    Figure::new().with_trace(trace)
}

fn surface() -> Figure {
    let axis = stats::linspace(-3.0, 3.0, 30);
    let z = axis
        .iter()
        .map(|y| axis.iter().map(|x| x.sin() * y.cos()).collect())
        .collect();
    let mut trace = Trace::new(TraceKind::Surface);
    trace.x = Some(Series::Numbers(axis.clone()));
    trace.y = Some(Series::Numbers(axis));
    trace.z = Some(z);
    Figure::new()
        .with_trace(trace.with("colorscale", json!("Viridis")))
        .with_layout("template", json!("plotly_white"))
}

/// Trapezoid rule over 200 slices.
fn integrate(f: impl Fn(f64) -> f64, start: f64, stop: f64) -> f64 {
    if stop <= start {
        return 0.0;
    }
    let xs = stats::linspace(start, stop, 201);
    xs.windows(2)
        .map(|w| (w[1] - w[0]) * (f(w[0]) + f(w[1])) / 2.0)
        .sum::<f64>()
        .min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{validate, AllowList, ChartSpec};

    fn spec(concept: &str, chart: &str, library: &str, title: &str) -> ValidatedSpec {
        validate(&ChartSpec::new(concept, chart, library, title), &AllowList::default()).unwrap()
    }

    #[test]
    fn normal_pdf_page_has_anchors_and_params() {
        let spec = validate(
            &ChartSpec::new("normal_distribution", "pdf", "plotly", "标准正态分布")
                .with_param("mu", 1.0)
                .with_param("sigma", 2.0),
            &AllowList::default(),
        )
        .unwrap();
        let artifact = render(&spec).unwrap();
        assert!(artifact.markup.contains("<title>标准正态分布</title>"));
        assert!(artifact.markup.contains(VIZ_DIV));
        assert!(artifact.markup.contains("Plotly.newPlot('viz'"));
        assert_eq!(artifact.concept_slug, "normal_distribution");

        let figure = figure_for(&spec);
        assert_eq!(figure.point_count(), 161);
        let Some(Series::Numbers(x)) = &figure.data[0].x else {
            panic!("numeric x expected");
        };
        assert!((x[0] - -7.0).abs() < 1e-9);
    }

    #[test]
    fn titles_are_escaped() {
        let artifact = render(&spec(
            "fourier_series",
            "line",
            "plotly",
            "<script>alert(1)</script>",
        ))
        .unwrap();
        assert!(artifact
            .markup
            .contains("<title>&lt;script&gt;alert(1)&lt;/script&gt;</title>"));
        assert!(!artifact.markup.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn discrete_cdf_is_a_step_line() {
        let figure = figure_for(&spec("poisson_distribution", "cdf", "plotly", "t"));
        let trace = &figure.data[0];
        assert_eq!(trace.mode.as_deref(), Some("lines"));
        assert_eq!(trace.attributes["line"]["shape"], "hv");
    }

    #[test]
    fn discrete_support_is_capped() {
        let mut spec = spec("poisson_distribution", "pmf", "plotly", "t");
        spec.plot = ConceptPlot::Poisson(RateParams { lambda: 1e20 });
        assert_eq!(figure_for(&spec).point_count(), 2001);
    }

    #[test]
    fn threejs_and_surface_use_generic_templates() {
        let artifact = render(&spec("normal_distribution", "pdf", "three.js", "cube")).unwrap();
        assert!(artifact.markup.contains("THREE.Scene"));
        assert!(!artifact.markup.contains(NEW_PLOT));

        let figure = figure_for(&spec("normal_distribution", "surface3d", "plotly", "s"));
        assert_eq!(figure.data[0].kind, TraceKind::Surface);
    }

    #[test]
    fn matrix_transform_plots_both_grids() {
        let figure = figure_for(&spec("matrix_transform", "scatter", "plotly", "m"));
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.point_count(), 162);
    }

    #[test]
    fn missing_anchor_is_reported() {
        assert_eq!(
            check_anchors("<title>t</title><div id=\"viz\"></div>", Library::Plotly),
            Err(RenderError { anchor: NEW_PLOT })
        );
    }
}
