//! Prompt text sent to the completion service.

use crate::{extract::ExtractionRequest, Domain};

pub const SPEC_SYSTEM_PROMPT: &str = r#"You are an interactive visualization engineer.
Read the user's description and answer with one JSON object with exactly these fields:
{concept, chart_type, library, params, title}
Rules:
- concept is a snake_case identifier of the mathematical concept.
- chart_type is short, one of pdf, pmf, cdf, hist, line, scatter, bar, surface3d.
- library is plotly or three.js; prefer plotly.
- params maps parameter names to numbers or nested lists of numbers.
- title is a short human-readable title in the user's language.
Examples:
1) 正态分布 -> {"concept":"normal_distribution","chart_type":"pdf","library":"plotly","params":{"mu":0,"sigma":1},"title":"标准正态分布"}
2) 泊松分布 -> {"concept":"poisson_distribution","chart_type":"pmf","library":"plotly","params":{"lambda":4},"title":"泊松分布 PMF"}
3) 矩阵变换 -> {"concept":"matrix_transform","chart_type":"scatter","library":"plotly","params":{"A":[[1,0],[0,1]]},"title":"二维矩阵变换"}
Output only the JSON, no explanation."#;

/// User turn for spec extraction: the raw prompt plus any hints.
pub fn spec_user_prompt(request: &ExtractionRequest) -> String {
    let mut text = request.prompt.clone();
    if let Some(viz_type) = hint(request.viz_type.as_deref()) {
        text.push_str("\nPreferred visualization type: ");
        text.push_str(viz_type);
    }
    if let Some(complexity) = hint(request.complexity.as_deref()) {
        text.push_str("\nComplexity: ");
        text.push_str(complexity);
    }
    text
}

/// "auto" style values carry no information.
fn hint(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !matches!(v.to_lowercase().as_str(), "auto" | "自动"))
}

const PROGRAM_RULES: &str = r"You write short figure scripts in a small Python subset.
The script runs in a sandbox that only provides numpy (as np), math and plotly
(plotly.express as px, plotly.graph_objects as go). There are no files, no network,
no environment and no other modules.
Supported syntax: import statements, `name = expression`, expression statements,
numbers, strings, lists, dicts, list comprehensions `[f(v) for v in xs]`,
arithmetic + - * / % **, function calls with keyword arguments, indexing.
There are no loops, conditionals, function definitions or classes.
Useful functions: np.linspace, np.arange, np.sin, np.cos, np.exp, np.log, np.sqrt,
np.power, np.array, math.factorial, normal_pdf(x, mu, sigma), poisson_pmf(k, lam),
binomial_pmf(k, n, p), px.line, px.bar, px.scatter, go.Figure, go.Scatter, go.Bar,
fig.add_trace, fig.add_scatter, fig.add_bar, fig.update_layout.
The final figure must be assigned to a variable named fig and must hold more than
a handful of points.
Answer with the complete script in one ```python fenced block.";

pub fn program_system_prompt(domain: Domain) -> String {
    let focus = match domain {
        Domain::LinearAlgebra => {
            "Topic: linear algebra. Show vectors, grids of points or their images under a 2x2 matrix as scatter or line traces."
        }
        Domain::Distribution => {
            "Topic: probability distributions. Plot densities with lines and probability masses with bars over a sensible support."
        }
        Domain::General => "Topic: general mathematics. Pick the clearest plot for the request.",
    };
    format!("{PROGRAM_RULES}\n{focus}")
}

pub fn program_user_prompt(prompt: &str) -> String {
    format!("Output the complete script (it must assign fig).\nRequest: {prompt}")
}

/// Follow-up request after a failed attempt.
pub fn repair_prompt(error: &str, source: &str) -> String {
    format!(
        "The script below did not produce a valid Plotly figure. Fix it and return the complete script.\n\
         Requirements:\n\
         - use only numpy, math and plotly\n\
         - assign the final plotly figure to fig\n\
         - no file, network or system access\n\
         Error:\n{error}\n\
         Script:\n{source}\n"
    )
}
