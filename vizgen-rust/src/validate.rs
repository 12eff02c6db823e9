use crate::{
    AllowList, BetaParams, BinomialParams, ChartSpec, ChartType, ConceptPlot, Library,
    MatrixParams, NormalParams, ParamValue, RateParams, UniformParams, ValidatedSpec,
    ValidationError,
};
use std::collections::BTreeMap;

const MAX_BINOMIAL_TRIALS: f64 = 1000.0;
/// Largest Poisson rate; the plotted support grows with the rate.
const MAX_POISSON_RATE: f64 = 1000.0;

/// Check a spec against the allow-lists and turn it into its typed form.
/// The error names the first offending field.
pub fn validate(spec: &ChartSpec, allow: &AllowList) -> Result<ValidatedSpec, ValidationError> {
    let chart_type = spec
        .chart_type
        .parse::<ChartType>()
        .ok()
        .filter(|chart_type| allow.allows_chart(*chart_type))
        .ok_or_else(|| ValidationError::NotAllowed {
            field: "chart_type",
            value: spec.chart_type.clone(),
        })?;

    let library = spec
        .library
        .parse::<Library>()
        .ok()
        .filter(|library| allow.allows_library(*library))
        .ok_or_else(|| ValidationError::NotAllowed {
            field: "library",
            value: spec.library.clone(),
        })?;

    let concept = spec.concept.trim();
    if concept.is_empty() {
        return Err(ValidationError::Missing { field: "concept" });
    }
    let title = spec.title.trim();
    if title.is_empty() {
        return Err(ValidationError::Missing { field: "title" });
    }

    Ok(ValidatedSpec {
        plot: concept_plot(concept, &spec.params)?,
        chart_type,
        library,
        title: title.to_string(),
    })
}

fn concept_plot(
    concept: &str,
    params: &BTreeMap<String, ParamValue>,
) -> Result<ConceptPlot, ValidationError> {
    let plot = match concept {
        "normal_distribution" => {
            let mu = number(params, "mu", 0.0)?;
            let sigma = number(params, "sigma", 1.0)?;
            ConceptPlot::Normal(NormalParams {
                mu,
                sigma: if sigma > 0.0 { sigma } else { 1.0 },
            })
        }
        "poisson_distribution" => {
            let lambda = positive(params, "lambda", 4.0)?;
            if lambda > MAX_POISSON_RATE {
                return Err(invalid("lambda", "must not exceed 1000"));
            }
            ConceptPlot::Poisson(RateParams { lambda })
        }
        "binomial_distribution" => {
            let n = number(params, "n", 20.0)?;
            if n < 0.0 || n.fract() != 0.0 || n > MAX_BINOMIAL_TRIALS {
                return Err(invalid("n", "must be a whole number between 0 and 1000"));
            }
            let p = number(params, "p", 0.4)?;
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid("p", "must lie in [0, 1]"));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = n as u32;
            ConceptPlot::Binomial(BinomialParams { n, p })
        }
        "beta_distribution" => ConceptPlot::Beta(BetaParams {
            alpha: positive(params, "alpha", 2.0)?,
            beta: positive(params, "beta", 5.0)?,
        }),
        "exponential_distribution" => ConceptPlot::Exponential(RateParams {
            lambda: positive(params, "lambda", 1.0)?,
        }),
        "uniform_distribution" => {
            let a = number(params, "a", 0.0)?;
            let b = number(params, "b", 1.0)?;
            if a >= b {
                return Err(invalid("b", "must be greater than a"));
            }
            ConceptPlot::Uniform(UniformParams { a, b })
        }
        "matrix_transform" => ConceptPlot::MatrixTransform(MatrixParams {
            matrix: matrix(params, "A")?,
        }),
        other => ConceptPlot::Generic {
            concept: other.to_string(),
        },
    };
    Ok(plot)
}

fn invalid(name: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidParam {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn number(
    params: &BTreeMap<String, ParamValue>,
    name: &str,
    default: f64,
) -> Result<f64, ValidationError> {
    let Some(value) = params.get(name) else {
        return Ok(default);
    };
    match value.as_number() {
        Some(n) if n.is_finite() => Ok(n),
        Some(_) => Err(invalid(name, "must be finite")),
        None => Err(invalid(name, "must be a number")),
    }
}

fn positive(
    params: &BTreeMap<String, ParamValue>,
    name: &str,
    default: f64,
) -> Result<f64, ValidationError> {
    let n = number(params, name, default)?;
    if n > 0.0 {
        Ok(n)
    } else {
        Err(invalid(name, "must be positive"))
    }
}

fn matrix(
    params: &BTreeMap<String, ParamValue>,
    name: &str,
) -> Result<[[f64; 2]; 2], ValidationError> {
    let Some(value) = params.get(name) else {
        return Ok([[1.0, 0.0], [0.0, 1.0]]);
    };
    let shape_error = || invalid(name, "must be a 2x2 matrix of numbers");

    let ParamValue::List(rows) = value else {
        return Err(shape_error());
    };
    if rows.len() != 2 {
        return Err(shape_error());
    }

    let mut out = [[0.0; 2]; 2];
    for (i, row) in rows.iter().enumerate() {
        let ParamValue::List(cells) = row else {
            return Err(shape_error());
        };
        if cells.len() != 2 {
            return Err(shape_error());
        }
        for (j, cell) in cells.iter().enumerate() {
            out[i][j] = cell
                .as_number()
                .filter(|n| n.is_finite())
                .ok_or_else(shape_error)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> AllowList {
        AllowList::default()
    }

    #[test]
    fn rejects_chart_type_outside_allow_list() {
        let spec = ChartSpec::new("normal_distribution", "pie3d", "plotly", "t");
        let err = validate(&spec, &allow()).unwrap_err();
        assert_eq!(err.field(), "chart_type");
        assert_eq!(
            err,
            ValidationError::NotAllowed {
                field: "chart_type",
                value: "pie3d".to_string()
            }
        );
    }

    #[test]
    fn rejects_known_chart_type_removed_from_allow_list() {
        let allow = AllowList {
            chart_types: vec![ChartType::Pdf],
            ..AllowList::default()
        };
        let spec = ChartSpec::new("poisson_distribution", "pmf", "plotly", "t");
        assert_eq!(validate(&spec, &allow).unwrap_err().field(), "chart_type");
    }

    #[test]
    fn rejects_unknown_library_and_accepts_three_js_aliases() {
        let spec = ChartSpec::new("normal_distribution", "pdf", "d3", "t");
        assert_eq!(validate(&spec, &allow()).unwrap_err().field(), "library");

        let spec = ChartSpec::new("normal_distribution", "pdf", "Three.js", "t");
        assert_eq!(
            validate(&spec, &allow()).unwrap().library,
            Library::Threejs
        );
    }

    #[test]
    fn fills_defaults_and_types_params() {
        let spec = ChartSpec::new("binomial_distribution", "pmf", "plotly", " 二项分布 PMF ")
            .with_param("p", 0.25);
        let validated = validate(&spec, &allow()).unwrap();
        assert_eq!(
            validated.plot,
            ConceptPlot::Binomial(BinomialParams { n: 20, p: 0.25 })
        );
        assert_eq!(validated.title, "二项分布 PMF");
    }

    #[test]
    fn zero_sigma_falls_back_to_one() {
        let spec =
            ChartSpec::new("normal_distribution", "pdf", "plotly", "t").with_param("sigma", 0.0);
        assert_eq!(
            validate(&spec, &allow()).unwrap().plot,
            ConceptPlot::Normal(NormalParams {
                mu: 0.0,
                sigma: 1.0
            })
        );
    }

    #[test]
    fn rejects_malformed_params() {
        let spec = ChartSpec::new("binomial_distribution", "pmf", "plotly", "t")
            .with_param("p", 1.5);
        assert_eq!(validate(&spec, &allow()).unwrap_err().field(), "params");

        let spec = ChartSpec::new("matrix_transform", "scatter", "plotly", "t").with_param(
            "A",
            ParamValue::List(vec![ParamValue::Number(1.0), ParamValue::Number(0.0)]),
        );
        assert!(matches!(
            validate(&spec, &allow()),
            Err(ValidationError::InvalidParam { name, .. }) if name == "A"
        ));
    }

    #[test]
    fn poisson_rate_is_bounded() {
        let spec = ChartSpec::new("poisson_distribution", "pmf", "plotly", "t")
            .with_param("lambda", 1e20);
        assert!(matches!(
            validate(&spec, &allow()),
            Err(ValidationError::InvalidParam { name, .. }) if name == "lambda"
        ));
        assert!(validate(&spec, &allow()).unwrap_err().is_client_error());

        let spec = ChartSpec::new("poisson_distribution", "pmf", "plotly", "t")
            .with_param("lambda", 1000.0);
        assert_eq!(
            validate(&spec, &allow()).unwrap().plot,
            ConceptPlot::Poisson(RateParams { lambda: 1000.0 })
        );
    }

    #[test]
    fn unknown_concepts_are_generic() {
        let spec = ChartSpec::new("fourier_series", "line", "plotly", "傅里叶级数");
        assert_eq!(
            validate(&spec, &allow()).unwrap().plot,
            ConceptPlot::Generic {
                concept: "fourier_series".to_string()
            }
        );
    }

    #[test]
    fn requires_concept_and_title() {
        let spec = ChartSpec::new("  ", "pdf", "plotly", "t");
        assert_eq!(
            validate(&spec, &allow()).unwrap_err(),
            ValidationError::Missing { field: "concept" }
        );
        let spec = ChartSpec::new("normal_distribution", "pdf", "plotly", "");
        assert_eq!(
            validate(&spec, &allow()).unwrap_err(),
            ValidationError::Missing { field: "title" }
        );
    }
}
