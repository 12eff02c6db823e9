use crate::{program::Figure, QualityGateFailure};

/// Minimum standard for an executed script: it imports plotly and its
/// figure plots more than `min_points` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    pub min_points: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self { min_points: 3 }
    }
}

impl QualityGate {
    #[must_use]
    pub fn new(min_points: usize) -> Self {
        Self { min_points }
    }

    pub fn check(&self, source: &str, figure: &Figure) -> Result<(), QualityGateFailure> {
        let imports_plotly = source.lines().map(str::trim_start).any(|line| {
            line.starts_with("import plotly") || line.starts_with("from plotly")
        });
        if !imports_plotly {
            return Err(QualityGateFailure::MissingPlotlyImport);
        }

        let points = figure.point_count();
        if points <= self.min_points {
            return Err(QualityGateFailure::TooFewPoints {
                points,
                minimum: self.min_points,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Trace, TraceKind};

    fn figure(points: usize) -> Figure {
        let xs: Vec<f64> = (0..points).map(|i| i as f64).collect();
        Figure::new().with_trace(Trace::xy(TraceKind::Scatter, xs.clone(), xs))
    }

    #[test]
    fn requires_plotly_import() {
        assert_eq!(
            QualityGate::default().check("import numpy as np", &figure(10)),
            Err(QualityGateFailure::MissingPlotlyImport)
        );
    }

    #[test]
    fn three_points_is_not_enough() {
        let source = "import plotly.graph_objects as go";
        assert_eq!(
            QualityGate::default().check(source, &figure(3)),
            Err(QualityGateFailure::TooFewPoints {
                points: 3,
                minimum: 3
            })
        );
        assert!(QualityGate::default().check(source, &figure(4)).is_ok());
    }
}
