//! Capability-free execution of generated figure scripts.
//!
//! Scripts are written in a small, import-gated subset of Python: module
//! imports of `numpy`, `math` and `plotly`, assignments, calls, arithmetic,
//! indexing, list literals and list comprehensions. There is no control
//! flow and nothing reaches the host; the only output is the figure bound
//! to `fig`.

mod figure;
mod interpreter;
mod parser;

pub use figure::{Figure, Series, Trace, TraceKind};
pub use interpreter::{execute, Interpreter, Limits, OUTPUT_NAME};
pub use parser::{parse, BinOp, Expr, Stmt, StmtKind};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionError;
    use std::time::Duration;

    fn run(source: &str) -> Result<Figure, ExecutionError> {
        execute(source, Limits::default())
    }

    #[test]
    fn runs_express_line_with_numpy() {
        let figure = run(
            "import numpy as np\nimport plotly.express as px\nx = np.linspace(0, 10, 50)\ny = np.sin(x)\nfig = px.line(x=x, y=y, title='Sine')\n",
        )
        .unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.point_count(), 50);
        assert_eq!(figure.title(), Some("Sine"));
    }

    #[test]
    fn builds_graph_objects_figure_and_mutates_binding() {
        let figure = run(concat!(
            "import plotly.graph_objects as go\n",
            "from math import factorial, exp\n",
            "lam = 4\n",
            "k = list(range(0, 15))\n",
            "p = [exp(-lam) * lam ** i / factorial(i) for i in k]\n",
            "fig = go.Figure()\n",
            "fig.add_trace(go.Bar(x=k, y=p, name='pmf'))\n",
            "fig.update_layout(title='Poisson', xaxis_title='k')\n",
        ))
        .unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.data[0].kind, TraceKind::Bar);
        assert_eq!(figure.point_count(), 15);
        assert_eq!(figure.title(), Some("Poisson"));
        assert_eq!(figure.layout["xaxis"]["title"]["text"], "k");
    }

    #[test]
    fn rejects_unknown_modules() {
        let err = run("import os\nfig = None\n").unwrap_err();
        assert_eq!(
            err,
            ExecutionError::UnsupportedImport {
                line: 1,
                module: "os".to_string()
            }
        );
    }

    #[test]
    fn reports_unknown_names_with_line() {
        let err = run("import numpy as np\nx = np.linspace(0, 1, 5)\ny = undefined_thing(x)\n")
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::UnknownName {
                line: 3,
                name: "undefined_thing".to_string()
            }
        );
    }

    #[test]
    fn requires_fig_binding() {
        let err = run("import numpy as np\nx = np.arange(0, 10)\n").unwrap_err();
        assert_eq!(err, ExecutionError::MissingOutput("fig".to_string()));

        let err = run("fig = 3\n").unwrap_err();
        assert!(matches!(err, ExecutionError::NotAFigure { found: "number", .. }));
    }

    #[test]
    fn promotes_bare_trace() {
        let figure = run("import plotly.graph_objects as go\nfig = go.Scatter(x=[1, 2, 3, 4], y=[1, 4, 9, 16])\n").unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.point_count(), 4);
    }

    #[test]
    fn broadcasting_checks_shapes() {
        let err = run("import numpy as np\nx = np.arange(0, 3) + np.arange(0, 4)\n").unwrap_err();
        assert!(matches!(err, ExecutionError::Type { line: 2, .. }));
    }

    #[test]
    fn enforces_array_cap() {
        let err = run("import numpy as np\nx = np.linspace(0, 1, 10000000)\n").unwrap_err();
        assert!(matches!(err, ExecutionError::TooLarge { line: 2, .. }));
    }

    #[test]
    fn enforces_statement_budget() {
        let limits = Limits {
            max_statements: 10,
            ..Limits::default()
        };
        let err = execute("x = [i * 2 for i in range(100)]\n", limits).unwrap_err();
        assert_eq!(err, ExecutionError::StatementBudget(10));
    }

    #[test]
    fn enforces_deadline() {
        let limits = Limits {
            timeout: Duration::ZERO,
            ..Limits::default()
        };
        let source = "x = 1\n".repeat(50);
        let err = execute(&source, limits).unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(Duration::ZERO));
    }

    #[test]
    fn python_modulo_follows_divisor_sign() {
        let figure = run(
            "import plotly.express as px\nfig = px.bar(x=['a', 'b'], y=[-7 % 3, 7 % -3])\n",
        )
        .unwrap();
        let json = serde_json::to_value(&figure).unwrap();
        assert_eq!(json["data"][0]["y"], serde_json::json!([2.0, -2.0]));
        assert_eq!(json["data"][0]["x"], serde_json::json!(["a", "b"]));
    }
}
