#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use super::{
    figure::{Figure, Series, Trace, TraceKind},
    parser::{parse, BinOp, Expr, StmtKind},
};
use crate::{stats, ExecutionError};
use serde_json::{Map, Number, Value as Json};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Name the script must bind its figure to.
pub const OUTPUT_NAME: &str = "fig";

const MODULES: &[&str] = &[
    "numpy",
    "math",
    "plotly",
    "plotly.express",
    "plotly.graph_objects",
    "plotly.graph_objs",
];

/// Resource bounds for one execution.
/// # Default Values
/// - `timeout`: 2s
/// - `max_statements`: 10 000 (comprehension iterations count)
/// - `max_array_len`: 100 000 elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub max_statements: usize,
    pub max_array_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_statements: 10_000,
            max_array_len: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Linspace,
    Arange,
    Range,
    Zeros,
    Ones,
    Array,
    List,
    Dict,
    Len,
    Int,
    Float,
    Round,
    Abs,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Power,
    Factorial,
    Sum,
    Cumsum,
    Max,
    Min,
    Mean,
    NormalPdf,
    PoissonPmf,
    BinomialPmf,
    Print,
    Line,
    ScatterPlot,
    BarPlot,
    Figure,
    Scatter,
    Bar,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<f64>),
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Module(&'static str),
    Func(Func),
    Figure(Figure),
    Trace(Trace),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Module(_) => "module",
            Self::Func(_) => "function",
            Self::Figure(_) => "figure",
            Self::Trace(_) => "trace",
        }
    }
}

/// Members the sandbox exposes on each module.
fn member(module: &str, name: &str) -> Option<Value> {
    let func = match (module, name) {
        ("numpy" | "math", "pi") => return Some(Value::Number(std::f64::consts::PI)),
        ("numpy" | "math", "e") => return Some(Value::Number(std::f64::consts::E)),
        ("numpy" | "math", "sin") => Func::Sin,
        ("numpy" | "math", "cos") => Func::Cos,
        ("numpy" | "math", "tan") => Func::Tan,
        ("numpy" | "math", "exp") => Func::Exp,
        ("numpy" | "math", "log") => Func::Log,
        ("numpy" | "math", "sqrt") => Func::Sqrt,
        ("numpy", "abs") | ("math", "fabs") => Func::Abs,
        ("numpy", "power") | ("math", "pow") => Func::Power,
        ("math", "factorial") => Func::Factorial,
        ("numpy", "linspace") => Func::Linspace,
        ("numpy", "arange") => Func::Arange,
        ("numpy", "zeros") => Func::Zeros,
        ("numpy", "ones") => Func::Ones,
        ("numpy", "array" | "asarray") => Func::Array,
        ("numpy", "sum") => Func::Sum,
        ("numpy", "cumsum") => Func::Cumsum,
        ("numpy", "max") => Func::Max,
        ("numpy", "min") => Func::Min,
        ("numpy", "mean") => Func::Mean,
        ("numpy", "round") => Func::Round,
        ("plotly.express", "line") => Func::Line,
        ("plotly.express", "scatter") => Func::ScatterPlot,
        ("plotly.express", "bar") => Func::BarPlot,
        ("plotly.graph_objects" | "plotly.graph_objs", "Figure") => Func::Figure,
        ("plotly.graph_objects" | "plotly.graph_objs", "Scatter") => Func::Scatter,
        ("plotly.graph_objects" | "plotly.graph_objs", "Bar") => Func::Bar,
        _ => return None,
    };
    Some(Value::Func(func))
}

fn builtin(name: &str) -> Option<Value> {
    let func = match name {
        "range" => Func::Range,
        "len" => Func::Len,
        "int" => Func::Int,
        "float" => Func::Float,
        "round" => Func::Round,
        "abs" => Func::Abs,
        "sum" => Func::Sum,
        "max" => Func::Max,
        "min" => Func::Min,
        "list" => Func::List,
        "dict" => Func::Dict,
        "print" => Func::Print,
        "normal_pdf" => Func::NormalPdf,
        "poisson_pmf" => Func::PoissonPmf,
        "binomial_pmf" => Func::BinomialPmf,
        _ => return None,
    };
    Some(Value::Func(func))
}

/// Resolve a dotted module path, treating `numpy.math` as `math`.
fn module(path: &str) -> Option<&'static str> {
    if path == "numpy.math" {
        return Some("math");
    }
    MODULES.iter().copied().find(|m| *m == path)
}

/// Call arguments after evaluation.
struct Args {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    fn take(&mut self, index: usize, name: &str) -> Option<Value> {
        if let Some(pos) = self.keywords.iter().position(|(k, _)| k == name) {
            return Some(self.keywords.remove(pos).1);
        }
        self.positional
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, Value::None))
            .filter(|value| *value != Value::None)
    }
}

/// A tree-walking evaluator for figure scripts. It has no file, network,
/// process or environment access; the only observable effect of a run is
/// the returned figure.
pub struct Interpreter {
    limits: Limits,
    env: HashMap<String, Value>,
    steps: usize,
    deadline: Instant,
    line: usize,
}

impl Interpreter {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            env: HashMap::new(),
            steps: 0,
            deadline: Instant::now() + limits.timeout,
            line: 0,
        }
    }

    /// Run `source` and return the figure bound to `fig`. A bare trace is
    /// promoted to a one-trace figure.
    pub fn run(mut self, source: &str) -> Result<Figure, ExecutionError> {
        self.deadline = Instant::now() + self.limits.timeout;
        let program = parse(source)?;

        for stmt in &program {
            self.line = stmt.line;
            self.tick()?;
            match &stmt.kind {
                StmtKind::Import { module: path, alias } => {
                    let resolved = module(path).ok_or_else(|| self.unsupported(path))?;
                    match alias {
                        Some(alias) => {
                            self.env.insert(alias.clone(), Value::Module(resolved));
                        }
                        None => {
                            let root = path.split('.').next().unwrap_or(path);
                            let root = module(root).ok_or_else(|| self.unsupported(path))?;
                            self.env.insert(root.to_string(), Value::Module(root));
                        }
                    }
                }
                StmtKind::FromImport { module: path, names } => {
                    let resolved = module(path).ok_or_else(|| self.unsupported(path))?;
                    for (name, alias) in names {
                        let full = format!("{resolved}.{name}");
                        let value = module(&full)
                            .map(Value::Module)
                            .or_else(|| member(resolved, name))
                            .ok_or_else(|| self.unknown(&full))?;
                        self.env
                            .insert(alias.clone().unwrap_or_else(|| name.clone()), value);
                    }
                }
                StmtKind::Assign { target, value } => {
                    let value = self.eval(value)?;
                    self.env.insert(target.clone(), value);
                }
                StmtKind::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }

        match self.env.remove(OUTPUT_NAME) {
            Some(Value::Figure(figure)) => Ok(figure),
            Some(Value::Trace(trace)) => Ok(Figure::new().with_trace(trace)),
            None | Some(Value::None) => Err(ExecutionError::MissingOutput(OUTPUT_NAME.to_string())),
            Some(other) => Err(ExecutionError::NotAFigure {
                name: OUTPUT_NAME.to_string(),
                found: other.type_name(),
            }),
        }
    }

    fn tick(&mut self) -> Result<(), ExecutionError> {
        self.steps += 1;
        if self.steps > self.limits.max_statements {
            return Err(ExecutionError::StatementBudget(self.limits.max_statements));
        }
        if Instant::now() >= self.deadline {
            return Err(ExecutionError::Timeout(self.limits.timeout));
        }
        Ok(())
    }

    fn type_error(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Type {
            line: self.line,
            message: message.into(),
        }
    }

    fn unknown(&self, name: &str) -> ExecutionError {
        ExecutionError::UnknownName {
            line: self.line,
            name: name.to_string(),
        }
    }

    fn unsupported(&self, module: &str) -> ExecutionError {
        ExecutionError::UnsupportedImport {
            line: self.line,
            module: module.to_string(),
        }
    }

    fn check_len(&self, len: usize) -> Result<(), ExecutionError> {
        if len > self.limits.max_array_len {
            return Err(ExecutionError::TooLarge {
                line: self.line,
                len,
                limit: self.limits.max_array_len,
            });
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ExecutionError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self
                .env
                .get(name)
                .cloned()
                .or_else(|| builtin(name))
                .ok_or_else(|| self.unknown(name)),
            Expr::Attr(target, attr) => {
                let target = self.eval(target)?;
                self.attribute(&target, attr)
            }
            Expr::Call { func, args, kwargs } => self.call(func, args, kwargs),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index(target, &index)
            }
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items))
            }
            Expr::Dict(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let Value::Str(key) = self.eval(key)? else {
                        return Err(self.type_error("dict keys must be strings"));
                    };
                    out.push((key, self.eval(value)?));
                }
                Ok(Value::Dict(out))
            }
            Expr::ListComp { element, var, iter } => self.comprehension(element, var, iter),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::Bool(b) => Ok(Value::Number(-f64::from(u8::from(b)))),
                Value::Array(values) => Ok(Value::Array(values.into_iter().map(|v| -v).collect())),
                other => Err(self.type_error(format!("cannot negate a {}", other.type_name()))),
            },
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
        }
    }

    fn attribute(&self, target: &Value, attr: &str) -> Result<Value, ExecutionError> {
        match target {
            Value::Module(path) => {
                let full = format!("{path}.{attr}");
                module(&full)
                    .map(Value::Module)
                    .or_else(|| member(path, attr))
                    .ok_or_else(|| self.unknown(&full))
            }
            Value::Array(values) if attr == "size" => {
                Ok(Value::Number(values.len() as f64))
            }
            other => Err(self.type_error(format!(
                "'{}' object has no attribute '{attr}'",
                other.type_name()
            ))),
        }
    }

    fn index(&self, target: Value, index: &Value) -> Result<Value, ExecutionError> {
        let position = |len: usize| -> Result<usize, ExecutionError> {
            let Value::Number(n) = index else {
                return Err(self.type_error("indices must be numbers"));
            };
            if n.fract() != 0.0 {
                return Err(self.type_error("indices must be whole numbers"));
            }
            let signed = if *n < 0.0 { len as i64 + *n as i64 } else { *n as i64 };
            usize::try_from(signed)
                .ok()
                .filter(|i| *i < len)
                .ok_or_else(|| self.type_error("index out of range"))
        };

        match target {
            Value::Array(values) => Ok(Value::Number(values[position(values.len())?])),
            Value::List(mut items) => {
                let i = position(items.len())?;
                Ok(items.swap_remove(i))
            }
            Value::Dict(entries) => {
                let Value::Str(key) = index else {
                    return Err(self.type_error("dict keys must be strings"));
                };
                entries
                    .into_iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v)
                    .ok_or_else(|| self.type_error(format!("key '{key}' not found")))
            }
            other => Err(self.type_error(format!("'{}' is not subscriptable", other.type_name()))),
        }
    }

    fn comprehension(&mut self, element: &Expr, var: &str, iter: &Expr) -> Result<Value, ExecutionError> {
        let items: Vec<Value> = match self.eval(iter)? {
            Value::Array(values) => values.into_iter().map(Value::Number).collect(),
            Value::List(items) => items,
            other => return Err(self.type_error(format!("'{}' is not iterable", other.type_name()))),
        };
        self.check_len(items.len())?;

        let shadowed = self.env.remove(var);
        let mut out = Vec::with_capacity(items.len());
        let mut result = Ok(());
        for item in items {
            if let Err(err) = self.tick() {
                result = Err(err);
                break;
            }
            self.env.insert(var.to_string(), item);
            match self.eval(element) {
                Ok(value) => out.push(value),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.env.remove(var);
        if let Some(previous) = shadowed {
            self.env.insert(var.to_string(), previous);
        }
        result.map(|()| Value::List(out))
    }

    fn binary(&self, op: BinOp, left: Value, right: Value) -> Result<Value, ExecutionError> {
        match (op, left, right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (BinOp::Add, Value::List(mut a), Value::List(b)) => {
                self.check_len(a.len() + b.len())?;
                a.extend(b);
                Ok(Value::List(a))
            }
            (BinOp::Mul, Value::List(items), Value::Number(n))
            | (BinOp::Mul, Value::Number(n), Value::List(items)) => {
                let times = if n > 0.0 { n as usize } else { 0 };
                self.check_len(items.len().saturating_mul(times))?;
                Ok(Value::List(
                    std::iter::repeat_n(items, times).flatten().collect(),
                ))
            }
            (op, left, right) => {
                let apply = |a: f64, b: f64| arithmetic(op, a, b);
                match (self.numeric(&left, &right)?, self.numeric(&right, &left)?) {
                    (Numeric::Scalar(a), Numeric::Scalar(b)) => Ok(Value::Number(apply(a, b))),
                    (Numeric::Vector(a), Numeric::Scalar(b)) => {
                        Ok(Value::Array(a.into_iter().map(|v| apply(v, b)).collect()))
                    }
                    (Numeric::Scalar(a), Numeric::Vector(b)) => {
                        Ok(Value::Array(b.into_iter().map(|v| apply(a, v)).collect()))
                    }
                    (Numeric::Vector(a), Numeric::Vector(b)) => {
                        if a.len() != b.len() {
                            return Err(self.type_error(format!(
                                "operands could not be broadcast together with shapes ({},) ({},)",
                                a.len(),
                                b.len()
                            )));
                        }
                        Ok(Value::Array(
                            a.into_iter().zip(b).map(|(x, y)| apply(x, y)).collect(),
                        ))
                    }
                }
            }
        }
    }

    /// Numeric view of an operand. Lists only broadcast against arrays.
    fn numeric(&self, value: &Value, other: &Value) -> Result<Numeric, ExecutionError> {
        match value {
            Value::Number(n) => Ok(Numeric::Scalar(*n)),
            Value::Bool(b) => Ok(Numeric::Scalar(f64::from(u8::from(*b)))),
            Value::Array(values) => Ok(Numeric::Vector(values.clone())),
            Value::List(_) if matches!(other, Value::Array(_)) => {
                Ok(Numeric::Vector(self.to_vec(value)?))
            }
            other_value => Err(self.type_error(format!(
                "unsupported operand types: {} and {}",
                other_value.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Flatten a number, array or list of numbers into a vector.
    fn to_vec(&self, value: &Value) -> Result<Vec<f64>, ExecutionError> {
        match value {
            Value::Number(n) => Ok(vec![*n]),
            Value::Array(values) => Ok(values.clone()),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Number(n) => Ok(*n),
                    Value::Bool(b) => Ok(f64::from(u8::from(*b))),
                    other => Err(self.type_error(format!(
                        "expected a list of numbers, found a {}",
                        other.type_name()
                    ))),
                })
                .collect(),
            other => Err(self.type_error(format!("expected numbers, found a {}", other.type_name()))),
        }
    }

    fn number(&self, value: &Value) -> Result<f64, ExecutionError> {
        match value {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(f64::from(u8::from(*b))),
            other => Err(self.type_error(format!("expected a number, found a {}", other.type_name()))),
        }
    }

    fn required(&self, args: &mut Args, index: usize, name: &str) -> Result<Value, ExecutionError> {
        args.take(index, name)
            .ok_or_else(|| self.type_error(format!("missing required argument '{name}'")))
    }

    /// Apply `f` element-wise, keeping scalars scalar.
    fn map(&self, value: &Value, f: impl Fn(f64) -> f64) -> Result<Value, ExecutionError> {
        match value {
            Value::Number(_) | Value::Bool(_) => Ok(Value::Number(f(self.number(value)?))),
            _ => Ok(Value::Array(self.to_vec(value)?.into_iter().map(f).collect())),
        }
    }

    fn call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, ExecutionError> {
        // figure methods mutate the binding they are called on
        if let Expr::Attr(target, method) = func {
            let receiver = self.eval(target)?;
            if let Value::Figure(mut figure) = receiver {
                let mut call_args = self.eval_args(args, kwargs)?;
                let result = self.figure_method(&mut figure, method, &mut call_args)?;
                if let Expr::Name(name) = target.as_ref() {
                    self.env.insert(name.clone(), Value::Figure(figure.clone()));
                }
                return Ok(result.unwrap_or(Value::Figure(figure)));
            }
            if let Value::Array(values) = &receiver {
                let reduced = match method.as_str() {
                    "sum" => Some(Func::Sum),
                    "max" => Some(Func::Max),
                    "min" => Some(Func::Min),
                    "mean" => Some(Func::Mean),
                    "cumsum" => Some(Func::Cumsum),
                    "tolist" => Some(Func::List),
                    _ => None,
                };
                if let Some(reduced) = reduced {
                    let mut call_args = Args {
                        positional: vec![Value::Array(values.clone())],
                        keywords: Vec::new(),
                    };
                    return self.call_func(reduced, &mut call_args);
                }
            }
            let callee = self.attribute(&receiver, method)?;
            let mut call_args = self.eval_args(args, kwargs)?;
            return self.invoke(callee, &mut call_args);
        }

        let callee = self.eval(func)?;
        let mut call_args = self.eval_args(args, kwargs)?;
        self.invoke(callee, &mut call_args)
    }

    fn eval_args(&mut self, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<Args, ExecutionError> {
        let positional = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let keywords = kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), self.eval(arg)?)))
            .collect::<Result<Vec<_>, ExecutionError>>()?;
        Ok(Args {
            positional,
            keywords,
        })
    }

    fn invoke(&mut self, callee: Value, args: &mut Args) -> Result<Value, ExecutionError> {
        match callee {
            Value::Func(func) => self.call_func(func, args),
            other => Err(self.type_error(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn call_func(&mut self, func: Func, args: &mut Args) -> Result<Value, ExecutionError> {
        match func {
            Func::Linspace => {
                let start = self.number(&self.required(args, 0, "start")?)?;
                let stop = self.number(&self.required(args, 1, "stop")?)?;
                let num = match args.take(2, "num") {
                    Some(value) => self.count(&value)?,
                    None => 50,
                };
                let endpoint = !matches!(args.take(3, "endpoint"), Some(Value::Bool(false)));
                self.check_len(num)?;
                if endpoint {
                    Ok(Value::Array(stats::linspace(start, stop, num)))
                } else {
                    let mut values = stats::linspace(start, stop, num + 1);
                    values.pop();
                    Ok(Value::Array(values))
                }
            }
            Func::Arange | Func::Range => {
                let first = self.number(&self.required(args, 0, "start")?)?;
                let (start, stop) = match args.take(1, "stop") {
                    Some(stop) => (first, self.number(&stop)?),
                    None => (0.0, first),
                };
                let step = match args.take(2, "step") {
                    Some(step) => self.number(&step)?,
                    None => 1.0,
                };
                if step == 0.0 || !step.is_finite() {
                    return Err(self.type_error("step must be a non-zero number"));
                }
                let span = ((stop - start) / step).ceil();
                let len = if span > 0.0 { span.min(f64::from(u32::MAX)) as usize } else { 0 };
                self.check_len(len)?;
                Ok(Value::Array((0..len).map(|i| start + step * i as f64).collect()))
            }
            Func::Zeros | Func::Ones => {
                let len = self.count(&self.required(args, 0, "shape")?)?;
                self.check_len(len)?;
                let fill = if func == Func::Zeros { 0.0 } else { 1.0 };
                Ok(Value::Array(vec![fill; len]))
            }
            Func::Array => {
                let value = self.required(args, 0, "object")?;
                Ok(Value::Array(self.to_vec(&value)?))
            }
            Func::List => match args.take(0, "iterable") {
                None => Ok(Value::List(Vec::new())),
                Some(Value::Array(values)) => {
                    Ok(Value::List(values.into_iter().map(Value::Number).collect()))
                }
                Some(Value::List(items)) => Ok(Value::List(items)),
                Some(other) => {
                    Err(self.type_error(format!("'{}' is not iterable", other.type_name())))
                }
            },
            Func::Dict => Ok(Value::Dict(std::mem::take(&mut args.keywords))),
            Func::Len => {
                let len = match self.required(args, 0, "obj")? {
                    Value::Array(values) => values.len(),
                    Value::List(items) => items.len(),
                    Value::Dict(entries) => entries.len(),
                    Value::Str(text) => text.chars().count(),
                    other => {
                        return Err(self.type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Number(len as f64))
            }
            Func::Int => {
                let value = self.required(args, 0, "x")?;
                Ok(Value::Number(self.number(&value)?.trunc()))
            }
            Func::Float => {
                let value = self.required(args, 0, "x")?;
                Ok(Value::Number(self.number(&value)?))
            }
            Func::Round => {
                let value = self.required(args, 0, "x")?;
                let digits = match args.take(1, "ndigits").or_else(|| args.take(1, "decimals")) {
                    Some(d) => self.number(&d)?,
                    None => 0.0,
                };
                let scale = 10f64.powf(digits);
                self.map(&value, |v| (v * scale).round() / scale)
            }
            Func::Abs => self.map(&self.required(args, 0, "x")?, f64::abs),
            Func::Sin => self.map(&self.required(args, 0, "x")?, f64::sin),
            Func::Cos => self.map(&self.required(args, 0, "x")?, f64::cos),
            Func::Tan => self.map(&self.required(args, 0, "x")?, f64::tan),
            Func::Exp => self.map(&self.required(args, 0, "x")?, f64::exp),
            Func::Log => self.map(&self.required(args, 0, "x")?, f64::ln),
            Func::Sqrt => self.map(&self.required(args, 0, "x")?, f64::sqrt),
            Func::Factorial => self.map(&self.required(args, 0, "x")?, stats::factorial),
            Func::Power => {
                let base = self.required(args, 0, "x1")?;
                let exponent = self.required(args, 1, "x2")?;
                self.binary(BinOp::Pow, base, exponent)
            }
            Func::Sum | Func::Max | Func::Min | Func::Mean => {
                let values = if args.positional.len() > 1 && matches!(func, Func::Max | Func::Min) {
                    args.positional
                        .iter()
                        .map(|value| self.number(value))
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    self.to_vec(&self.required(args, 0, "a")?)?
                };
                self.reduce(func, &values)
            }
            Func::Cumsum => {
                let values = self.to_vec(&self.required(args, 0, "a")?)?;
                let mut total = 0.0;
                Ok(Value::Array(
                    values
                        .into_iter()
                        .map(|v| {
                            total += v;
                            total
                        })
                        .collect(),
                ))
            }
            Func::NormalPdf => {
                let x = self.required(args, 0, "x")?;
                let mu = self.optional_number(args, 1, "mu", 0.0)?;
                let sigma = self.optional_number(args, 2, "sigma", 1.0)?;
                self.map(&x, |v| stats::normal_pdf(v, mu, sigma))
            }
            Func::PoissonPmf => {
                let k = self.required(args, 0, "k")?;
                let lambda = self.number(&self.required(args, 1, "lam")?)?;
                self.map(&k, |v| stats::poisson_pmf(v, lambda))
            }
            Func::BinomialPmf => {
                let k = self.required(args, 0, "k")?;
                let n = self.number(&self.required(args, 1, "n")?)?;
                let p = self.number(&self.required(args, 2, "p")?)?;
                self.map(&k, |v| stats::binomial_pmf(v, n, p))
            }
            Func::Print => Ok(Value::None),
            Func::Line | Func::ScatterPlot | Func::BarPlot => self.express(func, args),
            Func::Scatter | Func::Bar => {
                let kind = if func == Func::Bar {
                    TraceKind::Bar
                } else {
                    TraceKind::Scatter
                };
                Ok(Value::Trace(self.trace(kind, args)?))
            }
            Func::Figure => {
                let mut figure = Figure::new();
                match args.take(0, "data") {
                    None => {}
                    Some(Value::Trace(trace)) => figure.add_trace(trace),
                    Some(Value::List(items)) => {
                        for item in items {
                            let Value::Trace(trace) = item else {
                                return Err(self.type_error("Figure data must be traces"));
                            };
                            figure.add_trace(trace);
                        }
                    }
                    Some(other) => {
                        return Err(self.type_error(format!(
                            "Figure data must be traces, found a {}",
                            other.type_name()
                        )))
                    }
                }
                if let Some(layout) = args.take(1, "layout") {
                    let Value::Dict(entries) = layout else {
                        return Err(self.type_error("Figure layout must be a dict"));
                    };
                    for (key, value) in entries {
                        let value = self.to_json(value)?;
                        figure.update_layout(&key, value);
                    }
                }
                Ok(Value::Figure(figure))
            }
        }
    }

    fn optional_number(
        &self,
        args: &mut Args,
        index: usize,
        name: &str,
        default: f64,
    ) -> Result<f64, ExecutionError> {
        match args.take(index, name) {
            Some(value) => self.number(&value),
            None => Ok(default),
        }
    }

    fn count(&self, value: &Value) -> Result<usize, ExecutionError> {
        let n = self.number(value)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(self.type_error("expected a non-negative whole number"));
        }
        Ok(n.min(f64::from(u32::MAX)) as usize)
    }

    fn reduce(&self, func: Func, values: &[f64]) -> Result<Value, ExecutionError> {
        let result = match func {
            Func::Sum => values.iter().sum(),
            Func::Mean if !values.is_empty() => {
                let len = values.len() as f64;
                values.iter().sum::<f64>() / len
            }
            Func::Max if !values.is_empty() => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Func::Min if !values.is_empty() => values.iter().copied().fold(f64::INFINITY, f64::min),
            _ => return Err(self.type_error("reduction of an empty sequence")),
        };
        Ok(Value::Number(result))
    }

    /// `px.line` / `px.scatter` / `px.bar`: a figure with one trace.
    fn express(&mut self, func: Func, args: &mut Args) -> Result<Value, ExecutionError> {
        // first positional is a data frame in plotly; only keywords are read
        let x = match args.take(usize::MAX, "x") {
            Some(value) => Some(self.series(&value)?),
            None => None,
        };
        let y = match args.take(usize::MAX, "y") {
            Some(value) => Some(self.series(&value)?),
            None => None,
        };
        let (x, y) = match (x, y) {
            (Some(x), Some(y)) => (x, y),
            (None, Some(y)) => {
                let index = (0..y.len()).map(|i| i as f64).collect::<Vec<_>>();
                (Series::Numbers(index), y)
            }
            (Some(x), None) => {
                let index = (0..x.len()).map(|i| i as f64).collect::<Vec<_>>();
                (x, Series::Numbers(index))
            }
            (None, None) => return Err(self.type_error("plot needs x or y values")),
        };

        let trace = match func {
            Func::BarPlot => Trace::xy(TraceKind::Bar, x, y),
            Func::ScatterPlot => Trace::xy(TraceKind::Scatter, x, y).mode("markers"),
            _ => Trace::xy(TraceKind::Scatter, x, y).mode("lines"),
        };
        let mut figure = Figure::new().with_trace(trace);
        if let Some(title) = args.take(usize::MAX, "title") {
            let title = self.to_json(title)?;
            figure.update_layout("title", title);
        }
        Ok(Value::Figure(figure))
    }

    fn series(&self, value: &Value) -> Result<Series, ExecutionError> {
        let series = match value {
            Value::List(items) if items.iter().all(|item| matches!(item, Value::Str(_))) && !items.is_empty() => {
                Series::Labels(
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Str(s) => Some(s.clone()),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => Series::Numbers(self.to_vec(other)?),
        };
        self.check_len(series.len())?;
        Ok(series)
    }

    fn matrix(&self, value: &Value) -> Result<Vec<Vec<f64>>, ExecutionError> {
        let Value::List(rows) = value else {
            return Err(self.type_error("z must be a list of rows"));
        };
        let matrix = rows
            .iter()
            .map(|row| self.to_vec(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.check_len(matrix.iter().map(Vec::len).sum())?;
        Ok(matrix)
    }

    /// Build a graph-object trace from keyword arguments.
    fn trace(&self, kind: TraceKind, args: &mut Args) -> Result<Trace, ExecutionError> {
        let mut trace = Trace::new(kind);
        if let Some(x) = args.take(0, "x") {
            trace.x = Some(self.series(&x)?);
        }
        if let Some(y) = args.take(1, "y") {
            trace.y = Some(self.series(&y)?);
        }
        for (key, value) in std::mem::take(&mut args.keywords) {
            match (key.as_str(), value) {
                ("z", value) => trace.z = Some(self.matrix(&value)?),
                ("mode", Value::Str(mode)) => trace.mode = Some(mode),
                ("name", Value::Str(name)) => trace.name = Some(name),
                (key, value) => {
                    let value = self.to_json(value)?;
                    trace.set(key, value);
                }
            }
        }
        Ok(trace)
    }

    /// Returns `None` when the method yields the figure itself.
    fn figure_method(
        &self,
        figure: &mut Figure,
        method: &str,
        args: &mut Args,
    ) -> Result<Option<Value>, ExecutionError> {
        match method {
            "add_trace" => {
                let Some(Value::Trace(trace)) = args.take(0, "trace") else {
                    return Err(self.type_error("add_trace expects a trace"));
                };
                figure.add_trace(trace);
            }
            "add_traces" => {
                let Some(Value::List(items)) = args.take(0, "data") else {
                    return Err(self.type_error("add_traces expects a list of traces"));
                };
                for item in items {
                    let Value::Trace(trace) = item else {
                        return Err(self.type_error("add_traces expects a list of traces"));
                    };
                    figure.add_trace(trace);
                }
            }
            "add_scatter" => figure.add_trace(self.trace(TraceKind::Scatter, args)?),
            "add_bar" => figure.add_trace(self.trace(TraceKind::Bar, args)?),
            "update_layout" | "update_xaxes" | "update_yaxes" => {
                let mut entries = match args.take(0, "dict1") {
                    Some(Value::Dict(entries)) => entries,
                    Some(other) => {
                        return Err(self.type_error(format!(
                            "{method} expects a dict, found a {}",
                            other.type_name()
                        )))
                    }
                    None => Vec::new(),
                };
                entries.extend(std::mem::take(&mut args.keywords));
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key, self.to_json(value)?);
                }
                match method {
                    "update_xaxes" => figure.update_layout("xaxis", Json::Object(object)),
                    "update_yaxes" => figure.update_layout("yaxis", Json::Object(object)),
                    _ => {
                        for (key, value) in object {
                            figure.update_layout(&key, value);
                        }
                    }
                }
            }
            "update_traces" => {
                for (key, value) in std::mem::take(&mut args.keywords) {
                    let value = self.to_json(value)?;
                    for trace in &mut figure.data {
                        match (key.as_str(), &value) {
                            ("mode", Json::String(mode)) => trace.mode = Some(mode.clone()),
                            ("name", Json::String(name)) => trace.name = Some(name.clone()),
                            _ => trace.set(&key, value.clone()),
                        }
                    }
                }
            }
            "show" => return Ok(Some(Value::None)),
            other => {
                return Err(self.type_error(format!("'figure' object has no attribute '{other}'")))
            }
        }
        Ok(None)
    }

    fn to_json(&self, value: Value) -> Result<Json, ExecutionError> {
        let number = |n: f64| Number::from_f64(n).map_or(Json::Null, Json::Number);
        match value {
            Value::None => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(b)),
            Value::Number(n) => Ok(number(n)),
            Value::Str(s) => Ok(Json::String(s)),
            Value::Array(values) => Ok(Json::Array(values.into_iter().map(number).collect())),
            Value::List(items) => items
                .into_iter()
                .map(|item| self.to_json(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            Value::Dict(entries) => {
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(key, self.to_json(value)?);
                }
                Ok(Json::Object(object))
            }
            other => Err(self.type_error(format!(
                "a {} cannot be used as a plot attribute",
                other.type_name()
            ))),
        }
    }
}

enum Numeric {
    Scalar(f64),
    Vector(Vec<f64>),
}

fn arithmetic(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        // sign follows the divisor
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
    }
}

/// Run `source` in a fresh interpreter.
pub fn execute(source: &str, limits: Limits) -> Result<Figure, ExecutionError> {
    Interpreter::new(limits).run(source)
}
