use crate::ExecutionError;
use pest::{
    error::{Error as PestError, LineColLocation},
    iterators::Pair,
    Parser,
};
use std::{num::NonZeroUsize, sync::Once};

/// Deepest bracket nesting accepted. Checked with a flat pass before the
/// recursive grammar rules run.
pub const MAX_NESTING: usize = 32;

/// Tallest expression tree accepted. Evaluation recurses once per level,
/// so this also bounds the interpreter's stack use.
pub const MAX_EXPR_DEPTH: usize = 128;

/// Rule invocations allowed per parse.
const CALL_LIMIT: usize = 5_000_000;

#[derive(pest_derive::Parser)]
#[grammar = "program/figure_script.pest"]
struct ScriptParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    Attr(Box<Expr>, String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        var: String,
        iter: Box<Expr>,
    },
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `import a.b [as c]`
    Import { module: String, alias: Option<String> },
    /// `from a.b import c [as d], ...`
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Assign { target: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// An expression together with the height of its tree.
type Built = (Expr, usize);

pub fn parse(source: &str) -> Result<Vec<Stmt>, ExecutionError> {
    static CALL_LIMIT_SET: Once = Once::new();
    CALL_LIMIT_SET.call_once(|| pest::set_call_limit(NonZeroUsize::new(CALL_LIMIT)));

    check_nesting(source)?;

    let program = ScriptParser::parse(Rule::program, source)
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| syntax(1, "empty parse"))?;

    program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(statement)
        .collect()
}

fn check_nesting(source: &str) -> Result<(), ExecutionError> {
    let Some(scan) = ScriptParser::parse(Rule::scan, source)
        .map_err(syntax_error)?
        .next()
    else {
        return Ok(());
    };

    let mut depth = 0usize;
    for pair in scan.into_inner() {
        match pair.as_rule() {
            Rule::open => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(syntax(
                        line_of(&pair),
                        format!("brackets nest deeper than {MAX_NESTING} levels"),
                    ));
                }
            }
            Rule::close => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn syntax_error(error: PestError<Rule>) -> ExecutionError {
    let error = error.renamed_rules(|rule| describe(*rule).to_string());
    let line = match error.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    syntax(line, error.variant.message())
}

fn syntax(line: usize, message: impl Into<String>) -> ExecutionError {
    ExecutionError::Syntax {
        line,
        message: message.into(),
    }
}

fn describe(rule: Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of input",
        Rule::expr | Rule::term | Rule::factor | Rule::power | Rule::postfix => "an expression",
        Rule::add_op | Rule::mul_op | Rule::pow_op => "an operator",
        Rule::neg_op => "a sign",
        Rule::attr => "'.'",
        Rule::call => "'('",
        Rule::index => "'['",
        Rule::arguments | Rule::kwarg => "an argument",
        Rule::name | Rule::dotted_name => "a name",
        Rule::number => "a number",
        Rule::strings | Rule::string => "a string",
        Rule::assign_op => "'='",
        Rule::comp_tail | Rule::kw_for => "'for'",
        Rule::kw_in => "'in'",
        Rule::kw_import => "'import'",
        Rule::kw_as | Rule::alias => "'as'",
        _ => "a statement",
    }
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Inner pairs without keyword and `=` tokens.
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|inner| {
        !matches!(
            inner.as_rule(),
            Rule::kw_import
                | Rule::kw_from
                | Rule::kw_as
                | Rule::kw_for
                | Rule::kw_in
                | Rule::assign_op
        )
    })
}

fn next<'i>(
    parts: &mut impl Iterator<Item = Pair<'i, Rule>>,
    line: usize,
) -> Result<Pair<'i, Rule>, ExecutionError> {
    parts.next().ok_or_else(|| syntax(line, "incomplete construct"))
}

fn alias(pair: Pair<'_, Rule>) -> Option<String> {
    significant(pair).next().map(|name| name.as_str().to_string())
}

fn statement(pair: Pair<'_, Rule>) -> Result<Stmt, ExecutionError> {
    let line = line_of(&pair);
    let rule = pair.as_rule();
    let mut parts = significant(pair);

    let kind = match rule {
        Rule::import_stmt => StmtKind::Import {
            module: next(&mut parts, line)?.as_str().to_string(),
            alias: parts.next().and_then(alias),
        },
        Rule::from_stmt => {
            let module = next(&mut parts, line)?.as_str().to_string();
            let names = next(&mut parts, line)?
                .into_inner()
                .map(|item| -> Result<(String, Option<String>), ExecutionError> {
                    let mut item = item.into_inner();
                    let name = next(&mut item, line)?.as_str().to_string();
                    Ok((name, item.next().and_then(alias)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            StmtKind::FromImport { module, names }
        }
        Rule::assign_stmt => StmtKind::Assign {
            target: next(&mut parts, line)?.as_str().to_string(),
            value: expr(next(&mut parts, line)?)?.0,
        },
        Rule::expr_stmt => StmtKind::Expr(expr(next(&mut parts, line)?)?.0),
        other => return Err(syntax(line, format!("unexpected {}", describe(other)))),
    };

    Ok(Stmt { line, kind })
}

fn taller(height: usize, line: usize) -> Result<usize, ExecutionError> {
    let height = height + 1;
    if height > MAX_EXPR_DEPTH {
        return Err(syntax(
            line,
            format!("expression nests deeper than {MAX_EXPR_DEPTH} levels"),
        ));
    }
    Ok(height)
}

fn negate((mut expr, mut height): Built, count: usize, line: usize) -> Result<Built, ExecutionError> {
    for _ in 0..count {
        height = taller(height, line)?;
        expr = Expr::Neg(Box::new(expr));
    }
    Ok((expr, height))
}

fn expr(pair: Pair<'_, Rule>) -> Result<Built, ExecutionError> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            let mut parts = pair.into_inner();
            let (mut left, mut height) = expr(next(&mut parts, line)?)?;
            while let Some(op) = parts.next() {
                let op = match op.as_str().trim() {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    "%" => BinOp::Mod,
                    other => return Err(syntax(line, format!("unknown operator '{other}'"))),
                };
                let (right, right_height) = expr(next(&mut parts, line)?)?;
                height = taller(height.max(right_height), line)?;
                left = Expr::Binary(op, Box::new(left), Box::new(right));
            }
            Ok((left, height))
        }
        Rule::factor => {
            let mut minus = 0;
            let mut operand = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::neg_op if part.as_str() == "-" => minus += 1,
                    Rule::neg_op => {}
                    _ => operand = Some(expr(part)?),
                }
            }
            let operand = operand.ok_or_else(|| syntax(line, "missing operand"))?;
            negate(operand, minus, line)
        }
        // `-a ** -b ** c` is `-(a ** (-(b ** c)))`: signs before an
        // exponent apply to the rest of the chain.
        Rule::power => {
            let mut operands = Vec::new();
            let mut minus = 0;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::pow_op => {}
                    Rule::neg_op if part.as_str() == "-" => minus += 1,
                    Rule::neg_op => {}
                    _ => {
                        operands.push((minus, expr(part)?));
                        minus = 0;
                    }
                }
            }
            let (minus, last) = operands.pop().ok_or_else(|| syntax(line, "missing operand"))?;
            let mut chain = negate(last, minus, line)?;
            while let Some((minus, (base, base_height))) = operands.pop() {
                let height = taller(base_height.max(chain.1), line)?;
                let pow = Expr::Binary(BinOp::Pow, Box::new(base), Box::new(chain.0));
                chain = negate((pow, height), minus, line)?;
            }
            Ok(chain)
        }
        Rule::postfix => {
            let mut parts = pair.into_inner();
            let (mut target, mut height) = expr(next(&mut parts, line)?)?;
            for trailer in parts {
                let trailer_line = line_of(&trailer);
                match trailer.as_rule() {
                    Rule::attr => {
                        let attr = next(&mut trailer.into_inner(), trailer_line)?;
                        height = taller(height, trailer_line)?;
                        target = Expr::Attr(Box::new(target), attr.as_str().to_string());
                    }
                    Rule::call => {
                        let (args, kwargs, args_height) = match trailer.into_inner().next() {
                            Some(arguments) => call_arguments(arguments)?,
                            None => (Vec::new(), Vec::new(), 0),
                        };
                        height = taller(height.max(args_height), trailer_line)?;
                        target = Expr::Call {
                            func: Box::new(target),
                            args,
                            kwargs,
                        };
                    }
                    _ => {
                        let (index, index_height) =
                            expr(next(&mut trailer.into_inner(), trailer_line)?)?;
                        height = taller(height.max(index_height), trailer_line)?;
                        target = Expr::Index(Box::new(target), Box::new(index));
                    }
                }
            }
            Ok((target, height))
        }
        Rule::number => {
            let text: String = pair.as_str().chars().filter(|c| *c != '_').collect();
            text.parse::<f64>()
                .map(|n| (Expr::Number(n), 1))
                .map_err(|_| syntax(line, format!("invalid number '{text}'")))
        }
        Rule::strings => {
            let mut text = String::new();
            for string in pair.into_inner() {
                if let Some(body) = string.into_inner().next() {
                    unescape_into(body.as_str(), &mut text);
                }
            }
            Ok((Expr::Str(text), 1))
        }
        Rule::constant => Ok((
            match pair.as_str() {
                "True" => Expr::Bool(true),
                "False" => Expr::Bool(false),
                _ => Expr::None,
            },
            1,
        )),
        Rule::name => Ok((Expr::Name(pair.as_str().to_string()), 1)),
        Rule::paren => expr(next(&mut pair.into_inner(), line)?),
        Rule::list => list(pair, line),
        Rule::dict => {
            let mut entries = Vec::new();
            let mut height = 0;
            for entry in pair.into_inner() {
                let mut sides = entry.into_inner();
                let (key, key_height) = expr(next(&mut sides, line)?)?;
                let (value, value_height) = expr(next(&mut sides, line)?)?;
                height = height.max(key_height).max(value_height);
                entries.push((key, value));
            }
            Ok((Expr::Dict(entries), taller(height, line)?))
        }
        other => Err(syntax(line, format!("unexpected {}", describe(other)))),
    }
}

fn list(pair: Pair<'_, Rule>, line: usize) -> Result<Built, ExecutionError> {
    let mut parts = pair.into_inner();
    let Some(first) = parts.next() else {
        return Ok((Expr::List(Vec::new()), 1));
    };
    let (first, mut height) = expr(first)?;
    let tail = next(&mut parts, line)?;

    if tail.as_rule() == Rule::comp_tail {
        let mut tail = significant(tail);
        let var = next(&mut tail, line)?.as_str().to_string();
        let (iter, iter_height) = expr(next(&mut tail, line)?)?;
        return Ok((
            Expr::ListComp {
                element: Box::new(first),
                var,
                iter: Box::new(iter),
            },
            taller(height.max(iter_height), line)?,
        ));
    }

    let mut items = vec![first];
    for item in tail.into_inner() {
        let (item, item_height) = expr(item)?;
        height = height.max(item_height);
        items.push(item);
    }
    Ok((Expr::List(items), taller(height, line)?))
}

type Arguments = (Vec<Expr>, Vec<(String, Expr)>, usize);

fn call_arguments(pair: Pair<'_, Rule>) -> Result<Arguments, ExecutionError> {
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();
    let mut height = 0;

    for argument in pair.into_inner() {
        let line = line_of(&argument);
        if argument.as_rule() == Rule::kwarg {
            let mut parts = significant(argument);
            let name = next(&mut parts, line)?.as_str().to_string();
            let (value, value_height) = expr(next(&mut parts, line)?)?;
            height = height.max(value_height);
            kwargs.push((name, value));
        } else if kwargs.is_empty() {
            let (value, value_height) = expr(argument)?;
            height = height.max(value_height);
            args.push(value);
        } else {
            return Err(syntax(line, "positional argument follows keyword argument"));
        }
    }
    Ok((args, kwargs, height))
}

fn unescape_into(raw: &str, out: &mut String) {
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            // line continuation inside a literal
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    fn value(source: &str) -> Expr {
        match parse(source).unwrap().remove(0).kind {
            StmtKind::Assign { value, .. } => value,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_imports() {
        let program = parse(
            "import plotly.express as px\nfrom numpy import sin, cos as c\nfrom math import (\n  pi,\n  e,\n)",
        )
        .unwrap();
        assert_eq!(
            program[0].kind,
            StmtKind::Import {
                module: "plotly.express".to_string(),
                alias: Some("px".to_string())
            }
        );
        assert_eq!(
            program[1].kind,
            StmtKind::FromImport {
                module: "numpy".to_string(),
                names: vec![("sin".to_string(), None), ("cos".to_string(), Some("c".to_string()))]
            }
        );
        assert_eq!(program[1].line, 2);
        assert!(matches!(&program[2].kind, StmtKind::FromImport { names, .. } if names.len() == 2));
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        assert_eq!(
            value("y = -x ** 2 * 3"),
            Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::Neg(Box::new(Expr::Binary(
                    BinOp::Pow,
                    name("x"),
                    Box::new(Expr::Number(2.0))
                )))),
                Box::new(Expr::Number(3.0))
            )
        );
        assert_eq!(
            value("y = 2 ** -x ** 2"),
            Expr::Binary(
                BinOp::Pow,
                Box::new(Expr::Number(2.0)),
                Box::new(Expr::Neg(Box::new(Expr::Binary(
                    BinOp::Pow,
                    name("x"),
                    Box::new(Expr::Number(2.0))
                ))))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            value("y = a - b - 1_000"),
            Expr::Binary(
                BinOp::Sub,
                Box::new(Expr::Binary(BinOp::Sub, name("a"), name("b"))),
                Box::new(Expr::Number(1000.0))
            )
        );
    }

    #[test]
    fn parses_calls_with_keywords_and_comprehensions() {
        let program = parse("fig.add_bar(x=k, y=[f(v) for v in k], name='PMF')").unwrap();
        let StmtKind::Expr(Expr::Call { func, args, kwargs }) = &program[0].kind else {
            panic!("expected call");
        };
        assert_eq!(**func, Expr::Attr(name("fig"), "add_bar".to_string()));
        assert!(args.is_empty());
        assert_eq!(kwargs.len(), 3);
        assert!(matches!(kwargs[1].1, Expr::ListComp { .. }));
    }

    #[test]
    fn newlines_inside_brackets_continue_the_statement() {
        let program = parse(
            "fig = px.line(  # chart\n    x=x,\n    y=[1, 2,\n       3],\n    title=('Normal '\n           \"PDF\"),\n)\nz = {'a': 1,\n     'b': .5e1}",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[1].line, 8);
        let StmtKind::Assign { value: Expr::Call { kwargs, .. }, .. } = &program[0].kind else {
            panic!("expected call");
        };
        assert_eq!(kwargs[2].1, Expr::Str("Normal PDF".to_string()));
        let StmtKind::Assign { value: Expr::Dict(entries), .. } = &program[1].kind else {
            panic!("expected dict");
        };
        assert_eq!(entries[1].1, Expr::Number(5.0));
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(value(r#"t = "a\"b\n" + 'c'"#), Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Str("a\"b\n".to_string())),
            Box::new(Expr::Str("c".to_string()))
        ));
        assert_eq!(value("t = '''x\ny'''"), Expr::Str("x\ny".to_string()));
    }

    #[test]
    fn rejects_control_flow_and_comparisons() {
        assert!(matches!(
            parse("x = 1\nfor i in x:\n  pass"),
            Err(ExecutionError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            parse("def f():\n  return 1"),
            Err(ExecutionError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            parse("x = 1\nif x == 1"),
            Err(ExecutionError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            parse("x = 1\ny = 'open"),
            Err(ExecutionError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn positional_after_keyword_is_rejected() {
        let err = parse("f(a=1,\n  2)").unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Syntax {
                line: 2,
                message: "positional argument follows keyword argument".to_string()
            }
        );
    }

    #[test]
    fn deep_bracket_nesting_is_rejected_before_parsing() {
        let source = format!("x = 1\nfig = {}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert_eq!(
            parse(&source).unwrap_err(),
            ExecutionError::Syntax {
                line: 2,
                message: format!("brackets nest deeper than {MAX_NESTING} levels")
            }
        );

        let shallow = format!("x = {}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(value(&shallow), Expr::Number(1.0));
        // brackets inside strings and comments do not count
        let quoted = format!("t = '{}'  # {}", "(".repeat(100), "[".repeat(100));
        assert!(parse(&quoted).is_ok());
    }

    #[test]
    fn tall_expression_trees_are_rejected() {
        let negations = format!("x = {}1", "-".repeat(10_000));
        assert!(matches!(
            parse(&negations),
            Err(ExecutionError::Syntax { message, .. }) if message.contains("deeper than")
        ));

        let sum = format!("x = 1{}", " + 1".repeat(10_000));
        assert!(matches!(parse(&sum), Err(ExecutionError::Syntax { .. })));

        let powers = format!("x = 2{}", " ** 1".repeat(10_000));
        assert!(matches!(parse(&powers), Err(ExecutionError::Syntax { .. })));

        let wide = format!("x = [{}]", vec!["1"; 10_000].join(", "));
        assert!(matches!(value(&wide), Expr::List(items) if items.len() == 10_000));
    }
}
