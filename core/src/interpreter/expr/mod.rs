//! Expression compiler
//!
//! Turns assignment statements, conditions and loop bounds into a `Fragment`
//! that can be evaluated repeatedly against the workspace. Fragments hold
//! names, never values, so a cached fragment behaves exactly like compiling
//! its text again.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::errors::EvalError;

mod eval;

pub use eval::{evaluate, evaluate_condition, evaluate_number, evaluate_value};


/* ===================== AST ===================== */

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Var(String),
    /// `$name` accessors such as `$nobs` or `$error`
    Accessor(String),
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
}

/// Type keyword in front of an assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decl {
    Scalar,
    Series,
    String,
    Strings,
    Bundle,
    Genr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Compiled form of a statement or expression
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Assign {
        decl: Option<Decl>,
        name: String,
        op: AssignOp,
        expr: Expr,
    },
    /// `x++` / `x--`
    Step { name: String, delta: f64 },
    Eval(Expr),
}

impl Fragment {
    /// Name written by the fragment, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Fragment::Assign { name, .. } | Fragment::Step { name, .. } => Some(name),
            Fragment::Eval(_) => None,
        }
    }
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/expr/expr.pest"]
struct ExprParser;

/* ===================== Public API ===================== */

/// Compile an assignment or a bare expression
pub fn compile(text: &str) -> Result<Fragment, EvalError> {
    let text = text.trim();
    if let Ok(mut pairs) = ExprParser::parse(Rule::statement, text) {
        let statement = next(&mut pairs, text)?;
        return build_statement(statement, text);
    }
    compile_expr(text).map(Fragment::Eval)
}

/// Compile a bare expression; assignments are rejected
pub fn compile_expr(text: &str) -> Result<Expr, EvalError> {
    let text = text.trim();
    let mut pairs = ExprParser::parse(Rule::expression, text).map_err(|e| {
        EvalError::syntax(text, e.variant.message().to_string())
    })?;
    let expression = next(&mut pairs, text)?;
    let expr = next(&mut expression.into_inner(), text)?;
    build_expr(expr, text)
}

/* ===================== AST Builder ===================== */

fn next<'i>(pairs: &mut Pairs<'i, Rule>, text: &str) -> Result<Pair<'i, Rule>, EvalError> {
    pairs
        .next()
        .ok_or_else(|| EvalError::syntax(text, "unexpected end of expression"))
}

fn build_statement(pair: Pair<Rule>, text: &str) -> Result<Fragment, EvalError> {
    // statement = { SOI ~ (decl ~ target | target) ~ EOI }
    let mut decl = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::decl => {
                decl = Some(match item.as_str() {
                    "scalar" => Decl::Scalar,
                    "series" => Decl::Series,
                    "string" => Decl::String,
                    "strings" => Decl::Strings,
                    "bundle" => Decl::Bundle,
                    _ => Decl::Genr,
                })
            }
            Rule::assignment => {
                let mut inner = item.into_inner();
                let name = next(&mut inner, text)?.as_str().to_string();
                let op = match next(&mut inner, text)?.as_str() {
                    "+=" => AssignOp::Add,
                    "-=" => AssignOp::Sub,
                    "*=" => AssignOp::Mul,
                    "/=" => AssignOp::Div,
                    _ => AssignOp::Set,
                };
                let expr = build_expr(next(&mut inner, text)?, text)?;
                return Ok(Fragment::Assign { decl, name, op, expr });
            }
            Rule::increment => {
                let mut inner = item.into_inner();
                let name = next(&mut inner, text)?.as_str().to_string();
                let delta = if next(&mut inner, text)?.as_str() == "++" { 1.0 } else { -1.0 };
                return Ok(Fragment::Step { name, delta });
            }
            _ => {}
        }
    }
    Err(EvalError::syntax(text, "expected an assignment"))
}

fn build_expr(pair: Pair<Rule>, text: &str) -> Result<Expr, EvalError> {
    match pair.as_rule() {
        Rule::expr | Rule::and_expr | Rule::cmp_expr | Rule::sum_expr | Rule::prod_expr => {
            // layer = { operand ~ (op ~ operand)* }, folded left to right
            let mut inner = pair.into_inner();
            let mut lhs = build_expr(next(&mut inner, text)?, text)?;
            while let Some(op) = inner.next() {
                let rhs = build_expr(next(&mut inner, text)?, text)?;
                lhs = Expr::Binary {
                    op: binop(op.as_rule(), text)?,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
            }
            Ok(lhs)
        }
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for item in pair.into_inner() {
                match item.as_rule() {
                    Rule::neg => ops.push(UnaryOp::Neg),
                    Rule::not => ops.push(UnaryOp::Not),
                    _ => operand = Some(build_expr(item, text)?),
                }
            }
            let mut expr = operand.ok_or_else(|| EvalError::syntax(text, "missing operand"))?;
            for op in ops.into_iter().rev() {
                expr = Expr::Unary {
                    op,
                    expr: Box::new(expr),
                };
            }
            Ok(expr)
        }
        Rule::power => {
            // power = { postfix ~ (pow ~ unary)? }
            let mut inner = pair.into_inner();
            let base = build_expr(next(&mut inner, text)?, text)?;
            match inner.next() {
                Some(_) => Ok(Expr::Binary {
                    op: BinOp::Pow,
                    lhs: Box::new(base),
                    rhs: Box::new(build_expr(next(&mut inner, text)?, text)?),
                }),
                None => Ok(base),
            }
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = build_expr(next(&mut inner, text)?, text)?;
            for index in inner {
                let idx = build_expr(next(&mut index.into_inner(), text)?, text)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(idx),
                };
            }
            Ok(expr)
        }
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(Expr::Num)
            .map_err(|e| EvalError::syntax(text, format!("bad number '{}': {}", pair.as_str(), e))),
        Rule::string => {
            let content = next(&mut pair.into_inner(), text)?;
            Ok(Expr::Str(content.as_str().to_string()))
        }
        Rule::accessor => Ok(Expr::Accessor(pair.as_str()[1..].to_string())),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next(&mut inner, text)?.as_str().to_string();
            let args = inner
                .map(|arg| build_expr(arg, text))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call { name, args })
        }
        other => Err(EvalError::syntax(text, format!("unexpected {:?}", other))),
    }
}

fn binop(rule: Rule, text: &str) -> Result<BinOp, EvalError> {
    Ok(match rule {
        Rule::or => BinOp::Or,
        Rule::and => BinOp::And,
        Rule::eq => BinOp::Eq,
        Rule::ne => BinOp::Ne,
        Rule::le => BinOp::Le,
        Rule::ge => BinOp::Ge,
        Rule::lt => BinOp::Lt,
        Rule::gt => BinOp::Gt,
        Rule::add => BinOp::Add,
        Rule::sub => BinOp::Sub,
        Rule::mul => BinOp::Mul,
        Rule::div => BinOp::Div,
        Rule::pow => BinOp::Pow,
        other => return Err(EvalError::syntax(text, format!("unexpected operator {:?}", other))),
    })
}
