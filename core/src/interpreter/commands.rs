//! Statement dispatcher
//!
//! Runs one non-loop statement against the runtime: printing, assignments,
//! data commands, estimation and calls to user-defined functions. The loop
//! engine hands it every body statement it does not handle itself.

use tracing::info;

use super::errors::{EvalError, ExecResult, LoopError};
use super::expr;
use super::model::{self, Model, OlsSpec};
use super::output::format_g;
use super::parser::{classify, first_word, rest_of, split_top_level, StatementKind};
use super::runtime::Runtime;
use super::stdlib::strings::format_printf;
use super::workspace::{Calendar, Value, Workspace};

/* ===================== Dispatch ===================== */

pub fn dispatch(text: &str, rt: &mut Runtime) -> ExecResult {
    let text = text.trim();
    let word = first_word(text);
    let args = rest_of(text);

    match word {
        "print" => print(args, rt),
        "printf" => printf(args, rt),
        "eval" => eval(args, rt),
        "list" => define_list(args, &mut rt.ws),
        "delete" => {
            for name in words(args) {
                rt.ws.delete(&name)?;
            }
            Ok(())
        }
        "rename" => match words(args).as_slice() {
            [old, new] => Ok(rt.ws.rename(old, new)?),
            _ => Err(EvalError::syntax(text, "usage: rename OLD NEW").into()),
        },
        "open" => open_csv(args, rt),
        "nulldata" => {
            let n: usize = args
                .parse()
                .map_err(|_| EvalError::syntax(text, "nulldata needs a number of observations"))?;
            rt.ws.new_dataset(n);
            Ok(())
        }
        "setobs" => match words(args).as_slice() {
            [freq, start] => {
                let freq: u32 = freq
                    .parse()
                    .map_err(|_| EvalError::syntax(text, "setobs needs a numeric frequency"))?;
                rt.ws.set_calendar(Calendar::from_setobs(freq, start)?)?;
                Ok(())
            }
            _ => Err(EvalError::syntax(text, "usage: setobs FREQ START").into()),
        },
        "set" => set(args, rt),
        "ols" => estimate(text, rt, false).map(|_| ()),
        _ if args.starts_with('(') && rt.has_function(word) => {
            if args != "()" {
                return Err(EvalError::function(word, "user functions take no arguments").into());
            }
            rt.call_function(word)
        }
        _ if classify(text).kind == StatementKind::Genr => {
            let fragment = expr::compile(text)?;
            expr::evaluate(&fragment, &mut rt.ws)?;
            Ok(())
        }
        _ if args.starts_with('(') => Err(EvalError::UnknownFunction(word.to_string()).into()),
        _ => Err(EvalError::UnknownCommand(word.to_string()).into()),
    }
}

/// Split command arguments on whitespace and commas
pub fn words(args: &str) -> Vec<String> {
    args.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Current values of named scalars, for progressive print and store
pub fn scalar_values(names: &[String], ws: &Workspace) -> Result<Vec<f64>, EvalError> {
    names
        .iter()
        .map(|name| match ws.get(name) {
            Some(Value::Scalar(x)) => Ok(*x),
            Some(_) => Err(EvalError::NotScalar(name.clone())),
            None => Err(EvalError::Undefined(name.clone())),
        })
        .collect()
}

/// Estimate a model, print it unless quiet, and make it the last model
pub fn estimate(text: &str, rt: &mut Runtime, quiet: bool) -> ExecResult<Model> {
    let spec = OlsSpec::parse(rest_of(text))?;
    let model = model::ols(&rt.ws, &spec)?;
    if !(quiet || spec.quiet) {
        model.print(&rt.ws, &mut rt.out);
    }
    rt.ws.register_model(model.clone());
    Ok(model)
}

/* ===================== Printing ===================== */

fn print(args: &str, rt: &mut Runtime) -> ExecResult {
    if args.is_empty() {
        rt.out.blank();
        return Ok(());
    }
    if args.starts_with('"') {
        let expr = expr::compile_expr(args)?;
        let value = expr::evaluate_value(&expr, &mut rt.ws, false)?;
        rt.out.line(&render(&value));
        return Ok(());
    }
    for name in words(args) {
        let value = rt
            .ws
            .get(&name)
            .ok_or_else(|| EvalError::Undefined(name.clone()))?;
        let shown = match value {
            Value::Scalar(x) => format!("{} = {}", name, format_g(*x, 6)),
            Value::Str(s) => s.clone(),
            Value::Series(xs) => {
                let cal = rt.ws.calendar();
                let mut block = format!("{}:", name);
                for (t, x) in xs.iter().enumerate() {
                    block.push_str(&format!("\n{:>12} {:>14}", cal.label(t), format_g(*x, 6)));
                }
                block
            }
            Value::List(members) => format!("{}: {}", name, members.join(" ")),
            Value::Strings(items) => format!("{}: {}", name, items.join(" ")),
            Value::Bundle(map) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                format!("bundle {}: {}", name, keys.join(" "))
            }
        };
        rt.out.line(&shown);
    }
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::Scalar(x) => format_g(*x, 6),
        Value::Str(s) => s.clone(),
        Value::Series(xs) => xs.iter().map(|x| format_g(*x, 6)).collect::<Vec<_>>().join(" "),
        Value::List(items) | Value::Strings(items) => items.join(" "),
        Value::Bundle(map) => map.keys().cloned().collect::<Vec<_>>().join(" "),
    }
}

fn printf(args: &str, rt: &mut Runtime) -> ExecResult {
    let parts = split_top_level(args, ',');
    let Some((fmt, rest)) = parts.split_first() else {
        return Err(EvalError::syntax(args, "printf needs a format string").into());
    };
    let fmt = expr::compile_expr(fmt)?;
    let fmt = match expr::evaluate_value(&fmt, &mut rt.ws, false)? {
        Value::Str(s) => s,
        other => {
            return Err(EvalError::Type(format!("printf format must be a string, got {}", other.type_name())).into())
        }
    };
    let mut values = Vec::with_capacity(rest.len());
    for part in rest {
        let e = expr::compile_expr(part)?;
        values.push(expr::evaluate_value(&e, &mut rt.ws, false)?);
    }
    let text = format_printf(&fmt, &values)?;
    rt.out.text(&text);
    Ok(())
}

fn eval(args: &str, rt: &mut Runtime) -> ExecResult {
    let fragment = expr::compile(args)?;
    let value = expr::evaluate(&fragment, &mut rt.ws)?;
    rt.out.line(&render(&value));
    Ok(())
}

/* ===================== Data Commands ===================== */

/// `list L = a b c*`; members must be series, wildcards match in dataset order
fn define_list(args: &str, ws: &mut Workspace) -> ExecResult {
    let (name, members) = args
        .split_once('=')
        .ok_or_else(|| EvalError::syntax(args, "usage: list NAME = series..."))?;
    let name = name.trim();

    let mut out: Vec<String> = Vec::new();
    for word in words(members) {
        if word.contains(['*', '?']) {
            let pat = glob::Pattern::new(&word)
                .map_err(|e| EvalError::Data(format!("bad wildcard '{}': {}", word, e)))?;
            out.extend(ws.series_names().iter().filter(|s| pat.matches(s)).cloned());
            continue;
        }
        match ws.get(&word) {
            Some(Value::Series(_)) => out.push(word),
            Some(Value::List(inner)) => out.extend(inner.iter().cloned()),
            Some(other) => {
                return Err(EvalError::Type(format!("'{}' is a {}, lists hold series", word, other.type_name())).into())
            }
            None => return Err(EvalError::Undefined(word).into()),
        }
    }
    ws.assign(name, Value::List(out))?;
    Ok(())
}

fn set(args: &str, rt: &mut Runtime) -> ExecResult {
    let bad = || EvalError::syntax(args, "usage: set seed N | set loop_maxiter N");
    match words(args).as_slice() {
        [key, value] if key == "seed" => {
            let seed: u64 = value.parse().map_err(|_| bad())?;
            rt.ws.reseed(seed);
            Ok(())
        }
        [key, value] if key == "loop_maxiter" => {
            rt.limits.max_while_iterations = value.parse().map_err(|_| bad())?;
            Ok(())
        }
        [key, ..] => Err(EvalError::UnknownCommand(format!("set {}", key)).into()),
        [] => Err(bad().into()),
    }
}

/// Load a comma-separated file with a header row; empty cells and `NA` are missing
fn open_csv(args: &str, rt: &mut Runtime) -> ExecResult {
    let path = args.trim().trim_matches('"');
    let source = std::fs::read_to_string(path).map_err(|source| LoopError::Io {
        path: path.to_string(),
        source,
    })?;
    let columns = parse_csv(&source).map_err(|e| EvalError::Data(format!("{}: {}", path, e)))?;
    let nobs = columns.first().map(|(_, xs)| xs.len()).unwrap_or(0);
    let nvars = columns.len();
    rt.ws.load_dataset(columns, nobs)?;
    info!(path, nobs, nvars, "data loaded");
    rt.out.line(&format!("Read datafile {}: {} observations, {} variables", path, nobs, nvars));
    Ok(())
}

fn parse_csv(source: &str) -> Result<Vec<(String, Vec<f64>)>, String> {
    let mut lines = source.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or("the file is empty")?;
    let mut columns: Vec<(String, Vec<f64>)> = header
        .split(',')
        .map(|h| (h.trim().trim_matches('"').to_string(), Vec::new()))
        .collect();

    for (row, line) in lines.enumerate() {
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != columns.len() {
            return Err(format!(
                "row {} has {} fields, expected {}",
                row + 2,
                cells.len(),
                columns.len()
            ));
        }
        for ((name, xs), cell) in columns.iter_mut().zip(cells) {
            let cell = cell.trim();
            let x = match cell {
                "" | "NA" | "na" | "." => f64::NAN,
                _ => cell
                    .parse()
                    .map_err(|_| format!("row {}: '{}' in column {} is not numeric", row + 2, cell, name))?,
            };
            xs.push(x);
        }
    }
    Ok(columns)
}
