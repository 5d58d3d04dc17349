//! Iteration state machine
//!
//! ## Function Organization
//! 1. execute() - entry point for an outermost (or function-attached) loop
//! 2. run_loop() - top of loop, iteration, teardown; recursed into for children
//! 3. next_pass() - per-kind condition check and index update
//! 4. run_pass() / step() - one pass over the command buffer

use std::collections::btree_map::Entry;

use tracing::{debug, trace, warn};

use super::super::commands;
use super::super::errors::{EvalError, ExecResult, LoopError};
use super::super::expr::{self, Fragment};
use super::super::parser::rest_of;
use super::super::runtime::Runtime;
use super::super::workspace::{Value, Workspace};
use super::command::{CommandKind, CommandRecord};
use super::controller::Controller;
use super::flow::IfStack;
use super::progressive::{self, Accumulator, Role, StoreTable, Tracker};
use super::substitute::{substitute, Marker};
use super::{Loop, LoopKind, RunState};

/// How a pass over the body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Completed,
    Break,
    Continue,
}

/// What the pass should do after one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Break,
    Continue,
}

/* ===================== Public API ===================== */

/// Run a complete loop tree
///
/// A model estimated on the final pass becomes the caller's last model;
/// models from earlier passes only are discarded and the caller's previous
/// model is restored.
pub fn execute(lp: &mut Loop, rt: &mut Runtime) -> ExecResult {
    let saved = rt.ws.last_model().cloned();
    let serial_before = rt.ws.model_serial();
    let mut markers = Vec::new();

    let result = run_loop(lp, rt, &mut markers);

    if result.is_ok() {
        let serial = rt.ws.model_serial();
        let from_final_pass = serial > lp.state.pass_serial;
        if serial != serial_before && !from_final_pass {
            rt.ws.restore_last_model(saved);
        }
    }
    lp.release();
    debug!(line = lp.lineno, attached = lp.attached, "loop run released");
    result
}

/* ===================== Loop Lifecycle ===================== */

fn run_loop(lp: &mut Loop, rt: &mut Runtime, markers: &mut Vec<Marker>) -> ExecResult {
    top_of_loop(lp, rt, markers).map_err(|e| e.at(lp.lineno, &lp.header))?;

    let index_var = if lp.kind.has_marker() {
        lp.index_var.clone()
    } else {
        None
    };
    if let Some(var) = &index_var {
        rt.ws
            .lock(var)
            .map_err(|e| LoopError::from(e).at(lp.lineno, &lp.header))?;
        markers.push(Marker {
            name: var.clone(),
            value: String::new(),
        });
    }
    debug!(
        line = lp.lineno,
        kind = lp.kind.as_str(),
        level = lp.level,
        itermax = lp.state.itermax,
        "loop started"
    );

    let result = iterate(lp, rt, markers);

    if let Some(var) = &index_var {
        markers.pop();
        rt.ws.unlock(var);
    }
    result?;

    if lp.is_progressive() {
        progressive::report(&lp.trackers, &mut rt.out).map_err(|e| e.at(lp.lineno, &lp.header))?;
    }
    debug!(line = lp.lineno, iterations = lp.state.iter, "loop finished");
    Ok(())
}

/// Evaluate bounds and capture the iteration source for a fresh run
fn top_of_loop(lp: &mut Loop, rt: &mut Runtime, markers: &[Marker]) -> ExecResult {
    lp.state = RunState {
        step: 1,
        pass_serial: rt.ws.model_serial(),
        ..RunState::default()
    };
    if lp.renaming {
        lp.invalidate();
    }
    for tracker in lp.trackers.values_mut() {
        tracker.reset();
    }
    let cache_ok = !lp.renaming;
    let ws = &mut rt.ws;

    match lp.kind {
        LoopKind::Count => {
            let n = lp.final_.resolve(ws, markers, cache_ok)?;
            if n < 0.0 {
                return Err(EvalError::Data(format!("loop count must be non-negative, got {}", n)).into());
            }
            lp.state.itermax = n.trunc() as usize;
        }
        LoopKind::Index | LoopKind::Dated => {
            let (start, end) = if lp.kind == LoopKind::Dated {
                (date_position(&lp.init, ws)?, date_position(&lp.final_, ws)?)
            } else {
                (
                    integral(lp.init.resolve(ws, markers, cache_ok)?, "loop start")?,
                    integral(lp.final_.resolve(ws, markers, cache_ok)?, "loop end")?,
                )
            };
            let (lo, hi) = if lp.options.decrement {
                lp.state.step = -1;
                (end, start)
            } else {
                (start, end)
            };
            lp.state.start = start;
            lp.state.itermax = span(lo, hi)?;
        }
        LoopKind::Each => {
            lp.state.members = members(&lp.each_words, ws, markers, rt.limits.max_for_iterations)?;
            lp.state.itermax = lp.state.members.len();
        }
        LoopKind::While => {
            lp.state.itermax = rt.limits.max_while_iterations;
        }
        LoopKind::For => {
            if lp.init != Controller::Unset {
                lp.init.run(ws, markers, cache_ok)?;
            }
            lp.state.itermax = rt.limits.max_for_iterations;
        }
    }
    Ok(())
}

fn integral(x: f64, what: &str) -> ExecResult<i64> {
    if x.fract() != 0.0 {
        return Err(EvalError::Data(format!("{} must be an integer, got {}", what, x)).into());
    }
    // exact conversion only: `as` would saturate silently
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(EvalError::Data(format!("{} is out of range, got {}", what, x)).into());
    }
    Ok(x as i64)
}

/// Number of passes from `lo` up to `hi` inclusive; empty when `hi < lo`
fn span(lo: i64, hi: i64) -> ExecResult<usize> {
    if hi < lo {
        return Ok(0);
    }
    hi.checked_sub(lo)
        .and_then(|d| d.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| EvalError::Data(format!("loop range {}..{} is too large", lo, hi)).into())
}

/// 1-based observation position of a date bound
fn date_position(bound: &Controller, ws: &Workspace) -> ExecResult<i64> {
    match bound {
        Controller::Date(label) => ws
            .calendar()
            .position(label, ws.nobs())
            .map(|t| t as i64 + 1)
            .ok_or_else(|| {
                EvalError::Data(format!("the observation '{}' is not in the dataset", label)).into()
            }),
        other => Err(EvalError::Type(format!("{:?} is not a date", other)).into()),
    }
}

/// Resolve the foreach source into member strings
fn members(words: &[String], ws: &Workspace, markers: &[Marker], limit: usize) -> ExecResult<Vec<String>> {
    let words: Vec<String> = words
        .iter()
        .map(|w| substitute(w, markers).unwrap_or_else(|| w.clone()))
        .collect();

    if let [word] = words.as_slice() {
        match ws.get(word) {
            Some(Value::List(names)) | Some(Value::Strings(names)) => return Ok(names.clone()),
            Some(Value::Bundle(map)) => return Ok(map.keys().cloned().collect()),
            _ => {}
        }
        if let Some((a, b)) = word.split_once("..") {
            return name_range(a, b, ws, limit);
        }
    }

    let mut out = Vec::new();
    for word in &words {
        if word.contains(['*', '?']) {
            out.extend(wildcard(word, ws)?);
        } else {
            out.push(word.clone());
        }
    }
    Ok(out)
}

fn wildcard(pattern: &str, ws: &Workspace) -> ExecResult<Vec<String>> {
    let pat = glob::Pattern::new(pattern)
        .map_err(|e| EvalError::Data(format!("bad wildcard '{}': {}", pattern, e)))?;
    Ok(ws
        .series_names()
        .iter()
        .filter(|name| pat.matches(name))
        .cloned()
        .collect())
}

/// `3..7` counts; `x1..x4` takes the series between two names in dataset order
fn name_range(a: &str, b: &str, ws: &Workspace, limit: usize) -> ExecResult<Vec<String>> {
    if let (Ok(lo), Ok(hi)) = (a.parse::<i64>(), b.parse::<i64>()) {
        let n = span(lo, hi)?;
        if n > limit {
            return Err(LoopError::IterationLimit {
                limit,
                setting: "loops.max_for_iterations",
            });
        }
        let mut out = Vec::new();
        out.try_reserve_exact(n)
            .map_err(|e| LoopError::Resource(format!("foreach range {}..{}: {}", a, b, e)))?;
        out.extend((lo..=hi).map(|k| k.to_string()));
        return Ok(out);
    }
    let names = ws.series_names();
    let find = |n: &str| {
        names
            .iter()
            .position(|s| s == n)
            .ok_or_else(|| LoopError::from(EvalError::Undefined(n.to_string())))
    };
    let (i, j) = (find(a)?, find(b)?);
    if j < i {
        return Err(EvalError::Data(format!("'{}..{}' is not in dataset order", a, b)).into());
    }
    Ok(names[i..=j].to_vec())
}

/* ===================== Iteration ===================== */

fn iterate(lp: &mut Loop, rt: &mut Runtime, markers: &mut Vec<Marker>) -> ExecResult {
    let interval = rt.limits.cancel_poll_interval.max(1);
    loop {
        if lp.state.iter % interval == 0 && rt.should_stop() {
            debug!(line = lp.lineno, iteration = lp.state.iter, "loop cancelled");
            return Err(LoopError::Cancelled);
        }
        if !next_pass(lp, rt, markers).map_err(|e| e.at(lp.lineno, &lp.header))? {
            return Ok(());
        }
        lp.state.iter += 1;
        lp.state.pass_serial = rt.ws.model_serial();
        trace!(line = lp.lineno, iteration = lp.state.iter, "pass");

        if lp.options.verbose {
            let shown = match markers.last() {
                Some(m) if lp.kind.has_marker() => format!("loop: {} = {}", m.name, m.value),
                _ => format!("loop: iteration {}", lp.state.iter),
            };
            rt.out.line(&shown);
        }
        if run_pass(lp, rt, markers)? == Pass::Break {
            return Ok(());
        }
    }
}

/// Check the condition for the next pass and publish the index; false ends the loop
fn next_pass(lp: &mut Loop, rt: &mut Runtime, markers: &mut [Marker]) -> ExecResult<bool> {
    let k = lp.state.iter;
    let cache_ok = !lp.renaming;
    match lp.kind {
        LoopKind::Count => Ok(k < lp.state.itermax),
        LoopKind::Index | LoopKind::Dated => {
            if k >= lp.state.itermax {
                return Ok(false);
            }
            let idx = lp.state.start + lp.state.step * k as i64;
            let label = if lp.kind == LoopKind::Dated {
                rt.ws.calendar().label((idx - 1) as usize)
            } else {
                idx.to_string()
            };
            publish(lp, rt, markers, idx as f64, label);
            Ok(true)
        }
        LoopKind::Each => {
            let Some(member) = lp.state.members.get(k).cloned() else {
                return Ok(false);
            };
            publish(lp, rt, markers, (k + 1) as f64, member);
            Ok(true)
        }
        LoopKind::While | LoopKind::For => {
            // the marker stack excludes this loop: while/for publish none
            if lp.kind == LoopKind::For && k > 0 && lp.delta != Controller::Unset {
                lp.delta.run(&mut rt.ws, markers, cache_ok)?;
            }
            let go = lp.test.resolve(&mut rt.ws, markers, cache_ok)? != 0.0;
            if go && k >= lp.state.itermax {
                let setting = if lp.kind == LoopKind::While {
                    "loop_maxiter"
                } else {
                    "loops.max_for_iterations"
                };
                return Err(LoopError::IterationLimit {
                    limit: lp.state.itermax,
                    setting,
                });
            }
            Ok(go)
        }
    }
}

fn publish(lp: &Loop, rt: &mut Runtime, markers: &mut [Marker], index: f64, label: String) {
    if let Some(var) = &lp.index_var {
        rt.ws.set_index(var, index);
    }
    if let Some(marker) = markers.last_mut() {
        marker.value = label;
    }
}

/* ===================== Pass Execution ===================== */

fn run_pass(lp: &mut Loop, rt: &mut Runtime, markers: &mut Vec<Marker>) -> ExecResult<Pass> {
    let mut flow = IfStack::default();
    for i in 0..lp.commands.len() {
        let Some(rec) = lp.commands.get(i) else { break };
        let (kind, lineno, catch) = (rec.kind, rec.lineno, rec.flags.catch);
        if !flow.is_active() && !kind.is_flow() {
            continue;
        }
        match step(lp, i, rt, markers, &mut flow) {
            Ok(Step::Next) => {}
            Ok(Step::Break) => return Ok(Pass::Break),
            Ok(Step::Continue) => return Ok(Pass::Continue),
            Err(err) => {
                let text = lp.commands.get(i).map(|r| r.text.as_str()).unwrap_or_default();
                let err = err.at(lineno, text);
                if catch && err.is_catchable() {
                    warn!(line = lineno, error = %err, "error caught");
                    rt.ws.record_error(err.code());
                    continue;
                }
                return Err(err);
            }
        }
    }
    Ok(Pass::Completed)
}

fn step(
    lp: &mut Loop,
    i: usize,
    rt: &mut Runtime,
    markers: &mut Vec<Marker>,
    flow: &mut IfStack,
) -> ExecResult<Step> {
    let kind = match lp.commands.get(i) {
        Some(rec) => rec.kind,
        None => return Ok(Step::Next),
    };
    if let CommandKind::Loop { child } = kind {
        let child = lp
            .children
            .get_mut(child)
            .ok_or_else(|| LoopError::Resource(format!("nested loop {} is missing", child)))?;
        run_loop(child, rt, markers)?;
        return Ok(Step::Next);
    }

    let cache_ok = !lp.renaming;
    let options = lp.options.clone();
    let Some(rec) = lp.commands.get_mut(i) else {
        return Ok(Step::Next);
    };

    let substituted = if rec.flags.substitution_free {
        None
    } else {
        let s = substitute(&rec.text, markers);
        if s.is_none() {
            rec.flags.substitution_free = true;
        }
        s
    };
    let cacheable = cache_ok && substituted.is_none();
    let text: &str = substituted.as_deref().unwrap_or(&rec.text);

    if options.verbose && !kind.is_flow() {
        rt.out.line(&format!("? {}", text));
    }

    match kind {
        CommandKind::Break => return Ok(Step::Break),
        CommandKind::Continue => return Ok(Step::Continue),
        // A failed condition still opens its branch as false, so a caught
        // error leaves the if/endif nesting intact
        CommandKind::If => {
            if flow.is_active() {
                let cond = condition(&mut rec.fragment, text, cacheable, &mut rt.ws);
                flow.open(matches!(cond, Ok(true)));
                cond?;
            } else {
                flow.open_dead();
            }
        }
        CommandKind::Elif => {
            let cond = if flow.elif_pending()? {
                condition(&mut rec.fragment, text, cacheable, &mut rt.ws)
            } else {
                Ok(false)
            };
            flow.elif(matches!(cond, Ok(true)))?;
            cond?;
        }
        CommandKind::Else => flow.flip()?,
        CommandKind::Endif => flow.close()?,
        CommandKind::Genr => {
            let fragment = match rec.fragment.take() {
                Some(f) => f,
                None => expr::compile(text)?,
            };
            let result = expr::evaluate(&fragment, &mut rt.ws);
            if cacheable {
                rec.fragment = Some(fragment);
            }
            result?;
        }
        CommandKind::Print if options.progressive && !rec.flags.literal_print => {
            let names = commands::words(rest_of(text));
            let values = commands::scalar_values(&names, &rt.ws)?;
            let tracker = match lp.trackers.entry(i) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => v.insert(Tracker::Print(Accumulator::new(rec.lineno, Role::Print, names)?)),
            };
            if let Tracker::Print(acc) = tracker {
                acc.update(&values)?;
            }
        }
        CommandKind::Store => {
            let mut args = commands::words(rest_of(text));
            if args.len() < 2 {
                return Err(EvalError::syntax(text, "usage: store FILE variables...").into());
            }
            let path = args.remove(0).trim_matches('"').to_string();
            let values = commands::scalar_values(&args, &rt.ws)?;
            let tracker = match lp.trackers.entry(i) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => v.insert(Tracker::Store(StoreTable::new(rec.lineno, path, args))),
            };
            if let Tracker::Store(table) = tracker {
                table.push(values)?;
            }
        }
        CommandKind::Model => {
            let model = commands::estimate(text, rt, options.progressive || options.quiet)?;
            if options.progressive {
                let tracker = match lp.trackers.entry(i) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(v) => v.insert(Tracker::for_model(rec.lineno, &model)?),
                };
                tracker.update_model(&model)?;
            }
        }
        CommandKind::Print
        | CommandKind::Rename
        | CommandKind::Open
        | CommandKind::Ordinary
        | CommandKind::Loop { .. } => commands::dispatch(text, rt)?,
    }
    Ok(Step::Next)
}

/// Evaluate an if/elif condition, reusing and refreshing the cached fragment
fn condition(
    slot: &mut Option<Fragment>,
    text: &str,
    cacheable: bool,
    ws: &mut Workspace,
) -> ExecResult<bool> {
    let fragment = match slot.take() {
        Some(f) => f,
        None => expr::compile(CommandRecord::condition(text))?,
    };
    let result = expr::evaluate_condition(&fragment, ws);
    if cacheable {
        *slot = Some(fragment);
    }
    Ok(result?)
}
