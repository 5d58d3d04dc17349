//! Progressive accumulation
//!
//! In `--progressive` mode, `print`, `store` and estimation commands feed
//! per-line accumulators instead of producing output on every pass. Running
//! sums are kept in double-double arithmetic so that the variance survives
//! many repetitions without catastrophic cancellation.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::Serialize;

use super::super::errors::{ExecResult, LoopError};
use super::super::model::Model;
use super::super::output::{format_g, Printer};

/* ===================== Double-Double ===================== */

/// Unevaluated sum `hi + lo` carrying about 106 bits of mantissa
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DoubleDouble {
    hi: f64,
    lo: f64,
}

fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    (s, (a - (s - bb)) + (b - bb))
}

fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    (s, b - (s - a))
}

fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    (p, a.mul_add(b, -p))
}

impl DoubleDouble {
    pub fn new(x: f64) -> Self {
        Self { hi: x, lo: 0.0 }
    }

    fn from_parts((hi, lo): (f64, f64)) -> Self {
        Self { hi, lo }
    }

    pub fn to_f64(self) -> f64 {
        self.hi + self.lo
    }

    pub fn add_f64(self, b: f64) -> Self {
        let (s, e) = two_sum(self.hi, b);
        Self::from_parts(quick_two_sum(s, e + self.lo))
    }

    pub fn mul_f64(self, b: f64) -> Self {
        let (p, e) = two_prod(self.hi, b);
        Self::from_parts(quick_two_sum(p, e + self.lo * b))
    }

    pub fn div_f64(self, b: f64) -> Self {
        let q1 = self.hi / b;
        let (p, e) = two_prod(q1, b);
        let (s, f) = two_sum(self.hi, -p);
        let q2 = (s + (f - e + self.lo)) / b;
        Self::from_parts(quick_two_sum(q1, q2))
    }

    /// Square of a plain double, exactly
    pub fn square(x: f64) -> Self {
        Self::from_parts(two_prod(x, x))
    }
}

impl Add for DoubleDouble {
    type Output = DoubleDouble;

    fn add(self, o: DoubleDouble) -> DoubleDouble {
        let (s, e) = two_sum(self.hi, o.hi);
        let (t, f) = two_sum(self.lo, o.lo);
        let (s, e) = quick_two_sum(s, e + t);
        DoubleDouble::from_parts(quick_two_sum(s, e + f))
    }
}

impl Neg for DoubleDouble {
    type Output = DoubleDouble;

    fn neg(self) -> DoubleDouble {
        DoubleDouble {
            hi: -self.hi,
            lo: -self.lo,
        }
    }
}

impl Sub for DoubleDouble {
    type Output = DoubleDouble;

    fn sub(self, o: DoubleDouble) -> DoubleDouble {
        self + (-o)
    }
}

impl Mul for DoubleDouble {
    type Output = DoubleDouble;

    fn mul(self, o: DoubleDouble) -> DoubleDouble {
        let (p, e) = two_prod(self.hi, o.hi);
        DoubleDouble::from_parts(quick_two_sum(p, e + (self.hi * o.lo + self.lo * o.hi)))
    }
}

impl Div<f64> for DoubleDouble {
    type Output = DoubleDouble;

    fn div(self, b: f64) -> DoubleDouble {
        self.div_f64(b)
    }
}

/* ===================== Moments ===================== */

/// Running first and second moments of one item
pub trait Moments: Default + Clone + std::fmt::Debug {
    fn add(&mut self, x: f64);
    fn sum(&self) -> f64;
    fn sum_of_squares(&self) -> f64;
    /// Mean and population standard deviation over `n` values
    fn mean_and_sd(&self, n: usize) -> (f64, f64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompensatedMoments {
    sum: DoubleDouble,
    sumsq: DoubleDouble,
}

impl Moments for CompensatedMoments {
    fn add(&mut self, x: f64) {
        self.sum = self.sum.add_f64(x);
        self.sumsq = self.sumsq + DoubleDouble::square(x);
    }

    fn sum(&self) -> f64 {
        self.sum.to_f64()
    }

    fn sum_of_squares(&self) -> f64 {
        self.sumsq.to_f64()
    }

    fn mean_and_sd(&self, n: usize) -> (f64, f64) {
        if n == 0 {
            return (f64::NAN, f64::NAN);
        }
        let n = n as f64;
        let mean = self.sum / n;
        let var = (self.sumsq / n - mean * mean).to_f64();
        (mean.to_f64(), var.max(0.0).sqrt())
    }
}

/* ===================== Accumulator ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Model,
    Print,
    Store,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Model => "model",
            Role::Print => "print",
            Role::Store => "store",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Item<M> {
    moments: M,
    previous: f64,
    changed: bool,
}

/// Mean and standard deviation of one accumulated item
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone)]
pub struct Accumulator<M: Moments = CompensatedMoments> {
    pub lineno: usize,
    pub role: Role,
    pub names: Vec<String>,
    n: usize,
    items: Vec<Item<M>>,
}

impl<M: Moments> Accumulator<M> {
    /// The item count is fixed here, from `names`
    pub fn new(lineno: usize, role: Role, names: Vec<String>) -> ExecResult<Self> {
        let mut items = Vec::new();
        items
            .try_reserve_exact(names.len())
            .map_err(|e| LoopError::Resource(format!("progressive {}: {}", role.as_str(), e)))?;
        items.extend((0..names.len()).map(|_| Item {
            moments: M::default(),
            previous: f64::NAN,
            changed: false,
        }));
        Ok(Self {
            lineno,
            role,
            names,
            n: 0,
            items,
        })
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn width(&self) -> usize {
        self.items.len()
    }

    pub fn update(&mut self, values: &[f64]) -> ExecResult {
        if values.len() != self.items.len() {
            return Err(LoopError::Schema {
                role: self.role.as_str(),
                lineno: self.lineno,
                expected: self.items.len(),
                got: values.len(),
            });
        }
        let first = self.n == 0;
        for (item, &x) in self.items.iter_mut().zip(values) {
            item.moments.add(x);
            if !first && x != item.previous {
                item.changed = true;
            }
            item.previous = x;
        }
        self.n += 1;
        Ok(())
    }

    /// Zero the running totals, keeping the item count
    pub fn reset(&mut self) {
        self.n = 0;
        for item in &mut self.items {
            item.moments = M::default();
            item.previous = f64::NAN;
            item.changed = false;
        }
    }

    pub fn finalize(&self) -> Vec<Summary> {
        self.names
            .iter()
            .zip(&self.items)
            .map(|(name, item)| {
                let (mean, sd) = item.moments.mean_and_sd(self.n);
                Summary {
                    name: name.clone(),
                    mean,
                    sd: if item.changed { sd } else { 0.0 },
                }
            })
            .collect()
    }
}

/* ===================== Store Table ===================== */

#[derive(Debug, Clone)]
pub struct StoreTable {
    pub lineno: usize,
    pub path: String,
    pub names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct StoreJson<'a> {
    columns: &'a [String],
    rows: Vec<Vec<Option<f64>>>,
}

impl StoreTable {
    pub fn new(lineno: usize, path: String, names: Vec<String>) -> Self {
        Self {
            lineno,
            path,
            names,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn push(&mut self, row: Vec<f64>) -> ExecResult {
        if row.len() != self.names.len() {
            return Err(LoopError::Schema {
                role: Role::Store.as_str(),
                lineno: self.lineno,
                expected: self.names.len(),
                got: row.len(),
            });
        }
        self.rows
            .try_reserve(1)
            .map_err(|e| LoopError::Resource(format!("store table: {}", e)))?;
        self.rows.push(row);
        Ok(())
    }

    pub fn render(&self) -> ExecResult<String> {
        if self.path.ends_with(".json") {
            let json = StoreJson {
                columns: &self.names,
                rows: self
                    .rows
                    .iter()
                    .map(|r| r.iter().map(|x| (!x.is_nan()).then_some(*x)).collect())
                    .collect(),
            };
            return serde_json::to_string_pretty(&json).map_err(|e| LoopError::Io {
                path: self.path.clone(),
                source: e.into(),
            });
        }
        let mut out = self.names.join(",");
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|x| if x.is_nan() { "NA".to_string() } else { x.to_string() })
                .collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write(&self) -> ExecResult {
        let body = self.render()?;
        std::fs::write(&self.path, body).map_err(|source| LoopError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/* ===================== Trackers ===================== */

/// Progressive state attached to one command line
#[derive(Debug, Clone)]
pub enum Tracker {
    Model {
        depvar: String,
        coeff: Accumulator,
        sderr: Accumulator,
    },
    Print(Accumulator),
    Store(StoreTable),
}

impl Tracker {
    pub fn for_model(lineno: usize, model: &Model) -> ExecResult<Tracker> {
        Ok(Tracker::Model {
            depvar: model.depvar.clone(),
            coeff: Accumulator::new(lineno, Role::Model, model.names.clone())?,
            sderr: Accumulator::new(lineno, Role::Model, model.names.clone())?,
        })
    }

    pub fn update_model(&mut self, model: &Model) -> ExecResult {
        if let Tracker::Model { coeff, sderr, .. } = self {
            coeff.update(&model.coeff)?;
            sderr.update(&model.sderr)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        match self {
            Tracker::Model { coeff, sderr, .. } => {
                coeff.reset();
                sderr.reset();
            }
            Tracker::Print(acc) => acc.reset(),
            Tracker::Store(table) => table.rows.clear(),
        }
    }
}

/// Trackers of a progressive loop, keyed by command position
pub type Trackers = BTreeMap<usize, Tracker>;

/// Print summaries in buffer order and write the store file
pub fn report(trackers: &Trackers, out: &mut Printer) -> ExecResult {
    for tracker in trackers.values() {
        match tracker {
            Tracker::Model { depvar, coeff, sderr } => print_model(depvar, coeff, sderr, out),
            Tracker::Print(acc) => print_summary(acc, out),
            Tracker::Store(table) => {
                table.write()?;
                out.line(&format!(
                    "store: wrote {} observations on {} variables to {}",
                    table.rows.len(),
                    table.names.len(),
                    table.path
                ));
            }
        }
    }
    Ok(())
}

fn print_summary(acc: &Accumulator, out: &mut Printer) {
    if acc.count() == 0 {
        return;
    }
    out.line(&format!("Statistics for {} repetitions", acc.count()));
    out.blank();
    out.line(&format!("{:>12} {:>14} {:>14}", "", "mean", "std. dev"));
    for s in acc.finalize() {
        out.line(&format!(
            "{:>12} {:>14} {:>14}",
            s.name,
            format_g(s.mean, 6),
            format_g(s.sd, 6)
        ));
    }
    out.blank();
}

fn print_model(depvar: &str, coeff: &Accumulator, sderr: &Accumulator, out: &mut Printer) {
    if coeff.count() == 0 {
        return;
    }
    out.line(&format!("OLS estimates, dependent variable {}", depvar));
    out.line(&format!("Statistics for {} repetitions", coeff.count()));
    out.blank();
    out.line(&format!(
        "{:>12} {:>14} {:>14} {:>14} {:>14}",
        "", "mean of", "std. dev. of", "mean of", "std. dev. of"
    ));
    out.line(&format!(
        "{:>12} {:>14} {:>14} {:>14} {:>14}",
        "", "coefficients", "coefficients", "std. errors", "std. errors"
    ));
    for (b, se) in coeff.finalize().into_iter().zip(sderr.finalize()) {
        out.line(&format!(
            "{:>12} {:>14} {:>14} {:>14} {:>14}",
            b.name,
            format_g(b.mean, 6),
            format_g(b.sd, 6),
            format_g(se.mean, 6),
            format_g(se.sd, 6)
        ));
    }
    out.blank();
}
