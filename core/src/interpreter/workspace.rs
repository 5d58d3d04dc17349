//! Dataset and symbol table
//!
//! The workspace is the process-wide mutable state that loop bodies operate
//! on: named values, the dataset (series share one observation count and a
//! calendar), the last-error and last-model slots read through accessors, and
//! the random number generator. Loop index variables are locked here while
//! their loop runs so that body code cannot clobber in-flight iteration state.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::errors::{EvalError, E_NONE};
use super::model::Model;

/* ===================== Values ===================== */

/// Runtime value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Scalar(f64),
    Series(Vec<f64>),
    Str(String),
    /// Named list of series
    List(Vec<String>),
    /// Array of strings
    Strings(Vec<String>),
    Bundle(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Series(_) => "series",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Strings(_) => "strings",
            Value::Bundle(_) => "bundle",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar value that must be present (not NA)
    pub fn to_number(&self, what: &str) -> Result<f64, EvalError> {
        match self {
            Value::Scalar(x) if x.is_nan() => Err(EvalError::Missing(what.to_string())),
            Value::Scalar(x) => Ok(*x),
            _ => Err(EvalError::NotScalar(what.to_string())),
        }
    }
}

/* ===================== Calendar ===================== */

/// Observation calendar of the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Calendar {
    /// Observations labelled 1, 2, ...
    Undated,
    Annual { start: i32 },
    Quarterly { year: i32, period: u32 },
    Monthly { year: i32, period: u32 },
    Daily { start: NaiveDate },
}

impl Calendar {
    /// Build a calendar from a frequency and a starting label, as in `setobs 4 1990:1`
    pub fn from_setobs(freq: u32, start: &str) -> Result<Calendar, EvalError> {
        let bad = || EvalError::Data(format!("setobs: invalid starting observation '{}'", start));
        match freq {
            1 => Ok(Calendar::Annual {
                start: start.parse().map_err(|_| bad())?,
            }),
            4 | 12 => {
                let (year, period) = split_period(start).ok_or_else(bad)?;
                if period == 0 || period > freq {
                    return Err(bad());
                }
                Ok(if freq == 4 {
                    Calendar::Quarterly { year, period }
                } else {
                    Calendar::Monthly { year, period }
                })
            }
            7 => Ok(Calendar::Daily {
                start: NaiveDate::parse_from_str(start, "%Y-%m-%d").map_err(|_| bad())?,
            }),
            other => Err(EvalError::Data(format!(
                "setobs: unsupported frequency {}",
                other
            ))),
        }
    }

    /// Label of the observation at 0-based position `t`
    pub fn label(&self, t: usize) -> String {
        match self {
            Calendar::Undated => (t + 1).to_string(),
            Calendar::Annual { start } => (*start as i64 + t as i64).to_string(),
            Calendar::Quarterly { year, period } => {
                let (y, p) = advance(*year, *period, t, 4);
                format!("{}:{}", y, p)
            }
            Calendar::Monthly { year, period } => {
                let (y, p) = advance(*year, *period, t, 12);
                format!("{}:{:02}", y, p)
            }
            Calendar::Daily { start } => (*start + Duration::days(t as i64))
                .format("%Y-%m-%d")
                .to_string(),
        }
    }

    /// 0-based position of the observation labelled `label`, if it lies within `nobs`
    pub fn position(&self, label: &str, nobs: usize) -> Option<usize> {
        let offset: i64 = match self {
            Calendar::Undated => label.parse::<i64>().ok()? - 1,
            Calendar::Annual { start } => label.parse::<i64>().ok()? - *start as i64,
            Calendar::Quarterly { year, period } => {
                let (y, p) = split_period(label)?;
                (y as i64 - *year as i64) * 4 + (p as i64 - *period as i64)
            }
            Calendar::Monthly { year, period } => {
                let (y, p) = split_period(label)?;
                (y as i64 - *year as i64) * 12 + (p as i64 - *period as i64)
            }
            Calendar::Daily { start } => {
                let date = NaiveDate::parse_from_str(label, "%Y-%m-%d").ok()?;
                (date - *start).num_days()
            }
        };
        if offset < 0 || offset as usize >= nobs {
            None
        } else {
            Some(offset as usize)
        }
    }

    pub fn frequency(&self) -> u32 {
        match self {
            Calendar::Undated | Calendar::Annual { .. } => 1,
            Calendar::Quarterly { .. } => 4,
            Calendar::Monthly { .. } => 12,
            Calendar::Daily { .. } => 7,
        }
    }
}

fn split_period(label: &str) -> Option<(i32, u32)> {
    let (y, p) = label.split_once(':')?;
    Some((y.parse().ok()?, p.parse().ok()?))
}

fn advance(year: i32, period: u32, t: usize, freq: u32) -> (i64, u32) {
    let zero_based = year as i64 * freq as i64 + (period as i64 - 1) + t as i64;
    (
        zero_based.div_euclid(freq as i64),
        (zero_based.rem_euclid(freq as i64) + 1) as u32,
    )
}

/* ===================== Workspace ===================== */

/// Symbol table plus dataset
#[derive(Debug)]
pub struct Workspace {
    vars: HashMap<String, Value>,
    /// Series names in dataset order
    series_order: Vec<String>,
    nobs: usize,
    calendar: Calendar,
    /// Index variables of the loops currently running
    locked: Vec<String>,
    last_error: i32,
    last_model: Option<Model>,
    model_serial: u64,
    rng: StdRng,
}

impl Workspace {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            vars: HashMap::new(),
            series_order: Vec::new(),
            nobs: 0,
            calendar: Calendar::Undated,
            locked: Vec::new(),
            last_error: E_NONE,
            last_model: None,
            model_serial: 0,
            rng,
        }
    }

    /* ---------- lookup ---------- */

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.vars.get(name).and_then(Value::as_scalar)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.vars.get(name) {
            Some(Value::List(members)) => Some(members),
            _ => None,
        }
    }

    /// Series names in dataset order
    pub fn series_names(&self) -> &[String] {
        &self.series_order
    }

    /// Variable names in sorted order, for dumps
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /* ---------- mutation from script code ---------- */

    /// Assign a value on behalf of script code; loop index variables are refused
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if self.is_locked(name) {
            return Err(EvalError::IndexLocked(name.to_string()));
        }
        self.store(name, value)
    }

    pub fn delete(&mut self, name: &str) -> Result<(), EvalError> {
        if self.is_locked(name) {
            return Err(EvalError::IndexLocked(name.to_string()));
        }
        if self.vars.remove(name).is_none() {
            return Err(EvalError::Undefined(name.to_string()));
        }
        self.series_order.retain(|s| s != name);
        Ok(())
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), EvalError> {
        for name in [old, new] {
            if self.is_locked(name) {
                return Err(EvalError::IndexLocked(name.to_string()));
            }
        }
        if self.vars.contains_key(new) {
            return Err(EvalError::Data(format!("rename: '{}' already exists", new)));
        }
        let value = self
            .vars
            .remove(old)
            .ok_or_else(|| EvalError::Undefined(old.to_string()))?;
        for slot in self.series_order.iter_mut().filter(|s| *s == old) {
            *slot = new.to_string();
        }
        self.vars.insert(new.to_string(), value);
        Ok(())
    }

    fn store(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if let Value::Series(ref xs) = value {
            if xs.len() != self.nobs {
                return Err(EvalError::Data(format!(
                    "series '{}' has {} observations, the dataset has {}",
                    name,
                    xs.len(),
                    self.nobs
                )));
            }
            if !self.series_order.iter().any(|s| s == name) {
                self.series_order.push(name.to_string());
            }
        } else if let Some(Value::Series(_)) = self.vars.get(name) {
            return Err(EvalError::Type(format!(
                "'{}' is a series and cannot be replaced by a {}",
                name,
                value.type_name()
            )));
        }
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    /* ---------- dataset ---------- */

    /// Replace the dataset with `nobs` empty, undated observations
    pub fn new_dataset(&mut self, nobs: usize) {
        for name in self.series_order.drain(..) {
            self.vars.remove(&name);
        }
        self.nobs = nobs;
        self.calendar = Calendar::Undated;
    }

    /// Replace the dataset with the given columns
    pub fn load_dataset(&mut self, columns: Vec<(String, Vec<f64>)>, nobs: usize) -> Result<(), EvalError> {
        self.new_dataset(nobs);
        for (name, xs) in columns {
            self.store(&name, Value::Series(xs))?;
        }
        Ok(())
    }

    pub fn set_calendar(&mut self, calendar: Calendar) -> Result<(), EvalError> {
        if self.nobs == 0 {
            return Err(EvalError::Data("setobs: no dataset is in place".to_string()));
        }
        self.calendar = calendar;
        Ok(())
    }

    /// Series 1..nobs, available as `index`
    pub fn index_series(&self) -> Option<Vec<f64>> {
        (self.nobs > 0).then(|| (1..=self.nobs).map(|t| t as f64).collect())
    }

    /* ---------- loop index variables ---------- */

    pub fn is_locked(&self, name: &str) -> bool {
        self.locked.iter().any(|n| n == name)
    }

    /// Reserve `name` as the index variable of a running loop
    pub fn lock(&mut self, name: &str) -> Result<(), EvalError> {
        if self.is_locked(name) {
            return Err(EvalError::Data(format!(
                "the index variable '{}' is already in use by an enclosing loop",
                name
            )));
        }
        match self.vars.get(name) {
            None | Some(Value::Scalar(_)) => {}
            Some(other) => {
                return Err(EvalError::Type(format!(
                    "'{}' is a {} and cannot serve as a loop index",
                    name,
                    other.type_name()
                )))
            }
        }
        self.locked.push(name.to_string());
        Ok(())
    }

    pub fn unlock(&mut self, name: &str) {
        if let Some(pos) = self.locked.iter().rposition(|n| n == name) {
            self.locked.remove(pos);
        }
    }

    /// Write a loop index directly, bypassing the lock
    pub fn set_index(&mut self, name: &str, value: f64) {
        self.vars.insert(name.to_string(), Value::Scalar(value));
    }

    /* ---------- accessor slots ---------- */

    pub fn record_error(&mut self, code: i32) {
        self.last_error = code;
    }

    /// Read and reset the last error code
    pub fn take_error(&mut self) -> i32 {
        std::mem::replace(&mut self.last_error, E_NONE)
    }

    pub fn last_model(&self) -> Option<&Model> {
        self.last_model.as_ref()
    }

    /// Make `model` the last model; returns its serial number
    pub fn register_model(&mut self, model: Model) -> u64 {
        self.model_serial += 1;
        self.last_model = Some(model);
        self.model_serial
    }

    pub fn model_serial(&self) -> u64 {
        self.model_serial
    }

    pub fn take_last_model(&mut self) -> Option<Model> {
        self.last_model.take()
    }

    pub fn restore_last_model(&mut self, model: Option<Model>) {
        self.last_model = model;
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Scalars and strings as JSON, for `cadence run --dump-json`
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for name in self.names() {
            if let Some(value) = self.vars.get(name) {
                let json = match value {
                    Value::Scalar(x) => serde_json::json!(x),
                    Value::Str(s) => serde_json::json!(s),
                    Value::Series(xs) => serde_json::json!(xs),
                    Value::List(names) | Value::Strings(names) => serde_json::json!(names),
                    Value::Bundle(b) => serde_json::to_value(b).unwrap_or(serde_json::Value::Null),
                };
                map.insert(name.to_string(), json);
            }
        }
        serde_json::Value::Object(map)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(None)
    }
}
