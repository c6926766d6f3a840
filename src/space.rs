use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A single concrete hyper parameter value, as sampled or fixed in the config.
///
/// Untagged so the json `{"sg": 1, "alpha": 0.025}` maps onto it directly,
/// integers are tried before floats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats, so `"alpha": 1` is accepted where a float is expected.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Text(_) => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A hyper parameter set: option name to concrete value.
pub type Params = BTreeMap<String, ParamValue>;

/// Search space declaration for one option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    /// Inclusive integer range, `low + k * step` for k >= 0.
    Int {
        low: i64,
        high: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    /// Float range, sampled uniformly in log space when `log` is set.
    Float {
        low: f64,
        high: f64,
        #[serde(default)]
        log: bool,
    },
    Categorical { choices: Vec<ParamValue> },
}

fn default_step() -> i64 {
    1
}

impl Distribution {
    pub fn validate(&self, name: &str) -> Result<(), String> {
        match self {
            Distribution::Int { low, high, step } => {
                if low > high {
                    return Err(format!("{}: low {} is above high {}", name, low, high));
                }
                if *step < 1 {
                    return Err(format!("{}: step must be positive, got {}", name, step));
                }
            }
            Distribution::Float { low, high, log } => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(format!("{}: bad float range [{}, {}]", name, low, high));
                }
                if *log && *low <= 0.0 {
                    return Err(format!("{}: log range needs a positive low, got {}", name, low));
                }
            }
            Distribution::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(format!("{}: no categorical choices", name));
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Distribution::Int { low, high, step }, ParamValue::Int(v)) => {
                v >= low && v <= high && (v - low) % step == 0
            }
            (Distribution::Float { low, high, .. }, v) => match v.as_f64() {
                Some(x) => x >= *low && x <= *high,
                None => false,
            },
            (Distribution::Categorical { choices }, v) => choices.contains(v),
            _ => false,
        }
    }
}

pub type SearchSpace = BTreeMap<String, Distribution>;

/// A space is usable when it declares at least one option and every range can be drawn from.
pub fn validate_space(space: &SearchSpace) -> Result<(), String> {
    if space.is_empty() {
        return Err("search_space is empty".to_string());
    }
    for (name, distribution) in space {
        distribution.validate(name)?;
    }
    Ok(())
}

/// The space searched when the config does not declare one.
pub fn default_search_space() -> SearchSpace {
    let binary = || Distribution::Categorical { choices: vec![ParamValue::Int(0), ParamValue::Int(1)] };

    let mut space = SearchSpace::new();
    space.insert("vector_size".to_string(), Distribution::Int { low: 50, high: 300, step: 50 });
    space.insert("sg".to_string(), binary());
    space.insert("alpha".to_string(), Distribution::Float { low: 1e-3, high: 1e-1, log: true });
    space.insert("window".to_string(), Distribution::Int { low: 2, high: 10, step: 1 });
    space.insert("epochs".to_string(), Distribution::Int { low: 5, high: 30, step: 1 });
    space.insert("negative".to_string(), Distribution::Int { low: 0, high: 20, step: 1 });
    space.insert("hs".to_string(), binary());
    space
}

pub fn format_params(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<String>>()
        .join(", ")
}
