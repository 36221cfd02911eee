use serde::{Deserialize, Serialize};

use crate::config::DecimalAllowList;
use crate::error::{OcrError, Result};

/// A recognized statistic value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
}

impl StatValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            StatValue::Int(v) => v as f64,
            StatValue::Float(v) => v,
        }
    }
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Int(v) => write!(f, "{}", v),
            StatValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Turn left-to-right digit predictions into a number.
///
/// The digits are read as an integer. For allow-listed stats whose integer
/// rendering has more than one digit, a decimal point is inserted before the
/// last digit ("75" -> 7.5). Allow-listed stats always come back as floats.
pub fn assemble(digits: &[u8], stat: &str, decimals: &DecimalAllowList) -> Result<StatValue> {
    if digits.is_empty() {
        return Err(OcrError::NoDigitsFound {
            stat: stat.to_string(),
        });
    }

    let text = digits
        .iter()
        .map(|&d| {
            char::from_digit(d as u32, 10)
                .ok_or_else(|| OcrError::Classification(format!("{} is not a digit", d)))
        })
        .collect::<Result<String>>()?;

    let value: i64 = text.parse().map_err(|e| {
        OcrError::Classification(format!("digit string '{}' is not an integer: {}", text, e))
    })?;

    if !decimals.contains(stat) {
        return Ok(StatValue::Int(value));
    }

    let rendered = value.to_string();
    let decimal = if rendered.len() > 1 {
        let (whole, tenths) = rendered.split_at(rendered.len() - 1);
        format!("{}.{}", whole, tenths)
    } else {
        rendered
    };

    decimal
        .parse::<f64>()
        .map(StatValue::Float)
        .map_err(|e| OcrError::Classification(format!("'{}' is not a decimal: {}", decimal, e)))
}
