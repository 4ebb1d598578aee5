//! Variables - エンジンの型付き変数バッグ
//!
//! エンジンは変数を `{name: {value, type}}` の形で渡してくる。
//! 値は動的型なので、期待する型ごとにアクセサを用意し、
//! 型不一致は `ValidationError` に変換する（panic や暗黙変換はしない）。

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ValidationError;
use super::ids::ContractId;

/// Engine-side type tag of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    String,
    Integer,
    Short,
    Long,
    Double,
    Boolean,
    Date,
    Json,
    Null,
    #[serde(other)]
    Other,
}

/// One `{value, type}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(default)]
    pub value: Value,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<VariableType>,
}

impl TypedValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: Value::String(value.into()),
            value_type: Some(VariableType::String),
        }
    }

    /// Integer か Long かは値の大きさで決める（エンジンの Integer は 32bit）
    pub fn integer(value: i64) -> Self {
        let value_type = if i32::try_from(value).is_ok() {
            VariableType::Integer
        } else {
            VariableType::Long
        };
        Self {
            value: Value::from(value),
            value_type: Some(value_type),
        }
    }

    pub fn double(value: f64) -> Self {
        Self {
            value: Value::from(value),
            value_type: Some(VariableType::Double),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            value: Value::Bool(value),
            value_type: Some(VariableType::Boolean),
        }
    }

    pub fn null() -> Self {
        Self {
            value: Value::Null,
            value_type: Some(VariableType::Null),
        }
    }

    fn found(&self) -> String {
        match &self.value {
            Value::Null => "null".into(),
            Value::Bool(_) => "boolean".into(),
            Value::Number(_) => "number".into(),
            Value::String(_) => "string".into(),
            Value::Array(_) => "array".into(),
            Value::Object(_) => "object".into(),
        }
    }
}

/// Variable bag with typed, get-with-default accessors.
///
/// - 変数が無い / null / 空文字 → `Ok(None)`
/// - 型が合わない → `ValidationError::TypeMismatch`
/// - 文字列だが解釈できない → `ValidationError::Malformed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, TypedValue>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: TypedValue) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypedValue)> {
        self.0.iter()
    }

    /// Non-null raw value.
    fn present(&self, name: &str) -> Option<&TypedValue> {
        self.0.get(name).filter(|v| !v.value.is_null())
    }

    fn mismatch(name: &str, expected: &'static str, tv: &TypedValue) -> ValidationError {
        ValidationError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: tv.found(),
        }
    }

    fn malformed(name: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::Malformed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Text value. Numbers and booleans are rendered as text.
    pub fn string(&self, name: &str) -> Result<Option<String>, ValidationError> {
        let Some(tv) = self.present(name) else {
            return Ok(None);
        };
        match &tv.value {
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            _ => Err(Self::mismatch(name, "string", tv)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<Option<i64>, ValidationError> {
        let Some(tv) = self.present(name) else {
            return Ok(None);
        };
        match &tv.value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                    _ => Err(Self::malformed(name, format!("{n} is not an integer"))),
                }
            }
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| Self::malformed(name, format!("'{s}': {e}"))),
            _ => Err(Self::mismatch(name, "integer", tv)),
        }
    }

    pub fn decimal(&self, name: &str) -> Result<Option<f64>, ValidationError> {
        let Some(tv) = self.present(name) else {
            return Ok(None);
        };
        match &tv.value {
            Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::malformed(name, format!("{n} is not representable"))),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Some(f)),
                _ => Err(Self::malformed(name, format!("'{s}' is not a number"))),
            },
            _ => Err(Self::mismatch(name, "decimal", tv)),
        }
    }

    /// Null-safe numeric coercion: anything unusable becomes `None`.
    pub fn decimal_lenient(&self, name: &str) -> Option<f64> {
        self.decimal(name).ok().flatten()
    }

    /// Calendar date. Accepts `YYYY-MM-DD` and the engine's timestamp formats.
    pub fn date(&self, name: &str) -> Result<Option<NaiveDate>, ValidationError> {
        let Some(tv) = self.present(name) else {
            return Ok(None);
        };
        let Value::String(s) = &tv.value else {
            return Err(Self::mismatch(name, "date", tv));
        };
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        parse_date(s)
            .map(Some)
            .ok_or_else(|| Self::malformed(name, format!("'{s}' is not a date")))
    }

    pub fn contract_id(&self, name: &str) -> Result<Option<ContractId>, ValidationError> {
        let Some(tv) = self.present(name) else {
            return Ok(None);
        };
        match &tv.value {
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .parse::<ContractId>()
                .map(Some)
                .map_err(|e| Self::malformed(name, e.to_string())),
            _ => Err(Self::mismatch(name, "uuid string", tv)),
        }
    }

    pub fn require_contract_id(&self, name: &str) -> Result<ContractId, ValidationError> {
        self.contract_id(name)?
            .ok_or_else(|| ValidationError::Missing {
                name: name.to_string(),
            })
    }
}

impl FromIterator<(String, TypedValue)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, TypedValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    // エンジンの既定フォーマット: 2024-01-31T00:00:00.000+0100
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.date_naive());
    }
    None
}
