//! Signal constraints
//!
//! A constraint is `<signal> <relation> <threshold>`, e.g. `battery < 20`
//! or `wifi_ssid = home`. The threshold kind has to match the signal's type
//! family: integers for int/long signals, floats for float/double signals,
//! text for string signals (which only support `=` and `<>`).

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::codec::{Signal, SignalId, Value, ValueType};
use crate::series::{TimeSeries, TimeSeriesStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison between a signal value and a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

impl Relation {
    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Eq => "=",
            Relation::Ne => "<>",
            Relation::Ge => ">=",
            Relation::Gt => ">",
        }
    }

    /// `value <relation> threshold`
    pub fn eval<T: PartialOrd>(self, value: T, threshold: T) -> bool {
        match self {
            Relation::Lt => value < threshold,
            Relation::Le => value <= threshold,
            Relation::Eq => value == threshold,
            Relation::Ne => value != threshold,
            Relation::Ge => value >= threshold,
            Relation::Gt => value > threshold,
        }
    }

    /// Text values only compare for (in)equality
    pub fn applies_to_text(self) -> bool {
        matches!(self, Relation::Eq | Relation::Ne)
    }
}

impl FromStr for Relation {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Relation::Lt),
            "<=" => Ok(Relation::Le),
            "=" => Ok(Relation::Eq),
            "<>" => Ok(Relation::Ne),
            ">=" => Ok(Relation::Ge),
            ">" => Ok(Relation::Gt),
            other => Err(AnalysisError::UnknownRelation(other.to_string())),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Threshold {
    /// Name of the threshold kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Threshold::Integer(_) => "integer",
            Threshold::Float(_) => "float",
            Threshold::Text(_) => "text",
        }
    }

    /// Kind a signal of `value_type` needs
    pub fn kind_for(value_type: ValueType) -> &'static str {
        match value_type {
            ValueType::Int32 | ValueType::Int64 => "integer",
            ValueType::Float32 | ValueType::Float64 => "float",
            ValueType::Utf8 => "text",
        }
    }

    pub fn fits(&self, value_type: ValueType) -> bool {
        self.kind() == Self::kind_for(value_type)
    }

    /// Parse user input into the kind a signal of `value_type` needs
    pub fn parse_for(text: &str, value_type: ValueType) -> AnalysisResult<Self> {
        let invalid = || {
            AnalysisError::InvalidArgument(format!(
                "'{}' is not a valid {} threshold",
                text,
                Self::kind_for(value_type)
            ))
        };
        match value_type {
            ValueType::Int32 | ValueType::Int64 => {
                text.trim().parse().map(Threshold::Integer).map_err(|_| invalid())
            }
            ValueType::Float32 | ValueType::Float64 => {
                text.trim().parse().map(Threshold::Float).map_err(|_| invalid())
            }
            ValueType::Utf8 => Ok(Threshold::Text(text.to_string())),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Integer(v) => write!(f, "{}", v),
            Threshold::Float(v) => write!(f, "{}", v),
            Threshold::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Reference to a signal by id or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalRef {
    Id(SignalId),
    Name(String),
}

impl SignalRef {
    /// Find the referenced series in a store
    pub fn resolve<'a>(&self, store: &'a TimeSeriesStore) -> AnalysisResult<&'a TimeSeries> {
        let found = match self {
            SignalRef::Id(id) => store.by_id(*id),
            SignalRef::Name(name) => store.by_name(name),
        };
        found.ok_or_else(|| AnalysisError::SignalNotFound(self.to_string()))
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalRef::Id(id) => write!(f, "#{}", id),
            SignalRef::Name(name) => f.write_str(name),
        }
    }
}

impl From<SignalId> for SignalRef {
    fn from(id: SignalId) -> Self {
        SignalRef::Id(id)
    }
}

impl From<&str> for SignalRef {
    fn from(name: &str) -> Self {
        SignalRef::Name(name.to_string())
    }
}

impl From<String> for SignalRef {
    fn from(name: String) -> Self {
        SignalRef::Name(name)
    }
}

/// `<signal> <relation> <threshold>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConstraint {
    pub signal: SignalRef,
    pub relation: Relation,
    pub threshold: Threshold,
}

impl SignalConstraint {
    /// Build a constraint; text thresholds only accept `=` and `<>`
    pub fn new(
        signal: impl Into<SignalRef>,
        relation: Relation,
        threshold: Threshold,
    ) -> AnalysisResult<Self> {
        if matches!(threshold, Threshold::Text(_)) && !relation.applies_to_text() {
            return Err(AnalysisError::InvalidArgument(format!(
                "relation '{}' cannot compare text",
                relation
            )));
        }
        Ok(Self {
            signal: signal.into(),
            relation,
            threshold,
        })
    }

    /// Check the threshold kind against the constrained signal
    pub fn check_signal(&self, signal: &Signal) -> AnalysisResult<()> {
        if self.threshold.fits(signal.value_type) {
            return Ok(());
        }
        Err(AnalysisError::ConstraintTypeMismatch {
            signal: signal.name.clone(),
            value_type: signal.value_type,
            expected: Threshold::kind_for(signal.value_type),
        })
    }

    /// Whether a single value satisfies the constraint
    ///
    /// A value of the wrong kind never does.
    pub fn holds(&self, value: &Value) -> bool {
        match &self.threshold {
            Threshold::Integer(t) => value
                .as_i64()
                .is_some_and(|v| self.relation.eval(v, *t)),
            Threshold::Float(t) => match value {
                Value::Float32(_) | Value::Float64(_) => value
                    .as_f64()
                    .is_some_and(|v| self.relation.eval(v, *t)),
                _ => false,
            },
            Threshold::Text(t) => value.as_str().is_some_and(|v| match self.relation {
                Relation::Eq => v == t,
                Relation::Ne => v != t,
                _ => false,
            }),
        }
    }
}

impl fmt::Display for SignalConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.signal, self.relation, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_parse_and_display() {
        for symbol in ["<", "<=", "=", "<>", ">=", ">"] {
            let relation: Relation = symbol.parse().unwrap();
            assert_eq!(relation.to_string(), symbol);
        }
        assert!(matches!(
            "!=".parse::<Relation>(),
            Err(AnalysisError::UnknownRelation(_))
        ));
    }

    #[test]
    fn test_relation_eval() {
        assert!(Relation::Lt.eval(1, 2));
        assert!(!Relation::Lt.eval(2, 2));
        assert!(Relation::Le.eval(2, 2));
        assert!(Relation::Ne.eval(0.5, 0.6));
        assert!(Relation::Ge.eval(3.0, 3.0));
        assert!(!Relation::Gt.eval(f64::NAN, 0.0));
    }

    #[test]
    fn test_text_relation_restricted() {
        let err = SignalConstraint::new("ssid", Relation::Lt, Threshold::Text("a".into()))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument(_)));
        assert!(SignalConstraint::new("ssid", Relation::Ne, Threshold::Text("a".into())).is_ok());
    }

    #[test]
    fn test_check_signal_type_family() {
        let battery = Signal::new(0, "battery", ValueType::Int32);
        let ok = SignalConstraint::new(0, Relation::Lt, Threshold::Integer(20)).unwrap();
        assert!(ok.check_signal(&battery).is_ok());

        let wrong = SignalConstraint::new(0, Relation::Lt, Threshold::Float(0.2)).unwrap();
        assert!(matches!(
            wrong.check_signal(&battery),
            Err(AnalysisError::ConstraintTypeMismatch { expected: "integer", .. })
        ));
    }

    #[test]
    fn test_holds() {
        let low = SignalConstraint::new("b", Relation::Lt, Threshold::Integer(50)).unwrap();
        assert!(low.holds(&Value::Int64(40)));
        assert!(low.holds(&Value::Int32(49)));
        assert!(!low.holds(&Value::Int32(50)));
        assert!(!low.holds(&Value::Float64(10.0)));

        let bright = SignalConstraint::new("l", Relation::Gt, Threshold::Float(0.5)).unwrap();
        assert!(bright.holds(&Value::Float32(0.6)));
        assert!(!bright.holds(&Value::Float32(0.2)));

        let home = SignalConstraint::new("s", Relation::Eq, Threshold::Text("home".into())).unwrap();
        assert!(home.holds(&Value::from("home")));
        assert!(!home.holds(&Value::from("Home")));
    }

    #[test]
    fn test_threshold_parse_for() {
        assert_eq!(
            Threshold::parse_for("42", ValueType::Int64).unwrap(),
            Threshold::Integer(42)
        );
        assert_eq!(
            Threshold::parse_for("0.5", ValueType::Float32).unwrap(),
            Threshold::Float(0.5)
        );
        assert_eq!(
            Threshold::parse_for("lab wifi", ValueType::Utf8).unwrap(),
            Threshold::Text("lab wifi".into())
        );
        assert!(Threshold::parse_for("0.5", ValueType::Int32).is_err());
    }
}
