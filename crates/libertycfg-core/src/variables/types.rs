//! Variable type classification and widening rules

use regex::Regex;
use std::sync::LazyLock;

/// Duration literal: one or more `<digits><unit>` groups. Short abbreviations
/// and the long English unit names are both accepted.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(\d+(milliseconds?|ms|seconds?|s|minutes?|m|hours?|h|days?|d))+$").unwrap()
});

/// Type of a configuration variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Boolean,
    Short,
    Int,
    Long,
    Duration,
    String,
    Token,
    Location,
}

impl VariableType {
    /// Infer the type of a raw value.
    ///
    /// Integers are classified by magnitude, `true`/`false` (any case) is a
    /// boolean, duration literals like `5m` or `1h30m` are durations, and
    /// everything else is a string.
    pub fn compute(value: &str) -> VariableType {
        let trimmed = value.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return if i16::try_from(n).is_ok() {
                VariableType::Short
            } else if i32::try_from(n).is_ok() {
                VariableType::Int
            } else {
                VariableType::Long
            };
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return VariableType::Boolean;
        }
        if !trimmed.is_empty() && DURATION_RE.is_match(trimmed) {
            return VariableType::Duration;
        }
        VariableType::String
    }

    /// Whether a value of type `actual` can satisfy a slot of this type.
    ///
    /// Numeric types widen upward, durations additionally accept plain
    /// integer millisecond counts, tokens accept the single-word scalar
    /// types, and string/location accept everything.
    pub fn accepts(self, actual: VariableType) -> bool {
        use VariableType::*;
        match self {
            Boolean => actual == Boolean,
            Short => actual == Short,
            Int => matches!(actual, Int | Short),
            Long => matches!(actual, Long | Int | Short),
            Duration => matches!(actual, Duration | Long | Int | Short),
            Token => matches!(actual, Token | Boolean | Short | Int | Long),
            String | Location => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariableType::Boolean => "boolean",
            VariableType::Short => "short",
            VariableType::Int => "int",
            VariableType::Long => "long",
            VariableType::Duration => "duration",
            VariableType::String => "string",
            VariableType::Token => "token",
            VariableType::Location => "location",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
