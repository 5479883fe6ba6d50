//! Work items and the closed set of conversions a worker can apply to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TransformKind
// ---------------------------------------------------------------------------

/// Identifies which remote conversion a [`WorkItem`] requests.
///
/// Serialized as a kebab-case tag (`celsius-to-fahrenheit`), which is also
/// the format accepted by [`FromStr`] and produced by [`fmt::Display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    /// Degrees Celsius to degrees Fahrenheit.
    CelsiusToFahrenheit,
    /// Degrees Fahrenheit to degrees Celsius.
    FahrenheitToCelsius,
}

impl TransformKind {
    /// Every supported kind, in declaration order.
    pub const ALL: [Self; 2] = [Self::CelsiusToFahrenheit, Self::FahrenheitToCelsius];

    /// Form parameter name the conversion endpoint expects.
    #[must_use]
    pub const fn form_key(self) -> &'static str {
        match self {
            Self::CelsiusToFahrenheit => "Celsius",
            Self::FahrenheitToCelsius => "Fahrenheit",
        }
    }

    /// Path segment of the conversion endpoint, relative to the service base URL.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::CelsiusToFahrenheit => "CelsiusToFahrenheit",
            Self::FahrenheitToCelsius => "FahrenheitToCelsius",
        }
    }

    /// The conversion that undoes this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::CelsiusToFahrenheit => Self::FahrenheitToCelsius,
            Self::FahrenheitToCelsius => Self::CelsiusToFahrenheit,
        }
    }

    /// Kebab-case tag used for display and parsing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CelsiusToFahrenheit => "celsius-to-fahrenheit",
            Self::FahrenheitToCelsius => "fahrenheit-to-celsius",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`TransformKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transform kind: {tag:?}")]
pub struct UnknownTransformKind {
    pub tag: String,
}

impl FromStr for TransformKind {
    type Err = UnknownTransformKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTransformKind { tag: s.to_string() })
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One unit of conversion work: a value and the conversion to apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    kind: TransformKind,
    /// Numeric payload sent to the remote service.
    pub value: f64,
}

impl WorkItem {
    #[must_use]
    pub const fn new(kind: TransformKind, value: f64) -> Self {
        Self { kind, value }
    }

    /// Shorthand for a Celsius to Fahrenheit item.
    #[must_use]
    pub const fn celsius_to_fahrenheit(value: f64) -> Self {
        Self::new(TransformKind::CelsiusToFahrenheit, value)
    }

    /// Shorthand for a Fahrenheit to Celsius item.
    #[must_use]
    pub const fn fahrenheit_to_celsius(value: f64) -> Self {
        Self::new(TransformKind::FahrenheitToCelsius, value)
    }

    /// The conversion requested by this item. Fixed at construction.
    #[must_use]
    pub const fn kind(&self) -> TransformKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// Converted
// ---------------------------------------------------------------------------

/// Successful outcome of a [`WorkItem`]: the submitted item plus the value the
/// remote service returned for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Converted {
    /// The item exactly as it was submitted.
    pub item: WorkItem,
    /// Converted value.
    pub output: f64,
}

impl Converted {
    #[must_use]
    pub const fn new(item: WorkItem, output: f64) -> Self {
        Self { item, output }
    }

    /// Returns the submitted item with its value replaced by the output.
    #[must_use]
    pub const fn into_item(self) -> WorkItem {
        WorkItem::new(self.item.kind, self.output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
