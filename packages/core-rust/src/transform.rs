//! The remote conversion contract executed by worker threads.

use crate::work::TransformKind;

/// Errors produced while performing a remote conversion.
///
/// Variants carry rendered messages rather than source errors so an outcome
/// can be cloned out of a completion handle any number of times.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("conversion service returned HTTP {status}")]
    Status { status: u16 },
    #[error("malformed response: {body:?}")]
    MalformedResponse { body: String },
    #[error("response value {text:?} is not a number")]
    InvalidNumber { text: String },
}

/// Performs one blocking conversion against an external service.
///
/// Implementations are called from pool threads only, never from the
/// submitting thread, so they are free to block for the whole round trip.
/// Any `Fn(TransformKind, f64) -> Result<f64, TransformError>` closure is a
/// `RemoteTransform`.
pub trait RemoteTransform: Send + Sync + 'static {
    /// Converts `value` according to `kind`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if the call fails or the reply cannot be
    /// interpreted as a number.
    fn transform(&self, kind: TransformKind, value: f64) -> Result<f64, TransformError>;
}

impl<F> RemoteTransform for F
where
    F: Fn(TransformKind, f64) -> Result<f64, TransformError> + Send + Sync + 'static,
{
    fn transform(&self, kind: TransformKind, value: f64) -> Result<f64, TransformError> {
        self(kind, value)
    }
}

/// Local reference formulas, used to stub the remote service.
///
/// Results are rounded to the nearest integer, matching the whole-degree
/// replies of the public conversion endpoint.
#[must_use]
pub fn reference_conversion(kind: TransformKind, value: f64) -> f64 {
    match kind {
        TransformKind::CelsiusToFahrenheit => (value * 9.0 / 5.0 + 32.0).round(),
        TransformKind::FahrenheitToCelsius => ((value - 32.0) * 5.0 / 9.0).round(),
    }
}
