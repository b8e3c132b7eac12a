//! Best-effort device location.
//!
//! A report is never held up by location: [`acquire`] bounds the attempt
//! with a hard timeout and turns every failure into `None`, which the
//! submission flow sends as the `"0"`/`"0"` sentinel.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desa_sos_emergency_models::Coordinates;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Accuracy radius in meters, when known.
    pub accuracy_m: Option<f64>,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// Coordinates as sent to the server.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::from_degrees(self.latitude, self.longitude)
    }
}

/// Coordinates for an optional fix, falling back to the sentinel.
#[must_use]
pub fn coordinates_or_sentinel(position: Option<&Position>) -> Coordinates {
    position.map_or_else(Coordinates::unresolved, Position::coordinates)
}

/// How a fix may be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Prefer a precise fix over a fast one.
    pub high_accuracy: bool,
    /// Longest wait for a fix.
    pub timeout: Duration,
    /// Oldest cached fix that is still acceptable.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(15),
            maximum_age: Duration::from_secs(5 * 60),
        }
    }
}

/// Why no fix was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeolocationError {
    /// The user refused location access.
    #[error("Location permission denied")]
    PermissionDenied,

    /// The device could not determine a position.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix within the timeout.
    #[error("Timed out waiting for a position")]
    Timeout,

    /// There is no location source at all.
    #[error("Geolocation is not supported")]
    Unsupported,
}

/// Source of position fixes.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Requests one fix.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocationError`] if no fix can be obtained.
    async fn current_position(&self, options: &PositionOptions)
    -> Result<Position, GeolocationError>;
}

/// Attempts one fix, never waiting longer than `options.timeout` and never
/// failing. Errors are logged and yield `None`.
pub async fn acquire(provider: &dyn PositionProvider, options: &PositionOptions) -> Option<Position> {
    let result = tokio::time::timeout(options.timeout, provider.current_position(options))
        .await
        .unwrap_or(Err(GeolocationError::Timeout));

    match result {
        Ok(position) => {
            log::debug!(
                "Got position {},{} (accuracy {:?} m)",
                position.latitude,
                position.longitude,
                position.accuracy_m
            );
            Some(position)
        }
        Err(e) => {
            log::warn!("Continuing without location: {e}");
            None
        }
    }
}

/// Always returns the same coordinates, e.g. from command-line flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPosition {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

#[async_trait]
impl PositionProvider for FixedPosition {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Position, GeolocationError> {
        Ok(Position {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_m: None,
            timestamp: Utc::now(),
        })
    }
}

/// No location source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPosition;

#[async_trait]
impl PositionProvider for UnsupportedPosition {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Position, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}

/// Reuses the last fix while it is younger than `maximum_age`.
pub struct CachedPosition<P> {
    inner: P,
    last: Mutex<Option<Position>>,
}

impl<P: PositionProvider> CachedPosition<P> {
    /// Wraps `inner`.
    pub const fn new(inner: P) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    fn fresh(&self, maximum_age: Duration) -> Option<Position> {
        let last = *self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.filter(|p| {
            (Utc::now() - p.timestamp)
                .to_std()
                .is_ok_and(|age| age <= maximum_age)
        })
    }
}

#[async_trait]
impl<P: PositionProvider> PositionProvider for CachedPosition<P> {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, GeolocationError> {
        if let Some(cached) = self.fresh(options.maximum_age) {
            return Ok(cached);
        }

        let position = self.inner.current_position(options).await?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(position);
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Failing(GeolocationError);

    #[async_trait]
    impl PositionProvider for Failing {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Position, GeolocationError> {
            Err(self.0.clone())
        }
    }

    struct Hanging;

    #[async_trait]
    impl PositionProvider for Hanging {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Position, GeolocationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(GeolocationError::Timeout)
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PositionProvider for Counting {
        async fn current_position(
            &self,
            _options: &PositionOptions,
        ) -> Result<Position, GeolocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Position {
                latitude: -7.8,
                longitude: 110.4,
                accuracy_m: Some(12.0),
                timestamp: Utc::now(),
            })
        }
    }

    #[test]
    fn default_options() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(15));
        assert_eq!(options.maximum_age, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn every_failure_yields_no_location() {
        let options = PositionOptions::default();
        for error in [
            GeolocationError::PermissionDenied,
            GeolocationError::PositionUnavailable("no satellites".to_string()),
            GeolocationError::Timeout,
            GeolocationError::Unsupported,
        ] {
            assert_eq!(acquire(&Failing(error), &options).await, None);
        }
        assert_eq!(acquire(&UnsupportedPosition, &options).await, None);
    }

    #[tokio::test]
    async fn hanging_provider_is_cut_off() {
        let options = PositionOptions {
            timeout: Duration::from_millis(50),
            ..PositionOptions::default()
        };
        let started = std::time::Instant::now();
        assert_eq!(acquire(&Hanging, &options).await, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_location_becomes_sentinel() {
        let options = PositionOptions::default();
        let position = acquire(&UnsupportedPosition, &options).await;
        let coordinates = coordinates_or_sentinel(position.as_ref());
        assert_eq!(coordinates.latitude, "0");
        assert_eq!(coordinates.longitude, "0");

        let fixed = FixedPosition {
            latitude: -7.797_068,
            longitude: 110.370_529,
        };
        let position = acquire(&fixed, &options).await;
        assert!(!coordinates_or_sentinel(position.as_ref()).is_unresolved());
    }

    #[tokio::test]
    async fn cache_honors_maximum_age() {
        let cached = CachedPosition::new(Counting::default());
        let options = PositionOptions::default();

        cached.current_position(&options).await.unwrap();
        cached.current_position(&options).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        let no_cache = PositionOptions {
            maximum_age: Duration::ZERO,
            ..options
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cached.current_position(&no_cache).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }
}
