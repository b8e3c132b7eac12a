#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Client-side abuse guard for the SOS button.
//!
//! Pressing SOS opens a confirmation step. Every cancelled confirmation
//! bumps a durable counter: the third shows a warning, the fifth locks the
//! button for a minute and asks the UI to sign the user out shortly after.
//! The lockout expiry is persisted through a [`store::LockoutStore`], so
//! restarting the client does not lift it. When the countdown reaches zero
//! both the expiry and the counter are cleared.
//!
//! ```text
//! Idle ──press──▶ Confirming ──confirm──▶ Armed ──success/abandon──▶ Idle
//!                    │
//!                 cancel ──▶ Idle | WarningShown | Blocked { until }
//! ```

pub mod clock;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum_macros::Display;

use crate::clock::Clock;
use crate::store::{LockoutRecord, LockoutStore};

/// Errors raised by the guard.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Lockout state could not be read or written.
    #[error("Lockout storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Lockout state could not be encoded.
    #[error("Lockout encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Guard thresholds could not be parsed.
    #[error("Invalid guard config: {0}")]
    Config(#[from] toml::de::Error),

    /// A threshold or timer is outside the accepted range.
    #[error("Guard setting {field} must be at most {max}")]
    OutOfRange {
        /// Offending setting.
        field: &'static str,
        /// Largest accepted value.
        max: u64,
    },

    /// The action is not valid in the current state.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        /// State the guard was in.
        state: GuardState,
        /// Attempted action.
        action: &'static str,
    },
}

/// Longest lockout accepted, one week.
pub const MAX_LOCKOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Cancellation count that shows the warning.
    pub warning_threshold: u32,
    /// Cancellation count that starts a lockout.
    pub block_threshold: u32,
    /// Lockout length in seconds.
    pub lockout_secs: u64,
    /// Seconds between the lockout notice and the forced sign-out.
    pub forced_logout_secs: u64,
    /// Clear the counter after a report is sent successfully.
    pub reset_on_success: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 3,
            block_threshold: 5,
            lockout_secs: 60,
            forced_logout_secs: 3,
            reset_on_success: false,
        }
    }
}

impl GuardConfig {
    /// Reads the `[guard]` table of a TOML document. Other tables are
    /// ignored and a missing table yields the defaults.
    ///
    /// # Errors
    ///
    /// * [`GuardError::Config`] if the document is not valid
    /// * [`GuardError::OutOfRange`] if `lockout_secs` exceeds
    ///   [`MAX_LOCKOUT_SECS`]
    pub fn from_toml_str(text: &str) -> Result<Self, GuardError> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            guard: GuardConfig,
        }

        let config = toml::from_str::<Document>(text)?.guard;
        if config.lockout_secs > MAX_LOCKOUT_SECS {
            return Err(GuardError::OutOfRange {
                field: "lockout_secs",
                max: MAX_LOCKOUT_SECS,
            });
        }
        Ok(config)
    }

    /// Lockout length, capped at [`MAX_LOCKOUT_SECS`].
    fn lockout(&self) -> chrono::Duration {
        let secs = self.lockout_secs.min(MAX_LOCKOUT_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or_default())
    }
}

/// Where the guard is in the SOS flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum GuardState {
    /// Waiting for a press.
    Idle,
    /// Asking the user to confirm.
    Confirming,
    /// Confirmed; location and form may proceed.
    Armed,
    /// Idle, with the repeated-cancellation warning on screen.
    WarningShown,
    /// Locked out until `until`.
    Blocked {
        /// End of the lockout.
        until: DateTime<Utc>,
    },
}

/// Result of pressing the SOS control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The confirmation step is open.
    Confirming,
    /// Locked out; the notice should be shown again.
    Blocked {
        /// End of the lockout.
        until: DateTime<Utc>,
        /// Whole seconds left, rounded up.
        remaining_secs: u64,
    },
}

/// Result of cancelling the confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Counted, nothing else happens.
    Cancelled {
        /// Counter after this cancellation.
        count: u32,
    },
    /// Counted and the warning threshold was hit exactly.
    Warning {
        /// Counter after this cancellation.
        count: u32,
    },
    /// Counted and a lockout started.
    Blocked {
        /// Counter after this cancellation.
        count: u32,
        /// End of the lockout.
        until: DateTime<Utc>,
        /// Whole seconds left, rounded up.
        remaining_secs: u64,
        /// Delay before the UI signs the user out.
        force_logout_after: Duration,
    },
}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No lockout is running.
    NotBlocked,
    /// Still locked; whole seconds left, rounded up.
    Remaining(u64),
    /// The lockout just ended and the guard is idle again.
    Expired,
}

/// Gate in front of SOS submissions.
pub trait RateLimiter: Send {
    /// Current state.
    fn state(&self) -> GuardState;

    /// User pressed SOS.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the press is not valid now or lockout
    /// storage fails.
    fn press(&mut self) -> Result<PressOutcome, GuardError>;

    /// User confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidTransition`] outside the confirmation
    /// step.
    fn confirm(&mut self) -> Result<(), GuardError>;

    /// User cancelled the confirmation step.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] outside the confirmation step or if lockout
    /// storage fails.
    fn cancel(&mut self) -> Result<CancelOutcome, GuardError>;

    /// Advances the lockout countdown. Call once per second while blocked.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if clearing an expired lockout fails.
    fn tick(&mut self) -> Result<Tick, GuardError>;

    /// A report was sent successfully.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the guard was not armed or lockout storage
    /// fails.
    fn record_success(&mut self) -> Result<(), GuardError>;

    /// The user left the form without sending. Nothing is counted.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidTransition`] if the guard was not
    /// armed.
    fn abandon(&mut self) -> Result<(), GuardError>;
}

/// [`RateLimiter`] backed by a [`LockoutStore`] and a [`Clock`].
pub struct AbuseGuard {
    store: Box<dyn LockoutStore>,
    clock: Arc<dyn Clock>,
    config: GuardConfig,
    state: GuardState,
    record: LockoutRecord,
}

impl AbuseGuard {
    /// Builds the guard from persisted state, as on page load.
    ///
    /// A lockout that is still running is restored as
    /// [`GuardState::Blocked`]; one that already ran out is cleared
    /// together with the counter.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the store cannot be read or cleared.
    pub fn restore(
        store: Box<dyn LockoutStore>,
        clock: Arc<dyn Clock>,
        config: GuardConfig,
    ) -> Result<Self, GuardError> {
        let record = store.load()?;
        let mut guard = Self {
            store,
            clock,
            config,
            state: GuardState::Idle,
            record,
        };

        match record.block_until {
            Some(until) if until > guard.clock.now() => {
                log::info!("Restored SOS lockout until {until}");
                guard.state = GuardState::Blocked { until };
            }
            Some(until) => {
                log::debug!("Clearing SOS lockout that ended at {until}");
                guard.clear()?;
            }
            None => {}
        }

        Ok(guard)
    }

    /// Cancellations counted so far.
    #[must_use]
    pub const fn cancel_count(&self) -> u32 {
        self.record.cancel_count
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Seconds left on the lockout, rounded up. `None` when not blocked.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u64> {
        match self.state {
            GuardState::Blocked { until } => Some(seconds_until(until, self.clock.now())),
            _ => None,
        }
    }

    /// Hides the warning. The counter is unchanged.
    pub fn dismiss_warning(&mut self) {
        if self.state == GuardState::WarningShown {
            self.state = GuardState::Idle;
        }
    }

    fn clear(&mut self) -> Result<(), GuardError> {
        self.record = LockoutRecord::default();
        self.store.save(&self.record)?;
        self.state = GuardState::Idle;
        Ok(())
    }

    const fn invalid(&self, action: &'static str) -> GuardError {
        GuardError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}

impl RateLimiter for AbuseGuard {
    fn state(&self) -> GuardState {
        self.state
    }

    fn press(&mut self) -> Result<PressOutcome, GuardError> {
        if let GuardState::Blocked { until } = self.state {
            let now = self.clock.now();
            if now < until {
                return Ok(PressOutcome::Blocked {
                    until,
                    remaining_secs: seconds_until(until, now),
                });
            }
            self.clear()?;
        }

        match self.state {
            GuardState::Idle | GuardState::WarningShown | GuardState::Confirming => {
                self.state = GuardState::Confirming;
                Ok(PressOutcome::Confirming)
            }
            GuardState::Armed | GuardState::Blocked { .. } => Err(self.invalid("press")),
        }
    }

    fn confirm(&mut self) -> Result<(), GuardError> {
        if self.state != GuardState::Confirming {
            return Err(self.invalid("confirm"));
        }
        self.state = GuardState::Armed;
        Ok(())
    }

    fn cancel(&mut self) -> Result<CancelOutcome, GuardError> {
        if self.state != GuardState::Confirming {
            return Err(self.invalid("cancel"));
        }

        self.record.cancel_count += 1;
        let count = self.record.cancel_count;

        if count >= self.config.block_threshold {
            let now = self.clock.now();
            let until = now
                .checked_add_signed(self.config.lockout())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.record.block_until = Some(until);
            self.store.save(&self.record)?;
            self.state = GuardState::Blocked { until };
            log::warn!("SOS locked until {until} after {count} cancellations");
            return Ok(CancelOutcome::Blocked {
                count,
                until,
                remaining_secs: seconds_until(until, now),
                force_logout_after: Duration::from_secs(self.config.forced_logout_secs),
            });
        }

        self.store.save(&self.record)?;
        if count == self.config.warning_threshold {
            self.state = GuardState::WarningShown;
            Ok(CancelOutcome::Warning { count })
        } else {
            self.state = GuardState::Idle;
            Ok(CancelOutcome::Cancelled { count })
        }
    }

    fn tick(&mut self) -> Result<Tick, GuardError> {
        let GuardState::Blocked { until } = self.state else {
            return Ok(Tick::NotBlocked);
        };

        let remaining = seconds_until(until, self.clock.now());
        if remaining > 0 {
            return Ok(Tick::Remaining(remaining));
        }

        log::info!("SOS lockout ended");
        self.clear()?;
        Ok(Tick::Expired)
    }

    fn record_success(&mut self) -> Result<(), GuardError> {
        if self.state != GuardState::Armed {
            return Err(self.invalid("record a sent report"));
        }
        self.state = GuardState::Idle;

        if self.config.reset_on_success && self.record.cancel_count > 0 {
            self.record.cancel_count = 0;
            self.store.save(&self.record)?;
        }
        Ok(())
    }

    fn abandon(&mut self) -> Result<(), GuardError> {
        if self.state != GuardState::Armed {
            return Err(self.invalid("abandon"));
        }
        self.state = GuardState::Idle;
        Ok(())
    }
}

fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    u64::try_from(millis).map_or(0, |ms| ms.div_ceil(1000))
}
