//! Null/invalid-argument policy configuration.
//!
//! Whether a null untyped pointer or a null promoter source is an error is a
//! policy choice, resolved in this order:
//! - the `strict` cargo feature fixes [`SafetyLevel::Strict`] for the whole
//!   build; [`set_safety_level`] cannot lower it;
//! - otherwise the `EOU_MODE` environment variable (`strict` | `tolerant`),
//!   read once and cached for the life of the process;
//! - otherwise [`SafetyLevel::Tolerant`].
//!
//! Every policy-dependent operation also has a `*_with(level, ..)` form that
//! bypasses the process-wide setting.

use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted for the process-wide level.
pub const MODE_ENV_VAR: &str = "EOU_MODE";

/// How invalid arguments (null sources, undersized reinterpretations) are treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Invalid arguments are tolerated: the operation yields no result
    /// (`Ok(None)`) instead of signalling.
    #[default]
    Tolerant,
    /// Invalid arguments are signalled as `EouError::InvalidArgument`.
    Strict,
}

impl SafetyLevel {
    /// Parse from string (case-insensitive). Unknown input maps to `Tolerant`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "throw" | "checked" | "1" => Self::Strict,
            _ => Self::Tolerant,
        }
    }

    /// Returns true if invalid arguments are reported as errors.
    #[must_use]
    pub const fn rejects_invalid(self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Stable lowercase name, as accepted by [`SafetyLevel::from_str_loose`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tolerant => "tolerant",
            Self::Strict => "strict",
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// 0=unresolved, 1=Tolerant, 2=Strict.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(LEVEL_UNRESOLVED);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_TOLERANT: u8 = 1;
const LEVEL_STRICT: u8 = 2;

fn level_to_u8(level: SafetyLevel) -> u8 {
    match level {
        SafetyLevel::Tolerant => LEVEL_TOLERANT,
        SafetyLevel::Strict => LEVEL_STRICT,
    }
}

fn u8_to_level(v: u8) -> SafetyLevel {
    match v {
        LEVEL_STRICT => SafetyLevel::Strict,
        _ => SafetyLevel::Tolerant,
    }
}

fn resolve_level() -> SafetyLevel {
    std::env::var(MODE_ENV_VAR)
        .map(|v| SafetyLevel::from_str_loose(&v))
        .unwrap_or_default()
}

/// The process-wide safety level (resolved on first call, cached thereafter).
#[must_use]
pub fn safety_level() -> SafetyLevel {
    if cfg!(feature = "strict") {
        return SafetyLevel::Strict;
    }
    let cached = CACHED_LEVEL.load(Ordering::Relaxed);
    if cached != LEVEL_UNRESOLVED {
        return u8_to_level(cached);
    }

    let level = resolve_level();
    // A racing resolver computes the same value, so losing the exchange is fine.
    let _ = CACHED_LEVEL.compare_exchange(
        LEVEL_UNRESOLVED,
        level_to_u8(level),
        Ordering::AcqRel,
        Ordering::Relaxed,
    );
    u8_to_level(CACHED_LEVEL.load(Ordering::Acquire))
}

/// Override the process-wide level, returning the previous one.
///
/// Intended for drivers that take the mode from their own command line.
/// Builds with the `strict` feature ignore the override and stay strict.
pub fn set_safety_level(level: SafetyLevel) -> SafetyLevel {
    let previous = safety_level();
    if cfg!(feature = "strict") {
        return previous;
    }
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
    previous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_safety_levels() {
        assert_eq!(SafetyLevel::from_str_loose("strict"), SafetyLevel::Strict);
        assert_eq!(SafetyLevel::from_str_loose("STRICT"), SafetyLevel::Strict);
        assert_eq!(SafetyLevel::from_str_loose(" throw "), SafetyLevel::Strict);
        assert_eq!(SafetyLevel::from_str_loose("1"), SafetyLevel::Strict);
        assert_eq!(
            SafetyLevel::from_str_loose("tolerant"),
            SafetyLevel::Tolerant
        );
        assert_eq!(SafetyLevel::from_str_loose("bogus"), SafetyLevel::Tolerant);
        assert_eq!(SafetyLevel::from_str_loose(""), SafetyLevel::Tolerant);
    }

    #[test]
    fn default_is_tolerant() {
        assert_eq!(SafetyLevel::default(), SafetyLevel::Tolerant);
    }

    #[test]
    fn only_strict_rejects() {
        assert!(SafetyLevel::Strict.rejects_invalid());
        assert!(!SafetyLevel::Tolerant.rejects_invalid());
    }

    #[test]
    fn display_round_trips_through_parser() {
        for level in [SafetyLevel::Tolerant, SafetyLevel::Strict] {
            assert_eq!(SafetyLevel::from_str_loose(&level.to_string()), level);
        }
    }

    #[test]
    fn cached_level_is_sticky() {
        let previous = CACHED_LEVEL.swap(LEVEL_STRICT, Ordering::SeqCst);
        assert_eq!(safety_level(), SafetyLevel::Strict);
        assert_eq!(safety_level(), SafetyLevel::Strict);
        CACHED_LEVEL.store(previous, Ordering::SeqCst);
    }
}
