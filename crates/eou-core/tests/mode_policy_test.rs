//! Process-wide policy resolution. Kept to a single test: the level is read
//! from the environment once per process and cached.
#![cfg(not(feature = "strict"))]

use eou_core::{EouError, ReseatRef, SafetyLevel, promote, safety_level, set_safety_level};
use std::ffi::c_void;
use std::ptr;

#[test]
fn env_selected_strict_mode_then_explicit_override() {
    // SAFETY: this binary runs no other test, so nothing reads the
    // environment concurrently.
    unsafe { std::env::set_var(eou_core::config::MODE_ENV_VAR, "strict") };
    assert_eq!(safety_level(), SafetyLevel::Strict);

    // SAFETY: null is handled before any read.
    let err = unsafe { promote(ptr::null(), 16) }.expect_err("strict rejects null source");
    assert!(matches!(err, EouError::InvalidArgument { operation: "promote", .. }));

    // SAFETY: as above.
    let err = unsafe { ReseatRef::<u32>::reinterpret(ptr::null_mut::<c_void>(), 4) }
        .expect_err("strict rejects null untyped pointer");
    assert!(err.is_invalid_argument());

    // The cached level survives later environment changes.
    // SAFETY: single-test binary.
    unsafe { std::env::set_var(eou_core::config::MODE_ENV_VAR, "tolerant") };
    assert_eq!(safety_level(), SafetyLevel::Strict);

    let previous = set_safety_level(SafetyLevel::Tolerant);
    assert_eq!(previous, SafetyLevel::Strict);
    // SAFETY: null is handled before any read.
    assert!(matches!(unsafe { promote(ptr::null(), 16) }, Ok(None)));
    // SAFETY: as above.
    assert!(matches!(
        unsafe { ReseatRef::<u32>::reinterpret(ptr::null_mut(), 4) },
        Ok(None)
    ));
}
