//! Conditional logging and assertion macros.
//!
//! All of these compile away to nothing unless the matching cargo feature
//! is enabled, so the hot interpreter loop pays no cost in release builds.

#[cfg(feature = "debug")]
#[macro_export]
macro_rules! debugln {
    ($($rest:tt)*) => {
        std::println!($($rest)*)
    }
}

#[cfg(not(feature = "debug"))]
#[macro_export]
macro_rules! debugln {
    ($($rest:tt)*) => {
        ()
    };
}

#[macro_export]
macro_rules! warnln {
    ($($rest:tt)*) => {
        std::eprintln!($($rest)*)
    }
}

#[cfg(feature = "debug")]
#[macro_export]
macro_rules! infoln {
    ($($rest:tt)*) => {
        std::println!($($rest)*)
    }
}

#[cfg(not(feature = "debug"))]
#[macro_export]
macro_rules! infoln {
    ($($rest:tt)*) => {
        ()
    };
}

/// Panics carrying a message, used for conditions that indicate a bug in
/// the core itself (as opposed to malformed input, which is surfaced as
/// a typed [`crate::error::Error`]).
#[macro_export]
macro_rules! panic_gb {
    ($($rest:tt)*) => {
        panic!($($rest)*)
    }
}

/// Assertion that is only active when the `pedantic` feature is enabled,
/// used to catch emulation invariant violations during development/testing
/// without paying the cost in normal release builds.
#[cfg(feature = "pedantic")]
#[macro_export]
macro_rules! assert_pedantic_gb {
    ($cond:expr, $($rest:tt)*) => {
        assert!($cond, $($rest)*)
    }
}

#[cfg(not(feature = "pedantic"))]
#[macro_export]
macro_rules! assert_pedantic_gb {
    ($cond:expr, $($rest:tt)*) => {
        ()
    };
}
