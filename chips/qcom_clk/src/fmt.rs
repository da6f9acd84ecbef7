// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Diagnostic macros.
//!
//! With the `log` feature the macros forward to the `log` crate and the board
//! decides where the output goes. Without it they still borrow their
//! arguments so that call sites do not trip unused-variable lints.

#![allow(unused_macros)]

macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);
            #[cfg(not(feature = "log"))]
            let _ = ($( &$x, )*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        log_at!(trace, $($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log_at!(debug, $($arg)*)
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        log_at!(info, $($arg)*)
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log_at!(warn, $($arg)*)
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        log_at!(error, $($arg)*)
    };
}
