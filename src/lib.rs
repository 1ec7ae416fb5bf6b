// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Restart, power-off and download mode control for MSM SoCs.
//!
//! The restart reason and download mode magic live in shared IMEM, where
//! the bootloader picks them up after a warm reset. A restart drops PS_HOLD
//! and falls back to a short watchdog bite if the SoC is still alive. The
//! PMIC shutdown interrupt stops every core and has core 0 hand the
//! shutdown to the PMIC through the secure monitor.

#![no_std]

#[cfg(test)]
extern crate std;

mod error;

pub mod dload;
pub mod imem;
pub mod platform;
pub mod pmic;
pub mod reason;
pub mod rendezvous;
pub mod restart;
pub mod scm;
pub mod ssr;
pub mod wdog;

pub use error::Error;
pub use platform::{Board, Features, PlatformConfig, PlatformProfile};
pub use pmic::Pmic;
pub use rendezvous::{Cpus, Halted};
pub use restart::{Phase, RestartController, RestartControllerState, RestartRequest};
pub use scm::SecureMonitor;
