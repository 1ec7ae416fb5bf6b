// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The download_mode parameter only takes 0 or 1
    #[error("invalid download_mode value")]
    InvalidParam,

    /// The watchdog was armed and the chip is still running
    #[error("restarting has failed")]
    RestartFailed,

    /// PS_HOLD was dropped and the chip is still powered
    #[error("powering off has failed")]
    PowerOffFailed,

    /// The PMIC rendezvous owns the transition
    #[error("PMIC initiated shutdown in progress")]
    ShutdownInProgress,

    /// Another restart or power-off holds the controller
    #[error("restart controller busy")]
    Busy,

    /// The crash handler saw a crash magic restart mode and wants a panic
    #[error("crash handler detected panic (mode 0x{0:x})")]
    CrashHandlerTriggered(u32),

    #[error("device tree: {0}")]
    Fdt(&'static str),
}
