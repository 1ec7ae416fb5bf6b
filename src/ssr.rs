// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Crash handler reasons: which subsystem or kernel crash caused a restart.

use crate::restart::RestartControllerState;

pub const SSR_MAGIC_BASE: u32 = 0x6d63_0000;
pub const SSR_MAGIC_MASK: u32 = 0xffff_0000;
/// Subsystem restart of a subsystem not in the list
pub const SSR_MAGIC_UNKNOWN: u32 = SSR_MAGIC_BASE | 0xf000;

pub const REASON_KERNEL_CRASH: u32 = 0x6d63_0100;
pub const REASON_DLOAD_CRASH: u32 = 0x6d63_c421;
/// Written at init; replaced by a real reason on any orderly restart
pub const REASON_BOOTING: u32 = 0x6d63_ad00;

pub const CRASH_COOKIE: u32 = 0xa97f_2c46;

const SUBSYSTEMS: [&str; 6] = ["modem", "riva", "dsps", "lpass", "external_modem", "gss"];

pub fn magic_for(subsys: &str) -> u32 {
    SUBSYSTEMS
        .iter()
        .position(|s| *s == subsys)
        .map_or(SSR_MAGIC_UNKNOWN, |i| SSR_MAGIC_BASE | ((i as u32 + 1) << 12))
}

pub fn is_crash_magic(mode: u32) -> bool {
    mode & SSR_MAGIC_MASK == SSR_MAGIC_BASE
}

/// The reason for a kernel panic: a plain kernel crash, or the restart mode
/// if a subsystem restart escalated into this panic.
pub fn kernel_crash_magic(st: &mut RestartControllerState) -> u32 {
    st.wdog.pet();
    if st.ssr_magic == 0 {
        REASON_KERNEL_CRASH
    } else {
        st.restart_mode
    }
}
