// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Download mode: asks the next boot stage to stop for a memory dump.
//!
//! The flag is a two-word magic in IMEM, gated by the `download_mode` master
//! switch. With the switch off the magic is always cleared, whatever the
//! caller asked for.

use crate::reason::parse_ulong;
use crate::restart::{RestartControllerState, RESTART_DLOAD};
use crate::ssr;
use crate::Error;

pub const DLOAD_MAGIC_ON: (u32, u32) = (0xe47b_337d, 0xce14_091a);
pub const DLOAD_MAGIC_OFF: (u32, u32) = (0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DloadState {
    Off,
    On,
}

/// Master switch plus the state last written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadMode {
    enabled: bool,
    state: DloadState,
}

impl DownloadMode {
    pub const fn new(enabled: bool) -> DownloadMode {
        DownloadMode {
            enabled,
            state: DloadState::Off,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> DloadState {
        self.state
    }
}

/// Write the magic for `on`, unless the master switch forces it off.
pub fn set(st: &mut RestartControllerState, on: bool) -> DloadState {
    let state = if on && st.dload.enabled {
        DloadState::On
    } else {
        DloadState::Off
    };
    let armed = state == DloadState::On;

    st.store.write_dload_magic(if armed { DLOAD_MAGIC_ON } else { DLOAD_MAGIC_OFF });
    if st.profile.features.crash_handler {
        st.store
            .write_crash_cookie(if armed { ssr::CRASH_COOKIE } else { 0 });
    }
    st.dload.state = state;

    log::debug!("set_dload_mode <{}>\n", armed as u8);
    state
}

/// First step of every restart. Clear the flag as if this were a normal
/// reboot, then re-arm it only for a panic or an explicit download request.
pub fn quiesce(st: &mut RestartControllerState, panicking: bool) -> DloadState {
    set(st, false);
    if panicking || st.restart_mode == RESTART_DLOAD {
        set(st, true)
    } else {
        DloadState::Off
    }
}

/// Handle a write to the `download_mode` parameter. Only 0 and 1 are
/// accepted; anything else leaves the previous setting in place.
pub fn set_master(st: &mut RestartControllerState, val: &str) -> Result<DloadState, Error> {
    let enabled = match parse_ulong(val) {
        Some(0) => false,
        Some(1) => true,
        _ => return Err(Error::InvalidParam),
    };

    st.dload.enabled = enabled;
    let state = set(st, enabled);
    if st.profile.features.crash_handler {
        st.ssr_magic = 0;
    }
    Ok(state)
}

/// True when the store currently carries the download magic.
pub fn is_armed(st: &RestartControllerState) -> bool {
    st.store.dload_magic() == Some(DLOAD_MAGIC_ON)
}
