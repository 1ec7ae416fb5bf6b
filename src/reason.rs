// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Restart reason magic values.
//!
//! The values are read by the bootloader after a warm reset and must match
//! it bit for bit. Commands are matched by prefix, in table order.

use crate::platform::Features;
use crate::restart::{RestartControllerState, RESTART_DLOAD};
use crate::ssr;

pub const REASON_BOOTLOADER: u32 = 0x7766_5500;
pub const REASON_RESTART: u32 = 0x7766_5501;
pub const REASON_RECOVERY: u32 = 0x7766_5502;
pub const REASON_PERIPHERAL_HW_RESET: u32 = 0x7766_5507;
pub const REASON_NVBACKUP: u32 = 0x7766_5511;
pub const REASON_NVRESTORE: u32 = 0x7766_5512;
pub const REASON_NVERASE: u32 = 0x7766_5514;
pub const REASON_NVRECOVERY: u32 = 0x7766_5515;
pub const REASON_SEC_DEBUG_HW_RESET: u32 = 0x7766_55ee;
pub const REASON_OEM_BASE: u32 = 0x6f65_6d00;
pub const REASON_DOWNLOAD: u32 = 0x1234_5671;
pub const REASON_SUD_BASE: u32 = 0xabcf_0000;
pub const REASON_DEBUG_BASE: u32 = 0xabcd_0000;
pub const REASON_SWSEL_BASE: u32 = 0xabce_0000;
pub const REASON_CPDEBUG_BASE: u32 = 0xfedc_0000;
/// Clean reboot with no follow-up action
pub const REASON_CLEARED: u32 = 0x1234_5678;

/// Map a restart command to its reason word. Suffixes that do not parse
/// give the generic restart reason.
pub fn encode(cmd: &str, features: &Features) -> u32 {
    let tail = |prefix: &str| cmd.strip_prefix(prefix);

    if tail("bootloader").is_some() {
        REASON_BOOTLOADER
    } else if tail("recovery").is_some() {
        REASON_RECOVERY
    } else if let Some(code) = tail("oem-") {
        match parse_hex_prefix(code) {
            Some(v) => REASON_OEM_BASE | (v & 0xff) as u32,
            None => REASON_RESTART,
        }
    } else if features.sec_debug && tail("sec_debug_hw_reset").is_some() {
        REASON_SEC_DEBUG_HW_RESET
    } else if features.peripheral_secure_check && tail("peripheral_hw_reset").is_some() {
        log::info!("peripheral_hw_reset requested\n");
        REASON_PERIPHERAL_HW_RESET
    } else if tail("download").is_some() {
        REASON_DOWNLOAD
    } else if let Some(d) = tail("sud") {
        match d.bytes().next() {
            Some(c @ b'0'..=b'9') => REASON_SUD_BASE | (c - b'0') as u32,
            _ => REASON_RESTART,
        }
    } else if let Some(v) = tail("debug").and_then(parse_ulong) {
        REASON_DEBUG_BASE | (v & 0xffff) as u32
    } else if let Some(v) = tail("cpdebug")
        .filter(|_| features.ssr_debug_level)
        .and_then(parse_ulong)
    {
        REASON_CPDEBUG_BASE | (v & 0xffff) as u32
    } else if let Some(v) = tail("swsel")
        .filter(|_| features.dual_modem)
        .and_then(parse_ulong)
    {
        REASON_SWSEL_BASE | (v & 0xffff) as u32
    } else if tail("nvbackup").is_some() {
        REASON_NVBACKUP
    } else if tail("nvrestore").is_some() {
        REASON_NVRESTORE
    } else if tail("nverase").is_some() {
        REASON_NVERASE
    } else if tail("nvrecovery").is_some() {
        REASON_NVRECOVERY
    } else {
        REASON_RESTART
    }
}

/// Pick the reason word for this restart. With the crash handler present a
/// download request or a panic overrides the command; a clean reboot and a
/// panic reason never both get written.
pub fn select(st: &mut RestartControllerState, cmd: Option<&str>, panicking: bool) -> u32 {
    if st.profile.features.crash_handler {
        if st.restart_mode == RESTART_DLOAD {
            return ssr::REASON_DLOAD_CRASH;
        }
        if panicking {
            return ssr::kernel_crash_magic(st);
        }
    }

    match cmd {
        Some(cmd) => encode(cmd, &st.profile.features),
        None => REASON_CLEARED,
    }
}

/// Select and store the reason word, returning what was written.
pub fn record(st: &mut RestartControllerState, cmd: Option<&str>, panicking: bool) -> u32 {
    let reason = select(st, cmd, panicking);
    if reason == REASON_CLEARED {
        log::info!("clear reset flag\n");
    }
    st.store.write_reason(reason);
    log::info!("restart_reason = 0x{:x}\n", reason);
    reason
}

/// Leading hex digits, with an optional 0x prefix. Parsing stops at the
/// first non-hex character; `None` if there are no digits at all.
fn parse_hex_prefix(s: &str) -> Option<u64> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_hexdigit()))
        .unwrap_or(s);

    let digits = s.bytes().take_while(u8::is_ascii_hexdigit);
    let mut seen = false;
    let mut v: u64 = 0;
    for d in digits {
        seen = true;
        v = v.wrapping_mul(16).wrapping_add(hex_value(d));
    }
    seen.then_some(v)
}

fn hex_value(d: u8) -> u64 {
    match d {
        b'0'..=b'9' => (d - b'0') as u64,
        b'a'..=b'f' => (d - b'a' + 10) as u64,
        _ => (d - b'A' + 10) as u64,
    }
}

/// Whole-string unsigned integer with C base detection: 0x for hex, a
/// leading 0 for octal, decimal otherwise. A single trailing newline is
/// tolerated. Overflow is a parse failure.
pub(crate) fn parse_ulong(s: &str) -> Option<u64> {
    let s = s.strip_suffix('\n').unwrap_or(s);
    let s = s.strip_prefix('+').unwrap_or(s);

    let (digits, radix) = if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (h, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}
