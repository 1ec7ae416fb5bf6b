// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Restart reason and download magic cells in shared IMEM.
//!
//! The next boot stage reads these words straight through a warm reset, so
//! every store is followed by a full barrier. There is no handshake: the only
//! ordering guarantee is that the barrier retires before PS_HOLD is dropped
//! or the watchdog is allowed to bite.

use mmio::{Allow, VolBox};
use once_cell::unsync::OnceCell;

pub const RESTART_REASON_OFFSET: usize = 0x65c;
pub const DLOAD_MODE_OFFSET: usize = 0x0;
pub const CRASH_COOKIE_OFFSET: usize = 0x18;

/// Full system barrier, equivalent of mb()
#[inline(always)]
pub fn mb() {
    #[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "arm")))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

type Cell = VolBox<u32, Allow, Allow>;

pub struct ReasonStore {
    reason: OnceCell<Cell>,
    dload: OnceCell<(Cell, Cell)>,
    cookie: OnceCell<Cell>,
}

impl ReasonStore {
    pub const fn new() -> ReasonStore {
        ReasonStore {
            reason: OnceCell::new(),
            dload: OnceCell::new(),
            cookie: OnceCell::new(),
        }
    }

    /// Map the store at `imem_base`. Mapping happens once; later calls
    /// leave the first mapping in place.
    ///
    /// # Safety
    ///
    /// `imem_base` must point to at least one page of device memory that
    /// stays mapped for the lifetime of this store.
    pub unsafe fn map(&self, imem_base: usize) {
        let cell = |off: usize| Cell::new((imem_base + off) as *mut u32);

        self.reason.get_or_init(|| cell(RESTART_REASON_OFFSET));
        self.dload.get_or_init(|| {
            (
                cell(DLOAD_MODE_OFFSET),
                cell(DLOAD_MODE_OFFSET + core::mem::size_of::<u32>()),
            )
        });
        self.cookie.get_or_init(|| cell(CRASH_COOKIE_OFFSET));
    }

    pub fn is_mapped(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn write_reason(&mut self, value: u32) {
        if let Some(r) = self.reason.get_mut() {
            r.write(value);
            mb();
        }
    }

    pub fn reason(&self) -> Option<u32> {
        self.reason.get().map(|r| r.read())
    }

    pub fn write_dload_magic(&mut self, magic: (u32, u32)) {
        if let Some((lo, hi)) = self.dload.get_mut() {
            lo.write(magic.0);
            hi.write(magic.1);
            mb();
        }
    }

    pub fn dload_magic(&self) -> Option<(u32, u32)> {
        self.dload.get().map(|(lo, hi)| (lo.read(), hi.read()))
    }

    pub fn write_crash_cookie(&mut self, value: u32) {
        if let Some(c) = self.cookie.get_mut() {
            c.write(value);
            mb();
        }
    }

    pub fn crash_cookie(&self) -> Option<u32> {
        self.cookie.get().map(|c| c.read())
    }
}

impl Default for ReasonStore {
    fn default() -> Self {
        ReasonStore::new()
    }
}
