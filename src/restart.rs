// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Restart and power-off sequencing.
//!
//! A restart walks through a fixed series of phases and each one must
//! complete before the next starts:
//!
//! ```text
//! Idle -> QuiesceDload -> EncodeReason -> PrimaryReset -> FallbackArm -> FallbackWait
//! ```
//!
//! On working hardware the SoC resets during the PS_HOLD wait, or at the
//! latest when the watchdog bites. Returning from a restart or power-off
//! therefore always means failure.

use core::convert::Infallible;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};
use spinning_top::{Spinlock, SpinlockGuard};

use crate::dload::{self, DloadState, DownloadMode};
use crate::imem::ReasonStore;
use crate::platform::{PlatformConfig, PlatformProfile};
use crate::pmic::Pmic;
use crate::reason;
use crate::scm::SecureMonitor;
use crate::ssr;
use crate::wdog::{PsHold, Watchdog};
use crate::Error;

pub const RESTART_NORMAL: u32 = 0;
pub const RESTART_DLOAD: u32 = 1;

pub const PSHOLD_TIMEOUT_MS: u32 = 5000;
pub const WATCHDOG_TIMEOUT_MS: u32 = 10000;
pub const POWER_OFF_TIMEOUT_MS: u32 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle,
    QuiesceDload,
    EncodeReason,
    PrimaryReset,
    FallbackArm,
    FallbackWait,
    PowerOff,
    PowerOffWait,
    /// Terminal. Entered from the PMIC shutdown rendezvous only.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestartRequest<'a> {
    /// Restart command, if the caller passed one
    pub command: Option<&'a str>,
    pub is_panic: bool,
}

impl<'a> RestartRequest<'a> {
    pub fn new(command: Option<&'a str>) -> Self {
        RestartRequest {
            command,
            is_panic: false,
        }
    }

    pub fn panic(command: Option<&'a str>) -> Self {
        RestartRequest {
            command,
            is_panic: true,
        }
    }
}

/// Everything the restart path mutates. Created once at init and only
/// changed through the dload, reason and ssr helpers and the sequencer.
pub struct RestartControllerState {
    pub(crate) store: ReasonStore,
    pub(crate) dload: DownloadMode,
    pub(crate) wdog: Watchdog,
    pub(crate) pshold: PsHold,
    pub(crate) profile: PlatformProfile,
    pub(crate) restart_mode: u32,
    pub(crate) ssr_magic: u32,
    phase: Phase,
}

impl RestartControllerState {
    /// # Safety
    ///
    /// The IMEM, timer0 and PS_HOLD addresses in `config` must be mapped
    /// device memory that stays mapped for the lifetime of the state.
    pub unsafe fn new(config: &PlatformConfig) -> RestartControllerState {
        let store = ReasonStore::new();
        if let Some(base) = config.imem_base {
            store.map(base);
        }

        RestartControllerState {
            store,
            dload: DownloadMode::new(config.download_mode),
            wdog: Watchdog::new(config.timer0_base),
            pshold: PsHold::new(config.pshold_addr),
            profile: config.profile,
            restart_mode: RESTART_NORMAL,
            ssr_magic: 0,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}\n", self.phase, phase);
        self.phase = phase;
    }
}

pub(crate) struct Sequencer<P, D, S> {
    pub(crate) st: RestartControllerState,
    pub(crate) pmic: P,
    pub(crate) delay: D,
    pub(crate) scm: S,
}

// SAFETY: the MMIO cells in the state point at device memory that is mapped
// for the lifetime of the controller and is equally reachable from every
// core. All access to them goes through the state lock in RestartController,
// or through the transition that holds the ownership claim.
unsafe impl<P: Send, D: Send, S: Send> Send for Sequencer<P, D, S> {}

impl<P: Pmic, D: DelayNs, S: SecureMonitor> Sequencer<P, D, S> {
    fn restart(&mut self, cmd: Option<&str>, panicking: bool) -> Result<Infallible, Error> {
        let st = &mut self.st;

        st.enter(Phase::QuiesceDload);
        dload::quiesce(st, panicking);

        info!("Going down for restart now\n");
        self.pmic.reset_pwr_off(true);

        st.enter(Phase::EncodeReason);
        reason::record(st, cmd, panicking);

        st.enter(Phase::PrimaryReset);
        st.wdog.disable();
        if st.profile.board.drops_pshold_on_restart() {
            st.pshold.drop_line();
            self.delay.delay_ms(PSHOLD_TIMEOUT_MS);
            warn!("PS_HOLD didn't work, falling back to watchdog\n");
        }

        st.enter(Phase::FallbackArm);
        st.wdog.arm_fallback();

        st.enter(Phase::FallbackWait);
        self.delay.delay_ms(WATCHDOG_TIMEOUT_MS);
        error!("Restarting has failed\n");
        Err(Error::RestartFailed)
    }

    /// Clear download mode and tell the PMIC to remove power rather than
    /// restart once PS_HOLD goes away.
    pub(crate) fn pmic_power_off(&mut self) {
        info!("Powering off the SoC\n");
        self.st.enter(Phase::PowerOff);
        dload::set(&mut self.st, false);
        self.pmic.reset_pwr_off(false);
    }

    fn power_off(&mut self) -> Result<Infallible, Error> {
        self.pmic_power_off();

        self.st.enter(Phase::PowerOffWait);
        self.st.pshold.drop_line();
        self.delay.delay_ms(POWER_OFF_TIMEOUT_MS);
        error!("Powering off has failed\n");
        Err(Error::PowerOffFailed)
    }
}

/// Which transition, if any, owns the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Owner {
    Free,
    Software,
    Pmic,
}

/// Attempts at the state lock before a transition takes the state over.
/// Accessors hold the lock for a handful of instructions, so a lock still
/// held after this many attempts belongs to a core that has been stopped.
const LOCK_SPINS: u32 = 1 << 20;

/// Last published view of the state, readable without the state lock.
#[derive(Default)]
struct Status {
    phase: AtomicU8,
    download_mode: AtomicBool,
    armed: AtomicBool,
    restart_mode: AtomicU32,
    ssr_magic: AtomicU32,
    mapped: AtomicBool,
    reason: AtomicU32,
}

impl Status {
    fn publish(&self, st: &RestartControllerState) {
        self.phase.store(st.phase as u8, Ordering::Release);
        self.download_mode.store(st.dload.enabled(), Ordering::Release);
        self.armed.store(dload::is_armed(st), Ordering::Release);
        self.restart_mode.store(st.restart_mode, Ordering::Release);
        self.ssr_magic.store(st.ssr_magic, Ordering::Release);
        match st.store.reason() {
            Some(reason) => {
                self.reason.store(reason, Ordering::Release);
                self.mapped.store(true, Ordering::Release);
            }
            None => self.mapped.store(false, Ordering::Release),
        }
    }

    fn phase(&self) -> Phase {
        const PHASES: [Phase; 9] = [
            Phase::Idle,
            Phase::QuiesceDload,
            Phase::EncodeReason,
            Phase::PrimaryReset,
            Phase::FallbackArm,
            Phase::FallbackWait,
            Phase::PowerOff,
            Phase::PowerOffWait,
            Phase::Halted,
        ];
        let v = self.phase.load(Ordering::Acquire) as usize;
        PHASES.get(v).copied().unwrap_or(Phase::Idle)
    }
}

enum Held<'a, T> {
    Locked(SpinlockGuard<'a, T>),
    Seized(&'a mut T),
}

/// Exclusive access to the sequencer. The status snapshot is refreshed
/// when access ends.
pub(crate) struct Access<'a, P, D, S> {
    held: Held<'a, Sequencer<P, D, S>>,
    status: &'a Status,
}

impl<P, D, S> Deref for Access<'_, P, D, S> {
    type Target = Sequencer<P, D, S>;

    fn deref(&self) -> &Self::Target {
        match &self.held {
            Held::Locked(guard) => &**guard,
            Held::Seized(seq) => &**seq,
        }
    }
}

impl<P, D, S> DerefMut for Access<'_, P, D, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.held {
            Held::Locked(guard) => &mut **guard,
            Held::Seized(seq) => &mut **seq,
        }
    }
}

impl<P, D, S> Drop for Access<'_, P, D, S> {
    fn drop(&mut self) {
        self.status.publish(&self.st);
    }
}

/// Owner of the restart state and the hardware collaborators it drives.
///
/// Software restart, power-off and the PMIC shutdown path are transitions:
/// each has to win the ownership claim first, and whoever loses never
/// touches PS_HOLD. The state lock only serializes the winner against the
/// parameter handlers. Readers never take it.
pub struct RestartController<P, D, S> {
    pub(crate) seq: Spinlock<Sequencer<P, D, S>>,
    status: Status,
    owner: AtomicU8,
    in_panic: AtomicBool,
    pub(crate) shutdown: AtomicBool,
}

impl<P: Pmic, D: DelayNs, S: SecureMonitor> RestartController<P, D, S> {
    /// Map the store and apply the initial download mode setting.
    ///
    /// # Safety
    ///
    /// See [`RestartControllerState::new`].
    pub unsafe fn new(config: &PlatformConfig, pmic: P, delay: D, scm: S) -> Self {
        let mut st = RestartControllerState::new(config);

        if !st.store.is_mapped() {
            warn!("Restart reason store is not mapped\n");
        }
        dload::set(&mut st, config.download_mode);
        if st.profile.features.crash_handler {
            st.store.write_reason(ssr::REASON_BOOTING);
        }

        let status = Status::default();
        status.publish(&st);

        RestartController {
            seq: Spinlock::new(Sequencer {
                st,
                pmic,
                delay,
                scm,
            }),
            status,
            owner: AtomicU8::new(Owner::Free as u8),
            in_panic: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    fn refusal(owner: u8) -> Error {
        if owner == Owner::Pmic as u8 {
            Error::ShutdownInProgress
        } else {
            Error::Busy
        }
    }

    /// State access for the parameter handlers. Fails rather than waits.
    fn state(&self) -> Result<Access<'_, P, D, S>, Error> {
        if self.shutdown_in_progress() {
            return Err(Error::ShutdownInProgress);
        }
        let owner = self.owner.load(Ordering::Acquire);
        if owner != Owner::Free as u8 {
            return Err(Self::refusal(owner));
        }

        let guard = self.seq.try_lock().ok_or(Error::Busy)?;
        Ok(Access {
            held: Held::Locked(guard),
            status: &self.status,
        })
    }

    /// Win the hardware for a transition. Only another transition can make
    /// this fail.
    pub(crate) fn claim(&self, owner: Owner) -> Result<Access<'_, P, D, S>, Error> {
        self.owner
            .compare_exchange(
                Owner::Free as u8,
                owner as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(Self::refusal)?;

        for _ in 0..LOCK_SPINS {
            if let Some(guard) = self.seq.try_lock() {
                return Ok(Access {
                    held: Held::Locked(guard),
                    status: &self.status,
                });
            }
            spin_loop();
        }

        warn!("restart state held by a stopped core, taking it over\n");
        // SAFETY: the claim keeps every other transition out and the
        // parameter handlers refuse to start while it is held. The lock
        // holder was stopped inside a handler and never runs again.
        let seq = unsafe { &mut *self.seq.data_ptr() };
        Ok(Access {
            held: Held::Seized(seq),
            status: &self.status,
        })
    }

    fn release(&self) {
        self.owner.store(Owner::Free as u8, Ordering::Release);
    }

    fn software_claim(&self) -> Result<Access<'_, P, D, S>, Error> {
        if self.shutdown_in_progress() {
            return Err(Error::ShutdownInProgress);
        }
        self.claim(Owner::Software)
    }

    /// Restart the SoC. Only returns if every reset mechanism failed.
    pub fn restart(&self, request: &RestartRequest<'_>) -> Result<Infallible, Error> {
        let panicking = request.is_panic || self.in_panic.load(Ordering::Acquire);
        let mut seq = self.software_claim().map_err(|e| {
            warn!("Not restarting: {}\n", e);
            e
        })?;

        let result = seq.restart(request.command, panicking);
        drop(seq);
        self.release();
        result
    }

    /// SoC initiated power-off: the PMIC is told to power down and PS_HOLD
    /// is dropped. There is no watchdog fallback for power-off.
    pub fn power_off(&self) -> Result<Infallible, Error> {
        let mut seq = self.software_claim()?;

        let result = seq.power_off();
        drop(seq);
        self.release();
        result
    }

    /// Prepare a kexec hard boot: no download mode, PMIC restarts on
    /// PS_HOLD, and boot into recovery since the boot kernel may not cope.
    pub fn prepare_hardboot(&self) -> Result<(), Error> {
        let mut seq = self.state()?;
        dload::set(&mut seq.st, false);
        seq.pmic.reset_pwr_off(true);
        seq.st.store.write_reason(reason::REASON_RECOVERY);
        Ok(())
    }

    /// Panic notifier. Any later restart arms download mode.
    pub fn notify_panic(&self) {
        self.in_panic.store(true, Ordering::Release);
    }

    pub fn in_panic(&self) -> bool {
        self.in_panic.load(Ordering::Acquire)
    }

    /// Reboot notifier: a benign reboot must not leave download mode armed.
    pub fn notify_reboot(&self) {
        match self.state() {
            Ok(mut seq) => {
                dload::set(&mut seq.st, false);
            }
            Err(e) => warn!("reboot notifier: download mode left as is: {}\n", e),
        }
    }

    /// Write handler for the `download_mode` parameter.
    pub fn set_download_mode(&self, val: &str) -> Result<(), Error> {
        let mut seq = self.state()?;
        dload::set_master(&mut seq.st, val).map_err(|e| {
            warn!("download_mode: rejected {:?}\n", val);
            e
        })?;
        Ok(())
    }

    pub fn download_mode(&self) -> bool {
        self.status.download_mode.load(Ordering::Acquire)
    }

    /// Hook for debug subsystems that want the dump magic set or cleared
    /// directly. Still subject to the master switch.
    pub fn set_download_magic(&self, on: bool) -> Result<DloadState, Error> {
        let mut seq = self.state()?;
        info!("set_download_magic: on={}\n", on as u8);
        Ok(dload::set(&mut seq.st, on))
    }

    pub fn download_mode_armed(&self) -> bool {
        self.status.armed.load(Ordering::Acquire)
    }

    pub fn set_restart_mode(&self, mode: u32) -> Result<(), Error> {
        let mut seq = self.state()?;
        seq.st.restart_mode = mode;

        if seq.st.profile.features.crash_handler
            && seq.st.dload.enabled()
            && ssr::is_crash_magic(mode)
        {
            error!("crash handler detected panic, mode 0x{:x}\n", mode);
            return Err(Error::CrashHandlerTriggered(mode));
        }
        Ok(())
    }

    pub fn restart_mode(&self) -> u32 {
        self.status.restart_mode.load(Ordering::Acquire)
    }

    /// Record which subsystem is restarting, for crash attribution.
    pub fn set_ssr_magic(&self, subsys: &str) -> Result<u32, Error> {
        let mut seq = self.state()?;
        seq.st.ssr_magic = ssr::magic_for(subsys);
        Ok(seq.st.ssr_magic)
    }

    pub fn ssr_magic(&self) -> u32 {
        self.status.ssr_magic.load(Ordering::Acquire)
    }

    /// Store the kernel crash reason ahead of a dump.
    pub fn write_kernel_crash_magic(&self) -> Result<u32, Error> {
        let mut seq = self.state()?;
        let magic = ssr::kernel_crash_magic(&mut seq.st);
        seq.st.store.write_reason(magic);
        Ok(magic)
    }

    pub fn is_store_mapped(&self) -> bool {
        self.status.mapped.load(Ordering::Acquire)
    }

    /// Reason word as of the last completed operation
    pub fn restart_reason(&self) -> Option<u32> {
        self.is_store_mapped()
            .then(|| self.status.reason.load(Ordering::Acquire))
    }

    pub fn phase(&self) -> Phase {
        self.status.phase()
    }

    /// Set once the PMIC shutdown rendezvous has started. Nothing else may
    /// assume normal operation after that.
    pub fn shutdown_in_progress(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
            || self.owner.load(Ordering::Acquire) == Owner::Pmic as u8
    }
}
