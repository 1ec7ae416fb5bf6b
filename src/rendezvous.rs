// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! PMIC initiated shutdown.
//!
//! The PMIC raises an interrupt shortly before it removes power on its own,
//! for instance when the power key is held. Every core is stopped and core 0
//! hands the shutdown to the PMIC through the secure monitor. No core ever
//! comes back from here.

use core::sync::atomic::Ordering;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::pmic::Pmic;
use crate::restart::{Owner, Phase, RestartController};
use crate::scm::SecureMonitor;
use crate::Error;

/// The core that performs the power-off
pub const PRIMARY_CPU: usize = 0;

/// Proof that a core has reached the terminal state. It can only be made by
/// the rendezvous and can only be consumed by [`Cpus::halt`].
#[derive(Debug, PartialEq, Eq)]
pub struct Halted {
    cpu: usize,
}

impl Halted {
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

/// The per-core services the rendezvous needs from the platform.
pub trait Cpus {
    fn current(&self) -> usize;

    /// Make every other online core run [`RestartController::stop_cpu`],
    /// without waiting for them.
    fn stop_others(&mut self);

    /// Park this core for good, with preemption and interrupts disabled
    /// before it starts spinning.
    fn halt(&mut self, halted: Halted) -> !;
}

impl<P: Pmic, D: DelayNs, S: SecureMonitor> RestartController<P, D, S> {
    /// Interrupt handler for the PMIC shutdown-pending line.
    pub fn handle_pmic_shutdown<C: Cpus>(&self, cpus: &mut C) -> ! {
        warn!("PMIC initiated shutdown\n");
        self.shutdown.store(true, Ordering::Release);

        cpus.stop_others();
        let halted = self.cpu_power_off(cpus.current());
        cpus.halt(halted)
    }

    /// Target of the stop broadcast on the other cores.
    pub fn stop_cpu<C: Cpus>(&self, cpus: &mut C) -> ! {
        let halted = self.cpu_power_off(cpus.current());
        cpus.halt(halted)
    }

    /// Per-core part of the rendezvous. Only the primary core touches the
    /// hardware; every core comes out of here halted.
    pub fn cpu_power_off(&self, cpu: usize) -> Halted {
        error!("PMIC initiated shutdown cpu={}\n", cpu);
        if cpu != PRIMARY_CPU {
            return Halted { cpu };
        }

        // A software transition that already owns the hardware finishes
        // the job on its own.
        let mut seq = match self.claim(Owner::Pmic) {
            Ok(seq) => seq,
            Err(Error::Busy) => {
                warn!("restart in progress, leaving shutdown to it\n");
                return Halted { cpu };
            }
            Err(e) => {
                warn!("not powering off: {}\n", e);
                return Halted { cpu };
            }
        };

        // The PMIC removes power itself, PS_HOLD stays up
        seq.pmic_power_off();
        seq.st.wdog.pet();

        info!("Calling scm to disable arbiter\n");
        let rc = seq.scm.disable_pmic_arbiter();
        error!("SCM returned even when asked to busy loop rc={}\n", rc);
        error!("waiting on pmic to shut msm down\n");

        seq.st.enter(Phase::Halted);
        Halted { cpu }
    }
}
