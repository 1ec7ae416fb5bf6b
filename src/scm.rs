// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Secure monitor calls into TrustZone.

pub const SCM_SVC_PWR: u32 = 0x9;
pub const SCM_IO_DISABLE_PMIC_ARBITER: u32 = 1;

const SCM_CLASS_REGISTER: u32 = 0x2 << 8;
const SCM_MASK_IRQS: u32 = 1 << 5;

/// Command word for a register based atomic call with `nargs` arguments
pub const fn atomic_id(svc: u32, cmd: u32, nargs: u32) -> u32 {
    (((svc << 10) | (cmd & 0x3ff)) << 12) | SCM_CLASS_REGISTER | SCM_MASK_IRQS | (nargs & 0xf)
}

pub trait SecureMonitor {
    fn call_atomic1(&mut self, svc: u32, cmd: u32, arg1: u32) -> i32;

    /// Hand the shutdown over to the PMIC. Not expected to return.
    fn disable_pmic_arbiter(&mut self) -> i32 {
        self.call_atomic1(SCM_SVC_PWR, SCM_IO_DISABLE_PMIC_ARBITER, 1)
    }
}

#[cfg(target_arch = "arm")]
pub struct Scm;

#[cfg(target_arch = "arm")]
impl SecureMonitor for Scm {
    fn call_atomic1(&mut self, svc: u32, cmd: u32, arg1: u32) -> i32 {
        let context_id: u32 = 0;
        let mut r0 = atomic_id(svc, cmd, 1);
        unsafe {
            core::arch::asm!(
                ".arch_extension sec",
                "smc #0",
                inout("r0") r0,
                in("r1") &context_id as *const u32 as u32,
                in("r2") arg1,
                out("r3") _,
                options(nostack),
            );
        }
        r0 as i32
    }
}
