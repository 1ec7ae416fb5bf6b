// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

use crate::imem::mb;
use mmio::{Allow, Deny, VolBox};

pub const WDT0_RST: usize = 0x38;
pub const WDT0_EN: usize = 0x40;
pub const WDT0_BARK_TIME: usize = 0x4c;
pub const WDT0_BITE_TIME: usize = 0x5c;

/// Bite timeout in sleep clock ticks. Bark is armed at five times this so
/// the bite always fires first.
pub const WDT0_BITE_TICKS: u32 = 0x31f3;
pub const WDT0_BARK_TICKS: u32 = 5 * WDT0_BITE_TICKS;

type Reg = VolBox<u32, Deny, Allow>;

/// Write-only view of the timer0 watchdog registers
pub struct Watchdog {
    rst: Reg,
    en: Reg,
    bark_time: Reg,
    bite_time: Reg,
}

impl Watchdog {
    /// # Safety
    ///
    /// `base` must be the mapped timer0 register block.
    pub unsafe fn new(base: usize) -> Watchdog {
        let reg = |off: usize| Reg::new((base + off) as *mut u32);
        Watchdog {
            rst: reg(WDT0_RST),
            en: reg(WDT0_EN),
            bark_time: reg(WDT0_BARK_TIME),
            bite_time: reg(WDT0_BITE_TIME),
        }
    }

    pub fn pet(&mut self) {
        self.rst.write(1);
    }

    pub fn disable(&mut self) {
        self.en.write(0);
    }

    /// Reset the counter and arm a short bite as the restart of last resort.
    pub fn arm_fallback(&mut self) {
        self.rst.write(1);
        self.bark_time.write(WDT0_BARK_TICKS);
        self.bite_time.write(WDT0_BITE_TICKS);
        self.en.write(1);
    }
}

/// PS_HOLD control. The PMIC keeps the SoC powered while this line is high.
pub struct PsHold(VolBox<u32, Deny, Allow>);

impl PsHold {
    /// # Safety
    ///
    /// `addr` must be the mapped PS_HOLD control register.
    pub unsafe fn new(addr: usize) -> PsHold {
        PsHold(VolBox::new(addr as *mut u32))
    }

    /// Drop the line. Everything stored before this point has to be visible
    /// to the next boot stage, hence the barrier.
    pub fn drop_line(&mut self) {
        mb();
        self.0.write(0);
    }
}
