// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use msm_restart::imem::{DLOAD_MODE_OFFSET, RESTART_REASON_OFFSET};
use msm_restart::platform::PSHOLD_CTL_SU_OFFSET;
use msm_restart::wdog::{WDT0_BITE_TIME, WDT0_EN};
use msm_restart::{
    Board, Cpus, Features, Halted, PlatformConfig, PlatformProfile, Pmic, RestartController,
    SecureMonitor,
};

pub const UNTOUCHED: u32 = 0xdead_beef;

/// IMEM, timer0 and TLMM backed by leaked RAM. Writing PS_HOLD or arming
/// the watchdog has no effect, as on a board whose reset path is broken.
#[derive(Clone, Copy)]
pub struct Sim {
    imem: usize,
    timer: usize,
    tlmm: usize,
}

fn leak(words: usize) -> usize {
    Box::leak(vec![UNTOUCHED; words].into_boxed_slice()).as_mut_ptr() as usize
}

fn peek(addr: usize) -> u32 {
    unsafe { (addr as *const u32).read_volatile() }
}

impl Sim {
    pub fn new() -> Sim {
        Sim {
            imem: leak(1024),
            timer: leak(32),
            tlmm: leak(1024),
        }
    }

    pub fn config(&self, board: Board, features: Features) -> PlatformConfig {
        PlatformConfig::new(Some(self.imem), self.timer, self.tlmm)
            .with_profile(PlatformProfile { board, features })
    }

    pub fn imem(&self, offset: usize) -> u32 {
        peek(self.imem + offset)
    }

    pub fn timer(&self, offset: usize) -> u32 {
        peek(self.timer + offset)
    }

    pub fn reason(&self) -> u32 {
        self.imem(RESTART_REASON_OFFSET)
    }

    pub fn dload(&self) -> (u32, u32) {
        (
            self.imem(DLOAD_MODE_OFFSET),
            self.imem(DLOAD_MODE_OFFSET + 4),
        )
    }

    pub fn pshold(&self) -> u32 {
        peek(self.tlmm + PSHOLD_CTL_SU_OFFSET)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            reason: self.reason(),
            dload: self.dload(),
            wdog_en: self.timer(WDT0_EN),
            wdog_bite: self.timer(WDT0_BITE_TIME),
            pshold: self.pshold(),
        }
    }
}

/// Hardware as seen at the moment a collaborator was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub reason: u32,
    pub dload: (u32, u32),
    pub wdog_en: u32,
    pub wdog_bite: u32,
    pub pshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ResetPwrOff(bool, Snapshot),
    Delay(u32, Snapshot),
    Scm(u32, u32, u32),
}

pub type Events = Rc<RefCell<Vec<Event>>>;

pub struct FakePmic(Sim, Events);

impl Pmic for FakePmic {
    fn reset_pwr_off(&mut self, reset: bool) {
        self.1
            .borrow_mut()
            .push(Event::ResetPwrOff(reset, self.0.snapshot()));
    }
}

pub struct FakeDelay(Sim, Events);

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_ms(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.1.borrow_mut().push(Event::Delay(ms, self.0.snapshot()));
    }
}

pub struct FakeScm(Events);

impl SecureMonitor for FakeScm {
    fn call_atomic1(&mut self, svc: u32, cmd: u32, arg1: u32) -> i32 {
        self.0.borrow_mut().push(Event::Scm(svc, cmd, arg1));
        0
    }
}

pub type Controller = RestartController<FakePmic, FakeDelay, FakeScm>;

pub struct Rig {
    pub sim: Sim,
    pub events: Events,
    pub ctl: Controller,
}

impl Rig {
    pub fn new() -> Rig {
        Self::with(Board::Base, Features::default())
    }

    pub fn with(board: Board, features: Features) -> Rig {
        let sim = Sim::new();
        Self::from_config(sim, sim.config(board, features))
    }

    pub fn from_config(sim: Sim, config: PlatformConfig) -> Rig {
        let _ = env_logger::builder().is_test(true).try_init();

        let events = Events::default();
        let ctl = unsafe {
            RestartController::new(
                &config,
                FakePmic(sim, events.clone()),
                FakeDelay(sim, events.clone()),
                FakeScm(events.clone()),
            )
        };
        Rig { sim, events, ctl }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn delays(&self) -> Vec<(u32, Snapshot)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Delay(ms, s) => Some((ms, s)),
                _ => None,
            })
            .collect()
    }

    pub fn scm_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Scm(..)))
            .count()
    }
}

/// One core of an N-core system. `halt` unwinds so tests can observe it.
pub struct FakeCpu {
    pub id: usize,
    pub stop_broadcasts: usize,
}

impl FakeCpu {
    pub fn new(id: usize) -> FakeCpu {
        FakeCpu {
            id,
            stop_broadcasts: 0,
        }
    }
}

impl Cpus for FakeCpu {
    fn current(&self) -> usize {
        self.id
    }

    fn stop_others(&mut self) {
        self.stop_broadcasts += 1;
    }

    fn halt(&mut self, halted: Halted) -> ! {
        panic!("cpu{} halted", halted.cpu());
    }
}
