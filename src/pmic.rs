// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

/// The one PMIC control the restart path needs.
pub trait Pmic {
    /// Select what the PMIC does once PS_HOLD drops: restart the SoC when
    /// `reset` is set, remove power otherwise.
    fn reset_pwr_off(&mut self, reset: bool);
}
