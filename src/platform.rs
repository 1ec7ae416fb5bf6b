// SPDX-License-Identifier: GPL-2.0
// Copyright 2024 The msm-restart Authors

//! Board selection and register base addresses.

use crate::Error;
use fdt::Fdt;

const IMEM_COMPATIBLE: &str = "qcom,msm-imem";
const TIMER_COMPATIBLE: &str = "qcom,msm-timer";
const TLMM_COMPATIBLE: &str = "qcom,msm-tlmm";

const FUSION_COMPATIBLE: [&str; 2] = ["qcom,msm8660-fusion", "qcom,msm8x60-fusn-ffa"];

const DOWNLOAD_MODE_PROPERTY: &str = "qcom,download-mode";

pub const PSHOLD_CTL_SU_OFFSET: usize = 0x820;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Board {
    #[default]
    Base,
    /// Dual-die 8x60 fusion boards, where PS_HOLD is not wired for reset
    FusionDualDie,
}

impl Board {
    pub fn drops_pshold_on_restart(&self) -> bool {
        *self != Board::FusionDualDie
    }
}

/// Optional vendor behaviour that used to be selected at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    /// Crash handler cookie, SSR magic and crash restart reasons
    pub crash_handler: bool,
    /// "sec_debug_hw_reset" restart command
    pub sec_debug: bool,
    /// "peripheral_hw_reset" restart command
    pub peripheral_secure_check: bool,
    /// "cpdebug<n>" restart command
    pub ssr_debug_level: bool,
    /// "swsel<n>" restart command
    pub dual_modem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformProfile {
    pub board: Board,
    pub features: Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Shared IMEM; `None` leaves the reason store unmapped
    pub imem_base: Option<usize>,
    pub timer0_base: usize,
    pub pshold_addr: usize,
    /// Initial value of the download mode master switch
    pub download_mode: bool,
    pub profile: PlatformProfile,
}

impl PlatformConfig {
    pub fn new(imem_base: Option<usize>, timer0_base: usize, tlmm_base: usize) -> PlatformConfig {
        PlatformConfig {
            imem_base,
            timer0_base,
            pshold_addr: tlmm_base + PSHOLD_CTL_SU_OFFSET,
            download_mode: true,
            profile: PlatformProfile::default(),
        }
    }

    pub fn with_profile(self, profile: PlatformProfile) -> PlatformConfig {
        PlatformConfig { profile, ..self }
    }

    pub fn from_dtb(dtb: &[u8]) -> Result<PlatformConfig, Error> {
        let fdt = Fdt::new(dtb).map_err(|_| Error::Fdt("invalid device tree blob"))?;
        Self::from_fdt(&fdt)
    }

    /// Locate the timer, TLMM and IMEM blocks by their compatible strings.
    /// A missing IMEM node is not fatal: the reason store just stays unmapped.
    pub fn from_fdt(fdt: &Fdt) -> Result<PlatformConfig, Error> {
        let base_of = |compat: &str| -> Option<usize> {
            let reg = fdt.find_compatible(&[compat])?.reg()?.next()?;
            Some(reg.starting_address as usize)
        };

        let timer0_base = base_of(TIMER_COMPATIBLE).ok_or(Error::Fdt("no timer node"))?;
        let tlmm_base = base_of(TLMM_COMPATIBLE).ok_or(Error::Fdt("no TLMM node"))?;
        let imem_base = base_of(IMEM_COMPATIBLE);
        if imem_base.is_none() {
            log::warn!("No IMEM node found, restart reason will not be recorded\n");
        }

        let board = if fdt
            .root()
            .compatible()
            .all()
            .any(|c| FUSION_COMPATIBLE.contains(&c))
        {
            Board::FusionDualDie
        } else {
            Board::Base
        };

        let mut config = PlatformConfig::new(imem_base, timer0_base, tlmm_base);
        config.profile.board = board;

        if let Some(v) = fdt
            .find_node("/chosen")
            .and_then(|n| n.property(DOWNLOAD_MODE_PROPERTY))
            .and_then(|p| p.as_usize())
        {
            config.download_mode = v != 0;
        }

        log::info!(
            "{:?} board: timer0 @ {:#x}, PS_HOLD @ {:#x}\n",
            board,
            config.timer0_base,
            config.pshold_addr
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    const FDT_BEGIN_NODE: u32 = 1;
    const FDT_END_NODE: u32 = 2;
    const FDT_PROP: u32 = 3;
    const FDT_END: u32 = 9;

    #[derive(Default)]
    struct DtbBuilder {
        structs: Vec<u8>,
        strings: Vec<u8>,
    }

    impl DtbBuilder {
        fn token(&mut self, t: u32) {
            self.structs.extend_from_slice(&t.to_be_bytes());
        }

        fn pad(&mut self) {
            while self.structs.len() % 4 != 0 {
                self.structs.push(0);
            }
        }

        fn begin(&mut self, name: &str) -> &mut Self {
            self.token(FDT_BEGIN_NODE);
            self.structs.extend_from_slice(name.as_bytes());
            self.structs.push(0);
            self.pad();
            self
        }

        fn end(&mut self) -> &mut Self {
            self.token(FDT_END_NODE);
            self
        }

        fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
            let nameoff = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            self.token(FDT_PROP);
            self.token(value.len() as u32);
            self.token(nameoff);
            self.structs.extend_from_slice(value);
            self.pad();
            self
        }

        fn prop_u32s(&mut self, name: &str, cells: &[u32]) -> &mut Self {
            let v: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
            self.prop(name, &v)
        }

        fn prop_strs(&mut self, name: &str, strs: &[&str]) -> &mut Self {
            let mut v = Vec::new();
            for s in strs {
                v.extend_from_slice(s.as_bytes());
                v.push(0);
            }
            self.prop(name, &v)
        }

        fn finish(&mut self) -> Vec<u8> {
            self.token(FDT_END);

            const HEADER: usize = 40;
            const RSVMAP: usize = 16;
            let off_struct = HEADER + RSVMAP;
            let off_strings = off_struct + self.structs.len();
            let total = off_strings + self.strings.len();

            let mut blob = Vec::new();
            for w in [
                0xd00d_feed,
                total as u32,
                off_struct as u32,
                off_strings as u32,
                HEADER as u32,
                17,
                16,
                0,
                self.strings.len() as u32,
                self.structs.len() as u32,
            ] {
                blob.extend_from_slice(&u32::to_be_bytes(w));
            }
            blob.extend_from_slice(&[0; RSVMAP]);
            blob.extend_from_slice(&self.structs);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    fn soc_dtb(root_compat: &str, with_imem: bool, chosen_dload: Option<u32>) -> Vec<u8> {
        let mut b = DtbBuilder::default();
        b.begin("")
            .prop_u32s("#address-cells", &[1])
            .prop_u32s("#size-cells", &[1])
            .prop_strs("compatible", &[root_compat, "qcom,msm8660"]);

        b.begin("chosen");
        if let Some(v) = chosen_dload {
            b.prop_u32s(DOWNLOAD_MODE_PROPERTY, &[v]);
        }
        b.end();

        b.begin("timer@2000000")
            .prop_strs("compatible", &[TIMER_COMPATIBLE])
            .prop_u32s("reg", &[0x0200_0000, 0x1000])
            .end();
        b.begin("pinctrl@800000")
            .prop_strs("compatible", &[TLMM_COMPATIBLE])
            .prop_u32s("reg", &[0x0080_0000, 0x4000])
            .end();
        if with_imem {
            b.begin("imem@2a03f000")
                .prop_strs("compatible", &[IMEM_COMPATIBLE])
                .prop_u32s("reg", &[0x2a03_f000, 0x1000])
                .end();
        }
        b.end();
        b.finish()
    }

    #[test]
    fn discovers_base_board() {
        let dtb = soc_dtb("qcom,msm8660-surf", true, None);
        let config = PlatformConfig::from_dtb(&dtb).unwrap();

        assert_eq!(config.imem_base, Some(0x2a03_f000));
        assert_eq!(config.timer0_base, 0x0200_0000);
        assert_eq!(config.pshold_addr, 0x0080_0820);
        assert_eq!(config.profile.board, Board::Base);
        assert!(config.download_mode);
    }

    #[test]
    fn discovers_fusion_board_and_download_switch() {
        let dtb = soc_dtb("qcom,msm8660-fusion", true, Some(0));
        let config = PlatformConfig::from_dtb(&dtb).unwrap();

        assert_eq!(config.profile.board, Board::FusionDualDie);
        assert!(!config.profile.board.drops_pshold_on_restart());
        assert!(!config.download_mode);
    }

    #[test]
    fn missing_imem_leaves_store_unmapped() {
        let dtb = soc_dtb("qcom,msm8660-surf", false, None);
        let config = PlatformConfig::from_dtb(&dtb).unwrap();

        assert_eq!(config.imem_base, None);
    }

    #[test]
    fn rejects_garbage_blob() {
        assert_eq!(
            PlatformConfig::from_dtb(&[0u8; 64]),
            Err(Error::Fdt("invalid device tree blob"))
        );
    }
}
