use color_eyre::eyre;
use serde::{Deserialize, Serialize};

/// DRAM protocol family.
///
/// The protocol selects which timing parameters are active when the
/// timing table is built; it is resolved once at construction and never
/// consulted on the issue path.
#[allow(non_camel_case_types)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
pub enum Protocol {
    DDR3,
    DDR4,
    LPDDR,
    LPDDR3,
    LPDDR4,
    GDDR5,
    GDDR5X,
    GDDR6,
    HBM,
    HBM2,
    HMC,
}

impl Protocol {
    /// GDDR parts split the RAS-to-CAS delay by access direction and add
    /// the 32-activation rolling window; the timing table and the
    /// activation trackers dispatch on this.
    #[must_use]
    pub fn is_gddr(self) -> bool {
        matches!(self, Protocol::GDDR5 | Protocol::GDDR5X | Protocol::GDDR6)
    }
}

/// How the refresh clock spreads refresh obligations over time.
#[allow(non_camel_case_types)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
pub enum RefreshPolicy {
    /// All ranks refresh at once every tREFI. Impractical power-wise but
    /// useful as a baseline.
    RANK_LEVEL_SIMULTANEOUS,
    /// One rank at a time, every tREFI / ranks cycles.
    RANK_LEVEL_STAGGERED,
    /// One bank at a time, every tREFIb cycles.
    BANK_LEVEL_STAGGERED,
}

/// Configuration of one simulated memory channel.
///
/// Plain data; construction-time validation lives in [`Config::validate`].
/// All timing fields are in command-clock cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub protocol: Protocol,

    // physical structure
    pub ranks: usize,
    pub bankgroups: usize,
    pub banks_per_group: usize,
    /// Total banks per rank; must equal `bankgroups * banks_per_group`.
    pub banks: usize,

    // column access latencies
    pub cl: u64,
    pub cwl: u64,
    pub al: u64,
    /// Cycles one data burst occupies the bus. Kept separate from BL since
    /// for GDDRx it is not BL/2.
    pub burst_cycle: u64,

    // command-to-command gaps
    pub t_ccd_l: u64,
    pub t_ccd_s: u64,
    pub t_rtrs: u64,
    pub t_rtp: u64,
    pub t_wtr_l: u64,
    pub t_wtr_s: u64,
    pub t_wr: u64,
    pub t_rp: u64,
    pub t_rrd_l: u64,
    pub t_rrd_s: u64,
    pub t_ras: u64,
    pub t_rcd: u64,
    pub t_rfc: u64,
    pub t_rc: u64,
    pub t_cke: u64,
    pub t_ckesr: u64,
    pub t_xs: u64,
    pub t_xp: u64,
    pub t_rfcb: u64,
    pub t_refi: u64,
    pub t_refib: u64,
    pub t_faw: u64,
    pub t_rpre: u64,
    pub t_wpre: u64,

    // LPDDR4 / GDDR
    pub t_ppd: u64,
    pub t_32aw: u64,
    pub t_rcdrd: u64,
    pub t_rcdwr: u64,

    // system options
    /// "PER_BANK" or "PER_RANK"; parsed at command-queue construction.
    pub queue_structure: String,
    pub cmd_queue_size: usize,
    pub refresh_policy: RefreshPolicy,
    pub enable_self_refresh: bool,
    /// Idle cycles after which a rank becomes a self-refresh candidate.
    pub sref_threshold: u64,
}

impl Default for Config {
    /// A DDR4-2400-like parameter set, small enough to exercise in tests.
    fn default() -> Self {
        Self {
            protocol: Protocol::DDR4,
            ranks: 2,
            bankgroups: 4,
            banks_per_group: 4,
            banks: 16,
            cl: 16,
            cwl: 12,
            al: 0,
            burst_cycle: 4,
            t_ccd_l: 6,
            t_ccd_s: 4,
            t_rtrs: 2,
            t_rtp: 9,
            t_wtr_l: 9,
            t_wtr_s: 3,
            t_wr: 18,
            t_rp: 16,
            t_rrd_l: 6,
            t_rrd_s: 4,
            t_ras: 39,
            t_rcd: 16,
            t_rfc: 420,
            t_rc: 55,
            t_cke: 6,
            t_ckesr: 7,
            t_xs: 432,
            t_xp: 8,
            t_rfcb: 120,
            t_refi: 9360,
            t_refib: 585,
            t_faw: 26,
            t_rpre: 1,
            t_wpre: 1,
            t_ppd: 0,
            t_32aw: 0,
            t_rcdrd: 0,
            t_rcdwr: 0,
            queue_structure: "PER_BANK".to_string(),
            cmd_queue_size: 8,
            refresh_policy: RefreshPolicy::RANK_LEVEL_STAGGERED,
            enable_self_refresh: false,
            sref_threshold: 1000,
        }
    }
}

impl Config {
    /// Read latency: cycles from READ to first data beat.
    #[must_use]
    pub fn rl(&self) -> u64 {
        self.al + self.cl
    }

    /// Write latency: cycles from WRITE to first required data beat.
    #[must_use]
    pub fn wl(&self) -> u64 {
        self.al + self.cwl
    }

    #[must_use]
    pub fn read_delay(&self) -> u64 {
        self.rl()
    }

    #[must_use]
    pub fn write_delay(&self) -> u64 {
        self.wl()
    }

    /// Reject inconsistent sizing before any state is built.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.ranks == 0 || self.bankgroups == 0 || self.banks_per_group == 0 {
            eyre::bail!(
                "channel must have at least one rank, bankgroup and bank (got {}x{}x{})",
                self.ranks,
                self.bankgroups,
                self.banks_per_group
            );
        }
        if self.banks != self.bankgroups * self.banks_per_group {
            eyre::bail!(
                "inconsistent bank count: banks={} but bankgroups={} * banks_per_group={}",
                self.banks,
                self.bankgroups,
                self.banks_per_group
            );
        }
        if self.bankgroups == 1 && (self.t_ccd_l != self.t_ccd_s || self.t_rrd_l != self.t_rrd_s) {
            eyre::bail!(
                "protocol without bank groups must not distinguish long/short CAS or RAS gaps"
            );
        }
        if self.cmd_queue_size == 0 {
            eyre::bail!("cmd_queue_size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Protocol, RefreshPolicy};
    use std::str::FromStr;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.rl(), 16);
        assert_eq!(config.wl(), 12);
    }

    #[test]
    fn test_additive_latency() {
        let config = Config {
            al: 4,
            ..Config::default()
        };
        assert_eq!(config.rl(), 20);
        assert_eq!(config.wl(), 16);
    }

    #[test]
    fn test_inconsistent_banks() {
        let config = Config {
            banks: 8,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_bankgroup_gap_consistency() {
        let mut config = Config {
            protocol: Protocol::DDR3,
            bankgroups: 1,
            banks_per_group: 8,
            banks: 8,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        config.t_ccd_l = config.t_ccd_s;
        config.t_rrd_l = config.t_rrd_s;
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(Protocol::from_str("GDDR6").unwrap(), Protocol::GDDR6);
        assert!(Protocol::from_str("GDDR6").unwrap().is_gddr());
        assert!(Protocol::from_str("DDR5").is_err());
        assert_eq!(
            RefreshPolicy::from_str("BANK_LEVEL_STAGGERED").unwrap(),
            RefreshPolicy::BANK_LEVEL_STAGGERED
        );
    }
}
