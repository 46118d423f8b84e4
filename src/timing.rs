use crate::command::CommandKind;
use crate::config::Config;
use strum::EnumCount;

/// Successors of one predecessor kind with their minimum gaps in cycles.
pub type TimingList = Vec<(CommandKind, u64)>;

/// Minimum command-to-command gaps, per predecessor kind and locality scope.
///
/// Built once from the configuration and immutable afterwards. Each table
/// is indexed by the predecessor [`CommandKind`] discriminant; the inner
/// list holds the successor kinds whose earliest-issue cycle the
/// predecessor pushes out, and by how much.
///
/// Bank-scoped predecessors use `same_bank`, `other_banks_same_bankgroup`,
/// `other_bankgroups_same_rank` and `other_ranks`; rank-scoped predecessors
/// (REFRESH, SREF_ENTER, SREF_EXIT) use `same_rank` and `other_ranks`.
#[derive(Debug, Clone)]
pub struct TimingTable {
    pub same_bank: Vec<TimingList>,
    pub other_banks_same_bankgroup: Vec<TimingList>,
    pub other_bankgroups_same_rank: Vec<TimingList>,
    pub other_ranks: Vec<TimingList>,
    pub same_rank: Vec<TimingList>,
}

impl TimingTable {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        use CommandKind::{
            ACTIVATE, PRECHARGE, READ, READ_PRECHARGE, REFRESH, REFRESH_BANK, SREF_ENTER,
            SREF_EXIT, WRITE, WRITE_PRECHARGE,
        };

        let burst = config.burst_cycle;
        let rd = config.read_delay();
        let wd = config.write_delay();

        let read_to_read_l = burst.max(config.t_ccd_l);
        let read_to_read_s = burst.max(config.t_ccd_s);
        let read_to_read_o = burst + config.t_rtrs;
        let read_to_write = (rd + burst + config.t_rtrs).saturating_sub(wd);
        let read_to_precharge = config.al + config.t_rtp;
        let readp_to_activate = config.al + burst + config.t_rtp + config.t_rp;

        let write_to_read_l = wd + burst + config.t_wtr_l;
        let write_to_read_s = wd + burst + config.t_wtr_s;
        let write_to_read_o = (wd + burst + config.t_rtrs).saturating_sub(rd);
        let write_to_write_l = burst.max(config.t_ccd_l);
        let write_to_write_s = burst.max(config.t_ccd_s);
        let write_to_write_o = burst + config.t_rtrs;
        let write_to_precharge = wd + burst + config.t_wr;
        let writep_to_activate = write_to_precharge + config.t_rp;

        let precharge_to_activate = config.t_rp;

        let activate_to_activate = config.t_rc;
        let activate_to_activate_l = config.t_rrd_l;
        let activate_to_activate_s = config.t_rrd_s;
        let activate_to_precharge = config.t_ras;
        // GDDR splits the RAS-to-CAS delay by access direction; everything
        // else pulls the column command in by the additive latency.
        let (activate_to_read, activate_to_write) = if config.protocol.is_gddr() {
            (config.t_rcdrd, config.t_rcdwr)
        } else {
            (
                config.t_rcd.saturating_sub(config.al),
                config.t_rcd.saturating_sub(config.al),
            )
        };

        let refresh_to_command = config.t_rfc;
        let refresh_bank_to_command = config.t_rfcb;
        let sref_enter_to_exit = config.t_ckesr.max(config.t_cke);
        let sref_exit_to_command = config.t_xs;

        let mut table = Self {
            same_bank: vec![TimingList::new(); CommandKind::COUNT],
            other_banks_same_bankgroup: vec![TimingList::new(); CommandKind::COUNT],
            other_bankgroups_same_rank: vec![TimingList::new(); CommandKind::COUNT],
            other_ranks: vec![TimingList::new(); CommandKind::COUNT],
            same_rank: vec![TimingList::new(); CommandKind::COUNT],
        };

        // column reads
        table.same_bank[READ as usize] = vec![
            (READ, read_to_read_l),
            (READ_PRECHARGE, read_to_read_l),
            (WRITE, read_to_write),
            (WRITE_PRECHARGE, read_to_write),
            (PRECHARGE, read_to_precharge),
        ];
        table.other_banks_same_bankgroup[READ as usize] = vec![
            (READ, read_to_read_l),
            (READ_PRECHARGE, read_to_read_l),
            (WRITE, read_to_write),
            (WRITE_PRECHARGE, read_to_write),
        ];
        table.other_bankgroups_same_rank[READ as usize] = vec![
            (READ, read_to_read_s),
            (READ_PRECHARGE, read_to_read_s),
            (WRITE, read_to_write),
            (WRITE_PRECHARGE, read_to_write),
        ];
        // the read-to-write turnaround is the same on every bank of the
        // channel: the write's data must clear the read burst plus tRTRS
        table.other_ranks[READ as usize] = vec![
            (READ, read_to_read_o),
            (READ_PRECHARGE, read_to_read_o),
            (WRITE, read_to_write),
            (WRITE_PRECHARGE, read_to_write),
        ];

        // the auto-precharge variant closes the row on its own, so it must
        // also hold off everything that requires a closed bank
        table.same_bank[READ_PRECHARGE as usize] = vec![
            (ACTIVATE, readp_to_activate),
            (REFRESH, readp_to_activate),
            (REFRESH_BANK, readp_to_activate),
            (SREF_ENTER, readp_to_activate),
        ];
        table.other_banks_same_bankgroup[READ_PRECHARGE as usize] =
            table.other_banks_same_bankgroup[READ as usize].clone();
        table.other_bankgroups_same_rank[READ_PRECHARGE as usize] =
            table.other_bankgroups_same_rank[READ as usize].clone();
        table.other_ranks[READ_PRECHARGE as usize] = table.other_ranks[READ as usize].clone();

        // column writes
        table.same_bank[WRITE as usize] = vec![
            (READ, write_to_read_l),
            (READ_PRECHARGE, write_to_read_l),
            (WRITE, write_to_write_l),
            (WRITE_PRECHARGE, write_to_write_l),
            (PRECHARGE, write_to_precharge),
        ];
        table.other_banks_same_bankgroup[WRITE as usize] = vec![
            (READ, write_to_read_l),
            (READ_PRECHARGE, write_to_read_l),
            (WRITE, write_to_write_l),
            (WRITE_PRECHARGE, write_to_write_l),
        ];
        table.other_bankgroups_same_rank[WRITE as usize] = vec![
            (READ, write_to_read_s),
            (READ_PRECHARGE, write_to_read_s),
            (WRITE, write_to_write_s),
            (WRITE_PRECHARGE, write_to_write_s),
        ];
        table.other_ranks[WRITE as usize] = vec![
            (READ, write_to_read_o),
            (READ_PRECHARGE, write_to_read_o),
            (WRITE, write_to_write_o),
            (WRITE_PRECHARGE, write_to_write_o),
        ];

        table.same_bank[WRITE_PRECHARGE as usize] = vec![
            (ACTIVATE, writep_to_activate),
            (REFRESH, writep_to_activate),
            (REFRESH_BANK, writep_to_activate),
            (SREF_ENTER, writep_to_activate),
        ];
        table.other_banks_same_bankgroup[WRITE_PRECHARGE as usize] =
            table.other_banks_same_bankgroup[WRITE as usize].clone();
        table.other_bankgroups_same_rank[WRITE_PRECHARGE as usize] =
            table.other_bankgroups_same_rank[WRITE as usize].clone();
        table.other_ranks[WRITE_PRECHARGE as usize] = table.other_ranks[WRITE as usize].clone();

        // row activation
        table.same_bank[ACTIVATE as usize] = vec![
            (READ, activate_to_read),
            (READ_PRECHARGE, activate_to_read),
            (WRITE, activate_to_write),
            (WRITE_PRECHARGE, activate_to_write),
            (ACTIVATE, activate_to_activate),
            (PRECHARGE, activate_to_precharge),
            (REFRESH, activate_to_activate),
            (REFRESH_BANK, activate_to_activate),
        ];
        table.other_banks_same_bankgroup[ACTIVATE as usize] = vec![
            (ACTIVATE, activate_to_activate_l),
            (REFRESH_BANK, activate_to_activate_l),
        ];
        table.other_bankgroups_same_rank[ACTIVATE as usize] = vec![
            (ACTIVATE, activate_to_activate_s),
            (REFRESH_BANK, activate_to_activate_s),
        ];

        // precharge gates everything that needs the bank closed
        table.same_bank[PRECHARGE as usize] = vec![
            (ACTIVATE, precharge_to_activate),
            (REFRESH, precharge_to_activate),
            (REFRESH_BANK, precharge_to_activate),
            (SREF_ENTER, precharge_to_activate),
        ];
        if config.t_ppd > 0 {
            table.other_banks_same_bankgroup[PRECHARGE as usize] =
                vec![(PRECHARGE, config.t_ppd)];
            table.other_bankgroups_same_rank[PRECHARGE as usize] =
                vec![(PRECHARGE, config.t_ppd)];
        }

        // refresh
        table.same_rank[REFRESH as usize] = vec![
            (ACTIVATE, refresh_to_command),
            (REFRESH, refresh_to_command),
            (REFRESH_BANK, refresh_to_command),
            (SREF_ENTER, refresh_to_command),
        ];
        table.same_bank[REFRESH_BANK as usize] = vec![
            (ACTIVATE, refresh_bank_to_command),
            (REFRESH, refresh_bank_to_command),
            (REFRESH_BANK, refresh_bank_to_command),
        ];
        table.other_banks_same_bankgroup[REFRESH_BANK as usize] = vec![
            (ACTIVATE, activate_to_activate_l),
            (REFRESH_BANK, activate_to_activate_l),
        ];
        table.other_bankgroups_same_rank[REFRESH_BANK as usize] = vec![
            (ACTIVATE, activate_to_activate_s),
            (REFRESH_BANK, activate_to_activate_s),
        ];

        // self refresh
        table.same_rank[SREF_ENTER as usize] = vec![(SREF_EXIT, sref_enter_to_exit)];
        table.same_rank[SREF_EXIT as usize] = vec![
            (ACTIVATE, sref_exit_to_command),
            (REFRESH, sref_exit_to_command),
            (REFRESH_BANK, sref_exit_to_command),
            (SREF_ENTER, sref_exit_to_command),
        ];

        table
    }
}
