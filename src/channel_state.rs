use crate::bank_state::{BankState, State};
use crate::command::{Address, Command, CommandKind};
use crate::config::Config;
use crate::timing::{TimingList, TimingTable};
use console::style;
use std::collections::VecDeque;
use std::sync::Arc;

fn apply(bank: &mut BankState, list: &TimingList, clk: u64) {
    for &(kind, gap) in list {
        bank.update_timing(kind, gap, clk);
    }
}

/// Activations allowed inside a rolling tFAW window.
const FAW_CAP: usize = 4;
/// Activations allowed inside a rolling t32AW window (GDDR).
const AW32_CAP: usize = 32;

/// Aggregate state of one memory channel: the dense rank x bankgroup x bank
/// array of [`BankState`]s, rank-level self-refresh flags, the rolling
/// activation windows, and the pending-refresh queue.
///
/// The channel state answers "may this command issue now?"
/// ([`ChannelState::get_ready_command`]) and commits issued commands
/// ([`ChannelState::update_timing_and_states`]). It never chooses commands;
/// that is the command queue's job.
pub struct ChannelState {
    config: Arc<Config>,
    timing: TimingTable,
    bank_states: Vec<Vec<Vec<BankState>>>,
    rank_is_sref: Vec<bool>,
    /// Issue cycles of recent ACTIVATEs per rank, at most [`FAW_CAP`] live
    /// entries; aged entries are trimmed when new activations are recorded.
    four_aw: Vec<VecDeque<u64>>,
    /// GDDR only: the 32-activation rolling window.
    thirty_two_aw: Vec<VecDeque<u64>>,
    refresh_q: VecDeque<Command>,
    /// Consecutive cycles each rank has had every bank closed. The
    /// controller reads this against `sref_threshold`.
    pub rank_idle_cycles: Vec<u64>,
}

impl ChannelState {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let timing = TimingTable::new(&config);
        let bank_states = (0..config.ranks)
            .map(|_| {
                (0..config.bankgroups)
                    .map(|_| (0..config.banks_per_group).map(|_| BankState::new()).collect())
                    .collect()
            })
            .collect();
        Self {
            timing,
            bank_states,
            rank_is_sref: vec![false; config.ranks],
            four_aw: (0..config.ranks).map(|_| VecDeque::with_capacity(FAW_CAP)).collect(),
            thirty_two_aw: (0..config.ranks)
                .map(|_| VecDeque::with_capacity(AW32_CAP))
                .collect(),
            refresh_q: VecDeque::new(),
            rank_idle_cycles: vec![0; config.ranks],
            config,
        }
    }

    fn bank(&self, addr: &Address) -> &BankState {
        &self.bank_states[addr.rank][addr.bankgroup][addr.bank]
    }

    fn bank_mut(&mut self, addr: &Address) -> &mut BankState {
        &mut self.bank_states[addr.rank][addr.bankgroup][addr.bank]
    }

    #[must_use]
    pub fn is_row_open(&self, rank: usize, bankgroup: usize, bank: usize) -> bool {
        self.bank_states[rank][bankgroup][bank].is_row_open()
    }

    #[must_use]
    pub fn open_row(&self, rank: usize, bankgroup: usize, bank: usize) -> Option<u64> {
        self.bank_states[rank][bankgroup][bank].open_row()
    }

    #[must_use]
    pub fn row_hit_count(&self, rank: usize, bankgroup: usize, bank: usize) -> u32 {
        self.bank_states[rank][bankgroup][bank].row_hit_count()
    }

    #[must_use]
    pub fn is_rank_self_refreshing(&self, rank: usize) -> bool {
        self.rank_is_sref[rank]
    }

    /// A rank is busy as soon as any of its banks holds an open row.
    #[must_use]
    pub fn is_all_bank_idle_in_rank(&self, rank: usize) -> bool {
        self.bank_states[rank]
            .iter()
            .flatten()
            .all(|bank| bank.state() != State::Open)
    }

    #[must_use]
    pub fn is_refresh_waiting(&self) -> bool {
        !self.refresh_q.is_empty()
    }

    /// Head of the refresh queue; only REFRESH and REFRESH_BANK orders
    /// ever enter it.
    #[must_use]
    pub fn pending_ref_command(&self) -> Option<&Command> {
        self.refresh_q.front()
    }

    pub(crate) fn refresh_queue(&self) -> &VecDeque<Command> {
        &self.refresh_q
    }

    /// True when `cmd` is a column access held up by the refresh order at
    /// the head of the refresh queue.
    #[must_use]
    pub fn is_rw_pending_on_ref(&self, cmd: &Command) -> bool {
        if !cmd.is_read_write() {
            return false;
        }
        match self.refresh_q.front() {
            Some(pending) if pending.kind == CommandKind::REFRESH => {
                pending.addr.rank == cmd.addr.rank
            }
            Some(pending) => pending.addr.same_bank(&cmd.addr),
            None => false,
        }
    }

    /// Enqueue (or withdraw) a single-bank refresh obligation. Idempotent:
    /// a bank is never queued twice.
    pub fn bank_need_refresh(&mut self, rank: usize, bankgroup: usize, bank: usize, need: bool) {
        let addr = Address::bank_of(rank, bankgroup, bank);
        if need {
            let already = self
                .refresh_q
                .iter()
                .any(|r| r.kind == CommandKind::REFRESH_BANK && r.addr.same_bank(&addr));
            if !already {
                log::trace!("queue refresh for rank={rank} bg={bankgroup} bank={bank}");
                self.refresh_q
                    .push_back(Command::new(CommandKind::REFRESH_BANK, addr, 0));
            }
        } else {
            self.refresh_q
                .retain(|r| !(r.kind == CommandKind::REFRESH_BANK && r.addr.same_bank(&addr)));
        }
    }

    /// Enqueue (or withdraw) an all-bank refresh obligation for a rank.
    pub fn rank_need_refresh(&mut self, rank: usize, need: bool) {
        if need {
            let already = self
                .refresh_q
                .iter()
                .any(|r| r.kind == CommandKind::REFRESH && r.addr.rank == rank);
            if !already {
                log::trace!("queue refresh for rank={rank}");
                self.refresh_q
                    .push_back(Command::new(CommandKind::REFRESH, Address::rank_only(rank), 0));
            }
        } else {
            self.refresh_q
                .retain(|r| !(r.kind == CommandKind::REFRESH && r.addr.rank == rank));
        }
    }

    /// Resolve `cmd` against bank state and rank-level constraints.
    ///
    /// Rank-level commands require every bank of the rank to be ready; if
    /// some bank still holds an open row the resolved command is the
    /// PRECHARGE that closes it. A resolved ACTIVATE is additionally
    /// subject to the rolling activation windows.
    #[must_use]
    pub fn get_ready_command(&self, cmd: &Command, clk: u64) -> Option<Command> {
        if cmd.is_rank_command() {
            let mut num_ready = 0;
            for (j, group) in self.bank_states[cmd.addr.rank].iter().enumerate() {
                for (k, bank) in group.iter().enumerate() {
                    match bank.get_ready(cmd, clk) {
                        None => {}
                        Some(ready) if ready.kind == CommandKind::PRECHARGE => {
                            // close this bank first, then try again
                            return Some(Command::new(
                                CommandKind::PRECHARGE,
                                Address::bank_of(cmd.addr.rank, j, k),
                                cmd.hex_addr,
                            ));
                        }
                        Some(_) => num_ready += 1,
                    }
                }
            }
            if num_ready == self.config.banks {
                Some(*cmd)
            } else {
                None
            }
        } else {
            let ready = self.bank(&cmd.addr).get_ready(cmd, clk)?;
            if ready.kind == CommandKind::ACTIVATE && !self.activation_window_ok(cmd.addr.rank, clk)
            {
                return None;
            }
            Some(ready)
        }
    }

    /// Commit path called once per issued command: state first, then the
    /// timing fan-out.
    pub fn update_timing_and_states(&mut self, cmd: &Command, clk: u64) {
        self.update_state(cmd);
        self.update_timing(cmd, clk);
    }

    /// Apply the state transition of an issued command across the bank
    /// array, the self-refresh flags and the refresh queue.
    pub fn update_state(&mut self, cmd: &Command) {
        if cmd.is_rank_command() {
            for group in &mut self.bank_states[cmd.addr.rank] {
                for bank in group.iter_mut() {
                    bank.update_state(cmd);
                }
            }
            match cmd.kind {
                CommandKind::REFRESH => self.retire_refresh(cmd),
                CommandKind::SREF_ENTER => {
                    log::debug!("{} rank={}", style("enter self refresh").cyan(), cmd.addr.rank);
                    self.rank_is_sref[cmd.addr.rank] = true;
                }
                CommandKind::SREF_EXIT => {
                    log::debug!("{} rank={}", style("exit self refresh").cyan(), cmd.addr.rank);
                    self.rank_is_sref[cmd.addr.rank] = false;
                }
                _ => unreachable!("rank-level command {cmd}"),
            }
        } else {
            self.bank_mut(&cmd.addr).update_state(cmd);
            if cmd.kind == CommandKind::REFRESH_BANK {
                self.retire_refresh(cmd);
            }
        }
    }

    /// Drop the refresh obligation served by `cmd` from the refresh queue.
    fn retire_refresh(&mut self, cmd: &Command) {
        let pos = self.refresh_q.iter().position(|r| {
            r.kind == cmd.kind
                && match cmd.kind {
                    CommandKind::REFRESH => r.addr.rank == cmd.addr.rank,
                    _ => r.addr.same_bank(&cmd.addr),
                }
        });
        match pos {
            Some(pos) => {
                self.refresh_q.remove(pos);
                log::debug!("{} {}", style("refresh served").green(), cmd);
            }
            None => panic!("issued refresh without a queued obligation: {cmd}"),
        }
    }

    /// Propagate the timing constraints of an issued command to every bank
    /// it affects, scope by scope: the bank itself, its bank-group
    /// neighbors, the other bank groups of the rank, then the other ranks.
    pub fn update_timing(&mut self, cmd: &Command, clk: u64) {
        let kind = cmd.kind as usize;
        let addr = &cmd.addr;
        // split borrows: the table stays shared while banks are updated
        let Self {
            timing,
            bank_states,
            ..
        } = self;
        if cmd.is_rank_command() {
            for group in &mut bank_states[addr.rank] {
                for bank in group.iter_mut() {
                    apply(bank, &timing.same_rank[kind], clk);
                }
            }
        } else {
            apply(
                &mut bank_states[addr.rank][addr.bankgroup][addr.bank],
                &timing.same_bank[kind],
                clk,
            );
            for (k, bank) in bank_states[addr.rank][addr.bankgroup].iter_mut().enumerate() {
                if k != addr.bank {
                    apply(bank, &timing.other_banks_same_bankgroup[kind], clk);
                }
            }
            for (j, group) in bank_states[addr.rank].iter_mut().enumerate() {
                if j == addr.bankgroup {
                    continue;
                }
                for bank in group.iter_mut() {
                    apply(bank, &timing.other_bankgroups_same_rank[kind], clk);
                }
            }
        }
        for (i, rank) in bank_states.iter_mut().enumerate() {
            if i == addr.rank {
                continue;
            }
            for group in rank.iter_mut() {
                for bank in group.iter_mut() {
                    apply(bank, &timing.other_ranks[kind], clk);
                }
            }
        }
    }

    /// True when another ACTIVATE fits inside the rolling activation
    /// windows of `rank` at `clk`. Entries older than the window do not
    /// count against the cap.
    #[must_use]
    pub fn activation_window_ok(&self, rank: usize, clk: u64) -> bool {
        let live_faw = self.four_aw[rank]
            .iter()
            .filter(|&&t| t + self.config.t_faw > clk)
            .count();
        if live_faw >= FAW_CAP {
            return false;
        }
        if self.config.protocol.is_gddr() && self.config.t_32aw > 0 {
            let live_32 = self.thirty_two_aw[rank]
                .iter()
                .filter(|&&t| t + self.config.t_32aw > clk)
                .count();
            if live_32 >= AW32_CAP {
                return false;
            }
        }
        true
    }

    /// Record an issued ACTIVATE in the rolling windows, trimming aged
    /// entries so the windows never grow past their caps.
    pub fn update_activation_times(&mut self, rank: usize, clk: u64) {
        let t_faw = self.config.t_faw;
        let window = &mut self.four_aw[rank];
        while matches!(window.front(), Some(&t) if t + t_faw <= clk) {
            window.pop_front();
        }
        window.push_back(clk);
        debug_assert!(window.len() <= FAW_CAP);

        if self.config.protocol.is_gddr() && self.config.t_32aw > 0 {
            let t_32aw = self.config.t_32aw;
            let window = &mut self.thirty_two_aw[rank];
            while matches!(window.front(), Some(&t) if t + t_32aw <= clk) {
                window.pop_front();
            }
            window.push_back(clk);
            debug_assert!(window.len() <= AW32_CAP);
        }
    }

    /// Advance the per-rank idle counters by one cycle. A rank is idle
    /// while none of its banks holds an open row.
    pub fn update_rank_idle_state(&mut self) {
        for rank in 0..self.config.ranks {
            if self.is_all_bank_idle_in_rank(rank) {
                self.rank_idle_cycles[rank] += 1;
            } else {
                self.rank_idle_cycles[rank] = 0;
            }
        }
    }
}
