use crate::channel_state::ChannelState;
use crate::config::{Config, RefreshPolicy};
use std::sync::Arc;

/// The refresh clock: raises refresh obligations into the channel state on
/// the schedule the refresh policy prescribes. The scheduler then weaves
/// the orders into the command stream.
pub struct Refresh {
    clk: u64,
    /// Cycles between consecutive refresh orders.
    refresh_interval: u64,
    // staggering cursors
    next_rank: usize,
    next_bankgroup: usize,
    next_bank: usize,
    config: Arc<Config>,
}

impl Refresh {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let refresh_interval = match config.refresh_policy {
            RefreshPolicy::RANK_LEVEL_SIMULTANEOUS => config.t_refi,
            RefreshPolicy::RANK_LEVEL_STAGGERED => config.t_refi / config.ranks as u64,
            RefreshPolicy::BANK_LEVEL_STAGGERED => config.t_refib,
        };
        Self {
            clk: 0,
            refresh_interval: refresh_interval.max(1),
            next_rank: 0,
            next_bankgroup: 0,
            next_bank: 0,
            config,
        }
    }

    /// Advance one cycle; on interval boundaries enqueue the due refresh
    /// orders. Self-refreshing ranks take care of themselves and are
    /// skipped.
    pub fn tick(&mut self, channel_state: &mut ChannelState) {
        self.clk += 1;
        if self.clk % self.refresh_interval == 0 {
            self.insert_refresh(channel_state);
        }
    }

    fn insert_refresh(&mut self, channel_state: &mut ChannelState) {
        match self.config.refresh_policy {
            RefreshPolicy::RANK_LEVEL_SIMULTANEOUS => {
                for rank in 0..self.config.ranks {
                    if !channel_state.is_rank_self_refreshing(rank) {
                        channel_state.rank_need_refresh(rank, true);
                    }
                }
            }
            RefreshPolicy::RANK_LEVEL_STAGGERED => {
                if !channel_state.is_rank_self_refreshing(self.next_rank) {
                    channel_state.rank_need_refresh(self.next_rank, true);
                }
                self.next_rank = (self.next_rank + 1) % self.config.ranks;
            }
            RefreshPolicy::BANK_LEVEL_STAGGERED => {
                if !channel_state.is_rank_self_refreshing(self.next_rank) {
                    channel_state.bank_need_refresh(
                        self.next_rank,
                        self.next_bankgroup,
                        self.next_bank,
                        true,
                    );
                }
                self.advance_bank_cursor();
            }
        }
    }

    /// Banks within a group first, then the groups of the rank, then the
    /// next rank.
    fn advance_bank_cursor(&mut self) {
        self.next_bank = (self.next_bank + 1) % self.config.banks_per_group;
        if self.next_bank == 0 {
            self.next_bankgroup = (self.next_bankgroup + 1) % self.config.bankgroups;
            if self.next_bankgroup == 0 {
                self.next_rank = (self.next_rank + 1) % self.config.ranks;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Refresh;
    use crate::channel_state::ChannelState;
    use crate::command::{Address, Command, CommandKind};
    use crate::config::{Config, RefreshPolicy};
    use std::sync::Arc;

    fn small_config(policy: RefreshPolicy) -> Config {
        Config {
            ranks: 2,
            bankgroups: 2,
            banks_per_group: 2,
            banks: 4,
            t_refi: 100,
            t_refib: 10,
            refresh_policy: policy,
            ..Config::default()
        }
    }

    fn setup(policy: RefreshPolicy) -> (Refresh, ChannelState) {
        let config = Arc::new(small_config(policy));
        (
            Refresh::new(Arc::clone(&config)),
            ChannelState::new(config),
        )
    }

    fn run(refresh: &mut Refresh, state: &mut ChannelState, cycles: u64) {
        for _ in 0..cycles {
            refresh.tick(state);
        }
    }

    #[test]
    fn test_rank_staggered_schedule() {
        let (mut refresh, mut state) = setup(RefreshPolicy::RANK_LEVEL_STAGGERED);
        // tREFI / ranks = 50 cycles between orders, one rank at a time
        run(&mut refresh, &mut state, 49);
        assert!(!state.is_refresh_waiting());
        run(&mut refresh, &mut state, 1);
        let pending: Vec<_> = state.refresh_queue().iter().copied().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, CommandKind::REFRESH);
        assert_eq!(pending[0].addr.rank, 0);

        run(&mut refresh, &mut state, 50);
        let pending: Vec<_> = state.refresh_queue().iter().copied().collect();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].addr.rank, 1);
    }

    #[test]
    fn test_rank_simultaneous_schedule() {
        let (mut refresh, mut state) = setup(RefreshPolicy::RANK_LEVEL_SIMULTANEOUS);
        run(&mut refresh, &mut state, 100);
        let ranks: Vec<_> = state
            .refresh_queue()
            .iter()
            .map(|cmd| cmd.addr.rank)
            .collect();
        assert_eq!(ranks, vec![0, 1]);
    }

    #[test]
    fn test_bank_staggered_schedule() {
        let (mut refresh, mut state) = setup(RefreshPolicy::BANK_LEVEL_STAGGERED);
        run(&mut refresh, &mut state, 50);
        let banks: Vec<_> = state
            .refresh_queue()
            .iter()
            .map(|cmd| (cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank))
            .collect();
        assert!(state
            .refresh_queue()
            .iter()
            .all(|cmd| cmd.kind == CommandKind::REFRESH_BANK));
        assert_eq!(
            banks,
            vec![(0, 0, 0), (0, 0, 1), (0, 1, 0), (0, 1, 1), (1, 0, 0)]
        );
    }

    #[test]
    fn test_self_refreshing_rank_is_skipped() {
        let (mut refresh, mut state) = setup(RefreshPolicy::RANK_LEVEL_STAGGERED);
        state.update_state(&Command::new(
            CommandKind::SREF_ENTER,
            Address::rank_only(0),
            0,
        ));
        run(&mut refresh, &mut state, 100);
        let ranks: Vec<_> = state
            .refresh_queue()
            .iter()
            .map(|cmd| cmd.addr.rank)
            .collect();
        assert_eq!(ranks, vec![1]);
    }
}
