use crate::command::{Command, CommandKind};
use serde::{Deserialize, Serialize};
use strum::EnumCount;

/// Row-buffer state of one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// A row is latched in the row buffer.
    Open,
    /// No row open; the bank can activate or refresh.
    Closed,
    /// The rank holding this bank is in self-refresh.
    SelfRefresh,
    /// Power-down. Present in the state space but no command path enters
    /// it; tCKE/tXP stay in the configuration for completeness.
    PowerDown,
}

/// Per-bank state machine: row-buffer tracking plus the earliest cycle at
/// which each command kind may issue on this bank.
#[derive(Debug, Clone)]
pub struct BankState {
    state: State,
    /// Earliest allowed issue cycle per command kind. Monotonically
    /// non-decreasing over the bank's lifetime.
    earliest: [u64; CommandKind::COUNT],
    open_row: Option<u64>,
    /// Column accesses served by the currently open row since activation.
    row_hit_count: u32,
}

impl Default for BankState {
    fn default() -> Self {
        Self::new()
    }
}

impl BankState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Closed,
            earliest: [0; CommandKind::COUNT],
            open_row: None,
            row_hit_count: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn is_row_open(&self) -> bool {
        self.state == State::Open
    }

    #[must_use]
    pub fn open_row(&self) -> Option<u64> {
        self.open_row
    }

    #[must_use]
    pub fn row_hit_count(&self) -> u32 {
        self.row_hit_count
    }

    /// Earliest cycle `kind` may issue on this bank.
    #[must_use]
    pub fn earliest(&self, kind: CommandKind) -> u64 {
        self.earliest[kind as usize]
    }

    /// Resolve `cmd` against this bank's state: either the command itself,
    /// a prerequisite that must run first (ACTIVATE to open the row,
    /// PRECHARGE to close a conflicting one), or `None` when nothing can
    /// issue at `clk`.
    #[must_use]
    pub fn get_ready(&self, cmd: &Command, clk: u64) -> Option<Command> {
        use CommandKind::{
            ACTIVATE, PRECHARGE, READ, READ_PRECHARGE, REFRESH, REFRESH_BANK, SREF_ENTER,
            SREF_EXIT, WRITE, WRITE_PRECHARGE,
        };
        let required = match self.state {
            State::Closed => match cmd.kind {
                READ | READ_PRECHARGE | WRITE | WRITE_PRECHARGE => Some(ACTIVATE),
                ACTIVATE | REFRESH | REFRESH_BANK | SREF_ENTER => Some(cmd.kind),
                // nothing to close, nothing to exit
                PRECHARGE | SREF_EXIT => None,
            },
            State::Open => match cmd.kind {
                READ | READ_PRECHARGE | WRITE | WRITE_PRECHARGE => {
                    if self.open_row == Some(cmd.addr.row) {
                        Some(cmd.kind)
                    } else {
                        Some(PRECHARGE)
                    }
                }
                // the open row must close before any of these
                ACTIVATE | PRECHARGE | REFRESH | REFRESH_BANK | SREF_ENTER => Some(PRECHARGE),
                SREF_EXIT => None,
            },
            State::SelfRefresh => match cmd.kind {
                SREF_EXIT => Some(SREF_EXIT),
                _ => None,
            },
            State::PowerDown => None,
        };
        let kind = required?;
        if clk >= self.earliest[kind as usize] {
            Some(cmd.with_kind(kind))
        } else {
            None
        }
    }

    /// Commit the state transition for an issued command.
    ///
    /// Callers must only commit commands previously resolved by
    /// [`BankState::get_ready`]; a transition that cannot happen on real
    /// hardware is a scheduler bug and panics.
    pub fn update_state(&mut self, cmd: &Command) {
        use CommandKind::{
            ACTIVATE, PRECHARGE, READ, READ_PRECHARGE, REFRESH, REFRESH_BANK, SREF_ENTER,
            SREF_EXIT, WRITE, WRITE_PRECHARGE,
        };
        match cmd.kind {
            ACTIVATE => {
                assert_eq!(
                    self.state,
                    State::Closed,
                    "activate on a bank that is not closed: {cmd}"
                );
                self.state = State::Open;
                self.open_row = Some(cmd.addr.row);
                self.row_hit_count = 0;
            }
            READ | WRITE => {
                if self.open_row != Some(cmd.addr.row) {
                    panic!(
                        "column access to row {} but open row is {:?}: {cmd}",
                        cmd.addr.row, self.open_row
                    );
                }
                self.row_hit_count += 1;
            }
            READ_PRECHARGE | WRITE_PRECHARGE => {
                if self.open_row != Some(cmd.addr.row) {
                    panic!(
                        "column access to row {} but open row is {:?}: {cmd}",
                        cmd.addr.row, self.open_row
                    );
                }
                // the bank closes itself once the access drains; the delay
                // lives in the timing table as the future earliest ACTIVATE
                self.state = State::Closed;
                self.open_row = None;
                self.row_hit_count = 0;
            }
            PRECHARGE => {
                self.state = State::Closed;
                self.open_row = None;
                self.row_hit_count = 0;
            }
            REFRESH | REFRESH_BANK => {
                assert_eq!(
                    self.state,
                    State::Closed,
                    "refresh on a bank that is not closed: {cmd}"
                );
            }
            SREF_ENTER => {
                assert_eq!(
                    self.state,
                    State::Closed,
                    "self-refresh entry on a bank that is not closed: {cmd}"
                );
                self.state = State::SelfRefresh;
            }
            SREF_EXIT => {
                assert_eq!(
                    self.state,
                    State::SelfRefresh,
                    "self-refresh exit on a bank that is not self-refreshing: {cmd}"
                );
                self.state = State::Closed;
            }
        }
    }

    /// Push out the earliest issue cycle of `kind` to at least
    /// `clk + min_gap`. Never moves a constraint backwards.
    pub fn update_timing(&mut self, kind: CommandKind, min_gap: u64, clk: u64) {
        let earliest = &mut self.earliest[kind as usize];
        *earliest = (*earliest).max(clk + min_gap);
    }
}

#[cfg(test)]
mod tests {
    use super::{BankState, State};
    use crate::command::{Address, Command, CommandKind};

    fn read(row: u64) -> Command {
        Command::new(CommandKind::READ, Address::new(0, 0, 0, row, 0), row)
    }

    #[test]
    fn test_closed_bank_resolves_activate() {
        let bank = BankState::new();
        let resolved = bank.get_ready(&read(5), 0).unwrap();
        assert_eq!(resolved.kind, CommandKind::ACTIVATE);
        assert_eq!(resolved.addr.row, 5);
    }

    #[test]
    fn test_row_hit_and_conflict() {
        let mut bank = BankState::new();
        let act = read(5).with_kind(CommandKind::ACTIVATE);
        bank.update_state(&act);
        assert_eq!(bank.state(), State::Open);
        assert_eq!(bank.open_row(), Some(5));

        // hit: the command itself comes back
        let resolved = bank.get_ready(&read(5), 0).unwrap();
        assert_eq!(resolved.kind, CommandKind::READ);

        // conflict: a precharge is synthesized
        let resolved = bank.get_ready(&read(9), 0).unwrap();
        assert_eq!(resolved.kind, CommandKind::PRECHARGE);
    }

    #[test]
    fn test_timing_gates_resolution() {
        let mut bank = BankState::new();
        bank.update_timing(CommandKind::ACTIVATE, 10, 0);
        assert!(bank.get_ready(&read(5), 9).is_none());
        assert!(bank.get_ready(&read(5), 10).is_some());
    }

    #[test]
    fn test_earliest_is_monotone() {
        let mut bank = BankState::new();
        bank.update_timing(CommandKind::READ, 20, 0);
        assert_eq!(bank.earliest(CommandKind::READ), 20);
        // a shorter constraint later must not pull the cycle back in
        bank.update_timing(CommandKind::READ, 2, 5);
        assert_eq!(bank.earliest(CommandKind::READ), 20);
        bank.update_timing(CommandKind::READ, 30, 5);
        assert_eq!(bank.earliest(CommandKind::READ), 35);
    }

    #[test]
    fn test_row_hit_counter() {
        let mut bank = BankState::new();
        bank.update_state(&read(5).with_kind(CommandKind::ACTIVATE));
        assert_eq!(bank.row_hit_count(), 0);
        bank.update_state(&read(5));
        bank.update_state(&read(5));
        assert_eq!(bank.row_hit_count(), 2);
        bank.update_state(&read(5).with_kind(CommandKind::PRECHARGE));
        assert_eq!(bank.row_hit_count(), 0);
        assert_eq!(bank.state(), State::Closed);
        assert_eq!(bank.open_row(), None);
    }

    #[test]
    fn test_auto_precharge_closes() {
        let mut bank = BankState::new();
        bank.update_state(&read(5).with_kind(CommandKind::ACTIVATE));
        bank.update_state(&read(5).with_kind(CommandKind::READ_PRECHARGE));
        assert_eq!(bank.state(), State::Closed);
        assert_eq!(bank.open_row(), None);
    }

    #[test]
    fn test_refresh_requires_closed() {
        let mut bank = BankState::new();
        let refresh = Command::new(CommandKind::REFRESH_BANK, Address::bank_of(0, 0, 0), 0);
        // closed bank: refresh passes through
        assert_eq!(
            bank.get_ready(&refresh, 0).unwrap().kind,
            CommandKind::REFRESH_BANK
        );
        // open bank: a precharge is synthesized first
        bank.update_state(&read(5).with_kind(CommandKind::ACTIVATE));
        assert_eq!(
            bank.get_ready(&refresh, 0).unwrap().kind,
            CommandKind::PRECHARGE
        );
    }

    #[test]
    fn test_self_refresh_round_trip() {
        let mut bank = BankState::new();
        let enter = Command::new(CommandKind::SREF_ENTER, Address::rank_only(0), 0);
        let exit = Command::new(CommandKind::SREF_EXIT, Address::rank_only(0), 0);
        bank.update_state(&enter);
        assert_eq!(bank.state(), State::SelfRefresh);
        // nothing but the exit resolves while self-refreshing
        assert!(bank.get_ready(&read(5), 1000).is_none());
        assert_eq!(
            bank.get_ready(&exit, 0).unwrap().kind,
            CommandKind::SREF_EXIT
        );
        bank.update_state(&exit);
        assert_eq!(bank.state(), State::Closed);
    }

    #[test]
    #[should_panic(expected = "column access")]
    fn test_column_access_to_closed_bank_panics() {
        let mut bank = BankState::new();
        bank.update_state(&read(5));
    }

    #[test]
    fn test_precharge_on_closed_bank_is_noop() {
        let bank = BankState::new();
        let pre = Command::new(CommandKind::PRECHARGE, Address::bank_of(0, 0, 0), 0);
        assert!(bank.get_ready(&pre, 0).is_none());
    }
}
