use serde::{Deserialize, Serialize};

/// DRAM command kinds.
///
/// The absent ("invalid") command of the wire protocol is expressed as
/// `Option<Command>` at the API seams rather than a validity flag.
#[allow(non_camel_case_types)]
#[derive(
    Debug,
    strum::EnumIter,
    strum::EnumCount,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum CommandKind {
    ACTIVATE,
    READ,
    READ_PRECHARGE,
    WRITE,
    WRITE_PRECHARGE,
    PRECHARGE,
    REFRESH,
    REFRESH_BANK,
    SREF_ENTER,
    SREF_EXIT,
}

/// Location of a command within one channel.
///
/// Rank-level commands (REFRESH, SREF_ENTER, SREF_EXIT) only use the
/// `rank` field; the bank and row/column fields are zero and ignored.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Address {
    pub rank: usize,
    pub bankgroup: usize,
    pub bank: usize,
    pub row: u64,
    pub column: u64,
}

impl Address {
    #[must_use]
    pub fn new(rank: usize, bankgroup: usize, bank: usize, row: u64, column: u64) -> Self {
        Self {
            rank,
            bankgroup,
            bank,
            row,
            column,
        }
    }

    /// Address of a rank-level command.
    #[must_use]
    pub fn rank_only(rank: usize) -> Self {
        Self {
            rank,
            ..Self::default()
        }
    }

    /// Address of a bank-level command that carries no row or column.
    #[must_use]
    pub fn bank_of(rank: usize, bankgroup: usize, bank: usize) -> Self {
        Self {
            rank,
            bankgroup,
            bank,
            ..Self::default()
        }
    }

    /// Same (rank, bankgroup, bank) triple.
    #[must_use]
    pub fn same_bank(&self, other: &Self) -> bool {
        self.rank == other.rank && self.bankgroup == other.bankgroup && self.bank == other.bank
    }
}

/// One DRAM command on the channel command bus.
///
/// `hex_addr` is the identifier of the originating memory request and is
/// what ties a synthesized prerequisite (ACTIVATE, PRECHARGE) back to the
/// queued column access it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub addr: Address,
    pub hex_addr: u64,
}

impl Command {
    #[must_use]
    pub fn new(kind: CommandKind, addr: Address, hex_addr: u64) -> Self {
        Self {
            kind,
            addr,
            hex_addr,
        }
    }

    /// A command of a different kind serving the same request.
    #[must_use]
    pub fn with_kind(&self, kind: CommandKind) -> Self {
        Self { kind, ..*self }
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::READ | CommandKind::READ_PRECHARGE
        )
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::WRITE | CommandKind::WRITE_PRECHARGE
        )
    }

    /// Column access of either direction.
    #[must_use]
    pub fn is_read_write(&self) -> bool {
        self.is_read() || self.is_write()
    }

    #[must_use]
    pub fn is_refresh(&self) -> bool {
        matches!(self.kind, CommandKind::REFRESH | CommandKind::REFRESH_BANK)
    }

    /// Commands that address a whole rank rather than a single bank.
    #[must_use]
    pub fn is_rank_command(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::REFRESH | CommandKind::SREF_ENTER | CommandKind::SREF_EXIT
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:?}(rank={} bg={} bank={} row={} col={})",
            self.kind,
            self.addr.rank,
            self.addr.bankgroup,
            self.addr.bank,
            self.addr.row,
            self.addr.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, Command, CommandKind};

    #[test]
    fn test_predicates() {
        let addr = Address::new(0, 1, 2, 42, 8);
        let read = Command::new(CommandKind::READ, addr, 0xdead);
        assert!(read.is_read());
        assert!(read.is_read_write());
        assert!(!read.is_write());
        assert!(!read.is_rank_command());

        let wrp = read.with_kind(CommandKind::WRITE_PRECHARGE);
        assert!(wrp.is_write());
        assert_eq!(wrp.addr, addr);
        assert_eq!(wrp.hex_addr, 0xdead);

        let refresh = Command::new(CommandKind::REFRESH, Address::rank_only(1), 0);
        assert!(refresh.is_refresh());
        assert!(refresh.is_rank_command());
        assert!(!Command::new(CommandKind::REFRESH_BANK, addr, 0).is_rank_command());
    }

    #[test]
    fn test_same_bank() {
        let a = Address::new(0, 1, 2, 5, 0);
        let b = Address::new(0, 1, 2, 9, 64);
        let c = Address::new(0, 2, 2, 5, 0);
        assert!(a.same_bank(&b));
        assert!(!a.same_bank(&c));
    }
}
