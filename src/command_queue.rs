use crate::channel_state::ChannelState;
use crate::command::{Command, CommandKind};
use crate::config::Config;
use color_eyre::eyre;
use console::style;
use std::collections::HashSet;
use std::sync::Arc;

/// Row-hit streak length after which a conflicting PRECHARGE wins the
/// arbitration even though more hits are queued. Fairness cap, fixed by
/// design.
const ROW_HIT_CAP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueStructure {
    PerRank,
    PerBank,
}

/// Per-rank or per-bank buffers of pending commands plus the arbiter that
/// picks, once per cycle, the first command the channel state will accept.
///
/// The queue never mutates channel state itself: it resolves candidates
/// through [`ChannelState::get_ready_command`] and leaves the commit to the
/// caller.
pub struct CommandQueue {
    queue_structure: QueueStructure,
    /// Sub-queues in submission order; index layout is decided by
    /// [`CommandQueue::queue_index`].
    queues: Vec<Vec<Command>>,
    num_queues: usize,
    queue_size: usize,
    /// Round-robin cursor over the sub-queues.
    queue_idx: usize,
    /// True while a refresh order holds some sub-queues paused.
    is_in_ref: bool,
    /// Sub-queue indices paused by the in-progress refresh.
    ref_q_indices: HashSet<usize>,
    /// Per-rank flag the self-refresh heuristic reads: false as soon as a
    /// command for the rank is admitted, true again once its queues drain.
    pub rank_queues_empty: Vec<bool>,
    config: Arc<Config>,
}

impl CommandQueue {
    pub fn new(config: Arc<Config>) -> eyre::Result<Self> {
        let (queue_structure, num_queues) = match config.queue_structure.as_str() {
            "PER_BANK" => (QueueStructure::PerBank, config.banks * config.ranks),
            "PER_RANK" => (QueueStructure::PerRank, config.ranks),
            other => eyre::bail!("unsupported queue structure {other:?}"),
        };
        Ok(Self {
            queue_structure,
            queues: (0..num_queues)
                .map(|_| Vec::with_capacity(config.cmd_queue_size))
                .collect(),
            num_queues,
            queue_size: config.cmd_queue_size,
            queue_idx: 0,
            is_in_ref: false,
            ref_q_indices: HashSet::new(),
            rank_queues_empty: vec![true; config.ranks],
            config,
        })
    }

    /// Sub-queue index of a bank: the rank for PER_RANK queues, the flat
    /// bank number for PER_BANK queues.
    #[must_use]
    pub fn queue_index(&self, rank: usize, bankgroup: usize, bank: usize) -> usize {
        match self.queue_structure {
            QueueStructure::PerRank => rank,
            QueueStructure::PerBank => {
                rank * self.config.banks + bankgroup * self.config.banks_per_group + bank
            }
        }
    }

    /// Admission check: the target sub-queue has room for one more entry.
    #[must_use]
    pub fn will_accept_command(&self, rank: usize, bankgroup: usize, bank: usize) -> bool {
        self.queues[self.queue_index(rank, bankgroup, bank)].len() < self.queue_size
    }

    /// Append `cmd` to its sub-queue. Returns false when the queue is full;
    /// the caller keeps the command and retries later.
    pub fn add_command(&mut self, cmd: Command) -> bool {
        let idx = self.queue_index(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        if self.queues[idx].len() < self.queue_size {
            self.rank_queues_empty[cmd.addr.rank] = false;
            self.queues[idx].push(cmd);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn queue_empty(&self) -> bool {
        self.queues.iter().all(Vec::is_empty)
    }

    /// Total pending entries across all sub-queues.
    #[must_use]
    pub fn queue_usage(&self) -> usize {
        self.queues.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_in_refresh(&self) -> bool {
        self.is_in_ref
    }

    /// Scan the sub-queues round-robin for the first command the channel
    /// state accepts at `clk`. Sub-queues paused by an in-progress refresh
    /// are skipped. An issued READ/WRITE is removed from its sub-queue;
    /// synthesized ACTIVATE/PRECHARGE prerequisites leave the entry queued
    /// until the access itself can go.
    pub fn get_command_to_issue(
        &mut self,
        channel_state: &ChannelState,
        clk: u64,
    ) -> Option<Command> {
        for _ in 0..self.num_queues {
            self.queue_idx = (self.queue_idx + 1) % self.num_queues;
            if self.is_in_ref && self.ref_q_indices.contains(&self.queue_idx) {
                continue;
            }
            if let Some(cmd) = self.first_ready_in_queue(self.queue_idx, channel_state, clk) {
                if cmd.is_read_write() {
                    self.erase_rw_command(&cmd);
                }
                log::trace!("issue {cmd} at cycle {clk}");
                return Some(cmd);
            }
        }
        None
    }

    /// Drive the refresh order at the head of the channel's refresh queue:
    /// either the refresh itself (once every affected bank is closed and
    /// past its timing) or the PRECHARGE that closes the next open bank.
    ///
    /// On first invocation for an order this pauses the affected
    /// sub-queues; they resume when the refresh issues.
    pub fn finish_refresh(&mut self, channel_state: &ChannelState, clk: u64) -> Option<Command> {
        let ref_cmd = *channel_state
            .pending_ref_command()
            .expect("finish_refresh called with no pending refresh");
        if !self.is_in_ref {
            self.ref_q_indices = self.refresh_queue_indices(&ref_cmd);
            self.is_in_ref = true;
            log::debug!(
                "{} {} pauses queues {:?}",
                style("refresh").yellow(),
                ref_cmd,
                self.ref_q_indices
            );
        }
        let cmd = channel_state.get_ready_command(&ref_cmd, clk);
        if let Some(cmd) = &cmd {
            if cmd.is_refresh() {
                self.ref_q_indices.clear();
                self.is_in_ref = false;
            }
        }
        cmd
    }

    /// Sub-queue indices an order pauses: every queue of the rank for an
    /// all-bank REFRESH under PER_BANK queues, otherwise the single queue
    /// the order's bank maps to (which for PER_RANK queues is the whole
    /// rank).
    fn refresh_queue_indices(&self, ref_cmd: &Command) -> HashSet<usize> {
        let mut indices = HashSet::new();
        if ref_cmd.kind == CommandKind::REFRESH
            && self.queue_structure == QueueStructure::PerBank
        {
            for i in 0..self.num_queues {
                if i / self.config.banks == ref_cmd.addr.rank {
                    indices.insert(i);
                }
            }
        } else {
            indices.insert(self.queue_index(
                ref_cmd.addr.rank,
                ref_cmd.addr.bankgroup,
                ref_cmd.addr.bank,
            ));
        }
        indices
    }

    fn first_ready_in_queue(
        &self,
        idx: usize,
        channel_state: &ChannelState,
        clk: u64,
    ) -> Option<Command> {
        let queue = &self.queues[idx];
        for (pos, entry) in queue.iter().enumerate() {
            let Some(cmd) = channel_state.get_ready_command(entry, clk) else {
                continue;
            };
            if cmd.kind == CommandKind::PRECHARGE {
                if !self.arbitrate_precharge(pos, queue, channel_state) {
                    continue;
                }
            } else if cmd.is_write() && Self::has_rw_dependency(pos, queue) {
                continue;
            }
            return Some(cmd);
        }
        None
    }

    /// Decide whether a PRECHARGE synthesized for the entry at `pos` may
    /// close the row now. Earlier entries for the same bank go first (they
    /// may still use the open row); queued row hits keep the row open
    /// unless the streak already reached [`ROW_HIT_CAP`].
    fn arbitrate_precharge(
        &self,
        pos: usize,
        queue: &[Command],
        channel_state: &ChannelState,
    ) -> bool {
        let cmd = &queue[pos];
        for prev in &queue[..pos] {
            if prev.addr.same_bank(&cmd.addr) {
                return false;
            }
        }

        let open_row =
            channel_state.open_row(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        let pending_row_hits_exist = queue[pos..]
            .iter()
            .any(|pending| pending.addr.same_bank(&cmd.addr) && Some(pending.addr.row) == open_row);

        let rowhit_limit_reached =
            channel_state.row_hit_count(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank)
                >= ROW_HIT_CAP;
        if !pending_row_hits_exist || rowhit_limit_reached {
            log::trace!("on-demand precharge for {cmd}");
            return true;
        }
        false
    }

    /// Write-after-read: a WRITE must not pass an earlier queued READ to
    /// the same address. Read-after-write is already serialized upstream.
    fn has_rw_dependency(pos: usize, queue: &[Command]) -> bool {
        let cmd = &queue[pos];
        queue[..pos].iter().any(|prev| {
            prev.is_read()
                && prev.addr.same_bank(&cmd.addr)
                && prev.addr.row == cmd.addr.row
                && prev.addr.column == cmd.addr.column
        })
    }

    /// Remove the issued column access from its sub-queue, matched by
    /// request id and kind. Not finding it means the scheduler issued a
    /// command it never queued.
    fn erase_rw_command(&mut self, cmd: &Command) {
        let idx = self.queue_index(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        let queue = &mut self.queues[idx];
        let pos = queue
            .iter()
            .position(|entry| entry.hex_addr == cmd.hex_addr && entry.kind == cmd.kind)
            .unwrap_or_else(|| panic!("cannot find issued command in queue: {cmd}"));
        queue.remove(pos);

        let rank = cmd.addr.rank;
        let rank_drained = match self.queue_structure {
            QueueStructure::PerRank => self.queues[rank].is_empty(),
            QueueStructure::PerBank => self
                .queues
                .iter()
                .enumerate()
                .filter(|(i, _)| i / self.config.banks == rank)
                .all(|(_, q)| q.is_empty()),
        };
        if rank_drained {
            self.rank_queues_empty[rank] = true;
        }
    }
}
