pub mod bank_state;
pub mod channel_state;
pub mod command;
pub mod command_queue;
pub mod config;
pub mod refresh;
pub mod timing;

pub use bank_state::BankState;
pub use channel_state::ChannelState;
pub use command::{Address, Command, CommandKind};
pub use command_queue::CommandQueue;
pub use config::Config;
pub use refresh::Refresh;
pub use timing::TimingTable;
