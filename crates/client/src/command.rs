//! Units of work executed by the worker

use std::fmt;

/// A scheduled game action
///
/// Commands run one at a time on the worker. Submitted through the direct
/// queue they are never dropped; posted as signals through the idle mailbox,
/// a newer signal replaces one still waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ping every node playing the game
    Ping,
    /// Refetch the game and extend the block store
    Sync,
    /// Send commands for the round currently known locally
    SendCommands,
    /// Resync, then send commands unless already sent for that round
    SyncThenSendCommands,
    /// Ask the authority to close the current round
    EndOfRound,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Ping => "ping",
            Command::Sync => "sync",
            Command::SendCommands => "send commands",
            Command::SyncThenSendCommands => "sync then send commands",
            Command::EndOfRound => "end of round",
        };
        f.write_str(name)
    }
}
