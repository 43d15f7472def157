//! Bot command producers

use crate::config::BotConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as Process;

/// What a bot is asked to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEnv {
    pub round: u64,
    /// Rank of the bot in the game
    pub player: u32,
    pub nb_cycles: u32,
    pub bot_id: u32,
}

/// Produces the command string a bot submits for a round
#[async_trait]
pub trait CommandProducer: Send + Sync {
    async fn produce(&self, bot: &BotConfig, env: &CommandEnv) -> Result<String>;
}

/// Runs the bot's command line through the system shell
///
/// The command gets `ROUND_NUMBER`, `PLAYER_NUMBER`, `NB_CYCLES` and `BOT_ID`
/// in its environment and `"<round> <player>"` on stdin; its stdout is the
/// command string. Stderr is inherited.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellProducer;

#[async_trait]
impl CommandProducer for ShellProducer {
    async fn produce(&self, bot: &BotConfig, env: &CommandEnv) -> Result<String> {
        let failed = |reason: String| Error::Producer {
            bot_id: bot.id,
            reason,
        };

        let mut process = if cfg!(windows) {
            let mut p = Process::new("cmd.exe");
            p.arg("/C").arg(&bot.command);
            p
        } else {
            let mut p = Process::new("sh");
            p.arg("-c").arg(&bot.command);
            p
        };
        process
            .env("ROUND_NUMBER", env.round.to_string())
            .env("PLAYER_NUMBER", env.player.to_string())
            .env("NB_CYCLES", env.nb_cycles.to_string())
            .env("BOT_ID", env.bot_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        tracing::debug!("Running bot {}: {}", bot.id, bot.command);
        let mut child = process.spawn().map_err(|e| failed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{} {}", env.round, env.player);
            // A bot may exit without reading its input
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!("Bot {} did not read stdin: {}", bot.id, e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !output.status.success() {
            return Err(failed(format!("exited with {}", output.status)));
        }
        String::from_utf8(output.stdout).map_err(|e| failed(e.to_string()))
    }
}
