//! Worker loop: one command at a time, direct queue before signals

use crate::command::Command;
use crate::error::Result;
use crate::mailbox::Mailbox;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A command submitted through the direct queue
pub(crate) struct Job {
    pub command: Command,
    pub reply: Option<oneshot::Sender<Result<()>>>,
}

/// Drain `queue` and `signals` until the queue is closed
///
/// Queued jobs take priority; a signal is picked up only when the queue is
/// empty. `execute` runs to completion before the next command is taken.
pub(crate) async fn run<F, Fut>(
    mut queue: mpsc::UnboundedReceiver<Job>,
    signals: Arc<Mailbox<Command>>,
    mut execute: F,
) where
    F: FnMut(Command) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        let job = tokio::select! {
            biased;
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
            command = signals.recv() => Job { command, reply: None },
        };

        tracing::debug!("Worker running {}", job.command);
        let result = execute(job.command).await;
        if let Some(reply) = job.reply {
            let _ = reply.send(result);
        }
    }
    tracing::debug!("Worker stopped");
}
