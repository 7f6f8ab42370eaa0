use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinSet;

use super::message::WizardMessage;
use super::task::Task;

/// Spawns the tasks an update returns and feeds their messages back in.
pub struct Runtime {
    sender: UnboundedSender<WizardMessage>,
    receiver: UnboundedReceiver<WizardMessage>,
    jobs: JoinSet<()>,
}

impl Default for Runtime {
    fn default() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender,
            receiver,
            jobs: JoinSet::new(),
        }
    }
}

impl Runtime {
    pub fn spawn(&mut self, task: Task<WizardMessage>) {
        if task.is_none() {
            return;
        }
        for future in task.into_futures(&self.sender) {
            self.jobs.spawn(future);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.receiver.is_empty()
    }

    /// The next message from background work, or `None` once every job has
    /// finished and its messages were delivered.
    pub async fn next_message(&mut self) -> Option<WizardMessage> {
        loop {
            if let Ok(message) = self.receiver.try_recv() {
                return Some(message);
            }
            if self.jobs.is_empty() {
                return None;
            }
            tokio::select! {
                Some(message) = self.receiver.recv() => return Some(message),
                Some(joined) = self.jobs.join_next() => {
                    match joined {
                        Err(error) if error.is_cancelled() => {}
                        Err(error) => log::error!("Background job failed: {error}"),
                        Ok(()) => {}
                    }
                }
                else => return None,
            }
        }
    }

    /// Wait for the remaining jobs and drop what they report. Jobs whose
    /// token was cancelled stop at their next checkpoint, so this returns
    /// once the command currently running has finished or timed out.
    pub async fn finish(&mut self) {
        let mut dropped = 0_usize;
        while self.next_message().await.is_some() {
            dropped += 1;
        }
        log::debug!("Background work finished, dropped {dropped} late messages");
    }
}
