use super::{
    ChainError,
    CommitOp,
    CommittedChain,
    SealedBlock,
};

use anyhow::Result;
use parking_lot::RwLock;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Applies sealed blocks and finalizations to the committed view, one at a
/// time and in the order they were queued.
#[derive(Debug)]
pub struct Committer {
    rx: mpsc::UnboundedReceiver<CommitOp>,
    committed: Arc<RwLock<CommittedChain>>,
    commit_delay: Duration,
}

impl Committer {
    pub(super) fn new(
        rx: mpsc::UnboundedReceiver<CommitOp>,
        committed: Arc<RwLock<CommittedChain>>,
        commit_delay: Duration,
    ) -> Self {
        Self {
            rx,
            committed,
            commit_delay,
        }
    }

    /// Runs until cancelled or until the chain is dropped.
    pub async fn run(mut self, cancel_token: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("Committer received cancellation signal, shutting down...");
                    break;
                }
                op = self.rx.recv() => {
                    let Some(op) = op else {
                        tracing::debug!("Commit queue closed");
                        break;
                    };
                    if let CommitOp::Seal(block) = &op
                        && !self.commit_delay.is_zero()
                    {
                        tokio::select! {
                            () = cancel_token.cancelled() => {
                                tracing::info!(number = block.number, "Committer cancelled before committing block");
                                break;
                            }
                            () = tokio::time::sleep(self.commit_delay) => {}
                        }
                    }
                    self.apply(op)?;
                }
            }
        }
        Ok(())
    }

    fn apply(&self, op: CommitOp) -> Result<()> {
        match op {
            CommitOp::Seal(block) => self.commit(block)?,
            CommitOp::Finalize { hash, done } => {
                let result = self.committed.write().finalize(hash);
                match &result {
                    Ok(()) => tracing::debug!(%hash, "Finalized block"),
                    Err(err) => tracing::warn!(%hash, %err, "Finalization rejected"),
                }
                let _ = done.send(result);
            }
        }
        Ok(())
    }

    fn commit(&self, block: SealedBlock) -> Result<(), ChainError> {
        let number = block.number;
        let hash = block.hash;
        let finalize = block.finalize;

        let mut committed = self.committed.write();
        if let Err(err) = committed.commit(block) {
            tracing::error!(number, %hash, %err, "Failed to commit sealed block");
            return Err(err);
        }
        let head = committed.head();
        drop(committed);

        metrics::counter!("engine_blocks_committed").increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("engine_head_number").set(head as f64);
        tracing::debug!(number, %hash, finalize, "Committed block");
        Ok(())
    }
}
