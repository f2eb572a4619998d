//! # `chain`
//!
//! Block production for the development node.
//!
//! Blocks go through two stages. *Sealing* happens synchronously when an
//! engine command arrives: the next height, the parent and the pending
//! transactions are fixed under the sealing lock and the acknowledgment is
//! returned right away. *Committing* happens later on the [`Committer`] task,
//! which applies sealed blocks in order to the [`CommittedChain`] that every
//! query reads from. A block is observable through the `eth_*` methods and the
//! history query only once it has been committed.

mod block_hash_window;
mod committer;

pub use block_hash_window::{
    BlockHashWindow,
    WindowError,
};
pub use committer::Committer;

use crate::config::Sealing;

use alloy_primitives::{
    B256,
    Bytes,
    U64,
    keccak256,
};
use engine_rpc_core::{
    BlockCommand,
    BlockTag,
    CreatedBlock,
    ImportedAux,
    JsonRpcErrorCode,
    RpcBlock,
};
use parking_lot::{
    Mutex,
    RwLock,
};
use std::{
    collections::HashMap,
    num::NonZeroU64,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

/// Parameters of a [`DevChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub block_hash_count: NonZeroU64,
    /// Time the committer waits before applying each sealed block.
    pub commit_delay: Duration,
    pub sealing: Sealing,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no transactions to include")]
    NoTransactions,
    #[error("forking is not supported")]
    Forking { parent: B256, head: B256 },
    #[error("unknown block")]
    UnknownBlock(B256),
    #[error("empty transaction")]
    EmptyTransaction,
    #[error("chain is shutting down")]
    Stopped,
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl ChainError {
    /// JSON-RPC error code reported for this error.
    pub fn code(&self) -> JsonRpcErrorCode {
        match self {
            Self::Forking { .. } | Self::UnknownBlock(_) | Self::EmptyTransaction => {
                JsonRpcErrorCode::InvalidParams
            }
            Self::NoTransactions | Self::Stopped | Self::Window(_) => {
                JsonRpcErrorCode::InternalError
            }
        }
    }
}

/// A block fixed by the sealer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub transactions: Vec<B256>,
    /// Finalize the block once it is committed.
    pub finalize: bool,
}

impl SealedBlock {
    fn genesis(chain_id: u64) -> Self {
        let mut preimage = b"genesis".to_vec();
        preimage.extend_from_slice(&chain_id.to_be_bytes());

        Self {
            number: 0,
            hash: keccak256(preimage),
            parent_hash: B256::ZERO,
            transactions: Vec::new(),
            finalize: true,
        }
    }

    fn seal(parent_hash: B256, number: u64, transactions: Vec<B256>, finalize: bool) -> Self {
        let mut preimage = Vec::with_capacity(32 + 8 + 32 * transactions.len());
        preimage.extend_from_slice(parent_hash.as_slice());
        preimage.extend_from_slice(&number.to_be_bytes());
        for tx in &transactions {
            preimage.extend_from_slice(tx.as_slice());
        }

        Self {
            number,
            hash: keccak256(preimage),
            parent_hash,
            transactions,
            finalize,
        }
    }

    pub fn to_rpc(&self) -> RpcBlock {
        RpcBlock {
            number: U64::from(self.number),
            hash: self.hash,
            parent_hash: self.parent_hash,
            transactions: self.transactions.clone(),
        }
    }
}

/// Work queued for the committer, applied strictly in order.
#[derive(Debug)]
pub enum CommitOp {
    Seal(SealedBlock),
    Finalize {
        hash: B256,
        done: oneshot::Sender<Result<(), ChainError>>,
    },
}

/// The settled view of the chain. Every query reads from here.
#[derive(Debug)]
pub struct CommittedChain {
    blocks: HashMap<B256, SealedBlock>,
    /// Block hash per height, genesis at index 0.
    canonical: Vec<B256>,
    window: BlockHashWindow,
    finalized: u64,
}

impl CommittedChain {
    fn new(genesis: SealedBlock, block_hash_count: NonZeroU64) -> Self {
        let genesis_hash = genesis.hash;
        Self {
            blocks: HashMap::from([(genesis_hash, genesis)]),
            canonical: vec![genesis_hash],
            window: BlockHashWindow::new(block_hash_count),
            finalized: 0,
        }
    }

    pub fn head(&self) -> u64 {
        self.canonical.len() as u64 - 1
    }

    pub fn finalized(&self) -> u64 {
        self.finalized
    }

    pub fn window(&self) -> &BlockHashWindow {
        &self.window
    }

    /// Applies a sealed block. The window is checked first so a rejected
    /// block leaves the view untouched.
    fn commit(&mut self, block: SealedBlock) -> Result<(), ChainError> {
        self.window.push(block.number, block.hash)?;

        if block.finalize {
            self.finalized = block.number;
        }
        self.canonical.push(block.hash);
        self.blocks.insert(block.hash, block);
        Ok(())
    }

    fn finalize(&mut self, hash: B256) -> Result<(), ChainError> {
        let number = self
            .blocks
            .get(&hash)
            .map(|block| block.number)
            .ok_or(ChainError::UnknownBlock(hash))?;
        self.finalized = self.finalized.max(number);
        Ok(())
    }

    fn resolve(&self, tag: BlockTag) -> u64 {
        match tag {
            BlockTag::Latest | BlockTag::Pending => self.head(),
            BlockTag::Finalized | BlockTag::Safe => self.finalized,
            BlockTag::Earliest => 0,
            BlockTag::Number(number) => number,
        }
    }

    pub fn block_by_number(&self, tag: BlockTag) -> Option<&SealedBlock> {
        let number = usize::try_from(self.resolve(tag)).ok()?;
        self.canonical
            .get(number)
            .and_then(|hash| self.blocks.get(hash))
    }

    pub fn block_by_hash(&self, hash: &B256) -> Option<&SealedBlock> {
        self.blocks.get(hash)
    }
}

#[derive(Debug)]
struct SealState {
    head_number: u64,
    head_hash: B256,
    pending: Vec<B256>,
}

/// The development chain: sealer, committed view, and the committer queue.
#[derive(Debug)]
pub struct DevChain {
    config: ChainConfig,
    genesis_hash: B256,
    sealer: Mutex<SealState>,
    committed: Arc<RwLock<CommittedChain>>,
    commits: mpsc::UnboundedSender<CommitOp>,
}

impl DevChain {
    /// Creates the chain at genesis together with the committer that must be
    /// run for sealed blocks to become observable.
    pub fn new(config: ChainConfig) -> (Arc<Self>, Committer) {
        let genesis = SealedBlock::genesis(config.chain_id);
        let genesis_hash = genesis.hash;
        let committed = Arc::new(RwLock::new(CommittedChain::new(
            genesis,
            config.block_hash_count,
        )));
        let (commits, commit_rx) = mpsc::unbounded_channel();

        let chain = Arc::new(Self {
            config,
            genesis_hash,
            sealer: Mutex::new(SealState {
                head_number: 0,
                head_hash: genesis_hash,
                pending: Vec::new(),
            }),
            committed: committed.clone(),
            commits,
        });
        let committer = Committer::new(commit_rx, committed, config.commit_delay);

        (chain, committer)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn genesis_hash(&self) -> B256 {
        self.genesis_hash
    }

    /// Seals a block per `command` and queues it for commit.
    pub fn create_block(&self, command: BlockCommand) -> Result<CreatedBlock, ChainError> {
        let mut sealer = self.sealer.lock();
        self.seal_locked(&mut sealer, command)
    }

    /// Queues a finalization behind every block sealed so far and waits for
    /// the committer to apply it.
    pub async fn finalize_block(&self, hash: B256) -> Result<(), ChainError> {
        let (done, result) = oneshot::channel();
        self.commits
            .send(CommitOp::Finalize { hash, done })
            .map_err(|_| ChainError::Stopped)?;
        result.await.map_err(|_| ChainError::Stopped)?
    }

    /// Adds a raw transaction to the pending pool and returns its hash.
    ///
    /// With [`Sealing::Instant`] the transaction is sealed into its own
    /// finalized block right away.
    pub fn submit_transaction(&self, raw: &Bytes) -> Result<B256, ChainError> {
        if raw.is_empty() {
            return Err(ChainError::EmptyTransaction);
        }
        let hash = keccak256(raw);

        let mut sealer = self.sealer.lock();
        sealer.pending.push(hash);
        if self.config.sealing == Sealing::Instant {
            let command = BlockCommand {
                create_empty: false,
                finalize: true,
                parent_hash: None,
            };
            self.seal_locked(&mut sealer, command)?;
        }
        Ok(hash)
    }

    fn seal_locked(
        &self,
        sealer: &mut SealState,
        command: BlockCommand,
    ) -> Result<CreatedBlock, ChainError> {
        if let Some(parent) = command.parent_hash
            && parent != sealer.head_hash
        {
            return Err(ChainError::Forking {
                parent,
                head: sealer.head_hash,
            });
        }
        if !command.create_empty && sealer.pending.is_empty() {
            return Err(ChainError::NoTransactions);
        }

        let block = SealedBlock::seal(
            sealer.head_hash,
            sealer.head_number + 1,
            std::mem::take(&mut sealer.pending),
            command.finalize,
        );
        let hash = block.hash;
        let number = block.number;

        // Queued while the sealing lock is held, so commit order is seal order.
        if let Err(mpsc::error::SendError(op)) = self.commits.send(CommitOp::Seal(block)) {
            if let CommitOp::Seal(block) = op {
                sealer.pending = block.transactions;
            }
            return Err(ChainError::Stopped);
        }
        sealer.head_number = number;
        sealer.head_hash = hash;

        metrics::counter!("engine_blocks_created").increment(1);
        tracing::debug!(number, %hash, finalize = command.finalize, "Sealed block");

        Ok(CreatedBlock {
            hash,
            aux: ImportedAux {
                is_new_best: true,
                ..Default::default()
            },
        })
    }

    /// Height of the committed head.
    pub fn block_number(&self) -> u64 {
        self.committed.read().head()
    }

    pub fn finalized_number(&self) -> u64 {
        self.committed.read().finalized()
    }

    pub fn block_by_number(&self, tag: BlockTag) -> Option<RpcBlock> {
        self.committed
            .read()
            .block_by_number(tag)
            .map(SealedBlock::to_rpc)
    }

    pub fn block_by_hash(&self, hash: &B256) -> Option<RpcBlock> {
        self.committed
            .read()
            .block_by_hash(hash)
            .map(SealedBlock::to_rpc)
    }

    /// History lookup: the committed hash at `height`, or the sentinel.
    pub fn block_hash(&self, height: u64) -> B256 {
        self.committed.read().window().get(height)
    }

    /// Number of pending transactions not yet sealed.
    pub fn pending_transactions(&self) -> usize {
        self.sealer.lock().pending.len()
    }
}
