use std::sync::Mutex;

use async_trait::async_trait;

use super::{HardState, RaftError};

const HARD_STATE_KEY: &[u8] = b"hard_state";

/// Stable storage for the current term and vote.
///
/// `save` must not return until the record is durable: callers persist
/// before answering an RPC so a restarted node cannot vote twice in a term.
/// `load` runs once at startup; `save` runs under the consensus lock.
#[async_trait]
pub trait HardStateStore: Send + Sync {
    fn load(&self) -> Result<HardState, RaftError>;
    async fn save(&self, state: &HardState) -> Result<(), RaftError>;
}

/// Keeps the hard state in memory only. A restart begins again at term 0.
#[derive(Default)]
pub struct MemoryHardStateStore {
    state: Mutex<HardState>,
}

impl MemoryHardStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HardStateStore for MemoryHardStateStore {
    fn load(&self) -> Result<HardState, RaftError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.clone())
    }

    async fn save(&self, state: &HardState) -> Result<(), RaftError> {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *current = state.clone();
        Ok(())
    }
}

/// Persists the hard state as a single bincode record in a sled tree.
pub struct SledHardStateStore {
    tree: sled::Tree,
}

impl SledHardStateStore {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn open(db: &sled::Db) -> Result<Self, RaftError> {
        Ok(Self::new(db.open_tree("__raft_hard_state__")?))
    }
}

#[async_trait]
impl HardStateStore for SledHardStateStore {
    fn load(&self) -> Result<HardState, RaftError> {
        match self.tree.get(HARD_STATE_KEY)? {
            Some(bytes) => {
                let (state, _): (HardState, usize) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
                Ok(state)
            }
            None => Ok(HardState::default()),
        }
    }

    async fn save(&self, state: &HardState) -> Result<(), RaftError> {
        let bytes = bincode::serde::encode_to_vec(state, bincode::config::standard())?;
        self.tree.insert(HARD_STATE_KEY, bytes)?;
        self.tree.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::NodeId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn memory_store_returns_last_saved_state() {
        let store = MemoryHardStateStore::new();
        assert_eq!(store.load().unwrap(), HardState::default());

        let hs = HardState {
            current_term: 3,
            voted_for: Some(NodeId::from("b:2")),
        };
        store.save(&hs).await.unwrap();
        assert_eq!(store.load().unwrap(), hs);
    }

    #[tokio::test]
    async fn sled_store_survives_reopen() {
        let tmp = TempDir::new().expect("tempdir");
        let hs = HardState {
            current_term: 9,
            voted_for: Some(NodeId::from("127.0.0.1:4001")),
        };

        {
            let db = sled::open(tmp.path()).expect("open sled");
            let store = SledHardStateStore::open(&db).expect("open tree");
            assert_eq!(store.load().unwrap(), HardState::default());
            store.save(&hs).await.unwrap();
        }

        let db = sled::open(tmp.path()).expect("reopen sled");
        let store = SledHardStateStore::open(&db).expect("open tree");
        assert_eq!(store.load().unwrap(), hs);
    }
}
