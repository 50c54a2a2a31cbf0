//! In-process ChainConfess for the simulated fhEVM network.
//!
//! Confession storage and contract rules live here; encrypted values live in
//! the shared [`MockInstance`], which also enforces input proofs and ACLs.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use async_trait::async_trait;
use fhevm_client::mock::MockInstance;
use fhevm_client::types::{Handle, TypedValue};
use log::debug;

use crate::contract::{Confession, ConfessionContract, LikeOutcome, TxReceipt};
use crate::error::{AppError, Result};

struct StoredConfession {
    confession: Confession,
    likers: Vec<Address>,
    unlocked: bool,
}

#[derive(Default)]
struct Ledger {
    confessions: Vec<StoredConfession>,
    tx_count: u64,
}

struct SimulatedChain {
    mock: Arc<MockInstance>,
    address: Address,
    ledger: Mutex<Ledger>,
}

/// A deployed simulated contract, seen from one account.
///
/// [`as_account`](Self::as_account) returns a view on the same deployment
/// sending from another account.
#[derive(Clone)]
pub struct SimulatedConfessionContract {
    chain: Arc<SimulatedChain>,
    account: Address,
}

fn revert(reason: &str) -> AppError {
    AppError::Contract(format!("execution reverted: {reason}"))
}

impl SimulatedConfessionContract {
    pub fn deploy(mock: Arc<MockInstance>, address: Address, account: Address) -> Self {
        debug!("simulated ChainConfess deployed at {address}");
        Self {
            chain: Arc::new(SimulatedChain {
                mock,
                address,
                ledger: Mutex::new(Ledger::default()),
            }),
            account,
        }
    }

    pub fn as_account(&self, account: Address) -> Self {
        Self {
            chain: self.chain.clone(),
            account,
        }
    }

    pub fn mock(&self) -> &Arc<MockInstance> {
        &self.chain.mock
    }

    /// Whether the recipient has unlocked confession `id`.
    pub fn is_unlocked(&self, id: u64) -> bool {
        let ledger = self.ledger();
        index(&ledger, id).is_ok_and(|i| ledger.confessions[i].unlocked)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.chain
            .ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn receipt(&self, ledger: &mut Ledger) -> TxReceipt {
        ledger.tx_count += 1;
        let mut seed = self.account.to_vec();
        seed.extend_from_slice(&ledger.tx_count.to_be_bytes());
        TxReceipt {
            tx_hash: keccak256(&seed),
            success: true,
        }
    }

    /// Grant the contract and both parties access to a likes handle.
    fn share_likes(&self, handle: Handle, confession: &Confession) -> Result<()> {
        let mock = &self.chain.mock;
        mock.allow(handle, self.chain.address)?;
        mock.allow(handle, confession.sender)?;
        if confession.is_public() {
            mock.allow_for_decryption(handle)?;
        } else {
            mock.allow(handle, confession.recipient)?;
        }
        Ok(())
    }
}

fn index(ledger: &Ledger, id: u64) -> Result<usize> {
    let i = id
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < ledger.confessions.len());
    i.ok_or_else(|| revert("Confession not found"))
}

#[async_trait]
impl ConfessionContract for SimulatedConfessionContract {
    fn address(&self) -> Address {
        self.chain.address
    }

    fn account(&self) -> Address {
        self.account
    }

    fn is_in_process(&self) -> bool {
        true
    }

    async fn post_confession(
        &self,
        message: &[u8],
        recipient: Address,
        is_public: Handle,
        input_proof: &Bytes,
    ) -> Result<TxReceipt> {
        if message.is_empty() {
            return Err(revert("Empty message"));
        }
        let mock = &self.chain.mock;
        match mock.verify_input(is_public, input_proof, self.chain.address, self.account)? {
            TypedValue::Bool(_) => {}
            other => return Err(revert(&format!("expected ebool, got {}-bit value", other.bits()))),
        }
        mock.allow(is_public, self.account)?;

        let likes = mock.trivial_encrypt(TypedValue::U32(0));
        let mut ledger = self.ledger();
        let confession = Confession {
            id: ledger.confessions.len() as u64 + 1,
            sender: self.account,
            message: Bytes::copy_from_slice(message),
            recipient,
            timestamp: mock.now(),
            likes,
        };
        self.share_likes(likes, &confession)?;
        debug!(
            "confession {} posted by {} ({})",
            confession.id,
            self.account,
            if confession.is_public() { "public" } else { "private" }
        );
        ledger.confessions.push(StoredConfession {
            confession,
            likers: Vec::new(),
            unlocked: false,
        });
        Ok(self.receipt(&mut ledger))
    }

    async fn like_confession(&self, id: u64) -> Result<LikeOutcome> {
        let mut ledger = self.ledger();
        let i = index(&ledger, id)?;
        if ledger.confessions[i].likers.contains(&self.account) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        let likes = self.chain.mock.add(ledger.confessions[i].confession.likes, 1)?;
        self.share_likes(likes, &ledger.confessions[i].confession)?;

        let stored = &mut ledger.confessions[i];
        stored.confession.likes = likes;
        stored.likers.push(self.account);
        self.receipt(&mut ledger);
        Ok(LikeOutcome::Liked)
    }

    async fn unlock_confession(&self, id: u64) -> Result<TxReceipt> {
        let mut ledger = self.ledger();
        let i = index(&ledger, id)?;
        let stored = &mut ledger.confessions[i];
        if stored.confession.is_public() || stored.confession.recipient != self.account {
            return Err(revert("Not recipient"));
        }
        stored.unlocked = true;
        Ok(self.receipt(&mut ledger))
    }

    async fn confession(&self, id: u64) -> Result<Confession> {
        let ledger = self.ledger();
        let i = index(&ledger, id)?;
        Ok(ledger.confessions[i].confession.clone())
    }

    async fn public_confessions(&self) -> Result<Vec<u64>> {
        Ok(self
            .ledger()
            .confessions
            .iter()
            .filter(|s| s.confession.is_public())
            .map(|s| s.confession.id)
            .collect())
    }

    async fn my_confessions(&self, user: Address) -> Result<Vec<u64>> {
        Ok(self
            .ledger()
            .confessions
            .iter()
            .filter(|s| s.confession.is_participant(user))
            .map(|s| s.confession.id)
            .collect())
    }

    async fn top_confessions(&self, limit: u64) -> Result<Vec<u64>> {
        let ledger = self.ledger();
        let mut ranked: Vec<(usize, u64)> = ledger
            .confessions
            .iter()
            .filter(|s| s.confession.is_public())
            .map(|s| (s.likers.len(), s.confession.id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(ranked
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|(_, id)| id)
            .collect())
    }
}

/// Deterministic placeholder for the deployment address on simulated chains.
pub fn simulated_address(deployer: Address) -> Address {
    let digest: B256 = keccak256(deployer.as_slice());
    Address::from_slice(&digest[12..])
}
