//! Bindings to the ChainConfess contract.
//!
//! [`ConfessionContract`] is the seam between session flows and the chain:
//! [`RpcConfessionContract`] talks JSON-RPC to a node, while
//! `SimulatedConfessionContract` runs the same rules in process.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use fhevm_client::network::NetworkReader;
use fhevm_client::types::Handle;
use log::{debug, info};
use serde_json::{json, Value};

use crate::error::{AppError, Result};

sol! {
    interface IChainConfess {
        function postConfession(bytes message, address recipient, bytes32 isPublic, bytes inputProof) external returns (uint256);
        function likeConfession(uint256 id) external;
        function unlockConfession(uint256 id) external;
        function getConfession(uint256 id) external view returns (uint256 confessionId, address sender, bytes message, address recipient, uint256 timestamp, bytes32 likes);
        function getAllPublicConfessions() external view returns (uint256[] memory);
        function getMyConfessions(address user) external view returns (uint256[] memory);
        function getTopConfessions(uint256 limit) external view returns (uint256[] memory);
    }
}

/// Revert reason the contract uses for a repeated like.
pub const ALREADY_LIKED: &str = "Already liked";

const UNREADABLE_MESSAGE: &str = "[unreadable message]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confession {
    pub id: u64,
    pub sender: Address,
    pub message: Bytes,
    /// Zero address for public confessions.
    pub recipient: Address,
    pub timestamp: u64,
    /// Encrypted like counter.
    pub likes: Handle,
}

impl Confession {
    pub fn is_public(&self) -> bool {
        self.recipient == Address::ZERO
    }

    pub fn is_participant(&self, account: Address) -> bool {
        self.sender == account || (!self.is_public() && self.recipient == account)
    }

    /// The message as text; undecodable bytes yield a placeholder.
    pub fn message_text(&self) -> String {
        match std::str::from_utf8(&self.message) {
            Ok(text) => text.to_owned(),
            Err(_) => UNREADABLE_MESSAGE.to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
}

/// Calls a session account can make against a deployed ChainConfess.
#[async_trait]
pub trait ConfessionContract: Send + Sync {
    fn address(&self) -> Address;

    /// Account transactions are sent from.
    fn account(&self) -> Address;

    /// Whether the contract state lives in this process.
    fn is_in_process(&self) -> bool {
        false
    }

    async fn post_confession(
        &self,
        message: &[u8],
        recipient: Address,
        is_public: Handle,
        input_proof: &Bytes,
    ) -> Result<TxReceipt>;

    async fn like_confession(&self, id: u64) -> Result<LikeOutcome>;

    async fn unlock_confession(&self, id: u64) -> Result<TxReceipt>;

    async fn confession(&self, id: u64) -> Result<Confession>;

    async fn public_confessions(&self) -> Result<Vec<u64>>;

    async fn my_confessions(&self, user: Address) -> Result<Vec<u64>>;

    async fn top_confessions(&self, limit: u64) -> Result<Vec<u64>>;
}

pub(crate) fn to_u64(value: U256, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| AppError::Contract(format!("{what} out of range: {value}")))
}

fn ids(values: Vec<U256>) -> Result<Vec<u64>> {
    values.into_iter().map(|v| to_u64(v, "confession id")).collect()
}

/// JSON-RPC binding.
///
/// Writes go through `eth_sendTransaction`, so `account` must be managed by
/// the node (the default for Hardhat and Anvil accounts).
pub struct RpcConfessionContract {
    reader: Arc<dyn NetworkReader>,
    address: Address,
    account: Address,
    poll_interval: Duration,
    max_polls: u32,
}

impl RpcConfessionContract {
    pub fn new(reader: Arc<dyn NetworkReader>, address: Address, account: Address) -> Self {
        Self {
            reader,
            address,
            account,
            poll_interval: Duration::from_millis(500),
            max_polls: 120,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn call<C: SolCall>(&self, call: C) -> Result<C::Return> {
        let params = json!([
            { "to": self.address, "data": Bytes::from(call.abi_encode()) },
            "latest"
        ]);
        let raw = self.reader.request("eth_call", params).await?;
        let data: Bytes = serde_json::from_value(raw)
            .map_err(|e| AppError::Contract(format!("eth_call returned non-bytes: {e}")))?;
        C::abi_decode_returns(&data)
            .map_err(|e| AppError::Contract(format!("cannot decode {}: {e}", C::SIGNATURE)))
    }

    async fn send<C: SolCall>(&self, call: C) -> Result<TxReceipt> {
        let params = json!([{
            "from": self.account,
            "to": self.address,
            "data": Bytes::from(call.abi_encode()),
        }]);
        let raw = self.reader.request("eth_sendTransaction", params).await?;
        let tx_hash: B256 = serde_json::from_value(raw)
            .map_err(|e| AppError::Contract(format!("bad transaction hash: {e}")))?;
        debug!("{} sent as {tx_hash}", C::SIGNATURE);
        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        for _ in 0..self.max_polls {
            let receipt = self
                .reader
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(status) = receipt.get("status") {
                let success = status.as_str() == Some("0x1");
                if !success {
                    return Err(AppError::Contract(format!(
                        "transaction {tx_hash} reverted"
                    )));
                }
                info!("transaction {tx_hash} confirmed");
                return Ok(TxReceipt { tx_hash, success });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(AppError::Contract(format!(
            "no receipt for {tx_hash} after {} polls",
            self.max_polls
        )))
    }
}

fn is_already_liked(err: &AppError) -> bool {
    err.to_string().contains(ALREADY_LIKED)
}

#[async_trait]
impl ConfessionContract for RpcConfessionContract {
    fn address(&self) -> Address {
        self.address
    }

    fn account(&self) -> Address {
        self.account
    }

    async fn post_confession(
        &self,
        message: &[u8],
        recipient: Address,
        is_public: Handle,
        input_proof: &Bytes,
    ) -> Result<TxReceipt> {
        self.send(IChainConfess::postConfessionCall {
            message: Bytes::copy_from_slice(message),
            recipient,
            isPublic: is_public,
            inputProof: input_proof.clone(),
        })
        .await
    }

    async fn like_confession(&self, id: u64) -> Result<LikeOutcome> {
        match self
            .send(IChainConfess::likeConfessionCall { id: U256::from(id) })
            .await
        {
            Ok(_) => Ok(LikeOutcome::Liked),
            Err(e) if is_already_liked(&e) => Ok(LikeOutcome::AlreadyLiked),
            Err(e) => Err(e),
        }
    }

    async fn unlock_confession(&self, id: u64) -> Result<TxReceipt> {
        self.send(IChainConfess::unlockConfessionCall { id: U256::from(id) })
            .await
    }

    async fn confession(&self, id: u64) -> Result<Confession> {
        let r = self
            .call(IChainConfess::getConfessionCall { id: U256::from(id) })
            .await?;
        Ok(Confession {
            id: to_u64(r.confessionId, "confession id")?,
            sender: r.sender,
            message: r.message,
            recipient: r.recipient,
            timestamp: to_u64(r.timestamp, "timestamp")?,
            likes: r.likes,
        })
    }

    async fn public_confessions(&self) -> Result<Vec<u64>> {
        ids(self
            .call(IChainConfess::getAllPublicConfessionsCall {})
            .await?)
    }

    async fn my_confessions(&self, user: Address) -> Result<Vec<u64>> {
        ids(self
            .call(IChainConfess::getMyConfessionsCall { user })
            .await?)
    }

    async fn top_confessions(&self, limit: u64) -> Result<Vec<u64>> {
        ids(self
            .call(IChainConfess::getTopConfessionsCall {
                limit: U256::from(limit),
            })
            .await?)
    }
}
