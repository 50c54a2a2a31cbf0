//! User-facing confession flows for one connected account.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use fhevm_client::authorization::{authorize, decrypt, decrypt_public};
use fhevm_client::eip712::TypedDataSigner;
use fhevm_client::instance::{FhevmInstance, FhevmInstanceExt};
use fhevm_client::types::{ClearValue, HandleContractPair};
use log::{debug, info};

use crate::contract::{Confession, ConfessionContract, LikeOutcome, TxReceipt};
use crate::error::{AppError, Result};

pub const MAX_MESSAGE_CHARS: usize = 200;

/// Validity of the grant requested when decrypting private like counts.
pub const DECRYPT_GRANT_DAYS: u64 = 365;

pub const DEFAULT_TOP_LIMIT: u64 = 10;

const AVATAR_PALETTE: [&str; 5] = [
    "linear-gradient(135deg, #667eea 0%, #764ba2 100%)",
    "linear-gradient(135deg, #f093fb 0%, #f5576c 100%)",
    "linear-gradient(135deg, #4facfe 0%, #00f2fe 100%)",
    "linear-gradient(135deg, #43e97b 0%, #38f9d7 100%)",
    "linear-gradient(135deg, #fa709a 0%, #fee140 100%)",
];

/// Anonymous avatar derived from the first byte of the sender address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    pub palette_index: usize,
    pub initial: String,
}

impl Avatar {
    pub fn for_address(address: Address) -> Self {
        let first = address[0];
        Self {
            palette_index: first as usize % AVATAR_PALETTE.len(),
            initial: format!("{first:02X}"),
        }
    }

    pub fn background(&self) -> &'static str {
        AVATAR_PALETTE[self.palette_index]
    }
}

pub struct ConfessSession {
    instance: Arc<dyn FhevmInstance>,
    contract: Arc<dyn ConfessionContract>,
    signer: Arc<dyn TypedDataSigner>,
    unlocked: Mutex<HashSet<u64>>,
}

impl ConfessSession {
    pub fn new(
        instance: Arc<dyn FhevmInstance>,
        contract: Arc<dyn ConfessionContract>,
        signer: Arc<dyn TypedDataSigner>,
    ) -> Self {
        Self {
            instance,
            contract,
            signer,
            unlocked: Mutex::new(HashSet::new()),
        }
    }

    pub fn user(&self) -> Address {
        self.signer.address()
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    /// Ciphertexts of an in-process backend are unknown to an on-chain
    /// contract and the other way round.
    fn require_shared_state(&self, operation: &'static str) -> Result<()> {
        if self.instance.is_in_process() && !self.contract.is_in_process() {
            return Err(AppError::DetachedBackend(operation));
        }
        Ok(())
    }

    /// Post a confession.
    ///
    /// Public confessions always go to the zero address. A private one goes
    /// to `recipient` when it is a full 42-character address, otherwise to
    /// the zero address as well.
    pub async fn post(
        &self,
        message: &str,
        is_public: bool,
        recipient: Option<&str>,
    ) -> Result<TxReceipt> {
        let chars = message.chars().count();
        if chars == 0 || chars > MAX_MESSAGE_CHARS {
            return Err(AppError::InvalidMessage(format!(
                "message must be 1..={MAX_MESSAGE_CHARS} characters, got {chars}"
            )));
        }
        let recipient = if is_public {
            Address::ZERO
        } else {
            parse_recipient(recipient)?
        };
        self.require_shared_state("posting")?;

        let mut input = self
            .instance
            .create_encrypted_input(self.contract.address(), self.user());
        input.add_bool(is_public);
        let sealed = input.seal().await?;

        let receipt = self
            .contract
            .post_confession(
                message.as_bytes(),
                recipient,
                sealed.handles[0],
                &sealed.input_proof,
            )
            .await?;
        info!("confession posted in {}", receipt.tx_hash);
        Ok(receipt)
    }

    pub async fn like(&self, id: u64) -> Result<LikeOutcome> {
        let outcome = self.contract.like_confession(id).await?;
        debug!("like on {id}: {outcome:?}");
        Ok(outcome)
    }

    /// Reveal a private confession's message to its recipient.
    pub async fn unlock(&self, id: u64) -> Result<TxReceipt> {
        let confession = self.contract.confession(id).await?;
        if confession.is_public() || confession.recipient != self.user() {
            return Err(AppError::NotAuthorized(format!(
                "only the recipient can unlock confession {id}"
            )));
        }
        let receipt = self.contract.unlock_confession(id).await?;
        self.unlocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id);
        Ok(receipt)
    }

    /// Decrypt the like counter of confession `id`.
    ///
    /// Public confessions use public decryption. Private ones need a signed
    /// grant and are only available to the sender and the recipient.
    pub async fn likes(&self, id: u64) -> Result<u64> {
        self.require_shared_state("decrypting likes")?;
        let confession = self.contract.confession(id).await?;
        let contract = self.contract.address();

        let clear = if confession.is_public() {
            decrypt_public(self.instance.as_ref(), contract, confession.likes).await?
        } else {
            let user = self.user();
            if !confession.is_participant(user) {
                return Err(AppError::NotAuthorized(format!(
                    "{user} is neither sender nor recipient of confession {id}"
                )));
            }
            let grant = authorize(
                self.instance.as_ref(),
                self.signer.as_ref(),
                &[contract],
                DECRYPT_GRANT_DAYS,
            )
            .await?;
            let pairs = [HandleContractPair::new(confession.likes, contract)];
            let mut clear = decrypt(self.instance.as_ref(), &grant, &pairs, user).await?;
            clear.remove(&confession.likes).ok_or_else(|| {
                AppError::Contract(format!("no value returned for {}", confession.likes))
            })?
        };
        like_count(&clear)
    }

    pub async fn confession(&self, id: u64) -> Result<Confession> {
        self.contract.confession(id).await
    }

    async fn load(&self, ids: Vec<u64>) -> Result<Vec<Confession>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.contract.confession(id).await?);
        }
        Ok(out)
    }

    pub async fn public_feed(&self) -> Result<Vec<Confession>> {
        let ids = self.contract.public_confessions().await?;
        self.load(ids).await
    }

    /// Confessions the user sent or received.
    pub async fn my_feed(&self) -> Result<Vec<Confession>> {
        let ids = self.contract.my_confessions(self.user()).await?;
        self.load(ids).await
    }

    pub async fn top_feed(&self, limit: Option<u64>) -> Result<Vec<Confession>> {
        let ids = self
            .contract
            .top_confessions(limit.unwrap_or(DEFAULT_TOP_LIMIT))
            .await?;
        self.load(ids).await
    }

    /// Public messages are visible to everyone; private ones only to the
    /// recipient after unlocking in this session.
    pub fn can_view_message(&self, confession: &Confession) -> bool {
        confession.is_public()
            || (confession.recipient == self.user()
                && self
                    .unlocked
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .contains(&confession.id))
    }

    pub fn message_text(&self, confession: &Confession) -> Option<String> {
        self.can_view_message(confession)
            .then(|| confession.message_text())
    }

    pub fn avatar(&self, confession: &Confession) -> Avatar {
        Avatar::for_address(confession.sender)
    }
}

fn parse_recipient(recipient: Option<&str>) -> Result<Address> {
    match recipient.map(str::trim) {
        Some(raw) if raw.len() == 42 => Address::from_str(raw)
            .map_err(|e| AppError::InvalidMessage(format!("invalid recipient {raw}: {e}"))),
        _ => Ok(Address::ZERO),
    }
}

fn like_count(value: &ClearValue) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| AppError::Contract(format!("unexpected like counter value {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};

    #[test]
    fn avatar_from_first_byte() {
        let a = Avatar::for_address(address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert_eq!(a.initial, "F3");
        assert_eq!(a.palette_index, 0xf3 % 5);
        assert!(a.background().starts_with("linear-gradient"));
    }

    #[test]
    fn recipient_parsing() {
        assert_eq!(parse_recipient(None).unwrap(), Address::ZERO);
        assert_eq!(parse_recipient(Some("0x12")).unwrap(), Address::ZERO);
        assert_eq!(
            parse_recipient(Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")).unwrap(),
            address!("70997970C51812dc3A010C7d01b50e0d17dc79C8")
        );
        assert!(parse_recipient(Some("0xZZ997970C51812dc3A010C7d01b50e0d17dc79C8")).is_err());
    }

    #[test]
    fn like_counts_must_be_integers() {
        assert_eq!(like_count(&ClearValue::Uint(U256::from(3u64))).unwrap(), 3);
        assert!(like_count(&ClearValue::Bool(true)).is_err());
    }
}
