//! # fhevm-client: Client Protocol for Confidential Contracts
//!
//! Everything an application needs to talk to fhEVM contracts: a session
//! instance bound to one chain, encrypted input batches with validity
//! proofs, and signed decryption grants for reading encrypted state back.
//!
//! Local development chains (network id 31337 or a loopback endpoint) are
//! served by an in-process simulated backend; everything else goes through
//! the relayer SDK, which is fetched once per process.
//!
//! ## Quick Start
//!
//! ```ignore
//! let factory = Arc::new(InstanceFactory::new(SdkLoader::global()));
//! let lifecycle = InstanceLifecycle::new(factory);
//! lifecycle.set_context(NetworkContext::from_url("http://localhost:8545", Some(31337)));
//! let instance = lifecycle.wait_settled().await.instance.unwrap();
//!
//! let mut input = instance.create_encrypted_input(contract, user);
//! input.add_bool(true);
//! let sealed = input.seal().await?;
//!
//! let grant = authorize(instance.as_ref(), &wallet, &[contract], 365).await?;
//! let clear = decrypt(instance.as_ref(), &grant, &pairs, user).await?;
//! ```

pub mod authorization;
pub mod config;
pub mod eip712;
pub mod error;
pub mod factory;
mod http;
pub mod input;
pub mod instance;
pub mod keys;
pub mod lifecycle;
pub mod loader;
pub mod mock;
pub mod network;
pub mod relayer;
pub mod types;

pub mod prelude {
    pub use crate::authorization::{authorize, decrypt, decrypt_public, DecryptionGrant};
    pub use crate::config::{MockChainConfig, NetworkConfig, DEV_CHAIN_ID};
    pub use crate::eip712::{Eip712Payload, TypedDataSigner};
    pub use crate::error::{FhevmError, Result};
    pub use crate::factory::InstanceFactory;
    pub use crate::input::EncryptedInput;
    pub use crate::instance::{FhevmInstance, FhevmInstanceExt};
    pub use crate::lifecycle::{
        InstanceCreator, InstanceLifecycle, LifecycleSnapshot, LifecycleStatus,
    };
    pub use crate::loader::SdkLoader;
    pub use crate::network::{Connectivity, NetworkContext, NetworkReader};
    pub use crate::types::{ClearValue, Handle, HandleContractPair, SealedInput, TypedValue};
}
