//! Encrypted input batches.
//!
//! A batch is an open, append-only list of typed plaintexts scoped to one
//! `(contract, submitter)` pair. [`EncryptedInput::seal`] consumes it and
//! produces a [`SealedInput`], so a sealed batch can neither grow nor be
//! sealed again:
//!
//! ```compile_fail
//! use fhevm_client::input::EncryptedInput;
//!
//! async fn submit(mut input: EncryptedInput) {
//!     input.add_bool(true);
//!     let _sealed = input.seal().await;
//!     input.add_bool(false);
//! }
//! ```
//!
//! ```compile_fail
//! use fhevm_client::input::EncryptedInput;
//!
//! async fn submit(input: EncryptedInput) {
//!     let _first = input.seal().await;
//!     let _second = input.seal().await;
//! }
//! ```

use std::sync::Arc;

use alloy_primitives::Address;
use log::debug;

use crate::error::{FhevmError, Result};
use crate::instance::FhevmInstance;
use crate::types::{SealedInput, TypedValue};

pub struct EncryptedInput {
    instance: Arc<dyn FhevmInstance>,
    contract: Address,
    user: Address,
    values: Vec<TypedValue>,
}

impl EncryptedInput {
    pub fn new(instance: Arc<dyn FhevmInstance>, contract: Address, user: Address) -> Self {
        Self {
            instance,
            contract,
            user,
            values: Vec::new(),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn user(&self) -> Address {
        self.user
    }

    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.values.push(TypedValue::Bool(value));
        self
    }

    pub fn add8(&mut self, value: impl Into<u128>) -> Result<&mut Self> {
        let value = value.into();
        let v = u8::try_from(value).map_err(|_| FhevmError::TypeRange { bits: 8, value })?;
        self.values.push(TypedValue::U8(v));
        Ok(self)
    }

    pub fn add16(&mut self, value: impl Into<u128>) -> Result<&mut Self> {
        let value = value.into();
        let v = u16::try_from(value).map_err(|_| FhevmError::TypeRange { bits: 16, value })?;
        self.values.push(TypedValue::U16(v));
        Ok(self)
    }

    pub fn add32(&mut self, value: impl Into<u128>) -> Result<&mut Self> {
        let value = value.into();
        let v = u32::try_from(value).map_err(|_| FhevmError::TypeRange { bits: 32, value })?;
        self.values.push(TypedValue::U32(v));
        Ok(self)
    }

    pub fn add64(&mut self, value: impl Into<u128>) -> Result<&mut Self> {
        let value = value.into();
        let v = u64::try_from(value).map_err(|_| FhevmError::TypeRange { bits: 64, value })?;
        self.values.push(TypedValue::U64(v));
        Ok(self)
    }

    /// Encrypt the accumulated values and obtain handles plus a validity proof.
    ///
    /// On failure the batch is gone; start a new one.
    pub async fn seal(self) -> Result<SealedInput> {
        if self.values.is_empty() {
            return Err(FhevmError::Encryption("cannot seal an empty batch".into()));
        }
        debug!(
            "sealing {} value(s) for contract {} / user {}",
            self.values.len(),
            self.contract,
            self.user
        );
        let sealed = self
            .instance
            .encrypt(self.contract, self.user, &self.values)
            .await
            .map_err(FhevmError::into_encryption)?;

        if sealed.handles.len() != self.values.len() {
            return Err(FhevmError::Encryption(format!(
                "backend returned {} handle(s) for {} value(s)",
                sealed.handles.len(),
                self.values.len()
            )));
        }
        Ok(sealed)
    }
}
