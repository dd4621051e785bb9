//! Ordered list of strategies consulted for every embedded object.
//!
//! Entries are asked in array order and the first one whose acceptor takes the
//! type wins, even if a later entry would also accept it. The chain never
//! checks for a trailing catch-all entry; a type nobody accepts fails with
//! [`MarshalError::NoStrategyAccepted`] when it is met.

use tracing::debug;

use crate::acceptor::ClassFilterAcceptor;
use crate::error::{MarshalError, Result};
use crate::strategy::{ObjectMarshallingStrategy, Strategy};

pub type Fingerprint = [u8; 32];

#[derive(Debug)]
pub struct StrategyChain {
    entries: Vec<Strategy>,
}

impl StrategyChain {
    pub fn new(entries: Vec<Strategy>) -> Self {
        Self { entries }
    }
    /// Index of the first entry accepting `type_name`.
    pub fn resolve(&self, type_name: &str) -> Result<usize> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.accept(type_name))
            .ok_or_else(|| MarshalError::NoStrategyAccepted {
                type_name: type_name.to_owned(),
            })?;
        debug!(type_name, index, "strategy resolved");
        Ok(index)
    }
    pub fn entry(&self, index: usize) -> Result<&Strategy> {
        let len = self.entries.len();
        self.entries
            .get(index)
            .ok_or(MarshalError::UnknownChainEntry { index, len })
    }
    pub fn entry_mut(&mut self, index: usize) -> Result<&mut Strategy> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(MarshalError::UnknownChainEntry { index, len })
    }
    pub fn entries(&self) -> &[Strategy] {
        &self.entries
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Digest of every entry's strategy kind and acceptor patterns, in order.
    /// Identity table contents are not part of it.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.entries.len() as u64).to_be_bytes());
        for entry in &self.entries {
            hasher.update(entry.kind().to_string().as_bytes());
            hasher.update(&[0x1e]);
            for pattern in entry.acceptor().patterns() {
                hasher.update(pattern.as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1d]);
        }
        *hasher.finalize().as_bytes()
    }
}

impl Default for StrategyChain {
    /// A single content strategy accepting everything.
    fn default() -> Self {
        Self::new(vec![Strategy::content(ClassFilterAcceptor::accept_all())])
    }
}
