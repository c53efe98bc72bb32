//! Per-peer stream cipher registry
//!
//! Maps a peer address string to a stateful stream cipher. The receive path
//! consults it for every chunk and decrypts in place when an entry exists.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tracing::debug;

/// A stateful stream cipher
///
/// Implementations keep their keystream position between calls, so chunks
/// must be fed in arrival order.
pub trait StreamCipher: Send + Sync {
    /// Decrypt `data` in place
    fn decrypt(&mut self, data: &mut [u8]);
}

/// Cipher lookup keyed by peer address
#[derive(Default)]
pub struct CipherRegistry {
    ciphers: DashMap<String, Box<dyn StreamCipher>>,
}

impl CipherRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the cipher for a peer
    pub fn register(&self, peer: impl Into<String>, cipher: Box<dyn StreamCipher>) {
        let peer = peer.into();
        debug!(%peer, "Cipher registered");
        self.ciphers.insert(peer, cipher);
    }

    /// Remove the cipher for a peer, returning it if present
    pub fn remove(&self, peer: &str) -> Option<Box<dyn StreamCipher>> {
        self.ciphers.remove(peer).map(|(_, cipher)| cipher)
    }

    /// Check whether a peer has a cipher
    pub fn contains(&self, peer: &str) -> bool {
        self.ciphers.contains_key(peer)
    }

    /// Borrow the cipher for a peer
    ///
    /// The entry stays locked while the returned guard is alive.
    pub fn lookup(&self, peer: &str) -> Option<RefMut<'_, String, Box<dyn StreamCipher>>> {
        self.ciphers.get_mut(peer)
    }

    /// Decrypt `data` in place if `peer` has a cipher
    /// Returns whether a cipher was applied
    pub fn decrypt(&self, peer: &str, data: &mut [u8]) -> bool {
        match self.lookup(peer) {
            Some(mut cipher) => {
                cipher.decrypt(data);
                true
            }
            None => false,
        }
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.ciphers.len()
    }

    /// Check if no cipher is registered
    pub fn is_empty(&self) -> bool {
        self.ciphers.is_empty()
    }
}
