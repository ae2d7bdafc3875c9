// LNP/BP Core Library implementing LNPBP specifications & standards
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Encryption for the opaque channel-state backup handed to the peer under
//! the peer-storage feature. The peer cannot decrypt it; it only stores and
//! returns the blob on reconnect.
//!
//! Key: `SHA256("ln-channel-backup" || node_privkey)`. Nonce: the local
//! commitment index this blob was produced at, encoded as 12 little-endian
//! bytes (8 bytes of index, 4 zero bytes). The index strictly increases
//! within a channel's lifetime, so the nonce is never reused for a given key.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use secp256k1::SecretKey;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum BackupError {
    /// backup blob is too short to contain a valid authentication tag
    TooShort,

    /// backup decryption failed: either the key or the blob was wrong
    AuthenticationFailed,
}

fn derive_key(node_privkey: SecretKey) -> Key {
    let mut engine = sha256::Hash::engine();
    engine.input(b"ln-channel-backup");
    engine.input(&node_privkey.secret_bytes());
    let hash = sha256::Hash::from_engine(engine);
    *Key::from_slice(hash.as_inner())
}

fn derive_nonce(local_commit_index: u64) -> Nonce {
    let mut buf = [0u8; 12];
    buf[..8].copy_from_slice(&local_commit_index.to_le_bytes());
    *Nonce::from_slice(&buf)
}

/// Encrypts `plaintext` (the strict-encoded [`super::ChannelState`]) for
/// storage at the peer, keyed by our node's private key and bound to the
/// local commitment index at the time of encryption.
pub fn encrypt_backup(
    node_privkey: SecretKey,
    local_commit_index: u64,
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(&derive_key(node_privkey));
    let nonce = derive_nonce(local_commit_index);
    cipher
        .encrypt(&nonce, plaintext)
        .expect("chacha20poly1305 encryption of a bounded plaintext can't fail")
}

/// Reverses [`encrypt_backup`]. `local_commit_index` must be the value the
/// blob was encrypted under, which the caller learns from the peer's
/// `channel_reestablish.next_revocation_number` before attempting decryption.
pub fn decrypt_backup(
    node_privkey: SecretKey,
    local_commit_index: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, BackupError> {
    if ciphertext.len() < 16 {
        return Err(BackupError::TooShort);
    }
    let cipher = ChaCha20Poly1305::new(&derive_key(node_privkey));
    let nonce = derive_nonce(local_commit_index);
    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| BackupError::AuthenticationFailed)
}

#[cfg(test)]
mod test {
    use super::*;

    fn node_key() -> SecretKey {
        SecretKey::from_slice(&[0x11u8; 32]).unwrap()
    }

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let plaintext = b"pretend this is a strict-encoded channel state";
        let ciphertext = encrypt_backup(node_key(), 42, plaintext);
        let recovered = decrypt_backup(node_key(), 42, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rejects_wrong_commitment_index() {
        let plaintext = b"state at index 5";
        let ciphertext = encrypt_backup(node_key(), 5, plaintext);
        let err = decrypt_backup(node_key(), 6, &ciphertext).unwrap_err();
        assert_eq!(err, BackupError::AuthenticationFailed);
    }

    #[test]
    fn rejects_truncated_blob() {
        let err = decrypt_backup(node_key(), 0, &[0u8; 4]).unwrap_err();
        assert_eq!(err, BackupError::TooShort);
    }
}
