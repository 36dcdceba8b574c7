//! Wallet signature verification.
//!
//! The login flow only needs a yes/no answer to "did the owner of `address`
//! sign `message`", so the engine depends on the [`SignatureVerifier`] trait.
//! [`EthSignatureVerifier`] answers it for Ethereum `personal_sign`
//! signatures: keccak256 over the EIP-191 prefixed message, secp256k1 public
//! key recovery, address = last 20 bytes of keccak256(pubkey).

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

/// Opaque verifier consumed by the account service
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &str, signature: &str, address: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EthSignatureVerifier;

impl SignatureVerifier for EthSignatureVerifier {
    fn verify(&self, message: &str, signature: &str, address: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(strip_0x(signature.trim())) else {
            return false;
        };
        let Some(recovered) = recover_address(&personal_message_hash(message), &sig_bytes) else {
            return false;
        };
        hex::encode(recovered).eq_ignore_ascii_case(strip_0x(address.trim()))
    }
}

/// keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Recover the signer address from a 65-byte `r || s || v` signature.
/// `v` may be 0/1 or the legacy 27/28.
pub fn recover_address(prehash: &[u8; 32], signature: &[u8]) -> Option<[u8; 20]> {
    if signature.len() != 65 {
        return None;
    }
    let v = match signature[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(v)?;
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id).ok()?;
    Some(address_of(&key))
}

pub fn address_of(key: &VerifyingKey) -> [u8; 20] {
    // uncompressed point: 0x04 || x || y
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Sign like a wallet would (for testing). Returns (address, signature) as
/// 0x-prefixed hex with `v` in 27/28 form.
#[cfg(test)]
pub fn wallet_sign(seed: u8, message: &str) -> (String, String) {
    use k256::ecdsa::SigningKey;

    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    let (sig, recid) = key
        .sign_prehash_recoverable(&personal_message_hash(message))
        .unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(recid.to_byte() + 27);

    let address = format!("0x{}", hex::encode(address_of(key.verifying_key())));
    (address, format!("0x{}", hex::encode(bytes)))
}
