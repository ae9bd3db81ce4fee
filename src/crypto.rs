use crate::{BakeryError, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha3::Sha3_256;
use subtle::ConstantTimeEq;

type HmacSha3 = Hmac<Sha3_256>;

/// Size of HMAC-SHA3-256 output in bytes (32 bytes = 256 bits)
pub const SIGNATURE_SIZE: usize = 32;

/// Size of a ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Generates an HMAC-SHA3-256 signature
///
/// # Arguments
/// * `key` - The secret key
/// * `message` - The message to authenticate
///
/// # Returns
/// A 32-byte HMAC signature
pub fn hmac_sha3(key: &[u8], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let mut mac = <HmacSha3 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Binds a new caveat to the signature chain
///
/// This computes: HMAC-SHA3(previous_signature, caveat_id)
pub fn bind_caveat(signature: &[u8], caveat_id: &[u8]) -> [u8; SIGNATURE_SIZE] {
    hmac_sha3(signature, caveat_id)
}

/// Binds a third-party caveat to the signature chain.
///
/// Both the verification id and the caveat id take part, so neither can be
/// swapped out without breaking the chain.
pub fn bind_third_party_caveat(
    signature: &[u8],
    verification_key_id: &[u8],
    caveat_id: &[u8],
) -> [u8; SIGNATURE_SIZE] {
    let inner = hmac_sha3(signature, verification_key_id);
    hmac_sha3(&inner, caveat_id)
}

/// Binds a discharge signature to the primary macaroon's signature
pub fn bind_for_request(
    primary_signature: &[u8],
    discharge_signature: &[u8],
) -> [u8; SIGNATURE_SIZE] {
    hmac_sha3(discharge_signature, primary_signature)
}

/// Compares two signatures in constant time
pub fn signatures_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Fills a fresh buffer with `n` bytes from the operating system's CSPRNG.
///
/// Fails instead of falling back to a weaker source.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    getrandom::getrandom(&mut buf).map_err(|e| {
        BakeryError::RandomSource(format!("cannot generate {n} random bytes: {e}"))
    })?;
    Ok(buf)
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext`
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = random_bytes(NONCE_SIZE)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| BakeryError::CryptoError(format!("Encryption failed: {e}")))?;

    let mut sealed = nonce;
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts data produced by [`seal`]
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(BakeryError::CryptoError("Ciphertext too short".to_string()));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| BakeryError::CryptoError(format!("Decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha3_deterministic() {
        let key = b"secret key";
        let message = b"hello world";

        let sig1 = hmac_sha3(key, message);
        let sig2 = hmac_sha3(key, message);

        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), SIGNATURE_SIZE);
    }

    #[test]
    fn test_hmac_sha3_different_keys() {
        let sig1 = hmac_sha3(b"key1", b"hello world");
        let sig2 = hmac_sha3(b"key2", b"hello world");

        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_bind_caveat_chaining() {
        let sig1 = hmac_sha3(b"root secret", b"my macaroon");
        let sig2 = bind_caveat(&sig1, b"declared user alice");
        let sig3 = bind_caveat(&sig2, b"time-before 2030-01-01T00:00:00Z");

        assert_ne!(sig1, sig2);
        assert_ne!(sig2, sig3);

        let reconstructed = bind_caveat(
            &bind_caveat(&sig1, b"declared user alice"),
            b"time-before 2030-01-01T00:00:00Z",
        );
        assert_eq!(sig3, reconstructed);
    }

    #[test]
    fn test_third_party_binding_covers_both_ids() {
        let sig = hmac_sha3(b"root", b"id");

        let a = bind_third_party_caveat(&sig, b"vid", b"cav-1");
        let b = bind_third_party_caveat(&sig, b"vid", b"cav-2");
        let c = bind_third_party_caveat(&sig, b"other-vid", b"cav-1");

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_signatures_equal() {
        let sig = hmac_sha3(b"k", b"m");
        assert!(signatures_equal(&sig, &sig));
        assert!(!signatures_equal(&sig, &hmac_sha3(b"k", b"n")));
        assert!(!signatures_equal(&sig, &sig[..16]));
    }

    #[test]
    fn test_random_bytes_length_and_freshness() {
        let a = random_bytes(24).unwrap();
        let b = random_bytes(24).unwrap();

        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seal_open() {
        for _ in 0..16 {
            let key: [u8; 32] = rand::random();
            let plaintext: [u8; 24] = rand::random();
            let sealed = seal(&key, &plaintext).unwrap();

            assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + 16);
            assert_eq!(open(&key, &sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let key = hmac_sha3(b"sealing", b"key");
        let other = hmac_sha3(b"sealing", b"other");
        let sealed = seal(&key, b"secret").unwrap();

        assert!(matches!(
            open(&other, &sealed),
            Err(BakeryError::CryptoError(_))
        ));
    }

    #[test]
    fn test_open_too_short() {
        let key = [7u8; 32];
        assert!(open(&key, &[1, 2, 3]).is_err());
    }
}
