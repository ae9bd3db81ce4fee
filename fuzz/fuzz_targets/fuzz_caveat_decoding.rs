#![no_main]

use bakery::codec::decode_caveat;
use bakery::keys::{KeyPair, PrivateKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = KeyPair::from_private_key(PrivateKey::from_bytes([7u8; 32]));

    // Arbitrary bytes must be rejected cleanly, never panic
    let _ = decode_caveat(&key, data);

    // Same again with the header of a caveat addressed to this key
    let mut caveat = vec![3u8];
    caveat.extend_from_slice(&key.public_key().as_bytes()[..4]);
    caveat.extend_from_slice(data);
    let _ = decode_caveat(&key, &caveat);
});
