#![no_main]

use bakery::raw::RawMacaroon;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 10 {
        return;
    }

    let (root_key, rest) = data.split_at(data.len() / 2);
    let mut m = RawMacaroon::new(root_key, rest, None::<String>);
    for chunk in rest.chunks(8) {
        m.add_first_party_caveat(String::from_utf8_lossy(chunk).into_owned());
    }
    assert!(m.verify_signature(root_key, &[]).is_ok());

    // A third-party caveat with its discharge, bound and unbound
    if m.add_third_party_caveat(root_key, rest, "https://auth.example.com").is_err() {
        return;
    }
    let discharge = RawMacaroon::new(root_key, rest, None::<String>);
    assert!(m.verify_signature(root_key, &[discharge.clone()]).is_err());
    let ms = m.prepare_for_request(vec![discharge]);
    assert!(ms[0].verify_signature(root_key, &ms[1..]).is_ok());

    // Arbitrary discharges must never panic
    if let Ok(forged) = RawMacaroon::from_msgpack(data) {
        let _ = m.verify_signature(root_key, &[forged]);
    }

    let mut tampered = m.clone();
    tampered.signature[0] ^= 0xff;
    assert!(tampered.verify_signature(root_key, &[]).is_err());
});
