#![no_main]

use bakery::location::{decode_local_location, encode_local_location};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(location) = std::str::from_utf8(data) else {
        return;
    };

    // Anything that decodes must survive re-encoding; versions before 2
    // are not written out.
    if let Some(info) = decode_local_location(location) {
        let encoded = encode_local_location(&info.public_key, info.version);
        let decoded = decode_local_location(&encoded).unwrap();
        assert_eq!(decoded.public_key, info.public_key);
        if info.version.0 >= 2 {
            assert_eq!(decoded.version, info.version);
        }
    }

    let _ = decode_local_location(&format!("local {location}"));
});
