#![no_main]

use bakery::Namespace;
use bakery::checker::infer_declared;
use bakery::condition::{condition, parse_caveat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok((verb, arg)) = parse_caveat(s) {
        assert_eq!(parse_caveat(&condition(verb, arg)).unwrap(), (verb, arg));
    }

    if let Ok(ns) = s.parse::<Namespace>() {
        let reparsed: Namespace = ns.to_string().parse().unwrap();
        assert_eq!(reparsed, ns);
    }

    let _ = infer_declared(&s.lines().collect::<Vec<_>>());
});
