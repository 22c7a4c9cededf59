//! Fuzz target for `Signature-Input` and `Signature` header parsing
//!
//! Feeds arbitrary text to both header parsers. Anything that parses must
//! serialize back to a header that parses to the same metadata.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veilpost_core::signature::{
    DEFAULT_LABEL, parse_signature_header, parse_signature_input,
};

fuzz_target!(|data: &str| {
    let _ = parse_signature_header(data);

    if let Ok(metadata) = parse_signature_input(data) {
        let header = metadata.to_header(DEFAULT_LABEL);
        let reparsed = parse_signature_input(&header)
            .unwrap_or_else(|err| panic!("serialized header {header:?} failed to parse: {err}"));
        assert_eq!(reparsed, metadata);
    }
});
