//! Fuzz target for signed token verification
//!
//! Arbitrary text must never panic and never verify under a key it was not
//! signed with.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use recordvault_core::session::TokenCodec;

#[derive(Arbitrary, Debug)]
enum FuzzInput {
    /// Verify arbitrary text as a token
    Raw(String),
    /// Issue a token, splice arbitrary text into it, then verify
    Splice { payload: String, position: usize, insert: String },
}

fuzz_target!(|input: FuzzInput| {
    let codec = TokenCodec::new(b"fuzzing signing key").expect("non-empty key");

    match input {
        FuzzInput::Raw(token) => {
            assert!(codec.verify::<serde_json::Value>(&token).is_err());
            let _ = TokenCodec::decode_unverified(&token);
        }

        FuzzInput::Splice { payload, position, insert } => {
            let token = codec.issue(&payload).expect("issue");
            assert_eq!(codec.verify::<String>(&token).expect("verify"), payload);

            let signed_from = token.find('.').map_or(0, |i| i + 1);
            let mut index = signed_from + position % (token.len() - signed_from + 1);
            while !token.is_char_boundary(index) {
                index -= 1;
            }
            let mut altered = token.clone();
            altered.insert_str(index, &insert);
            if altered != token {
                assert!(codec.verify::<serde_json::Value>(&altered).is_err());
            }
        }
    }
});
