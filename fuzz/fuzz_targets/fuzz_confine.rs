//! Fuzz target for relative path confinement
//!
//! No input string may resolve outside the root.

#![no_main]

use std::path::{Component, Path};

use libfuzzer_sys::fuzz_target;
use recordvault_core::confine;

fuzz_target!(|user_path: &str| {
    let root = Path::new("/srv/records/alice/data");
    let confined = confine(root, user_path);

    let rest = confined.strip_prefix(root).expect("escaped the root");
    assert!(rest.components().all(|c| matches!(c, Component::Normal(_))));
});
