//! Thread safety implementations for cryptographic types.
//!
//! `MemSafe` holds a raw pointer to its mlocked page, which opts it out of the
//! automatic `Send`/`Sync` impls. `DataKeys` wraps every `MemSafe` in an
//! `RwLock`, never hands out the pointer, and only touches the page while
//! holding the write lock, so sharing it across threads cannot race.

use super::keys::DataKeys;

// SAFETY: every field is an RwLock<MemSafe<_>>; the pointed-to page is valid
// from any thread and mlock/mprotect are thread-safe system calls.
unsafe impl Send for DataKeys {}

// SAFETY: all access to key material goes through RwLock::write(), so no two
// threads ever touch the protected page at the same time.
unsafe impl Sync for DataKeys {}
