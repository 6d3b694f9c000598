//! File-level operations: path confinement, atomic replacement and
//! authenticated record encryption.

pub mod atomic;
pub mod path;
pub mod record;

pub use atomic::write_atomic;
pub use path::confine;
pub use record::{RecordContext, RecordCryptor, RecordError};
