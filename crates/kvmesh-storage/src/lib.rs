pub mod mem;

pub use mem::{PutOutcome, VersionedStore};
