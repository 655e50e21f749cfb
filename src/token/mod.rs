//! Token pair type and persistent token storage.

pub mod pair;
pub mod store;

pub use pair::TokenPair;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreConfig};
