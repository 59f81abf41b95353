mod error;
pub mod hash;
pub mod signature;

pub use error::CryptoError;
pub use signature::generate_random_private_key;
