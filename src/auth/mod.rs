pub mod verify;

pub use verify::{FirebaseVerifier, IdentityVerifier, JwksKeyStore, UserId};
