mod google;
mod traits;

pub use google::{GoogleProvider, RELAY_SCOPES};
pub use traits::{OAuthProvider, TokenSet};
