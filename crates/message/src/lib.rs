//! Signed message protocol
//!
//! Every state-changing request sent to the contest authority is:
//! - re-encoded into a canonical, indentation-exact JSON form
//! - authenticated with HMAC-SHA512 (truncated to 32 bytes) keyed by the API key
//! - signed with the team's Ed25519 key
//! - wrapped by appending a `signature` member to the canonical object

pub mod encode;
pub mod error;
pub mod keypair;
pub mod sign;

pub use encode::{encode, inject_signature};
pub use error::{Error, Result};
pub use keypair::KeyPair;
pub use sign::{MessageSigner, SIGNATURE_SUFFIX};
