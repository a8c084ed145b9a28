//! Credential verification: token codec, secret hashing and the
//! authentication step that turns a bearer token into a [`Principal`].
//!
//! [`Principal`]: crate::rbac::Principal

pub mod authenticator;
pub mod clock;
pub mod error;
pub mod password;
pub mod token;

pub use authenticator::{authenticate, bearer_token};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, Forbidden, Unauthenticated};
pub use password::{hash_secret, verify_secret};
pub use token::{fingerprint, Claims, IssuedToken, TokenCodec, TokenError, TokenIdentity};
