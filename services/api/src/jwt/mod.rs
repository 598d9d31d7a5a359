pub mod bearer;
pub mod claims;
pub mod jwks;
pub mod token;
pub mod verifier;

pub use bearer::bearer_token;
pub use claims::{Audience, TokenClaims};
pub use jwks::{Jwk, KeyFamily, KeySetClient, KeySetConfig, SigningKey, SigningKeySource};
pub use token::{SignatureValidated, Token, TokenState, Unvalidated, Validated, VerifiedToken};
pub use verifier::{Clock, SystemClock, TokenVerifier, VerifierConfig};
