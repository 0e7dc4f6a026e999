//! Authentication state for the Galaxy Digital API.
//!
//! - `GalaxyCredentials`: API key, account email and password
//! - `Session`: bearer token persisted to disk, valid for 60 minutes
//! - `CredentialStore`: password storage in the OS keychain via keyring

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, GalaxyCredentials};
pub use session::{Session, SessionData};
