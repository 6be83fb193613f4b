//! Credential storage and session signaling.
//!
//! This module provides:
//! - `CredentialStore`: persistent bearer-token slots (keychain, file, memory)
//!   read in `access_token`, then `token` order
//! - `SessionEvents`: the broadcast hub the client uses to announce that the
//!   backend rejected the stored credential

pub mod credentials;
pub mod events;

pub use credentials::{
    clear_credentials, credential_source, current_credential, current_credential_entry,
    CredentialStore, FileStore,
    KeyringStore, MemoryStore, StorageError, ACCESS_TOKEN_KEY, CREDENTIAL_KEYS, LEGACY_TOKEN_KEY,
};
pub use events::{spawn_invalidation_listener, SessionEvent, SessionEvents};
