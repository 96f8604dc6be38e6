pub mod credentials;

pub use credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore, StoredCredential};
