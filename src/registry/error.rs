/// Errors that can occur during registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("credential already exists: {0}")]
    DuplicateCredential(String),

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("credential id cannot be empty")]
    EmptyCredential,
}
