//! Bounded retry helper for one logical request.

use std::collections::HashSet;

use super::{DispatchError, Dispatcher, Selection};
use crate::registry::{FailureKind, FailureTransition, RegistryError};

/// Tracks the credentials tried for one request.
///
/// Allows one initial attempt plus `max_retries` retries; each retry skips
/// credentials already tried in this session.
///
/// ```
/// use keypool::config::KeyPoolConfig;
/// use keypool::pool::KeyPool;
/// use keypool::registry::FailureKind;
///
/// let config = KeyPoolConfig {
///     credentials: vec!["key-a".to_string(), "key-b".to_string()],
///     ..Default::default()
/// };
/// let pool = KeyPool::from_config(&config).unwrap();
///
/// let mut session = pool.session("gemini-pro");
/// let first = session.next_credential().unwrap();
/// session.fail(&first, FailureKind::ServerError).unwrap();
/// let second = session.next_credential().unwrap();
/// assert_ne!(first.credential_id, second.credential_id);
/// session.succeed(&second).unwrap();
/// ```
pub struct DispatchSession<'a> {
    dispatcher: &'a Dispatcher,
    model: String,
    tried: HashSet<String>,
    attempts: u32,
    max_retries: u32,
}

impl<'a> DispatchSession<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher, model: &str, max_retries: u32) -> Self {
        Self {
            dispatcher,
            model: model.to_string(),
            tried: HashSet::new(),
            attempts: 0,
            max_retries,
        }
    }

    /// Selections made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Select the next untried credential.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` once the first attempt and all retries are used;
    /// `NoAvailableCredential` when no untried credential has capacity.
    pub fn next_credential(&mut self) -> Result<Selection, DispatchError> {
        if self.attempts > self.max_retries {
            return Err(DispatchError::RetriesExhausted {
                model: self.model.clone(),
                attempts: self.attempts,
            });
        }

        let selection = self.dispatcher.select_excluding(&self.model, &self.tried)?;
        self.attempts += 1;
        self.tried.insert(selection.credential_id.clone());

        if self.attempts > 1 {
            tracing::debug!(
                model = %self.model,
                attempt = self.attempts,
                max_retries = self.max_retries,
                "Retrying with another credential"
            );
        }
        Ok(selection)
    }

    pub fn succeed(&self, selection: &Selection) -> Result<(), RegistryError> {
        self.dispatcher.record_success(&selection.credential_id)
    }

    pub fn fail(
        &self,
        selection: &Selection,
        kind: FailureKind,
    ) -> Result<FailureTransition, RegistryError> {
        self.dispatcher.record_failure(&selection.credential_id, kind)
    }
}
