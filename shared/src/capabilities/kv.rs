use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
}

impl KeyNamespace {
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Keys fixed in code.
    pub(crate) fn from_static(namespace: KeyNamespace, key: &'static str) -> Self {
        debug_assert!(Self::validate_key(key).is_ok());
        Self {
            namespace,
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        let invalid = |reason: &str| KvError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains(':') {
            return Err(invalid("key cannot contain the namespace separator"));
        }
        if key.chars().any(char::is_control) {
            return Err(invalid("key contains control characters"));
        }
        Ok(())
    }
}

/// Batched operations: the shell applies each batch as one write so that
/// related entries never end up half-written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvOperation {
    GetMulti { keys: Vec<String> },
    SetMulti { entries: Vec<(String, Vec<u8>)> },
    DeleteMulti { keys: Vec<String> },
}

impl Operation for KvOperation {
    type Output = KvResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvOutput {
    /// One slot per requested key, in request order.
    Values(Vec<Option<Vec<u8>>>),
    Written,
    Deleted,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("unexpected storage output")]
    UnexpectedOutput,
}

pub type KvResult = Result<KvOutput, KvError>;

#[derive(Capability)]
pub struct KeyValue<Ev> {
    context: CapabilityContext<KvOperation, Ev>,
}

impl<Ev> KeyValue<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<KvOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get_multi<F>(&self, keys: &[KvKey], make_event: F)
    where
        F: FnOnce(Result<Vec<Option<Vec<u8>>>, KvError>) -> Ev + Send + 'static,
        Ev: Send,
    {
        let expected = keys.len();
        let keys = keys.iter().map(KvKey::raw).collect();

        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(KvOperation::GetMulti { keys }).await {
                Ok(KvOutput::Values(values)) if values.len() == expected => Ok(values),
                Ok(_) => Err(KvError::UnexpectedOutput),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    pub fn set_multi<F>(&self, entries: Vec<(KvKey, Vec<u8>)>, make_event: F)
    where
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
        Ev: Send,
    {
        if let Some((_, value)) = entries.iter().find(|(_, v)| v.len() > MAX_VALUE_SIZE) {
            let err = KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            };
            let ctx = self.context.clone();
            self.context.spawn(async move {
                ctx.update_app(make_event(Err(err)));
            });
            return;
        }

        let entries = entries.into_iter().map(|(k, v)| (k.raw(), v)).collect();

        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(KvOperation::SetMulti { entries }).await {
                Ok(KvOutput::Written) => Ok(()),
                Ok(_) => Err(KvError::UnexpectedOutput),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    pub fn delete_multi<F>(&self, keys: &[KvKey], make_event: F)
    where
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
        Ev: Send,
    {
        let keys = keys.iter().map(KvKey::raw).collect();

        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(KvOperation::DeleteMulti { keys }).await {
                Ok(KvOutput::Deleted) => Ok(()),
                Ok(_) => Err(KvError::UnexpectedOutput),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_empty() {
        assert!(matches!(
            KvKey::new(KeyNamespace::Session, "   "),
            Err(KvError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_key_validation_separator() {
        assert!(KvKey::new(KeyNamespace::Session, "a:b").is_err());
    }

    #[test]
    fn test_key_validation_control_chars() {
        assert!(KvKey::new(KeyNamespace::Session, "key\x01value").is_err());
    }

    #[test]
    fn test_key_validation_too_long() {
        let long_key = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(KvKey::new(KeyNamespace::Session, long_key).is_err());
    }

    #[test]
    fn test_key_namespace_prefix() {
        let key = KvKey::new(KeyNamespace::Session, "auth_token").unwrap();
        assert_eq!(key.raw(), "session:auth_token");
        assert_eq!(key.key(), "auth_token");
    }
}
