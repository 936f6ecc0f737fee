//! Durable mirror of the session: credential and role tag, read and written as
//! one pair through batched key-value operations.

use crate::auth::{Credential, Role, Session};
use crate::capabilities::{KeyNamespace, KeyValue, KvError, KvKey};

pub const TOKEN_KEY: &str = "auth_token";
pub const ROLE_KEY: &str = "user_role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    token_key: KvKey,
    role_key: KvKey,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            token_key: KvKey::from_static(KeyNamespace::Session, TOKEN_KEY),
            role_key: KvKey::from_static(KeyNamespace::Session, ROLE_KEY),
        }
    }
}

impl SessionStore {
    fn keys(&self) -> [KvKey; 2] {
        [self.token_key.clone(), self.role_key.clone()]
    }

    pub fn restore<Ev, F>(&self, kv: &KeyValue<Ev>, make_event: F)
    where
        Ev: Send + 'static,
        F: FnOnce(Result<Option<Session>, KvError>) -> Ev + Send + 'static,
    {
        kv.get_multi(&self.keys(), move |result| {
            make_event(result.and_then(|values| decode(&values)))
        });
    }

    pub fn persist<Ev, F>(&self, kv: &KeyValue<Ev>, session: &Session, make_event: F)
    where
        Ev: Send + 'static,
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
    {
        let entries = vec![
            (
                self.token_key.clone(),
                session.credential.expose().as_bytes().to_vec(),
            ),
            (
                self.role_key.clone(),
                session.role.as_str().as_bytes().to_vec(),
            ),
        ];
        kv.set_multi(entries, make_event);
    }

    pub fn clear<Ev, F>(&self, kv: &KeyValue<Ev>, make_event: F)
    where
        Ev: Send + 'static,
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
    {
        kv.delete_multi(&self.keys(), make_event);
    }
}

/// A role without a credential is treated as no session at all.
pub fn decode(values: &[Option<Vec<u8>>]) -> Result<Option<Session>, KvError> {
    let [token, role] = values else {
        return Err(KvError::UnexpectedOutput);
    };

    let Some(token) = token else {
        return Ok(None);
    };
    let token = std::str::from_utf8(token).map_err(|e| KvError::Storage {
        message: format!("stored credential is not UTF-8: {e}"),
    })?;
    let Some(credential) = Credential::new(token) else {
        return Ok(None);
    };

    let role = role
        .as_deref()
        .and_then(|r| std::str::from_utf8(r).ok())
        .map(Role::parse)
        .unwrap_or_default();

    Ok(Some(Session {
        credential,
        role,
        phone_number: None,
    }))
}
