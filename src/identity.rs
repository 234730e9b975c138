use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::errors::LogBufResult;
use crate::kv_store::KeyValueStore;

pub const USER_UID_KEY: &str = "user_uid";
pub const DEVICE_UID_KEY: &str = "device_uid";

/// Identity stamped onto events, copied by value at event construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
}

/// Holds the current user/device identifiers.
///
/// Only `load_or_generate` writes to storage; `identify*` change the in-memory
/// value for subsequent events and leave the persisted ids alone.
pub struct IdentityProvider {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Identity>,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Identity::default()),
        }
    }

    /// Restores persisted ids, generating and persisting a UUID v4 for each one missing.
    pub fn load_or_generate(&self) -> LogBufResult<Identity> {
        let user_id = self.load_or_create(USER_UID_KEY)?;
        let device_id = self.load_or_create(DEVICE_UID_KEY)?;

        let identity = Identity {
            user_id: Some(user_id),
            device_id: Some(device_id),
        };
        *self.write() = identity.clone();
        Ok(identity)
    }

    /// The persisted ids as they are, without generating missing ones.
    pub fn stored(&self) -> LogBufResult<Identity> {
        Ok(Identity {
            user_id: self.store.get(USER_UID_KEY)?,
            device_id: self.store.get(DEVICE_UID_KEY)?,
        })
    }

    pub fn identify(&self, user_id: impl Into<String>, device_id: impl Into<String>) {
        let mut current = self.write();
        current.user_id = Some(user_id.into());
        current.device_id = Some(device_id.into());
    }

    pub fn identify_user(&self, user_id: impl Into<String>) {
        self.write().user_id = Some(user_id.into());
    }

    pub fn identify_device(&self, device_id: impl Into<String>) {
        self.write().device_id = Some(device_id.into());
    }

    pub fn current(&self) -> Identity {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load_or_create(&self, key: &str) -> LogBufResult<String> {
        if let Some(existing) = self.store.get(key)? {
            return Ok(existing);
        }
        let generated = Uuid::new_v4().to_string();
        self.store.set(key, &generated)?;
        Ok(generated)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Identity> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}
