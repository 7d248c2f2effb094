use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

/// A registered storefront account, owned by the external auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolve the identity carried by a bearer token (its email) to an account.
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<UserAccount>>;
}

/// Directory used in standalone mode and tests.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    users: RwLock<HashMap<String, UserAccount>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, account: UserAccount) -> CoreResult<()> {
        let mut users = self
            .users
            .write()
            .map_err(|_| CoreError::IdentityError("directory lock poisoned".to_string()))?;
        users.insert(account.email.to_lowercase(), account);
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<UserAccount>> {
        let users = self
            .users
            .read()
            .map_err(|_| CoreError::IdentityError("directory lock poisoned".to_string()))?;
        Ok(users.get(&email.to_lowercase()).cloned())
    }
}
