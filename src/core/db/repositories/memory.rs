//! In-memory store implementations
//!
//! Used by the test suites and by the server when no `DATABASE_URL` is
//! configured. Per-key atomicity comes from `DashMap`'s shard locks; when a
//! store touches two maps it always locks them in the same order.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::channel::{ChannelRepositoryError, ChannelStore};
use super::token::{TokenRepositoryError, TokenStore, hash_token};
use super::user::{UserRepositoryError, UserStore};
use crate::core::db::models::{
    AuthUser, Channel, CreateChannel, CreateUser, Token, TokenRecord, UpdateChannel, User,
};

// ============================================================================
// Users
// ============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    /// username -> id; locked before `users`
    usernames: DashMap<String, Uuid>,
    users: DashMap<Uuid, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, dto: &CreateUser) -> Result<AuthUser, UserRepositoryError> {
        match self.usernames.entry(dto.username.clone()) {
            Entry::Occupied(_) => Err(UserRepositoryError::UsernameAlreadyExists),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    username: dto.username.clone(),
                    password_hash: dto.password_hash.clone(),
                    created_at: Utc::now(),
                    account_description: None,
                };
                let auth_user = AuthUser::from(&user);
                slot.insert(user.id);
                self.users.insert(user.id, user);
                Ok(auth_user)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, UserRepositoryError> {
        self.users
            .get(&id)
            .map(|user| user.clone())
            .ok_or(UserRepositoryError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, UserRepositoryError> {
        let id = self
            .usernames
            .get(username)
            .map(|id| *id)
            .ok_or(UserRepositoryError::NotFound)?;
        self.find_by_id(id).await
    }

    async fn update_username(
        &self,
        id: Uuid,
        username: &str,
    ) -> Result<User, UserRepositoryError> {
        let current = self.find_by_id(id).await?;
        if current.username == username {
            return Ok(current);
        }

        let already_owned = match self.usernames.entry(username.to_string()) {
            Entry::Occupied(owner) if *owner.get() == id => true,
            Entry::Occupied(_) => return Err(UserRepositoryError::UsernameAlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(id);
                false
            }
        };
        if already_owned {
            return self.find_by_id(id).await;
        }

        // Release the name replaced under the `users` lock, not the one read above
        let renamed = self.users.get_mut(&id).map(|mut user| {
            let previous = std::mem::replace(&mut user.username, username.to_string());
            (previous, user.clone())
        });

        match renamed {
            Some((previous, user)) => {
                self.usernames.remove_if(&previous, |_, owner| *owner == id);
                Ok(user)
            }
            None => {
                self.usernames.remove_if(username, |_, owner| *owner == id);
                Err(UserRepositoryError::NotFound)
            }
        }
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<User, UserRepositoryError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or(UserRepositoryError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(user.clone())
    }
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    by_user: DashMap<Uuid, Token>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find(&self, refresh_token: &str) -> Result<Token, TokenRepositoryError> {
        let token_hash = hash_token(refresh_token);
        self.by_user
            .iter()
            .find(|row| row.token_hash == token_hash)
            .map(|row| row.value().clone())
            .ok_or(TokenRepositoryError::NotFound)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Token, TokenRepositoryError> {
        self.by_user
            .get(&user_id)
            .map(|row| row.clone())
            .ok_or(TokenRepositoryError::NotFound)
    }

    async fn save(&self, record: &TokenRecord) -> Result<Token, TokenRepositoryError> {
        let now = Utc::now();
        let token_hash = hash_token(&record.refresh_token);

        let row = self
            .by_user
            .entry(record.user_id)
            .and_modify(|row| {
                row.token_hash = token_hash.clone();
                row.updated_at = now;
            })
            .or_insert_with(|| Token {
                user_id: record.user_id,
                token_hash: token_hash.clone(),
                created_at: now,
                updated_at: now,
            });

        Ok(row.clone())
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<Token, TokenRepositoryError> {
        let mut row = self
            .by_user
            .get_mut(&user_id)
            .ok_or(TokenRepositoryError::NotFound)?;

        if row.token_hash != hash_token(current) {
            return Err(TokenRepositoryError::NotFound);
        }

        row.token_hash = hash_token(next);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, refresh_token: &str) -> Result<(), TokenRepositoryError> {
        let token_hash = hash_token(refresh_token);
        self.by_user.retain(|_, row| row.token_hash != token_hash);
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<(), TokenRepositoryError> {
        self.by_user.remove(&user_id);
        Ok(())
    }
}

// ============================================================================
// Channels
// ============================================================================

#[derive(Default)]
pub struct MemoryChannelStore {
    channels: DashMap<Uuid, Channel>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self, filter: impl Fn(&Channel) -> bool) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .channels
            .iter()
            .filter(|c| filter(c.value()))
            .map(|c| c.value().clone())
            .collect();
        channels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        channels
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn find_all(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Channel>, ChannelRepositoryError> {
        Ok(self
            .sorted(|_| true)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Channel>, ChannelRepositoryError> {
        Ok(self.sorted(|c| c.user_id == user_id))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Channel, ChannelRepositoryError> {
        self.channels
            .get(&id)
            .map(|c| c.clone())
            .ok_or(ChannelRepositoryError::NotFound)
    }

    async fn create(&self, dto: &CreateChannel) -> Result<Channel, ChannelRepositoryError> {
        let channel = Channel {
            id: Uuid::new_v4(),
            user_id: dto.user_id,
            created_at: Utc::now(),
            title: dto.title.clone(),
            description: dto.description.clone(),
        };
        self.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn update(
        &self,
        id: Uuid,
        dto: &UpdateChannel,
    ) -> Result<Channel, ChannelRepositoryError> {
        let mut channel = self
            .channels
            .get_mut(&id)
            .ok_or(ChannelRepositoryError::NotFound)?;

        if let Some(title) = &dto.title {
            channel.title = title.clone();
        }
        if let Some(description) = &dto.description {
            channel.description = description.clone();
        }
        Ok(channel.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ChannelRepositoryError> {
        Ok(self.channels.remove(&id).is_some())
    }
}
