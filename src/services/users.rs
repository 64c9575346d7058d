use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Condition, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthError, CredentialHasher},
    db::DbPool,
    entities::{user, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Registration input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 64), custom = "validate_not_blank")]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    pub role: UserRole,
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

fn hash_error(err: AuthError) -> ServiceError {
    match err {
        AuthError::InvalidCredentials => ServiceError::InvalidCredentials,
        other => ServiceError::HashError(other.to_string()),
    }
}

/// Unique-index violations surface as `Conflict`.
pub fn map_unique_violation(err: DbErr, what: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("{} already exists", what))
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Identity store: registration, credential checks and lookups.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
    hasher: Arc<dyn CredentialHasher>,
    event_sender: EventSender,
    // Verified against when the username is unknown, so both failure paths hash.
    dummy_hash: Option<String>,
}

impl UserService {
    pub fn new(
        db: Arc<DbPool>,
        hasher: Arc<dyn CredentialHasher>,
        event_sender: EventSender,
    ) -> Self {
        let dummy_hash = hasher.hash("placeholder-credential").ok();
        Self {
            db,
            hasher,
            event_sender,
            dummy_hash,
        }
    }

    /// Registers a user; username and email must both be unused.
    #[instrument(skip(self, input), fields(username = %input.username, role = %input.role))]
    pub async fn create_user(&self, input: NewUser) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        let existing = user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username.as_str()))
                    .add(user::Column::Email.eq(email.as_str())),
            )
            .one(&*self.db)
            .await?;
        if let Some(existing) = existing {
            let field = if existing.username == username {
                "Username"
            } else {
                "Email"
            };
            return Err(ServiceError::Conflict(format!("{} already registered", field)));
        }

        let hasher = self.hasher.clone();
        let password = input.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::InternalError(format!("hashing task failed: {}", e)))?
            .map_err(hash_error)?;

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(input.role),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| map_unique_violation(e, "User"))?;

        info!(user_id = %created.id, "user registered");
        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;

        Ok(created)
    }

    /// Checks a username/password pair.
    ///
    /// Unknown users and wrong passwords both yield `InvalidCredentials`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(username.trim()))
            .one(&*self.db)
            .await?;

        let hasher = self.hasher.clone();
        let password = password.to_string();

        match found {
            Some(user) => {
                let stored = user.password_hash.clone();
                tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
                    .await
                    .map_err(|e| ServiceError::InternalError(format!("verify task failed: {}", e)))?
                    .map_err(|e| {
                        warn!(user_id = %user.id, "failed login");
                        hash_error(e)
                    })?;
                Ok(user)
            }
            None => {
                if let Some(dummy) = self.dummy_hash.clone() {
                    let _ = tokio::task::spawn_blocking(move || hasher.verify(&password, &dummy))
                        .await;
                }
                warn!("failed login for unknown username");
                Err(ServiceError::InvalidCredentials)
            }
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }
}
