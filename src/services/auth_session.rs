use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::database::Database;
use crate::entities;

const TOKEN_LENGTH: usize = 43;

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| {
            const CHARSET: &[u8] =
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
            CHARSET[rng.random_range(0..CHARSET.len())] as char
        })
        .collect()
}

/// Pending authorization flows, stored so whichever process receives the
/// callback can finish it.
pub struct AuthSessionService {
    db: Arc<Database>,
}

impl AuthSessionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start a session. Its token doubles as the OAuth `state` value.
    pub async fn create(&self, label: &str, ttl: Duration) -> Result<entities::auth_session::Model> {
        let now = chrono::Utc::now().timestamp();
        entities::auth_session::ActiveModel {
            token: Set(generate_token()),
            label: Set(label.to_string()),
            expires_at: Set(now + ttl.as_secs() as i64),
            created_at: Set(now),
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to create auth session")
    }

    /// Take the session for `token`. A session can be consumed once; expired
    /// or unknown tokens yield `None`.
    pub async fn consume(&self, token: &str) -> Result<Option<entities::auth_session::Model>> {
        let Some(session) = entities::auth_session::Entity::find_by_id(token.to_string())
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch auth session")?
        else {
            return Ok(None);
        };

        entities::auth_session::Entity::delete_by_id(token.to_string())
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete auth session")?;

        if session.expires_at <= chrono::Utc::now().timestamp() {
            tracing::warn!("Auth session '{}' has expired", session.label);
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Delete every expired session, returning how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = entities::auth_session::Entity::delete_many()
            .filter(entities::auth_session::Column::ExpiresAt.lte(chrono::Utc::now().timestamp()))
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to sweep auth sessions")?;

        tracing::debug!("Swept {} expired auth sessions", result.rows_affected);
        Ok(result.rows_affected)
    }
}
