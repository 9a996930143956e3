use std::sync::Arc;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::database::Database;
use crate::entities;

/// Linked catalog accounts.
pub struct AccountService {
    db: Arc<Database>,
}

impl AccountService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list_accounts(&self) -> Result<Vec<entities::catalog_account::Model>> {
        entities::catalog_account::Entity::find()
            .order_by_asc(entities::catalog_account::Column::Id)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch catalog accounts")
    }

    /// The given account, or the first authorized one (lowest id) when no id
    /// is given.
    pub async fn resolve(&self, account_id: Option<i64>) -> Result<entities::catalog_account::Model> {
        match account_id {
            Some(id) => entities::catalog_account::Entity::find_by_id(id)
                .one(&self.db.conn)
                .await
                .wrap_err("Failed to fetch catalog account")?
                .ok_or_eyre(format!("Catalog account {} not found", id)),
            None => entities::catalog_account::Entity::find()
                .order_by_asc(entities::catalog_account::Column::Id)
                .one(&self.db.conn)
                .await
                .wrap_err("Failed to fetch catalog account")?
                .ok_or_eyre("No catalog account has been authorized yet"),
        }
    }

    /// Insert the account, or refresh the token and name of an existing one
    /// with the same user id.
    pub async fn upsert_account(
        &self,
        user_id: &str,
        display_name: Option<String>,
        refresh_token: &str,
    ) -> Result<entities::catalog_account::Model> {
        let existing = entities::catalog_account::Entity::find()
            .filter(entities::catalog_account::Column::UserId.eq(user_id))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to check for existing catalog account")?;

        let account = if let Some(existing) = existing {
            let mut account: entities::catalog_account::ActiveModel = existing.into();
            account.display_name = Set(display_name);
            account.refresh_token = Set(refresh_token.to_string());
            account
                .update(&self.db.conn)
                .await
                .wrap_err("Failed to update catalog account")?
        } else {
            entities::catalog_account::ActiveModel {
                user_id: Set(user_id.to_string()),
                display_name: Set(display_name),
                refresh_token: Set(refresh_token.to_string()),
                playlist_id: Set(None),
                created_at: Set(chrono::Utc::now().timestamp()),
                ..Default::default()
            }
            .insert(&self.db.conn)
            .await
            .wrap_err("Failed to create catalog account")?
        };

        tracing::info!("Catalog account {} linked as {}", account.user_id, account.id);
        Ok(account)
    }

    pub async fn set_playlist(&self, account_id: i64, playlist_id: &str) -> Result<()> {
        let account = self.resolve(Some(account_id)).await?;
        let mut account: entities::catalog_account::ActiveModel = account.into();
        account.playlist_id = Set(Some(playlist_id.to_string()));
        account
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update catalog account playlist")?;
        Ok(())
    }
}
