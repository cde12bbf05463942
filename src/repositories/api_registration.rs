//! # ApiRegistration Repository
//!
//! Repository operations for the api_registrations table.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::api_registration::{ActiveModel, Column, Entity, Model};

use super::{Page, PageParams};

/// Fields accepted when creating a registration.
pub struct NewRegistration {
    pub owner_id: Uuid,
    pub name: String,
    pub base_url: String,
    pub api_kind: String,
    pub auth_type: String,
    pub auth_blob: Option<Vec<u8>>,
}

/// Repository for API registration database operations
pub struct ApiRegistrationRepository {
    db: DatabaseConnection,
}

impl ApiRegistrationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new registration in `pending` status.
    ///
    /// The (owner_id, name) unique index surfaces duplicates as a CONFLICT.
    pub async fn create(&self, new: NewRegistration) -> Result<Model, ApiError> {
        self.create_with_id(Uuid::new_v4(), new).await
    }

    /// Create a registration with a caller-chosen id.
    ///
    /// The credential blob is AAD-bound to the registration id, so the id
    /// must exist before encryption.
    pub async fn create_with_id(&self, id: Uuid, new: NewRegistration) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let registration = ActiveModel {
            id: Set(id),
            owner_id: Set(new.owner_id),
            name: Set(new.name),
            base_url: Set(new.base_url),
            api_kind: Set(new.api_kind),
            auth_type: Set(new.auth_type),
            auth_blob: Set(new.auth_blob),
            status: Set("pending".to_string()),
            last_validated_at: Set(None),
            validation_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = registration.insert(&self.db).await?;

        tracing::info!(
            registration_id = %result.id,
            owner_id = %result.owner_id,
            api_kind = %result.api_kind,
            "API registration created"
        );

        Ok(result)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find a registration or return NOT_FOUND.
    pub async fn get(&self, id: Uuid) -> Result<Model, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found("API registration"))
    }

    /// List registrations with optional owner and status filters.
    pub async fn list(
        &self,
        owner_id: Option<Uuid>,
        status: Option<String>,
        params: &PageParams,
    ) -> Result<Page<Model>, ApiError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);

        if let Some(owner) = owner_id {
            query = query.filter(Column::OwnerId.eq(owner));
        }

        if let Some(status_filter) = status {
            query = query.filter(Column::Status.eq(status_filter));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .offset(params.offset())
            .limit(params.size())
            .all(&self.db)
            .await?;

        Ok(Page::new(items, total, params))
    }

    /// Move a registration into `validating` before normalization starts.
    pub async fn mark_validating(&self, id: Uuid) -> Result<Model, ApiError> {
        let registration = self.get(id).await?;

        let mut active: ActiveModel = registration.into();
        active.status = Set("validating".to_string());
        active.validation_error = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    /// Record the outcome of a normalization run.
    ///
    /// `active` on success, `validation_failed` with an error message
    /// otherwise. Both stamp `last_validated_at`.
    pub async fn record_validation(
        &self,
        id: Uuid,
        success: bool,
        validation_error: Option<String>,
    ) -> Result<Model, ApiError> {
        let registration = self.get(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = registration.into();
        active.status = Set(if success {
            "active".to_string()
        } else {
            "validation_failed".to_string()
        });
        active.validation_error = Set(validation_error);
        active.last_validated_at = Set(Some(now));
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Delete a registration. Endpoints cascade through the FK.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(not_found("API registration"));
        }

        tracing::info!(registration_id = %id, "API registration deleted");
        Ok(())
    }
}
