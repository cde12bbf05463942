//! # ApiEndpoint Repository
//!
//! Repository operations for the api_endpoints table. The canonical endpoint
//! set for a registration is replaced wholesale on each normalization run,
//! inside a transaction, so re-normalizing the same document is idempotent.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::api_endpoint::{ActiveModel, Column, Entity, Model};

use super::{Page, PageParams};

/// One normalized endpoint as produced by the normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedEndpoint {
    /// Deterministic id derived from (registration_id, method, path)
    pub id: Uuid,
    pub name: String,
    pub method: String,
    pub path: String,
    pub request_schema: Option<JsonValue>,
    pub response_schema: Option<JsonValue>,
    pub query_params: Option<JsonValue>,
    pub path_params: Option<JsonValue>,
    pub headers: Option<JsonValue>,
    pub requires_auth: bool,
    pub rate_limit: Option<i32>,
    pub timeout_seconds: i32,
    pub cache_ttl_seconds: Option<i32>,
    pub content_type: String,
}

/// Repository for API endpoint database operations
pub struct ApiEndpointRepository {
    db: DatabaseConnection,
}

impl ApiEndpointRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Replace the endpoint set for a registration atomically.
    ///
    /// Deletes the existing rows and inserts the new set in one transaction,
    /// so readers never observe a partially normalized registration.
    pub async fn replace_for_registration(
        &self,
        registration_id: Uuid,
        endpoints: Vec<NormalizedEndpoint>,
    ) -> Result<usize, ApiError> {
        let now = Utc::now().fixed_offset();
        let count = endpoints.len();

        let txn = self.db.begin().await?;

        Entity::delete_many()
            .filter(Column::RegistrationId.eq(registration_id))
            .exec(&txn)
            .await?;

        for endpoint in endpoints {
            let active = ActiveModel {
                id: Set(endpoint.id),
                registration_id: Set(registration_id),
                name: Set(endpoint.name),
                method: Set(endpoint.method),
                path: Set(endpoint.path),
                request_schema: Set(endpoint.request_schema),
                response_schema: Set(endpoint.response_schema),
                query_params: Set(endpoint.query_params),
                path_params: Set(endpoint.path_params),
                headers: Set(endpoint.headers),
                requires_auth: Set(endpoint.requires_auth),
                rate_limit: Set(endpoint.rate_limit),
                timeout_seconds: Set(endpoint.timeout_seconds),
                cache_ttl_seconds: Set(endpoint.cache_ttl_seconds),
                content_type: Set(endpoint.content_type),
                created_at: Set(now),
                updated_at: Set(now),
            };
            active.insert(&txn).await?;
        }

        txn.commit().await?;

        tracing::info!(
            registration_id = %registration_id,
            endpoint_count = count,
            "Endpoint set replaced"
        );

        Ok(count)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Find an endpoint or return NOT_FOUND.
    pub async fn get(&self, id: Uuid) -> Result<Model, ApiError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| not_found("API endpoint"))
    }

    /// List endpoints for a registration, ordered by path then method.
    pub async fn list_by_registration(
        &self,
        registration_id: Uuid,
        method: Option<String>,
        params: &PageParams,
    ) -> Result<Page<Model>, ApiError> {
        let mut query = Entity::find()
            .filter(Column::RegistrationId.eq(registration_id))
            .order_by_asc(Column::Path)
            .order_by_asc(Column::Method);

        if let Some(method_filter) = method {
            query = query.filter(Column::Method.eq(method_filter.to_lowercase()));
        }

        let total = query.clone().count(&self.db).await?;
        let items = query
            .offset(params.offset())
            .limit(params.size())
            .all(&self.db)
            .await?;

        Ok(Page::new(items, total, params))
    }

    /// All endpoints for a registration, unpaged (used by the generator).
    pub async fn all_for_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::RegistrationId.eq(registration_id))
            .order_by_asc(Column::Path)
            .order_by_asc(Column::Method)
            .all(&self.db)
            .await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(not_found("API endpoint"));
        }

        tracing::info!(endpoint_id = %id, "API endpoint deleted");
        Ok(())
    }

    pub async fn count_by_registration(&self, registration_id: Uuid) -> Result<u64, ApiError> {
        Ok(Entity::find()
            .filter(Column::RegistrationId.eq(registration_id))
            .count(&self.db)
            .await?)
    }
}
