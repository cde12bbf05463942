//! # Event Stream Handlers
//!
//! Server-sent events for pipeline resources. The bus has no replay, so the
//! handler snapshots current state from the database and emits it as the
//! first event before subscribing; a client therefore always sees the
//! resource's present status even if it connects between transitions.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::events::{BusEvent, ResourceKind};
use crate::repositories::{
    ApiRegistrationRepository, BuildRecordRepository, DeploymentRepository,
    GenerationJobRepository,
};
use crate::server::AppState;

/// Builds the snapshot event for a resource, verifying it exists.
async fn snapshot(
    state: &AppState,
    kind: ResourceKind,
    id: Uuid,
) -> Result<BusEvent, ApiError> {
    match kind {
        ResourceKind::Registration => {
            let registration = ApiRegistrationRepository::new(state.db.clone())
                .get(id)
                .await?;
            Ok(BusEvent::status(kind, id, registration.status))
        }
        ResourceKind::Generation => {
            let job = GenerationJobRepository::new(state.db.clone()).get(id).await?;
            Ok(BusEvent::status(kind, id, job.status))
        }
        ResourceKind::Build => {
            let build = BuildRecordRepository::new(state.db.clone()).get(id).await?;
            Ok(BusEvent::status(kind, id, build.status))
        }
        ResourceKind::Deployment => {
            let deployment = DeploymentRepository::new(state.db.clone()).get(id).await?;
            Ok(BusEvent::status_with_health(
                kind,
                id,
                deployment.status,
                deployment.health,
            ))
        }
    }
}

fn to_sse_event(event: &BusEvent) -> Event {
    let name = match event {
        BusEvent::StatusUpdate { .. } => "status_update",
        BusEvent::Log { .. } => "log",
    };
    match serde_json::to_string(event) {
        Ok(data) => Event::default().event(name).data(data),
        Err(_) => Event::default().event(name),
    }
}

/// Streams status and log events for one resource
///
/// The first event is a snapshot of the resource's current state; every
/// subsequent event is a live bus event for that resource.
#[utoipa::path(
    get,
    path = "/events/{resource_type}/{resource_id}",
    params(
        ("resource_type" = String, Path, description = "registration, generation, build or deployment"),
        ("resource_id" = Uuid, Path, description = "Resource ID")
    ),
    responses(
        (status = 200, description = "SSE stream of resource events"),
        (status = 404, description = "Unknown resource type or id", body = ApiError)
    ),
    tag = "events"
)]
pub async fn stream_events(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, Uuid)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let kind = ResourceKind::parse(&resource_type)
        .ok_or_else(|| not_found("Resource type"))?;

    // Subscribe before snapshotting so transitions between the snapshot
    // read and the first poll are not lost.
    let receiver = state.bus.subscribe();
    let initial = snapshot(&state, kind, resource_id).await?;

    let live = BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(event) if event.resource() == (kind, resource_id) => {
                Some(Ok(to_sse_event(&event)))
            }
            // Lagged subscribers skip dropped events; state catches up on
            // the next status update.
            _ => None,
        }
    });

    let stream = stream::once(async move { Ok(to_sse_event(&initial)) }).chain(live);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_event_carries_tagged_json() {
        let event = BusEvent::status(ResourceKind::Build, Uuid::new_v4(), "building");
        let sse = to_sse_event(&event);
        // Event is opaque; serialization is covered by asserting the source
        // JSON is well-formed and tagged.
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status_update");
        assert_eq!(json["status"], "building");
        drop(sse);
    }

    #[test]
    fn test_unknown_resource_type_rejected() {
        assert!(ResourceKind::parse("pipeline").is_none());
    }
}
