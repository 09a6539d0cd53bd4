use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use uuid::Uuid;

use agenttrace_audit::MerkleTree;
use agenttrace_audit::{verify::verify_chain, Checkpoint};
use agenttrace_core::domain::ids::{Digest32, EventId};
use agenttrace_query::{
    aggregation::{actor_activity, summary, DEFAULT_CRITICAL_BURST_THRESHOLD},
    context::get_with_context,
    cursor::Cursor,
    export::{ExportJob, ExportRequest, ExportStatus},
    filter::EventFilter,
    permissions::Capability,
    query::query_events,
    self_audit::{record_access, C6Operation},
};

use crate::{
    auth::{require, AuthUser},
    dto::{
        ActorActivityQuery, EventContextQuery, EventLookupQuery, EventsQuery, ExportRequestBody,
        MerkleProofRequest, MerkleProofVerifyRequest, SummaryQuery, VerifyQuery,
    },
    error::{ApiError, ApiResult},
    AppState,
};

fn build_filter(user: &AuthUser, q: EventsQuery) -> ApiResult<EventFilter> {
    let mut filter = EventFilter::new(user.organization_id, q.from, q.to);
    filter.actor_id = q.actor_id;
    filter.actor_type = q.actor_type;
    filter.event_category = q.event_category;
    filter.event_type = q.event_type;
    filter.resource_type = q.resource_type;
    filter.resource_id = q.resource_id;
    filter.action = q.action;
    filter.severity = q.severity;
    if let Some(limit) = q.limit {
        filter = filter.with_limit(limit);
    }
    if let Some(cursor) = q.cursor {
        filter = filter.with_cursor(Cursor::decode(&cursor)?);
    }
    Ok(filter)
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let filter = build_filter(&user, q)?;
    let result = query_events(&*state.storage, &filter).await?;
    record_access(&state.audit_log, user.organization_id, &user.principal, C6Operation::Viewed, "query:events").await?;
    Ok(Json(result))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(q): Query<EventLookupQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let event = state
        .storage
        .read_event(user.organization_id, q.date, EventId::from_uuid(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event {id} not found on {}", q.date)))?;
    record_access(&state.audit_log, user.organization_id, &user.principal, C6Operation::Viewed, &id.to_string()).await?;
    Ok(Json(event))
}

pub async fn get_event_context(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(q): Query<EventContextQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let context = get_with_context(&*state.storage, user.organization_id, q.date, EventId::from_uuid(id), q.before, q.after)
        .await?;
    Ok(Json(context))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<SummaryQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let threshold = q.critical_burst_threshold.unwrap_or(DEFAULT_CRITICAL_BURST_THRESHOLD);
    let result = summary(&*state.storage, user.organization_id, q.from, q.to, threshold).await?;
    Ok(Json(result))
}

pub async fn get_actor_activity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(actor_id): Path<String>,
    Query(q): Query<ActorActivityQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let limit = q.limit.unwrap_or(agenttrace_query::aggregation::DEFAULT_ACTOR_ACTIVITY_MAX_LIMIT);
    let result = actor_activity(&*state.storage, user.organization_id, &actor_id, q.from, q.to, limit).await?;
    Ok(Json(result))
}

pub async fn create_export(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ExportRequestBody>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditExport)?;
    let request = ExportRequest {
        organization_id: user.organization_id,
        from: body.from,
        to: body.to,
        format: body.format,
        include_verification: body.include_verification,
        encryption_public_key: body.encryption_public_key,
    };
    let export_id = state.export_jobs.create();
    tokio::spawn(agenttrace_query::export::run_export_job(
        state.export_jobs.clone(),
        state.storage.clone(),
        export_id,
        request,
    ));
    record_access(&state.audit_log, user.organization_id, &user.principal, C6Operation::Exported, &export_id.to_string()).await?;
    Ok(Json(state.export_jobs.get(export_id).ok_or_else(|| ApiError::Internal("export job vanished".into()))?))
}

pub async fn get_export(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditExport)?;
    let export_id = id.into();
    let job: ExportJob = state.export_jobs.get(export_id).ok_or_else(|| ApiError::NotFound(format!("export {id} not found")))?;
    Ok(Json(job))
}

pub async fn download_export(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    require(&user, Capability::AuditExport)?;
    let export_id = id.into();
    let job = state.export_jobs.get(export_id).ok_or_else(|| ApiError::NotFound(format!("export {id} not found")))?;
    match job.status {
        ExportStatus::Completed => {
            let artifact = job.artifact.ok_or_else(|| ApiError::Internal("completed export has no artifact".into()))?;
            Ok(([("content-type", "application/octet-stream")], artifact).into_response())
        }
        ExportStatus::Failed => Err(ApiError::Validation(job.error_message.unwrap_or_else(|| "export failed".into()))),
        ExportStatus::Pending | ExportStatus::Processing => {
            Err(ApiError::Validation("export is not ready yet".into()))
        }
    }
}

pub async fn stream_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    require(&user, Capability::AuditRead)?;
    Ok(ws.on_upgrade(move |socket| handle_stream(socket, state)))
}

async fn handle_stream(mut socket: WebSocket, state: AppState) {
    let mut subscription = state.stream.subscribe();
    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                match event {
                    Some(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
    state.stream.unsubscribe(subscription.id);
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<VerifyQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditAdmin)?;
    let report = verify_chain(&*state.storage, user.organization_id, q.from, q.to, q.max_clock_skew_secs.unwrap_or(300)).await?;
    Ok(Json(report))
}

pub async fn get_checkpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let checkpoint: Option<Checkpoint> = state.storage.read_checkpoint(user.organization_id, date).await?;
    checkpoint.map(Json).ok_or_else(|| ApiError::NotFound(format!("no checkpoint for {date}")))
}

pub async fn merkle_proof(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<MerkleProofRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let event_id = EventId::from_uuid(event_id);
    let mut events = state.storage.list_events(user.organization_id, body.date).await?;
    events.sort_by_key(|e| (e.timestamp, *e.event_id.as_uuid()));

    let index = events
        .iter()
        .position(|e| e.event_id == event_id)
        .ok_or_else(|| ApiError::NotFound(format!("event {event_id} not found on {}", body.date)))?;

    let leaves: Vec<Digest32> = events.iter().map(|e| e.hash).collect();
    let tree = MerkleTree::build(leaves);
    let proof = tree.proof(index).ok_or_else(|| ApiError::Internal("failed to build merkle proof".into()))?;
    Ok(Json(proof))
}

pub async fn merkle_proof_verify(
    Extension(user): Extension<AuthUser>,
    Json(body): Json<MerkleProofVerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&user, Capability::AuditRead)?;
    let valid = agenttrace_audit::verify_proof(&body.proof, body.root_hash);
    Ok(Json(serde_json::json!({ "valid": valid })))
}
