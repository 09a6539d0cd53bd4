use agenttrace_core::domain::ids::{EventId, OrganizationId};
use agenttrace_core::error::{CoreError, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::{ObjectLockLegalHoldStatus, ObjectLockMode};
use aws_sdk_s3::Client;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::model::{AuditEvent, Checkpoint};

use super::AuditStorage;

/// Object-store backend config, modeled on the teacher's `S3Config`
/// (`llm-research-storage::s3`), extended with Object-Lock retention.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub retention_days: u32,
    pub force_path_style: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "agenttrace-audit".to_string(),
            endpoint: None,
            region: "us-east-1".to_string(),
            retention_days: 7 * 365,
            force_path_style: false,
        }
    }
}

/// v2 backend: PUT with Object-Lock in compliance mode, retention =
/// `retention_days` (spec.md §4.3 "v2 Object-store"). Before the first write
/// the bucket's Object-Lock configuration is verified; capture fails fast if
/// it is not enabled, since compliance-mode WORM is the entire point of this
/// backend.
#[derive(Debug)]
pub struct ObjectStoreAuditStorage {
    client: Client,
    config: ObjectStoreConfig,
}

impl ObjectStoreAuditStorage {
    pub async fn connect(config: ObjectStoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(
            aws_config::Region::new(config.region.clone()),
        );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let storage = Self { client, config };
        storage.verify_object_lock_enabled().await?;
        Ok(storage)
    }

    async fn verify_object_lock_enabled(&self) -> Result<()> {
        let result = self
            .client
            .get_object_lock_configuration()
            .bucket(&self.config.bucket)
            .send()
            .await;

        match result {
            Ok(output) => {
                let enabled = output
                    .object_lock_configuration()
                    .and_then(|c| c.object_lock_enabled())
                    .map(|s| s.as_str() == "Enabled")
                    .unwrap_or(false);
                if enabled {
                    Ok(())
                } else {
                    Err(CoreError::Integrity(format!(
                        "bucket {} does not have Object-Lock enabled",
                        self.config.bucket
                    )))
                }
            }
            Err(e) => Err(CoreError::Storage(format!("failed to verify object lock: {e}"))),
        }
    }

    fn retain_until(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::days(self.config.retention_days as i64)
    }

    async fn put_worm(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let retain_until = self.retain_until();
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(bytes.into())
            .object_lock_mode(ObjectLockMode::Compliance)
            .object_lock_retain_until_date(
                aws_sdk_s3::primitives::DateTime::from_secs(retain_until.timestamp()),
            )
            .object_lock_legal_hold_status(ObjectLockLegalHoldStatus::Off)
            .send()
            .await
            .map_err(|e| CoreError::Storage(format!("s3 put_object failed for {key}: {e}")))?;
        Ok(())
    }

    fn event_key(org: OrganizationId, date: NaiveDate, event_id: EventId) -> String {
        format!(
            "{}/{:04}/{:02}/{:02}/{}.json",
            org,
            date.year(),
            date.month(),
            date.day(),
            event_id
        )
    }

    fn checkpoint_key(org: OrganizationId, date: NaiveDate) -> String {
        format!("{org}/checkpoints/{date}.json")
    }
}

#[async_trait]
impl AuditStorage for ObjectStoreAuditStorage {
    async fn write_event(&self, event: &AuditEvent) -> Result<()> {
        let key = Self::event_key(event.organization_id, event.timestamp.date_naive(), event.event_id);
        let bytes = serde_json::to_vec(event)?;
        self.put_worm(&key, bytes).await
    }

    async fn read_event(&self, org: OrganizationId, date: NaiveDate, event_id: EventId) -> Result<Option<AuditEvent>> {
        let key = Self::event_key(org, date, event_id);
        match self.client.get_object().bucket(&self.config.bucket).key(&key).send().await {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| CoreError::Storage(e.to_string()))?
                    .into_bytes();
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }

    async fn list_events(&self, org: OrganizationId, date: NaiveDate) -> Result<Vec<AuditEvent>> {
        let prefix = format!("{}/{:04}/{:02}/{:02}/", org, date.year(), date.month(), date.day());
        let mut events = Vec::new();
        let mut continuation = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(&prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    let get = self.client.get_object().bucket(&self.config.bucket).key(key).send().await;
                    if let Ok(resp) = get {
                        if let Ok(bytes) = resp.body.collect().await {
                            if let Ok(event) = serde_json::from_slice::<AuditEvent>(&bytes.into_bytes()) {
                                events.push(event);
                            }
                        }
                    }
                }
            }

            if output.is_truncated().unwrap_or(false) {
                continuation = output.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.event_id.0.cmp(&b.event_id.0)));
        Ok(events)
    }

    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let key = Self::checkpoint_key(checkpoint.organization_id, checkpoint.date);
        let bytes = serde_json::to_vec(checkpoint)?;
        self.put_worm(&key, bytes).await
    }

    async fn read_checkpoint(&self, org: OrganizationId, date: NaiveDate) -> Result<Option<Checkpoint>> {
        let key = Self::checkpoint_key(org, date);
        match self.client.get_object().bucket(&self.config.bucket).key(&key).send().await {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| CoreError::Storage(e.to_string()))?
                    .into_bytes();
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }
}

fn is_not_found<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("NoSuchKey")
}
