//! SQLite-backed `PipelineStore` implementation with durable persistence.

use crate::{PipelineStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use otto_core::{system_clock, Clock};
use otto_types::{
    Contact, ConversationMessage, DeliveryAttempt, DeliveryStatus, MessageDirection,
    NewConversationMessage, NewDeliveryAttempt, Template, Tenant, TrainingEntry, TrainingEntryKind,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

static RECORD_COUNTER: AtomicU64 = AtomicU64::new(1);

fn new_record_id(prefix: &str, now: DateTime<Utc>) -> String {
    let count = RECORD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{count}", now.timestamp_millis())
}

/// Persistent SQLite store backend used by the pipeline.
pub struct SqlitePipelineStore {
    db_path: PathBuf,
    clock: Clock,
}

impl SqlitePipelineStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_clock(path, system_clock())
    }

    /// Same as [`SqlitePipelineStore::new`] with an injected clock so tests
    /// can pin record timestamps.
    pub fn with_clock(path: impl AsRef<Path>, clock: Clock) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path, clock };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(StdDuration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                routing_key TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                brand_ref TEXT NULL,
                is_active INTEGER NOT NULL,
                is_verified INTEGER NOT NULL,
                escalation_contact TEXT NULL,
                generation_provider TEXT NULL,
                generation_model TEXT NULL,
                generation_api_key TEXT NULL,
                channel_access_token TEXT NULL,
                channel_sender_id TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS templates (
                template_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                label TEXT NOT NULL,
                system_instruction TEXT NOT NULL,
                is_default INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(tenant_id) REFERENCES tenants(tenant_id)
            );

            CREATE INDEX IF NOT EXISTS idx_templates_tenant
                ON templates (tenant_id, is_active);

            CREATE TABLE IF NOT EXISTS training_entries (
                entry_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                question TEXT NULL,
                answer TEXT NULL,
                category TEXT NULL,
                priority INTEGER NOT NULL,
                confidence REAL NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(tenant_id) REFERENCES tenants(tenant_id)
            );

            CREATE INDEX IF NOT EXISTS idx_training_entries_tenant
                ON training_entries (tenant_id, is_active, priority DESC);

            CREATE TABLE IF NOT EXISTS contacts (
                contact_id TEXT PRIMARY KEY,
                phone TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversation_messages (
                message_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NULL,
                contact TEXT NOT NULL,
                direction TEXT NOT NULL,
                body TEXT NOT NULL,
                external_message_id TEXT NULL UNIQUE,
                raw_payload_json TEXT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversation_messages_contact
                ON conversation_messages (contact, created_at);

            CREATE TABLE IF NOT EXISTS delivery_attempts (
                attempt_id TEXT PRIMARY KEY,
                recipient TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                response_status INTEGER NULL,
                response_body_json TEXT NULL,
                error_detail TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_delivery_attempts_status
                ON delivery_attempts (status, retry_count);
            "#,
        )?;
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

#[async_trait]
impl PipelineStore for SqlitePipelineStore {
    async fn find_tenant_by_routing_key(&self, routing_key: &str) -> StoreResult<Option<Tenant>> {
        let connection = self.open_connection()?;
        connection
            .query_row(
                r#"
                SELECT
                    tenant_id, routing_key, display_name, brand_ref, is_active, is_verified,
                    escalation_contact, generation_provider, generation_model, generation_api_key,
                    channel_access_token, channel_sender_id, created_at, updated_at
                FROM tenants
                WHERE routing_key = ?1
                "#,
                params![routing_key],
                map_tenant_row,
            )
            .optional()?
            .transpose()
    }

    async fn load_active_templates(&self, tenant_id: &str) -> StoreResult<Vec<Template>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT template_id, tenant_id, label, system_instruction, is_default, is_active,
                   created_at
            FROM templates
            WHERE tenant_id = ?1 AND is_active = 1
            ORDER BY is_default DESC, created_at ASC, template_id ASC
            "#,
        )?;
        let rows = statement.query_map(params![tenant_id], map_template_row)?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row??);
        }
        Ok(templates)
    }

    async fn load_active_training_entries(
        &self,
        tenant_id: &str,
    ) -> StoreResult<Vec<TrainingEntry>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT entry_id, tenant_id, kind, question, answer, category, priority, confidence,
                   is_active, created_at
            FROM training_entries
            WHERE tenant_id = ?1 AND is_active = 1
            ORDER BY priority DESC, confidence DESC, created_at ASC
            "#,
        )?;
        let rows = statement.query_map(params![tenant_id], map_training_entry_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }

    async fn find_or_create_contact(
        &self,
        phone: &str,
        display_name: &str,
    ) -> StoreResult<Contact> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = transaction
            .query_row(
                "SELECT contact_id, phone, display_name, created_at FROM contacts WHERE phone = ?1",
                params![phone],
                map_contact_row,
            )
            .optional()?
            .transpose()?;
        if let Some(contact) = existing {
            transaction.commit()?;
            return Ok(contact);
        }

        let now = self.now();
        let contact = Contact {
            contact_id: new_record_id("contact", now),
            phone: phone.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
        };
        transaction.execute(
            "INSERT INTO contacts (contact_id, phone, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                contact.contact_id,
                contact.phone,
                contact.display_name,
                timestamp_to_db(contact.created_at),
            ],
        )?;
        transaction.commit()?;
        Ok(contact)
    }

    async fn inbound_already_recorded(&self, external_message_id: &str) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM conversation_messages WHERE external_message_id = ?1",
                params![external_message_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn append_message(&self, message: NewConversationMessage) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let raw_payload_json = message
            .raw_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        connection.execute(
            r#"
            INSERT INTO conversation_messages (
                tenant_id, contact, direction, body, external_message_id, raw_payload_json,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                message.tenant_id,
                message.contact,
                direction_to_db(message.direction),
                message.body,
                message.external_message_id,
                raw_payload_json,
                timestamp_to_db(self.now()),
            ],
        )?;
        Ok(())
    }

    async fn list_messages_for_contact(
        &self,
        contact: &str,
        limit: u32,
    ) -> StoreResult<Vec<ConversationMessage>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT message_id, tenant_id, contact, direction, body, external_message_id,
                   raw_payload_json, created_at
            FROM conversation_messages
            WHERE contact = ?1
            ORDER BY message_id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = statement.query_map(params![contact, limit], map_message_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    async fn record_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> StoreResult<DeliveryAttempt> {
        let connection = self.open_connection()?;
        let now = self.now();
        let record = DeliveryAttempt {
            attempt_id: new_record_id("attempt", now),
            recipient: attempt.recipient,
            body: attempt.body,
            status: attempt.status,
            retry_count: 0,
            response_status: attempt.response_status,
            response_body: attempt.response_body,
            error_detail: attempt.error_detail,
            created_at: now,
            updated_at: now,
        };
        let response_body_json = record
            .response_body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        connection.execute(
            r#"
            INSERT INTO delivery_attempts (
                attempt_id, recipient, body, status, retry_count, response_status,
                response_body_json, error_detail, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.attempt_id,
                record.recipient,
                record.body,
                delivery_status_to_db(record.status),
                record.retry_count,
                record.response_status,
                response_body_json,
                record.error_detail,
                timestamp_to_db(record.created_at),
                timestamp_to_db(record.updated_at),
            ],
        )?;
        Ok(record)
    }

    async fn list_retryable_attempts(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        max_retries: u32,
    ) -> StoreResult<Vec<DeliveryAttempt>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT attempt_id, recipient, body, status, retry_count, response_status,
                   response_body_json, error_detail, created_at, updated_at
            FROM delivery_attempts
            WHERE status = 'failed' AND retry_count < ?1
            "#,
        )?;
        let rows = statement.query_map(params![max_retries], map_attempt_row)?;

        let cutoff = now - window;
        let mut attempts = Vec::new();
        for row in rows {
            let attempt = row??;
            if attempt.created_at >= cutoff {
                attempts.push(attempt);
            }
        }
        attempts.sort_by_key(|attempt| attempt.created_at);
        Ok(attempts)
    }

    async fn mark_attempt_resent(&self, attempt_id: &str, retry_count: u32) -> StoreResult<()> {
        self.transition_attempt(attempt_id, DeliveryStatus::Resent, retry_count, None)
    }

    async fn mark_attempt_retry_failed(
        &self,
        attempt_id: &str,
        retry_count: u32,
        permanent: bool,
        error_detail: &str,
    ) -> StoreResult<()> {
        let target = if permanent {
            DeliveryStatus::PermanentFailure
        } else {
            DeliveryStatus::Failed
        };
        self.transition_attempt(attempt_id, target, retry_count, Some(error_detail))
    }

    async fn get_attempt(&self, attempt_id: &str) -> StoreResult<Option<DeliveryAttempt>> {
        let connection = self.open_connection()?;
        connection
            .query_row(
                r#"
                SELECT attempt_id, recipient, body, status, retry_count, response_status,
                       response_body_json, error_detail, created_at, updated_at
                FROM delivery_attempts
                WHERE attempt_id = ?1
                "#,
                params![attempt_id],
                map_attempt_row,
            )
            .optional()?
            .transpose()
    }

    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let exists = transaction
            .query_row(
                "SELECT 1 FROM tenants WHERE routing_key = ?1",
                params![tenant.routing_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::RoutingKeyAlreadyExists(tenant.routing_key));
        }

        transaction.execute(
            r#"
            INSERT INTO tenants (
                tenant_id, routing_key, display_name, brand_ref, is_active, is_verified,
                escalation_contact, generation_provider, generation_model, generation_api_key,
                channel_access_token, channel_sender_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                tenant.tenant_id,
                tenant.routing_key,
                tenant.display_name,
                tenant.brand_ref,
                tenant.is_active,
                tenant.is_verified,
                tenant.escalation_contact,
                tenant.generation_provider,
                tenant.generation_model,
                tenant.generation_api_key,
                tenant.channel_access_token,
                tenant.channel_sender_id,
                timestamp_to_db(tenant.created_at),
                timestamp_to_db(tenant.updated_at),
            ],
        )?;
        transaction.commit()?;
        Ok(())
    }

    async fn insert_template(&self, template: Template) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO templates (
                template_id, tenant_id, label, system_instruction, is_default, is_active,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                template.template_id,
                template.tenant_id,
                template.label,
                template.system_instruction,
                template.is_default,
                template.is_active,
                timestamp_to_db(template.created_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_training_entry(&self, entry: TrainingEntry) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO training_entries (
                entry_id, tenant_id, kind, question, answer, category, priority, confidence,
                is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.entry_id,
                entry.tenant_id,
                training_kind_to_db(entry.kind),
                entry.question,
                entry.answer,
                entry.category,
                entry.priority,
                entry.confidence,
                entry.is_active,
                timestamp_to_db(entry.created_at),
            ],
        )?;
        Ok(())
    }
}

impl SqlitePipelineStore {
    fn transition_attempt(
        &self,
        attempt_id: &str,
        target: DeliveryStatus,
        retry_count: u32,
        error_detail: Option<&str>,
    ) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = transaction
            .query_row(
                "SELECT status FROM delivery_attempts WHERE attempt_id = ?1",
                params![attempt_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(StoreError::AttemptNotFound(attempt_id.to_string()));
        };
        let from = delivery_status_from_db(&current)?;
        if !from.can_transition_to(target) {
            return Err(StoreError::InvalidDeliveryTransition { from, to: target });
        }

        match error_detail {
            Some(detail) => {
                transaction.execute(
                    r#"
                    UPDATE delivery_attempts
                    SET status = ?2, retry_count = ?3, error_detail = ?4, updated_at = ?5
                    WHERE attempt_id = ?1
                    "#,
                    params![
                        attempt_id,
                        delivery_status_to_db(target),
                        retry_count,
                        detail,
                        timestamp_to_db(self.now()),
                    ],
                )?;
            }
            None => {
                transaction.execute(
                    r#"
                    UPDATE delivery_attempts
                    SET status = ?2, retry_count = ?3, updated_at = ?4
                    WHERE attempt_id = ?1
                    "#,
                    params![
                        attempt_id,
                        delivery_status_to_db(target),
                        retry_count,
                        timestamp_to_db(self.now()),
                    ],
                )?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
}

fn map_tenant_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<Tenant>> {
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    let tenant_id: String = row.get(0)?;
    let routing_key: String = row.get(1)?;
    let display_name: String = row.get(2)?;
    let brand_ref: Option<String> = row.get(3)?;
    let is_active: bool = row.get(4)?;
    let is_verified: bool = row.get(5)?;
    let escalation_contact: Option<String> = row.get(6)?;
    let generation_provider: Option<String> = row.get(7)?;
    let generation_model: Option<String> = row.get(8)?;
    let generation_api_key: Option<String> = row.get(9)?;
    let channel_access_token: Option<String> = row.get(10)?;
    let channel_sender_id: Option<String> = row.get(11)?;
    Ok((move || {
        Ok(Tenant {
            tenant_id,
            routing_key,
            display_name,
            brand_ref,
            is_active,
            is_verified,
            escalation_contact,
            generation_provider,
            generation_model,
            generation_api_key,
            channel_access_token,
            channel_sender_id,
            created_at: timestamp_from_db(&created_at)?,
            updated_at: timestamp_from_db(&updated_at)?,
        })
    })())
}

fn map_template_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<Template>> {
    let created_at: String = row.get(6)?;
    Ok((|| {
        Ok(Template {
            template_id: row.get(0)?,
            tenant_id: row.get(1)?,
            label: row.get(2)?,
            system_instruction: row.get(3)?,
            is_default: row.get(4)?,
            is_active: row.get(5)?,
            created_at: timestamp_from_db(&created_at)?,
        })
    })())
}

fn map_training_entry_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<TrainingEntry>> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(9)?;
    Ok((|| {
        Ok(TrainingEntry {
            entry_id: row.get(0)?,
            tenant_id: row.get(1)?,
            kind: training_kind_from_db(&kind)?,
            question: row.get(3)?,
            answer: row.get(4)?,
            category: row.get(5)?,
            priority: row.get(6)?,
            confidence: row.get(7)?,
            is_active: row.get(8)?,
            created_at: timestamp_from_db(&created_at)?,
        })
    })())
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<ConversationMessage>> {
    let direction: String = row.get(3)?;
    let raw_payload_json: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let message_id: i64 = row.get(0)?;
    let tenant_id: Option<String> = row.get(1)?;
    let contact: String = row.get(2)?;
    let body: String = row.get(4)?;
    let external_message_id: Option<String> = row.get(5)?;
    Ok((move || {
        Ok(ConversationMessage {
            message_id,
            tenant_id,
            contact,
            direction: direction_from_db(&direction)?,
            body,
            external_message_id,
            raw_payload: raw_payload_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: timestamp_from_db(&created_at)?,
        })
    })())
}

fn map_contact_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<Contact>> {
    let created_at: String = row.get(3)?;
    Ok((|| {
        Ok(Contact {
            contact_id: row.get(0)?,
            phone: row.get(1)?,
            display_name: row.get(2)?,
            created_at: timestamp_from_db(&created_at)?,
        })
    })())
}

fn map_attempt_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<DeliveryAttempt>> {
    let status: String = row.get(3)?;
    let retry_count: i64 = row.get(4)?;
    let response_status: Option<i64> = row.get(5)?;
    let response_body_json: Option<String> = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let attempt_id: String = row.get(0)?;
    let recipient: String = row.get(1)?;
    let body: String = row.get(2)?;
    let error_detail: Option<String> = row.get(7)?;
    Ok((move || {
        Ok(DeliveryAttempt {
            attempt_id,
            recipient,
            body,
            status: delivery_status_from_db(&status)?,
            retry_count: i64_to_u32("retry_count", retry_count)?,
            response_status: response_status
                .map(|value| i64_to_u32("response_status", value).map(|status| status as u16))
                .transpose()?,
            response_body: response_body_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error_detail,
            created_at: timestamp_from_db(&created_at)?,
            updated_at: timestamp_from_db(&updated_at)?,
        })
    })())
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn direction_to_db(direction: MessageDirection) -> &'static str {
    direction.as_str()
}

fn direction_from_db(value: &str) -> StoreResult<MessageDirection> {
    match value {
        "inbound" => Ok(MessageDirection::Inbound),
        "outbound" => Ok(MessageDirection::Outbound),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "message_direction",
            value: value.to_string(),
        }),
    }
}

fn delivery_status_to_db(status: DeliveryStatus) -> &'static str {
    status.as_str()
}

fn delivery_status_from_db(value: &str) -> StoreResult<DeliveryStatus> {
    match value {
        "sent" => Ok(DeliveryStatus::Sent),
        "failed" => Ok(DeliveryStatus::Failed),
        "resent" => Ok(DeliveryStatus::Resent),
        "permanent_failure" => Ok(DeliveryStatus::PermanentFailure),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "delivery_status",
            value: value.to_string(),
        }),
    }
}

fn training_kind_to_db(kind: TrainingEntryKind) -> &'static str {
    kind.as_str()
}

fn training_kind_from_db(value: &str) -> StoreResult<TrainingEntryKind> {
    match value {
        "faq" => Ok(TrainingEntryKind::Faq),
        "canned_reply" => Ok(TrainingEntryKind::CannedReply),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "training_entry_kind",
            value: value.to_string(),
        }),
    }
}

fn i64_to_u32(field: &'static str, value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
