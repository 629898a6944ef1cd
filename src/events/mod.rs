use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: &'static str, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Structured activity payload stored alongside each event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// The previous state (for update/delete operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    /// Severity level for retention policy
    pub severity: Severity,
}

/// Emit an activity event for a [`Loggable`] entity. Fire and forget:
/// logging failures never fail the mutation that triggered them.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    // Event names form a small bounded set, so leaking them to get the
    // 'static lifetime is fine.
    let static_name: &'static str = Box::leak(event_name.into_boxed_str());

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: None,
        severity,
    };

    let event = DomainEvent::new(
        static_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(event_name: &str) -> &'static str {
    match event_name {
        "role.created" => "Role created",
        "role.deleted" => "Role deleted",
        "permission.created" => "Permission registered",
        "role_permission.assigned" => "Permission granted to role",
        "role_permission.revoked" => "Permission revoked from role",
        "secured_object.created" => "Object placed under protection",
        "generic_mapping.created" => "Subject-class grant added",
        "generic_mapping.deleted" => "Subject-class grant removed",
        "user_mapping.created" => "User grant added",
        "user_mapping.deleted" => "User grant removed",
        "group_mapping.created" => "Group grant added",
        "group_mapping.deleted" => "Group grant removed",
        "group.created" => "Group created",
        "group_membership.created" => "User added to group",
        "group_membership.deleted" => "User removed from group",
        "org_profile.updated" => "Org membership updated",
        "user.registered" => "New user registered",
        "user.login" => "User logged in",
        _ => "System event",
    }
}

/// Project events into the activity log and the hash-chained audit store.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let actor_id = event.get("actor_id").and_then(|v| v.as_str()).map(String::from);
        let subject_id = event.get("subject_id").and_then(|v| v.as_str()).map(String::from);
        let occurred_at = event
            .get("occurred_at")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let severity = event
            .get("payload")
            .and_then(|p| p.get("severity"))
            .and_then(|s| s.as_str())
            .unwrap_or("important")
            .to_string();
        let properties = serde_json::to_string(&event).unwrap_or_default();

        let result = sqlx::query(
            r#"
            INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name)
        .bind(describe(&name))
        .bind(&actor_id)
        .bind(&subject_id)
        .bind(&occurred_at)
        .bind(&properties)
        .bind(&severity)
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("failed to save activity log: {}", e);
        }

        // Tamper-evident chain over the raw payloads: each row hashes the
        // previous row's hash plus its own payload.
        let prev_hash: Option<String> = sqlx::query_scalar(
            "SELECT hash FROM audit_store ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&pool)
        .await
        .ok()
        .flatten();

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        if let Some(ref ph) = prev_hash {
            hasher.update(ph.as_bytes());
        }
        hasher.update(properties.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let audit_result = sqlx::query(
            r#"
            INSERT INTO audit_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name)
        .bind(&occurred_at)
        .bind(&actor_id)
        .bind(&subject_id)
        .bind(&properties)
        .bind(&severity)
        .bind(&prev_hash)
        .bind(&hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await;

        if let Err(e) = audit_result {
            tracing::error!("failed to save to audit store: {}", e);
        }
    }
}
