//! Audit event persistence as an append-only hash chain.
//!
//! Every successful structural mutation and every denial returned to a
//! caller appends one event whose hash covers the previous event's hash.
//! Appends serialise on a transaction-scoped advisory lock so two writers
//! never chain onto the same predecessor.

use chrono::{DateTime, Utc};
use civic_access::Operation;
use civic_core::{DenialReason, NodeId};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// Hash preceding the first event.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const APPEND_LOCK_KEY: i64 = 0x6369_7669_6361_7564;

/// Whether the audited attempt went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied(DenialReason),
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::Denied(_) => "DENIED",
        }
    }

    fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::Denied(r) => Some(r.as_str()),
        }
    }
}

/// An audit event to be persisted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub operation: Operation,
    /// Actor label, e.g. `REGION@<node>` or `service`.
    pub actor: String,
    pub outcome: Outcome,
    pub node_id: Option<NodeId>,
    pub metadata: serde_json::Value,
}

/// SHA-256 over the previous hash and the event's fields, hex encoded.
pub fn chain_hash(
    previous_hash: &str,
    operation: &str,
    actor: &str,
    outcome: &str,
    reason: Option<&str>,
    node_id: Option<Uuid>,
    metadata: &serde_json::Value,
) -> String {
    let node = node_id.map(|n| n.to_string()).unwrap_or_default();
    let metadata = metadata.to_string();
    let mut hasher = Sha256::new();
    for part in [
        previous_hash,
        operation,
        actor,
        outcome,
        reason.unwrap_or(""),
        node.as_str(),
        metadata.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Append an event, chaining it to the latest one.
pub async fn append(pool: &PgPool, event: AuditEvent) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(APPEND_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let previous: Option<String> =
        sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let previous = previous.as_deref().unwrap_or(GENESIS_HASH);

    let node = event.node_id.map(|n| *n.as_uuid());
    let event_hash = chain_hash(
        previous,
        event.operation.as_str(),
        &event.actor,
        event.outcome.as_str(),
        event.outcome.reason(),
        node,
        &event.metadata,
    );

    sqlx::query(
        "INSERT INTO audit_events (id, operation, actor, outcome, reason, node_id, metadata,
         previous_hash, event_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
    )
    .bind(id)
    .bind(event.operation.as_str())
    .bind(&event.actor)
    .bind(event.outcome.as_str())
    .bind(event.outcome.reason())
    .bind(node)
    .bind(&event.metadata)
    .bind(previous)
    .bind(&event_hash)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(id)
}

/// Database row for audit events.
#[derive(Debug, sqlx::FromRow)]
pub struct AuditEventRow {
    pub seq: i64,
    pub id: Uuid,
    pub operation: String,
    pub actor: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub node_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct ChainIntegrity {
    pub total_events: usize,
    /// Events whose `previous_hash` does not name their predecessor.
    pub broken_links: usize,
    /// Events whose stored hash does not match their contents.
    pub tampered: usize,
}

impl ChainIntegrity {
    pub fn is_valid(&self) -> bool {
        self.broken_links == 0 && self.tampered == 0
    }
}

/// Check linkage and recompute every hash, oldest first.
pub fn verify(rows: &[AuditEventRow]) -> ChainIntegrity {
    let mut broken_links = 0;
    let mut tampered = 0;
    let mut expected_previous = GENESIS_HASH;
    for row in rows {
        if row.previous_hash != expected_previous {
            broken_links += 1;
        }
        let recomputed = chain_hash(
            &row.previous_hash,
            &row.operation,
            &row.actor,
            &row.outcome,
            row.reason.as_deref(),
            row.node_id,
            &row.metadata,
        );
        if recomputed != row.event_hash {
            tampered += 1;
        }
        expected_previous = &row.event_hash;
    }
    ChainIntegrity {
        total_events: rows.len(),
        broken_links,
        tampered,
    }
}

/// Load the whole chain and verify it.
pub async fn verify_chain(pool: &PgPool) -> Result<ChainIntegrity, sqlx::Error> {
    let rows = sqlx::query_as::<_, AuditEventRow>(
        "SELECT seq, id, operation, actor, outcome, reason, node_id, metadata,
         previous_hash, event_hash, created_at
         FROM audit_events ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(verify(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seq: i64, previous: &str, outcome: &str, reason: Option<&str>) -> AuditEventRow {
        let metadata = serde_json::json!({ "code": "KRT" });
        let event_hash = chain_hash(
            previous,
            "create_node",
            "service",
            outcome,
            reason,
            None,
            &metadata,
        );
        AuditEventRow {
            seq,
            id: Uuid::new_v4(),
            operation: "create_node".into(),
            actor: "service".into(),
            outcome: outcome.into(),
            reason: reason.map(str::to_string),
            node_id: None,
            metadata,
            previous_hash: previous.to_string(),
            event_hash,
            created_at: Utc::now(),
        }
    }

    fn chain(n: usize) -> Vec<AuditEventRow> {
        let mut rows: Vec<AuditEventRow> = Vec::new();
        for i in 0..n {
            let previous = rows
                .last()
                .map(|r| r.event_hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string());
            rows.push(row(i as i64 + 1, &previous, "ALLOWED", None));
        }
        rows
    }

    #[test]
    fn hash_is_hex_sha256_and_depends_on_every_field() {
        let meta = serde_json::json!({});
        let base = chain_hash(GENESIS_HASH, "op", "a", "ALLOWED", None, None, &meta);
        assert_eq!(base.len(), 64);
        assert!(base.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(
            base,
            chain_hash(GENESIS_HASH, "op", "a", "DENIED", Some("OUT_OF_JURISDICTION"), None, &meta)
        );
        assert_ne!(
            base,
            chain_hash(GENESIS_HASH, "op", "a", "ALLOWED", None, Some(Uuid::nil()), &meta)
        );
        // Field boundaries are separated.
        assert_ne!(
            chain_hash(GENESIS_HASH, "op", "ab", "ALLOWED", None, None, &meta),
            chain_hash(GENESIS_HASH, "opa", "b", "ALLOWED", None, None, &meta)
        );
    }

    #[test]
    fn intact_chain_verifies() {
        let rows = chain(5);
        let result = verify(&rows);
        assert_eq!(result.total_events, 5);
        assert!(result.is_valid());
        assert!(verify(&[]).is_valid());
    }

    #[test]
    fn edited_event_is_detected() {
        let mut rows = chain(3);
        rows[1].actor = "someone-else".into();
        let result = verify(&rows);
        assert_eq!(result.tampered, 1);
        assert_eq!(result.broken_links, 0);
        assert!(!result.is_valid());
    }

    #[test]
    fn removed_event_breaks_the_link() {
        let mut rows = chain(3);
        rows.remove(1);
        let result = verify(&rows);
        assert_eq!(result.broken_links, 1);
        assert_eq!(result.tampered, 0);
    }

    #[test]
    fn denied_outcome_carries_reason() {
        let outcome = Outcome::Denied(DenialReason::HasBoundUsers);
        assert_eq!(outcome.as_str(), "DENIED");
        assert_eq!(outcome.reason(), Some("HAS_BOUND_USERS"));
        assert_eq!(Outcome::Allowed.reason(), None);
    }
}
