use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::ensure_non_negative;
use ims_core::{AggregateRoot, AlertId, DomainError, DomainResult, ProductId, WarehouseId};

use crate::reorder::ReorderPolicy;

/// Alert status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// ACTIVE and ACKNOWLEDGED alerts are still open.
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl core::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "ACTIVE"),
            AlertStatus::Acknowledged => write!(f, "ACKNOWLEDGED"),
            AlertStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Input for raising a low-stock alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaiseAlert {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub threshold: i64,
    pub current_stock: i64,
    pub unit_price_cents: u64,
    pub notes: Option<String>,
}

/// Aggregate root: Alert.
///
/// # Invariants
/// - RESOLVED is terminal.
/// - Transitions only move forward: ACTIVE -> ACKNOWLEDGED -> RESOLVED, or ACTIVE -> RESOLVED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    id: AlertId,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    threshold: i64,
    current_stock: i64,
    status: AlertStatus,
    suggested_reorder_quantity: i64,
    optimal_stock_level: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Alert {
    pub fn raise(
        id: AlertId,
        input: RaiseAlert,
        policy: &ReorderPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_non_negative("threshold", input.threshold)?;
        ensure_non_negative("current stock", input.current_stock)?;
        let suggestion = policy.suggest(input.threshold, input.unit_price_cents, input.current_stock);

        Ok(Self {
            id,
            product_id: input.product_id,
            warehouse_id: input.warehouse_id,
            threshold: input.threshold,
            current_stock: input.current_stock,
            status: AlertStatus::Active,
            suggested_reorder_quantity: suggestion.suggested_reorder_quantity,
            optimal_stock_level: suggestion.optimal_stock_level,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> AlertId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn status(&self) -> AlertStatus {
        self.status
    }

    pub fn suggested_reorder_quantity(&self) -> i64 {
        self.suggested_reorder_quantity
    }

    pub fn optimal_stock_level(&self) -> i64 {
        self.optimal_stock_level
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Move to `next`. Returns `false` when already in that state.
    pub fn transition(&mut self, next: AlertStatus, now: DateTime<Utc>) -> DomainResult<bool> {
        self.ensure_not_resolved()?;
        if self.status == next {
            return Ok(false);
        }
        match (self.status, next) {
            (AlertStatus::Active, AlertStatus::Acknowledged)
            | (AlertStatus::Active, AlertStatus::Resolved)
            | (AlertStatus::Acknowledged, AlertStatus::Resolved) => {
                self.status = next;
                self.updated_at = now;
                Ok(true)
            }
            (from, to) => Err(DomainError::invalid_state(format!(
                "alert cannot move from {from} to {to}"
            ))),
        }
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != AlertStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "only ACTIVE alerts can be acknowledged (current: {})",
                self.status
            )));
        }
        self.transition(AlertStatus::Acknowledged, now).map(|_| ())
    }

    /// Resolve and append `note` to the existing notes.
    pub fn resolve(&mut self, note: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(AlertStatus::Resolved, now)?;
        self.append_note(note);
        Ok(())
    }

    /// Replace the notes when `notes` is non-blank.
    pub fn replace_notes(&mut self, notes: Option<String>) {
        if let Some(n) = notes.filter(|n| !n.trim().is_empty()) {
            self.notes = Some(n);
        }
    }

    pub fn append_note(&mut self, note: &str) {
        if note.trim().is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }

    /// Refresh the stock snapshot of an open alert and resize its suggestion.
    pub fn refresh_stock(
        &mut self,
        current_stock: i64,
        policy: &ReorderPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_not_resolved()?;
        ensure_non_negative("current stock", current_stock)?;
        self.current_stock = current_stock;
        self.suggested_reorder_quantity =
            policy.suggested_reorder_quantity(self.optimal_stock_level, current_stock);
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status == AlertStatus::Active {
            return Err(DomainError::invalid_state(
                "ACTIVE alerts cannot be deleted; acknowledge or resolve first",
            ));
        }
        Ok(())
    }

    fn ensure_not_resolved(&self) -> DomainResult<()> {
        if self.status == AlertStatus::Resolved {
            return Err(DomainError::invalid_state("resolved alerts cannot be updated"));
        }
        Ok(())
    }
}

impl AggregateRoot for Alert {
    type Id = AlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
