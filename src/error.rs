use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// An item that cannot fit an empty sheet of any stock definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfeasibleItem {
    pub item_id: String,
    /// Footprint including spacing, in mm.
    pub required_width_mm: f64,
    pub required_height_mm: f64,
    pub rotation_allowed: bool,
    /// Largest usable rectangle on offer, in mm.
    pub max_usable_width_mm: f64,
    pub max_usable_height_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnplacedInstance {
    pub item_id: String,
    pub instance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Constraint,
    InfeasibleItem,
    PartialPlacement,
    Timeout,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackingFailure {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("stock {stock_id} has no usable area after trim ({usable_width_mm}x{usable_height_mm} mm)")]
    DegenerateSheet {
        stock_id: String,
        usable_width_mm: f64,
        usable_height_mm: f64,
    },

    #[error("{} cannot fit into any stock", describe_items(.items))]
    InfeasibleItems { items: Vec<InfeasibleItem> },

    #[error("unable to place all items with provided stock ({} instance(s) left over)", .instances.len())]
    Unplaced { instances: Vec<UnplacedInstance> },

    #[error("time limit of {time_limit_ms}ms exceeded before any attempt completed")]
    Timeout { time_limit_ms: u64, elapsed_ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_items(items: &[InfeasibleItem]) -> String {
    let ids: Vec<&str> = items.iter().map(|i| i.item_id.as_str()).collect();
    match ids.as_slice() {
        [one] => format!("item {one}"),
        many => format!("items {}", many.join(", ")),
    }
}

impl PackingFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            PackingFailure::InvalidConfig(_) | PackingFailure::DegenerateSheet { .. } => {
                FailureKind::Constraint
            }
            PackingFailure::InfeasibleItems { .. } => FailureKind::InfeasibleItem,
            PackingFailure::Unplaced { .. } => FailureKind::PartialPlacement,
            PackingFailure::Timeout { .. } => FailureKind::Timeout,
            PackingFailure::Internal(_) => FailureKind::Internal,
        }
    }

    /// Structured detail for callers formatting a user-facing error.
    pub fn details(&self) -> Option<Value> {
        match self {
            PackingFailure::InvalidConfig(_) | PackingFailure::Internal(_) => None,
            PackingFailure::DegenerateSheet {
                stock_id,
                usable_width_mm,
                usable_height_mm,
            } => Some(json!({
                "stock_id": stock_id,
                "usable_width_mm": usable_width_mm,
                "usable_height_mm": usable_height_mm,
            })),
            PackingFailure::InfeasibleItems { items } => Some(json!({ "items": items })),
            PackingFailure::Unplaced { instances } => Some(json!({
                "unplaced_count": instances.len(),
                "unplaced": instances,
            })),
            PackingFailure::Timeout {
                time_limit_ms,
                elapsed_ms,
            } => Some(json!({
                "time_limit_ms": time_limit_ms,
                "elapsed_ms": elapsed_ms,
            })),
        }
    }
}
