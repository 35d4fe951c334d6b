//! JSON request/response schema shared by the HTTP service and the CLI.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::Settings;
use crate::error::{FailureKind, PackingFailure};
use crate::render;
use crate::solution::{SheetSolution, SolutionSet};
use crate::types::{
    EngineParams, EngineSelection, Item, Mode, Objective, OptimizationConfig, PatternDirection,
    Rotation, StockSheet, Trim,
};

pub const MAX_STOCK_ENTRIES: usize = 50;
pub const MIN_TIME_LIMIT_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    #[serde(rename = "mm")]
    Mm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizeRequest {
    pub units: Units,
    pub params: Params,
    pub stock: Vec<StockRequest>,
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub spacing_mm: f64,
    /// Applied to every stock sheet.
    #[serde(default)]
    pub trim_mm: Trim,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub restarts: Option<u32>,
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub engine: EngineSelection,
    #[serde(default)]
    pub unit_scale: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StockRequest {
    pub id: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemRequest {
    pub id: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub qty: u32,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub pattern_direction: PatternDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub mode: Mode,
    pub objective: Objective,
    pub used_stock_count: u64,
    pub total_waste_area_mm2: f64,
    pub waste_percent: f64,
    pub time_ms: u64,
    pub restarts_used: u32,
    pub seed: u64,
    pub engine: EngineParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifacts {
    pub svg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeResponse {
    pub status: &'static str,
    pub summary: Summary,
    pub solutions: Vec<SheetSolution>,
    pub artifacts: Artifacts,
}

impl From<SolutionSet> for OptimizeResponse {
    fn from(set: SolutionSet) -> Self {
        let svg = render::render_svg(&set.sheets);
        OptimizeResponse {
            status: "ok",
            summary: Summary {
                mode: set.mode,
                objective: set.objective,
                used_stock_count: set.used_stock_count,
                total_waste_area_mm2: set.total_waste_area_mm2,
                waste_percent: set.waste_percent,
                time_ms: set.elapsed_ms,
                restarts_used: set.restarts_used,
                seed: set.seed_used,
                engine: set.engine,
            },
            solutions: set.sheets,
            artifacts: Artifacts { svg },
        }
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    Constraint {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    Timeout {
        message: String,
        details: Option<Value>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Constraint { .. } => StatusCode::BAD_REQUEST,
            ApiError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Constraint { .. } => "CONSTRAINT_ERROR",
            ApiError::Timeout { .. } => "TIMEOUT",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// `{"status":"error","error_code":..,"message":..,"details"?:..}`. Internal
    /// detail never leaves the process.
    pub fn payload(&self) -> Value {
        let (message, details) = match self {
            ApiError::Validation { message, details }
            | ApiError::Constraint { message, details }
            | ApiError::Timeout { message, details } => (message.as_str(), details.as_ref()),
            ApiError::Internal(_) => ("Internal error", None),
        };
        let mut body = json!({
            "status": "error",
            "error_code": self.code(),
            "message": message,
        });
        if let Some(details) = details {
            body["details"] = details.clone();
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(reason) = &self {
            tracing::error!(%reason, "internal error");
        }
        (self.status(), Json(self.payload())).into_response()
    }
}

impl From<PackingFailure> for ApiError {
    fn from(failure: PackingFailure) -> Self {
        let details = failure.details();
        match failure.kind() {
            FailureKind::Constraint | FailureKind::InfeasibleItem => ApiError::Validation {
                message: failure.to_string(),
                details,
            },
            FailureKind::PartialPlacement => ApiError::Constraint {
                message: "Unable to place all items with provided stock".to_string(),
                details,
            },
            FailureKind::Timeout => ApiError::Timeout {
                message: "Time limit exceeded".to_string(),
                details,
            },
            FailureKind::Internal => ApiError::Internal(failure.to_string()),
        }
    }
}

/// A request checked against the schema limits and converted to core types.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub stock: Vec<StockSheet>,
    pub items: Vec<Item>,
    pub config: OptimizationConfig,
}

pub fn parse(body: &[u8]) -> Result<OptimizeRequest, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Validation {
        message: "Request validation failed".to_string(),
        details: Some(json!({ "errors": [{ "field": "body", "message": e.to_string() }] })),
    })
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Checks every schema rule and reports all violations at once.
pub fn validate(req: &OptimizeRequest, settings: &Settings) -> Result<Job, ApiError> {
    let mut errors: Vec<FieldError> = Vec::new();
    let mut reject = |field: String, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        })
    };

    let p = &req.params;
    if !non_negative(p.spacing_mm) {
        reject("params.spacing_mm".into(), "must be >= 0");
    }
    let trim = p.trim_mm;
    for (side, v) in [
        ("left", trim.left),
        ("right", trim.right),
        ("top", trim.top),
        ("bottom", trim.bottom),
    ] {
        if !non_negative(v) {
            reject(format!("params.trim_mm.{side}"), "must be >= 0");
        }
    }
    let time_limit_ms = p.time_limit_ms.unwrap_or(settings.default_time_limit_ms);
    if time_limit_ms < MIN_TIME_LIMIT_MS {
        reject("params.time_limit_ms".into(), "must be >= 50");
    }
    let restarts = p.restarts.unwrap_or(settings.default_restarts);
    if restarts < 1 {
        reject("params.restarts".into(), "must be >= 1");
    }
    let unit_scale = p.unit_scale.unwrap_or(settings.default_unit_scale);
    if unit_scale == 0 {
        reject("params.unit_scale".into(), "must be > 0");
    }
    if let Err(message) = p.engine.resolve(p.mode) {
        reject("params.engine.packer".into(), &message);
    }

    if req.stock.is_empty() || req.stock.len() > MAX_STOCK_ENTRIES {
        reject("stock".into(), "must contain between 1 and 50 entries");
    }
    for (i, s) in req.stock.iter().enumerate() {
        if s.id.is_empty() {
            reject(format!("stock[{i}].id"), "must not be empty");
        }
        if !positive(s.width_mm) {
            reject(format!("stock[{i}].width_mm"), "must be > 0");
        }
        if !positive(s.height_mm) {
            reject(format!("stock[{i}].height_mm"), "must be > 0");
        }
        if s.qty < 1 {
            reject(format!("stock[{i}].qty"), "must be >= 1");
        }
        if trim.left + trim.right >= s.width_mm || trim.top + trim.bottom >= s.height_mm {
            reject(format!("stock[{i}]"), "trim leaves no usable area");
        }
    }

    if req.items.is_empty() {
        reject("items".into(), "must contain at least 1 entry");
    }
    let mut total_instances: u64 = 0;
    for (i, item) in req.items.iter().enumerate() {
        if item.id.is_empty() {
            reject(format!("items[{i}].id"), "must not be empty");
        }
        if !positive(item.width_mm) {
            reject(format!("items[{i}].width_mm"), "must be > 0");
        }
        if !positive(item.height_mm) {
            reject(format!("items[{i}].height_mm"), "must be > 0");
        }
        if item.qty < 1 {
            reject(format!("items[{i}].qty"), "must be >= 1");
        }
        if item.rotation == Rotation::Allow90 && item.pattern_direction != PatternDirection::None {
            reject(
                format!("items[{i}].rotation"),
                "allow_90 conflicts with a pattern direction",
            );
        }
        total_instances += item.qty as u64;
    }
    let limit = settings.instance_limit();
    if total_instances > limit {
        reject(
            "items".into(),
            &format!("total instances {total_instances} exceeds limit {limit}"),
        );
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation {
            message: "Request validation failed".to_string(),
            details: Some(json!({ "errors": errors })),
        });
    }

    Ok(Job {
        stock: req
            .stock
            .iter()
            .map(|s| StockSheet {
                id: s.id.clone(),
                width_mm: s.width_mm,
                height_mm: s.height_mm,
                qty: s.qty,
                trim,
            })
            .collect(),
        items: req
            .items
            .iter()
            .map(|i| Item {
                id: i.id.clone(),
                width_mm: i.width_mm,
                height_mm: i.height_mm,
                qty: i.qty,
                rotation: i.rotation,
                pattern_direction: i.pattern_direction,
            })
            .collect(),
        config: OptimizationConfig {
            mode: p.mode,
            engine: p.engine,
            objective: p.objective,
            spacing_mm: p.spacing_mm,
            unit_scale,
            time_limit_ms,
            restarts,
            seed: p.seed,
        },
    })
}

/// Validates, optimizes and renders one request.
pub fn run(req: &OptimizeRequest, settings: &Settings) -> Result<OptimizeResponse, ApiError> {
    let job = validate(req, settings)?;
    tracing::info!(
        stock = job.stock.len(),
        items = job.items.len(),
        mode = %job.config.mode,
        time_limit_ms = job.config.time_limit_ms,
        restarts = job.config.restarts,
        "optimize request"
    );
    let set = crate::optimize(&job.stock, &job.items, &job.config)?;
    Ok(set.into())
}
