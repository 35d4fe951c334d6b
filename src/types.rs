use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Width/height pair in normalized integer units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn rotated(&self) -> Self {
        Self {
            w: self.h,
            h: self.w,
        }
    }

    pub fn fits_in(&self, other: &Rect) -> bool {
        self.w <= other.w && self.h <= other.h
    }

    pub fn max_side(&self) -> u32 {
        self.w.max(self.h)
    }

    pub fn is_square(&self) -> bool {
        self.w == self.h
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Unusable margins around a sheet, in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trim {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Trim {
    pub fn uniform(mm: f64) -> Self {
        Self {
            left: mm,
            right: mm,
            top: mm,
            bottom: mm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockSheet {
    pub id: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub qty: u32,
    pub trim: Trim,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub qty: u32,
    pub rotation: Rotation,
    pub pattern_direction: PatternDirection,
}

impl Item {
    /// Whether a 90° turn is ever legal for this item. Directional patterns pin the
    /// orientation regardless of the rotation rule.
    pub fn may_rotate(&self) -> bool {
        self.rotation == Rotation::Allow90 && self.pattern_direction == PatternDirection::None
    }
}

macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $name:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name $(| $alias)* => Ok($ty::$variant),)+
                    _ => Err(format!(
                        "invalid {} '{}', expected one of: {}",
                        stringify!($ty),
                        s,
                        [$($name),+].join(", ")
                    )),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "forbid")]
    Forbid,
    #[serde(rename = "allow_90")]
    Allow90,
}

named_enum!(Rotation {
    Forbid => "forbid",
    Allow90 => "allow_90" | "allow-90" | "rot",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDirection {
    #[default]
    None,
    AlongWidth,
    AlongHeight,
}

named_enum!(PatternDirection {
    None => "none",
    AlongWidth => "along_width" | "along-width",
    AlongHeight => "along_height" | "along-height",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Guillotine,
    Nested,
}

named_enum!(Mode {
    Guillotine => "guillotine",
    Nested => "nested",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packer {
    #[serde(rename = "guillotine")]
    Guillotine,
    #[serde(rename = "maxrects")]
    MaxRects,
    #[serde(rename = "skyline")]
    Skyline,
}

named_enum!(Packer {
    Guillotine => "guillotine",
    MaxRects => "maxrects",
    Skyline => "skyline",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinSelect {
    #[default]
    BestFit,
    FirstFit,
}

named_enum!(BinSelect {
    BestFit => "best_fit" | "best-fit",
    FirstFit => "first_fit" | "first-fit",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "area_desc")]
    AreaDesc,
    #[serde(rename = "maxside_desc")]
    MaxSideDesc,
    #[serde(rename = "none")]
    None,
}

named_enum!(SortOrder {
    AreaDesc => "area_desc" | "area-desc",
    MaxSideDesc => "maxside_desc" | "maxside-desc",
    None => "none",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MinWaste,
    MinSheets,
}

named_enum!(Objective {
    MinWaste => "min_waste" | "min-waste",
    MinSheets => "min_sheets" | "min-sheets",
});

/// Which leftover strip of a guillotine split receives the full edge length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuillotineSplit {
    #[default]
    ShorterLeftoverAxis,
    LongerLeftoverAxis,
}

/// Engine choices as requested; unset fields fall back to mode defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSelection {
    #[serde(default)]
    pub packer: Option<Packer>,
    #[serde(default)]
    pub bin_select: Option<BinSelect>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

impl EngineSelection {
    pub fn resolve(&self, mode: Mode) -> Result<EngineParams, String> {
        let default_packer = match mode {
            Mode::Guillotine => Packer::Guillotine,
            Mode::Nested => Packer::MaxRects,
        };
        let packer = self.packer.unwrap_or(default_packer);

        match (mode, packer) {
            (Mode::Guillotine, p) if p != Packer::Guillotine => {
                return Err("engine.packer must be 'guillotine' for mode='guillotine'".to_string());
            }
            (Mode::Nested, Packer::Guillotine) => {
                return Err("engine.packer must not be 'guillotine' for mode='nested'".to_string());
            }
            _ => {}
        }

        Ok(EngineParams {
            packer,
            bin_select: self.bin_select.unwrap_or_default(),
            sort: self.sort.unwrap_or_default(),
            split: GuillotineSplit::default(),
        })
    }
}

/// Fully resolved engine parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineParams {
    pub packer: Packer,
    pub bin_select: BinSelect,
    pub sort: SortOrder,
    #[serde(skip)]
    pub split: GuillotineSplit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub mode: Mode,
    pub engine: EngineSelection,
    pub objective: Objective,
    pub spacing_mm: f64,
    pub unit_scale: u32,
    pub time_limit_ms: u64,
    pub restarts: u32,
    pub seed: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            engine: EngineSelection::default(),
            objective: Objective::default(),
            spacing_mm: 0.0,
            unit_scale: 100,
            time_limit_ms: 800,
            restarts: 5,
            seed: None,
        }
    }
}
