//! Maps the winning integer-space layout back to millimetres.

use serde::Serialize;

use crate::geometry::{Problem, to_mm};
use crate::packing::PackedSheet;
use crate::solver::RunOutcome;
use crate::types::{EngineParams, Item, Mode, Objective, PatternDirection, StockSheet, Trim};

/// One part on a sheet. Coordinates are relative to the top-left corner of
/// the untrimmed sheet; x grows rightward and y downward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedItem {
    pub item_id: String,
    /// 1-based, per item.
    pub instance: u32,
    pub x_mm: f64,
    pub y_mm: f64,
    /// Extent as placed, so swapped when `rotated`.
    pub width_mm: f64,
    pub height_mm: f64,
    pub rotated: bool,
    pub pattern_direction: PatternDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSolution {
    pub stock_id: String,
    /// Position among the sheets opened from this stock id.
    pub index: u32,
    pub width_mm: f64,
    pub height_mm: f64,
    #[serde(rename = "trim_mm")]
    pub trim: Trim,
    pub placements: Vec<PlacedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionSet {
    pub mode: Mode,
    pub objective: Objective,
    pub used_stock_count: u64,
    pub total_waste_area_mm2: f64,
    pub waste_percent: f64,
    pub elapsed_ms: u64,
    pub restarts_used: u32,
    pub seed_used: u64,
    pub attempt_seeds: Vec<u64>,
    pub engine: EngineParams,
    pub sheets: Vec<SheetSolution>,
}

impl SolutionSet {
    pub fn placed_count(&self) -> usize {
        self.sheets.iter().map(|s| s.placements.len()).sum()
    }
}

fn sheet_solution(
    problem: &Problem,
    stock: &[StockSheet],
    items: &[Item],
    sheet: &PackedSheet,
) -> SheetSolution {
    let source = &stock[problem.sheets[sheet.spec].stock];
    let placements = sheet
        .placements
        .iter()
        .map(|p| {
            let inst = &problem.instances[p.instance];
            let item = &items[inst.item];
            let (width_mm, height_mm) = if p.rotated {
                (item.height_mm, item.width_mm)
            } else {
                (item.width_mm, item.height_mm)
            };
            PlacedItem {
                item_id: item.id.clone(),
                instance: inst.instance,
                x_mm: to_mm(p.x as u64, problem.scale) + source.trim.left,
                y_mm: to_mm(p.y as u64, problem.scale) + source.trim.top,
                width_mm,
                height_mm,
                rotated: p.rotated,
                pattern_direction: item.pattern_direction,
            }
        })
        .collect();

    SheetSolution {
        stock_id: source.id.clone(),
        index: sheet.ordinal,
        width_mm: source.width_mm,
        height_mm: source.height_mm,
        trim: source.trim,
        placements,
    }
}

/// Builds the caller-facing result from the scheduler's winner. Sheets keep
/// the order in which they were opened.
pub fn build(
    problem: &Problem,
    stock: &[StockSheet],
    items: &[Item],
    mode: Mode,
    objective: Objective,
    engine: EngineParams,
    outcome: &RunOutcome,
) -> SolutionSet {
    let sheets = outcome
        .result
        .sheets
        .iter()
        .filter(|s| !s.placements.is_empty())
        .map(|s| sheet_solution(problem, stock, items, s))
        .collect();

    let scale = problem.scale as f64;
    SolutionSet {
        mode,
        objective,
        used_stock_count: outcome.metrics.used_stock_count,
        total_waste_area_mm2: outcome.metrics.total_waste_area as f64 / (scale * scale),
        waste_percent: outcome.metrics.waste_percent(),
        elapsed_ms: outcome.elapsed.as_millis() as u64,
        restarts_used: outcome.restarts_used,
        seed_used: outcome.seed,
        attempt_seeds: outcome.attempt_seeds.clone(),
        engine,
        sheets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{Metrics, RankKey};
    use crate::packing::{PackingResult, Placement};
    use crate::types::{BinSelect, GuillotineSplit, Packer, Rect, Rotation, SortOrder};
    use std::time::Duration;

    fn fixture() -> (Vec<StockSheet>, Vec<Item>, Problem) {
        let stock = vec![StockSheet {
            id: "ply".into(),
            width_mm: 100.0,
            height_mm: 50.0,
            qty: 2,
            trim: Trim {
                left: 5.0,
                right: 0.0,
                top: 2.5,
                bottom: 0.0,
            },
        }];
        let items = vec![Item {
            id: "door".into(),
            width_mm: 30.0,
            height_mm: 10.5,
            qty: 2,
            rotation: Rotation::Allow90,
            pattern_direction: PatternDirection::None,
        }];
        let problem = Problem::new(&stock, &items, 0.0, 10).unwrap();
        (stock, items, problem)
    }

    fn outcome(problem: &Problem, result: PackingResult) -> RunOutcome {
        let metrics = Metrics::of(problem, &result);
        RunOutcome {
            rank: RankKey(0, metrics.total_waste_area, metrics.used_stock_count),
            metrics,
            result,
            attempt: 0,
            seed: 42,
            attempt_seeds: vec![7],
            restarts_used: 1,
            elapsed: Duration::from_millis(12),
        }
    }

    fn engine() -> EngineParams {
        EngineParams {
            packer: Packer::Guillotine,
            bin_select: BinSelect::BestFit,
            sort: SortOrder::AreaDesc,
            split: GuillotineSplit::default(),
        }
    }

    #[test]
    fn test_coordinates_shift_by_trim_and_rotation_swaps_extent() {
        let (stock, items, problem) = fixture();
        let result = PackingResult {
            sheets: vec![PackedSheet {
                spec: 0,
                ordinal: 0,
                placements: vec![
                    Placement {
                        instance: 0,
                        x: 0,
                        y: 0,
                        size: Rect::new(300, 105),
                        rotated: false,
                    },
                    Placement {
                        instance: 1,
                        x: 300,
                        y: 15,
                        size: Rect::new(105, 300),
                        rotated: true,
                    },
                ],
            }],
            unplaced: vec![],
        };
        let set = build(
            &problem,
            &stock,
            &items,
            Mode::Guillotine,
            Objective::MinWaste,
            engine(),
            &outcome(&problem, result),
        );

        assert_eq!(set.sheets.len(), 1);
        let sheet = &set.sheets[0];
        assert_eq!(sheet.stock_id, "ply");
        assert_eq!((sheet.width_mm, sheet.height_mm), (100.0, 50.0));

        let first = &sheet.placements[0];
        assert_eq!((first.x_mm, first.y_mm), (5.0, 2.5));
        assert_eq!((first.width_mm, first.height_mm), (30.0, 10.5));
        assert_eq!(first.instance, 1);

        let second = &sheet.placements[1];
        assert!(second.rotated);
        assert_eq!((second.x_mm, second.y_mm), (35.0, 4.0));
        assert_eq!((second.width_mm, second.height_mm), (10.5, 30.0));
        assert_eq!(second.instance, 2);

        // usable 95 x 47.5 = 4512.5 mm2, parts 2 x 315 mm2
        assert_eq!(set.total_waste_area_mm2, 3882.5);
        assert_eq!(set.seed_used, 42);
        assert_eq!(set.elapsed_ms, 12);
        assert_eq!(set.placed_count(), 2);
    }

    #[test]
    fn test_sheet_index_counts_within_stock_id() {
        let (stock, items, problem) = fixture();
        let on = |ordinal, instance| PackedSheet {
            spec: 0,
            ordinal,
            placements: vec![Placement {
                instance,
                x: 0,
                y: 0,
                size: Rect::new(300, 105),
                rotated: false,
            }],
        };
        let result = PackingResult {
            sheets: vec![on(0, 0), on(1, 1)],
            unplaced: vec![],
        };
        let set = build(
            &problem,
            &stock,
            &items,
            Mode::Nested,
            Objective::MinSheets,
            engine(),
            &outcome(&problem, result),
        );
        let indices: Vec<u32> = set.sheets.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(set.used_stock_count, 2);
    }
}
