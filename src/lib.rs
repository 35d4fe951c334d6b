pub mod api;
pub mod config;
pub mod error;
pub mod geometry;
pub mod guillotine;
pub mod maxrects;
pub mod objective;
pub mod packing;
pub mod render;
pub mod skyline;
pub mod solution;
pub mod solver;
pub mod types;
pub mod verify;

use error::{PackingFailure, UnplacedInstance};
use geometry::Problem;
use solution::SolutionSet;
use solver::Solver;
use types::{Item, OptimizationConfig, StockSheet};

/// Packs `items` onto `stock` and returns the best layout found within the
/// configured time budget.
///
/// Inputs are expected to be validated already (see [`api::validate`]); this
/// only rejects what it discovers while normalizing geometry. Items that fit
/// no empty sheet are reported before any attempt runs. A best result that
/// still leaves instances unplaced is reported as [`PackingFailure::Unplaced`].
pub fn optimize(
    stock: &[StockSheet],
    items: &[Item],
    config: &OptimizationConfig,
) -> Result<SolutionSet, PackingFailure> {
    let engine = config
        .engine
        .resolve(config.mode)
        .map_err(PackingFailure::InvalidConfig)?;
    let problem = Problem::new(stock, items, config.spacing_mm, config.unit_scale)?;

    let infeasible = problem.infeasible_items(items);
    if !infeasible.is_empty() {
        tracing::info!(count = infeasible.len(), "items fit no stock sheet");
        return Err(PackingFailure::InfeasibleItems { items: infeasible });
    }

    let mut solver = Solver::new(&problem, items, engine, config);
    let outcome = solver.solve()?;

    if !outcome.result.unplaced.is_empty() {
        let mut left: Vec<&geometry::Instance> = outcome
            .result
            .unplaced
            .iter()
            .map(|&i| &problem.instances[i])
            .collect();
        left.sort_by_key(|inst| (inst.item, inst.instance));
        return Err(PackingFailure::Unplaced {
            instances: left
                .into_iter()
                .map(|inst| UnplacedInstance {
                    item_id: items[inst.item].id.clone(),
                    instance: inst.instance,
                })
                .collect(),
        });
    }

    Ok(solution::build(
        &problem,
        stock,
        items,
        config.mode,
        config.objective,
        engine,
        &outcome,
    ))
}
