//! Multi-start scheduler: splits the time budget across independent attempts
//! and keeps the best-ranked result.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::PackingFailure;
use crate::geometry::Problem;
use crate::objective::{Metrics, RankKey};
use crate::packing::{self, Aborted, Deadline, PackingResult};
use crate::types::{EngineParams, Item, Mode, Objective, OptimizationConfig};
use crate::verify;

/// Attempts are never planned with less than this much time each.
pub const MIN_ATTEMPT_BUDGET_MS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    TimedOut,
}

/// The winning attempt and how the run got there.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: PackingResult,
    pub metrics: Metrics,
    pub rank: RankKey,
    /// Index of the winning attempt.
    pub attempt: usize,
    pub seed: u64,
    /// Derived seed of every attempt that was started, in order.
    pub attempt_seeds: Vec<u64>,
    pub restarts_used: u32,
    pub elapsed: Duration,
}

/// SplitMix64 finaliser; decorrelates consecutive seeds.
pub fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn attempt_seed(seed: u64, attempt: usize) -> u64 {
    splitmix64(seed.wrapping_add(attempt as u64))
}

/// How many attempts fit the budget at `MIN_ATTEMPT_BUDGET_MS` each.
pub fn planned_attempts(restarts: u32, time_limit_ms: u64) -> u32 {
    let restarts = restarts.max(1);
    if time_limit_ms / restarts as u64 >= MIN_ATTEMPT_BUDGET_MS {
        return restarts;
    }
    let affordable = (time_limit_ms / MIN_ATTEMPT_BUDGET_MS).max(1);
    affordable.min(restarts as u64) as u32
}

/// Equal shares of `total_ms`; the remainder goes one unit each to the
/// earliest attempts.
pub fn split_budget(total_ms: u64, attempts: u32) -> Vec<u64> {
    let n = attempts.max(1) as u64;
    let base = total_ms / n;
    let extra = total_ms % n;
    (0..n).map(|i| base + u64::from(i < extra)).collect()
}

type PackFn = fn(&Problem, &[usize], &EngineParams, &Deadline) -> Result<PackingResult, Aborted>;
type CheckFn = fn(&Problem, &PackingResult, bool) -> Result<(), String>;

/// The two stages every attempt runs.
#[derive(Clone, Copy)]
struct Stages {
    pack: PackFn,
    check: CheckFn,
}

impl Default for Stages {
    fn default() -> Self {
        Self {
            pack: packing::pack,
            check: verify::check,
        }
    }
}

struct Best {
    result: PackingResult,
    metrics: Metrics,
    rank: RankKey,
    attempt: usize,
}

pub struct Solver<'a> {
    problem: &'a Problem,
    items: &'a [Item],
    engine: EngineParams,
    mode: Mode,
    objective: Objective,
    time_limit_ms: u64,
    restarts: u32,
    seed: u64,
    state: RunState,
    stages: Stages,
}

impl<'a> Solver<'a> {
    pub fn new(
        problem: &'a Problem,
        items: &'a [Item],
        engine: EngineParams,
        config: &OptimizationConfig,
    ) -> Self {
        Self {
            problem,
            items,
            engine,
            mode: config.mode,
            objective: config.objective,
            time_limit_ms: config.time_limit_ms,
            restarts: config.restarts,
            seed: config.seed.unwrap_or_else(rand::random),
            state: RunState::Idle,
            stages: Stages::default(),
        }
    }

    #[cfg(test)]
    fn with_stages(mut self, pack: PackFn, check: CheckFn) -> Self {
        self.stages = Stages { pack, check };
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "solver state");
        self.state = next;
    }

    pub fn solve(&mut self) -> Result<RunOutcome, PackingFailure> {
        self.transition(RunState::Running);
        let start = Instant::now();
        let total = Duration::from_millis(self.time_limit_ms);
        let attempts = planned_attempts(self.restarts, self.time_limit_ms);
        let budgets = split_budget(self.time_limit_ms, attempts);

        tracing::info!(
            instances = self.problem.instances.len(),
            packer = %self.engine.packer,
            bin_select = %self.engine.bin_select,
            sort = %self.engine.sort,
            objective = %self.objective,
            seed = self.seed,
            attempts,
            time_limit_ms = self.time_limit_ms,
            "optimization started"
        );

        let mut best: Option<Best> = None;
        let mut attempt_seeds = Vec::with_capacity(budgets.len());
        let mut inconsistent: Option<String> = None;

        for (i, &budget_ms) in budgets.iter().enumerate() {
            let attempt_start = Instant::now();
            if attempt_start.duration_since(start) >= total {
                tracing::debug!(attempt = i, "time budget spent, skipping remaining attempts");
                break;
            }

            let seed = attempt_seed(self.seed, i);
            attempt_seeds.push(seed);

            let deadline =
                Deadline::new((attempt_start + Duration::from_millis(budget_ms)).min(start + total));
            let mut rng = StdRng::seed_from_u64(seed);
            let rng = if i == 0 { None } else { Some(&mut rng) };
            let order = packing::order_instances(self.problem, self.items, self.engine.sort, rng);

            let result = match (self.stages.pack)(self.problem, &order, &self.engine, &deadline) {
                Ok(result) => result,
                Err(aborted) => {
                    tracing::warn!(
                        attempt = i,
                        seed,
                        budget_ms,
                        placed = aborted.placed,
                        "attempt exceeded its time budget"
                    );
                    continue;
                }
            };

            let guillotine = self.mode == Mode::Guillotine;
            if let Err(reason) = (self.stages.check)(self.problem, &result, guillotine) {
                tracing::error!(attempt = i, seed, %reason, "attempt produced an invalid layout");
                inconsistent = Some(reason);
                continue;
            }

            let metrics = Metrics::of(self.problem, &result);
            let rank = self.objective.rank(&metrics);
            tracing::debug!(
                attempt = i,
                seed,
                sheets = metrics.used_stock_count,
                waste = metrics.total_waste_area,
                unplaced = metrics.unplaced_count,
                elapsed_ms = attempt_start.elapsed().as_millis() as u64,
                "attempt finished"
            );

            if best.as_ref().is_none_or(|b| rank < b.rank) {
                best = Some(Best {
                    result,
                    metrics,
                    rank,
                    attempt: i,
                });
            }
        }

        let elapsed = start.elapsed();
        let restarts_used = attempt_seeds.len() as u32;

        let Some(best) = best else {
            if let Some(reason) = inconsistent {
                self.transition(RunState::Completed);
                return Err(PackingFailure::Internal(reason));
            }
            self.transition(RunState::TimedOut);
            tracing::warn!(
                restarts_used,
                elapsed_ms = elapsed.as_millis() as u64,
                "no attempt finished within the time limit"
            );
            return Err(PackingFailure::Timeout {
                time_limit_ms: self.time_limit_ms,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        };

        self.transition(RunState::Completed);
        tracing::info!(
            attempt = best.attempt,
            restarts_used,
            sheets = best.metrics.used_stock_count,
            waste_percent = best.metrics.waste_percent(),
            unplaced = best.metrics.unplaced_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "optimization finished"
        );

        Ok(RunOutcome {
            result: best.result,
            metrics: best.metrics,
            rank: best.rank,
            attempt: best.attempt,
            seed: self.seed,
            attempt_seeds,
            restarts_used,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineSelection, PatternDirection, Rotation, StockSheet, Trim};
    use std::cell::Cell;

    thread_local! {
        static PACK_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    fn abort_first_attempt(
        problem: &Problem,
        order: &[usize],
        params: &EngineParams,
        deadline: &Deadline,
    ) -> Result<PackingResult, Aborted> {
        let call = PACK_CALLS.with(|c| c.replace(c.get() + 1));
        if call == 0 {
            return Err(Aborted { placed: 0 });
        }
        packing::pack(problem, order, params, deadline)
    }

    fn always_abort(
        _: &Problem,
        _: &[usize],
        _: &EngineParams,
        _: &Deadline,
    ) -> Result<PackingResult, Aborted> {
        Err(Aborted { placed: 0 })
    }

    fn reject_layout(_: &Problem, _: &PackingResult, _: bool) -> Result<(), String> {
        Err("sheet 0: forced rejection".to_string())
    }

    fn slow_check(problem: &Problem, result: &PackingResult, guillotine: bool) -> Result<(), String> {
        std::thread::sleep(Duration::from_millis(350));
        verify::check(problem, result, guillotine)
    }

    fn items() -> Vec<Item> {
        [(300.0, 200.0, 4), (150.0, 120.0, 7), (90.0, 60.0, 9)]
            .iter()
            .enumerate()
            .map(|(i, &(w, h, qty))| Item {
                id: format!("part{i}"),
                width_mm: w,
                height_mm: h,
                qty,
                rotation: Rotation::Allow90,
                pattern_direction: PatternDirection::None,
            })
            .collect()
    }

    fn problem(items: &[Item]) -> Problem {
        let stock = [StockSheet {
            id: "board".into(),
            width_mm: 600.0,
            height_mm: 400.0,
            qty: 10,
            trim: Trim::default(),
        }];
        Problem::new(&stock, items, 1.0, 10).unwrap()
    }

    fn config(mode: Mode, restarts: u32, seed: Option<u64>) -> OptimizationConfig {
        OptimizationConfig {
            mode,
            time_limit_ms: 60_000,
            restarts,
            seed,
            ..Default::default()
        }
    }

    fn solver<'a>(problem: &'a Problem, items: &'a [Item], restarts: u32, seed: u64) -> Solver<'a> {
        let engine = EngineSelection::default().resolve(Mode::Nested).unwrap();
        Solver::new(problem, items, engine, &config(Mode::Nested, restarts, Some(seed)))
    }

    #[test]
    fn test_split_budget_spreads_remainder_first() {
        assert_eq!(split_budget(10, 3), vec![4, 3, 3]);
        assert_eq!(split_budget(900, 3), vec![300, 300, 300]);
        assert_eq!(split_budget(5, 1), vec![5]);
    }

    #[test]
    fn test_planned_attempts_keep_minimum_slice() {
        assert_eq!(planned_attempts(5, 800), 5);
        assert_eq!(planned_attempts(10, 100), 3);
        assert_eq!(planned_attempts(4, 1), 1);
        assert_eq!(planned_attempts(0, 500), 1);
    }

    #[test]
    fn test_attempt_seeds_depend_only_on_seed_and_index() {
        assert_eq!(attempt_seed(12345, 2), attempt_seed(12345, 2));
        assert_ne!(attempt_seed(12345, 0), attempt_seed(12345, 1));
        assert_eq!(attempt_seed(u64::MAX, 1), splitmix64(0));
    }

    #[test]
    fn test_solve_is_reproducible() {
        let items = items();
        let problem = problem(&items);
        let a = solver(&problem, &items, 4, 99).solve().unwrap();
        let b = solver(&problem, &items, 4, 99).solve().unwrap();
        assert_eq!(a.result, b.result);
        assert_eq!(a.attempt_seeds, b.attempt_seeds);
        assert_eq!(a.restarts_used, 4);
        assert!(a.result.unplaced.is_empty());
    }

    #[test]
    fn test_more_restarts_never_rank_worse() {
        let items = items();
        let problem = problem(&items);
        let mut previous: Option<RankKey> = None;
        for restarts in 1..=6 {
            let outcome = solver(&problem, &items, restarts, 7).solve().unwrap();
            if let Some(prev) = previous {
                assert!(outcome.rank <= prev, "restarts={restarts}");
            }
            previous = Some(outcome.rank);
        }
    }

    #[test]
    fn test_state_moves_to_completed() {
        let items = items();
        let problem = problem(&items);
        let mut s = solver(&problem, &items, 1, 1);
        assert_eq!(s.state(), RunState::Idle);
        s.solve().unwrap();
        assert_eq!(s.state(), RunState::Completed);
    }

    #[test]
    fn test_generated_seed_is_reported() {
        let items = items();
        let problem = problem(&items);
        let engine = EngineSelection::default().resolve(Mode::Guillotine).unwrap();
        let cfg = OptimizationConfig {
            objective: Objective::MinSheets,
            ..config(Mode::Guillotine, 2, None)
        };
        let mut s = Solver::new(&problem, &items, engine, &cfg);
        let outcome = s.solve().unwrap();
        assert_eq!(outcome.seed, s.seed());
        assert_eq!(outcome.attempt_seeds[1], attempt_seed(s.seed(), 1));
    }

    #[test]
    fn test_spent_budget_skips_remaining_attempts() {
        let items = items();
        let problem = problem(&items);
        let engine = EngineSelection::default().resolve(Mode::Nested).unwrap();
        let cfg = OptimizationConfig {
            time_limit_ms: 300,
            ..config(Mode::Nested, 2, Some(3))
        };
        assert_eq!(planned_attempts(2, 300), 2);

        let mut s = Solver::new(&problem, &items, engine, &cfg)
            .with_stages(packing::pack, slow_check);
        let outcome = s.solve().unwrap();
        assert_eq!(s.state(), RunState::Completed);
        assert_eq!(outcome.restarts_used, 1);
        assert_eq!(outcome.attempt_seeds, vec![attempt_seed(3, 0)]);
        assert_eq!(outcome.attempt, 0);
    }

    #[test]
    fn test_aborted_attempt_counts_and_a_later_one_wins() {
        let items = items();
        let problem = problem(&items);
        PACK_CALLS.with(|c| c.set(0));
        let mut s = solver(&problem, &items, 3, 11).with_stages(abort_first_attempt, verify::check);
        let outcome = s.solve().unwrap();
        assert_eq!(s.state(), RunState::Completed);
        assert_eq!(outcome.restarts_used, 3);
        assert_eq!(outcome.attempt_seeds.len(), 3);
        assert!(outcome.attempt >= 1);
        assert!(outcome.result.unplaced.is_empty());
    }

    #[test]
    fn test_every_attempt_aborted_is_a_timeout() {
        let items = items();
        let problem = problem(&items);
        let mut s = solver(&problem, &items, 3, 11).with_stages(always_abort, verify::check);
        let err = s.solve().unwrap_err();
        assert_eq!(s.state(), RunState::TimedOut);
        assert!(
            matches!(err, PackingFailure::Timeout { time_limit_ms: 60_000, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_rejected_layouts_are_internal_failures() {
        let items = items();
        let problem = problem(&items);
        let mut s = solver(&problem, &items, 2, 11).with_stages(packing::pack, reject_layout);
        match s.solve().unwrap_err() {
            PackingFailure::Internal(reason) => assert!(reason.contains("forced rejection")),
            other => panic!("expected internal failure, got {other:?}"),
        }
        assert_eq!(s.state(), RunState::Completed);

        // One inconsistent attempt outweighs aborted ones.
        PACK_CALLS.with(|c| c.set(0));
        let mut s = solver(&problem, &items, 2, 11).with_stages(abort_first_attempt, reject_layout);
        assert!(matches!(s.solve(), Err(PackingFailure::Internal(_))));
    }
}
