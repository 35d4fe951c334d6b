use crate::geometry::Problem;
use crate::packing::PackingResult;
use crate::types::Objective;

/// Integer-space measurements of one packing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub used_stock_count: u64,
    pub placed_count: u64,
    pub unplaced_count: u64,
    pub total_usable_area: u64,
    /// Parts only; spacing gaps count as waste.
    pub placed_area: u64,
    pub total_waste_area: u64,
}

impl Metrics {
    pub fn of(problem: &Problem, result: &PackingResult) -> Self {
        let used = result.sheets.iter().filter(|s| !s.placements.is_empty());
        let mut used_stock_count = 0;
        let mut total_usable_area = 0;
        let mut placed_area = 0;
        let mut placed_count = 0;
        for sheet in used {
            used_stock_count += 1;
            total_usable_area += problem.sheets[sheet.spec].usable.area();
            for p in &sheet.placements {
                placed_area += p.size.area();
                placed_count += 1;
            }
        }
        Self {
            used_stock_count,
            placed_count,
            unplaced_count: result.unplaced.len() as u64,
            total_usable_area,
            placed_area,
            total_waste_area: total_usable_area.saturating_sub(placed_area),
        }
    }

    /// Waste as a share of used usable area, rounded to four decimals.
    pub fn waste_percent(&self) -> f64 {
        if self.total_usable_area == 0 {
            return 0.0;
        }
        let pct = self.total_waste_area as f64 / self.total_usable_area as f64 * 100.0;
        (pct * 10_000.0).round() / 10_000.0
    }
}

/// Lexicographic rank; lower is better. Unplaced parts always dominate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey(pub u64, pub u64, pub u64);

impl Objective {
    pub fn rank(&self, m: &Metrics) -> RankKey {
        match self {
            Objective::MinWaste => {
                RankKey(m.unplaced_count, m.total_waste_area, m.used_stock_count)
            }
            Objective::MinSheets => {
                RankKey(m.unplaced_count, m.used_stock_count, m.total_waste_area)
            }
        }
    }
}
