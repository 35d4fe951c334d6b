//! Runtime checks on a finished attempt. A failure here means a strategy
//! produced an invalid layout; the attempt is discarded.

use crate::geometry::Problem;
use crate::packing::{PackedSheet, PackingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Span {
    fn right(&self) -> u32 {
        self.x + self.w
    }

    fn bottom(&self) -> u32 {
        self.y + self.h
    }
}

/// Checks conservation, containment and spacing-inflated non-overlap.
/// With `guillotine` set every sheet must also be separable by edge-to-edge cuts.
pub fn check(problem: &Problem, result: &PackingResult, guillotine: bool) -> Result<(), String> {
    let mut seen = vec![false; problem.instances.len()];
    let claimed = result
        .sheets
        .iter()
        .flat_map(|s| s.placements.iter().map(|p| p.instance))
        .chain(result.unplaced.iter().copied());
    for idx in claimed {
        match seen.get_mut(idx) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => return Err(format!("instance {idx} reported twice")),
            None => return Err(format!("instance {idx} does not exist")),
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(format!("instance {missing} was dropped"));
    }

    for (si, sheet) in result.sheets.iter().enumerate() {
        check_sheet(problem, si, sheet, guillotine)?;
    }
    Ok(())
}

fn check_sheet(
    problem: &Problem,
    si: usize,
    sheet: &PackedSheet,
    guillotine: bool,
) -> Result<(), String> {
    let spec = problem
        .sheets
        .get(sheet.spec)
        .ok_or_else(|| format!("sheet {si} refers to unknown stock {}", sheet.spec))?;
    if sheet.placements.is_empty() {
        return Err(format!("sheet {si} was opened but holds nothing"));
    }

    let mut spans: Vec<Span> = Vec::with_capacity(sheet.placements.len());
    for p in &sheet.placements {
        let expected = problem.instances[p.instance].size;
        let expected = if p.rotated { expected.rotated() } else { expected };
        if expected != p.size {
            return Err(format!(
                "sheet {si}: instance {} placed as {} but is {}",
                p.instance, p.size, expected
            ));
        }
        let footprint = problem.footprint(p.size);
        let right = u64::from(p.x) + u64::from(footprint.w);
        let bottom = u64::from(p.y) + u64::from(footprint.h);
        if right > u64::from(spec.usable.w) || bottom > u64::from(spec.usable.h) {
            return Err(format!(
                "sheet {si}: instance {} at ({}, {}) footprint {} leaves usable area {}",
                p.instance, p.x, p.y, footprint, spec.usable
            ));
        }
        spans.push(Span {
            x: p.x,
            y: p.y,
            w: footprint.w,
            h: footprint.h,
        });
    }

    // Sweep along x so only horizontally overlapping pairs are compared.
    let mut by_x = spans.clone();
    by_x.sort_by_key(|s| (s.x, s.y));
    for (i, a) in by_x.iter().enumerate() {
        for b in by_x[i + 1..].iter().take_while(|b| b.x < a.right()) {
            if a.y < b.bottom() && b.y < a.bottom() {
                return Err(format!("sheet {si}: {a:?} overlaps {b:?}"));
            }
        }
    }

    if guillotine {
        let root = Span {
            x: 0,
            y: 0,
            w: spec.usable.w,
            h: spec.usable.h,
        };
        if !is_guillotine(&spans, root) {
            return Err(format!("sheet {si}: layout is not guillotine-cuttable"));
        }
    }
    Ok(())
}

/// Whether the parts inside `region` can be separated by recursive
/// edge-to-edge cuts. Any full-length cut that crosses no part is safe to
/// take, so the first one found is used.
fn is_guillotine(parts: &[Span], region: Span) -> bool {
    if parts.len() <= 1 {
        return true;
    }

    let mut xs: Vec<u32> = parts.iter().flat_map(|p| [p.x, p.right()]).collect();
    xs.sort_unstable();
    xs.dedup();
    for &x in &xs {
        if x <= region.x || x >= region.right() {
            continue;
        }
        if parts.iter().any(|p| p.x < x && x < p.right()) {
            continue;
        }
        let (left, right): (Vec<Span>, Vec<Span>) = parts.iter().copied().partition(|p| p.right() <= x);
        if left.is_empty() || right.is_empty() {
            continue;
        }
        let left_region = Span { w: x - region.x, ..region };
        let right_region = Span {
            x,
            w: region.right() - x,
            ..region
        };
        return is_guillotine(&left, left_region) && is_guillotine(&right, right_region);
    }

    let mut ys: Vec<u32> = parts.iter().flat_map(|p| [p.y, p.bottom()]).collect();
    ys.sort_unstable();
    ys.dedup();
    for &y in &ys {
        if y <= region.y || y >= region.bottom() {
            continue;
        }
        if parts.iter().any(|p| p.y < y && y < p.bottom()) {
            continue;
        }
        let (top, bottom): (Vec<Span>, Vec<Span>) = parts.iter().copied().partition(|p| p.bottom() <= y);
        if top.is_empty() || bottom.is_empty() {
            continue;
        }
        let top_region = Span { h: y - region.y, ..region };
        let bottom_region = Span {
            y,
            h: region.bottom() - y,
            ..region
        };
        return is_guillotine(&top, top_region) && is_guillotine(&bottom, bottom_region);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::Placement;
    use crate::types::{Item, PatternDirection, Rect, Rotation, StockSheet, Trim};

    fn problem(spacing: f64) -> Problem {
        let stock = [StockSheet {
            id: "s".into(),
            width_mm: 100.0,
            height_mm: 100.0,
            qty: 1,
            trim: Trim::default(),
        }];
        let items = [Item {
            id: "p".into(),
            width_mm: 40.0,
            height_mm: 20.0,
            qty: 3,
            rotation: Rotation::Allow90,
            pattern_direction: PatternDirection::None,
        }];
        Problem::new(&stock, &items, spacing, 1).unwrap()
    }

    fn placed(instance: usize, x: u32, y: u32, rotated: bool) -> Placement {
        let size = Rect::new(40, 20);
        Placement {
            instance,
            x,
            y,
            size: if rotated { size.rotated() } else { size },
            rotated,
        }
    }

    fn result(placements: Vec<Placement>, unplaced: Vec<usize>) -> PackingResult {
        PackingResult {
            sheets: vec![PackedSheet {
                spec: 0,
                ordinal: 0,
                placements,
            }],
            unplaced,
        }
    }

    #[test]
    fn test_valid_layout_passes() {
        let p = problem(2.0);
        let r = result(
            vec![placed(0, 0, 0, false), placed(1, 42, 0, false), placed(2, 0, 22, true)],
            vec![],
        );
        assert_eq!(check(&p, &r, true), Ok(()));
    }

    #[test]
    fn test_spacing_overlap_is_caught() {
        let p = problem(2.0);
        let r = result(vec![placed(0, 0, 0, false), placed(1, 41, 0, false)], vec![2]);
        assert!(check(&p, &r, false).unwrap_err().contains("overlaps"));
    }

    #[test]
    fn test_containment_is_caught() {
        let p = problem(0.0);
        let r = result(vec![placed(0, 70, 0, false)], vec![1, 2]);
        assert!(check(&p, &r, false).unwrap_err().contains("usable area"));
    }

    #[test]
    fn test_trailing_spacing_past_usable_edge_is_caught() {
        let p = problem(2.0);
        // The part ends at 99 but its gap reaches 101.
        let r = result(vec![placed(0, 59, 0, false)], vec![1, 2]);
        assert!(check(&p, &r, false).unwrap_err().contains("usable area"));

        let r = result(vec![placed(0, 58, 0, false)], vec![1, 2]);
        assert_eq!(check(&p, &r, false), Ok(()));
    }

    #[test]
    fn test_dropped_and_duplicated_instances_are_caught() {
        let p = problem(0.0);
        let dropped = result(vec![placed(0, 0, 0, false)], vec![1]);
        assert!(check(&p, &dropped, false).unwrap_err().contains("dropped"));

        let twice = result(vec![placed(0, 0, 0, false)], vec![0, 1, 2]);
        assert!(check(&p, &twice, false).unwrap_err().contains("twice"));
    }

    #[test]
    fn test_pinwheel_is_not_guillotine() {
        let region = Span { x: 0, y: 0, w: 3, h: 3 };
        let pinwheel = [
            Span { x: 0, y: 0, w: 2, h: 1 },
            Span { x: 2, y: 0, w: 1, h: 2 },
            Span { x: 1, y: 2, w: 2, h: 1 },
            Span { x: 0, y: 1, w: 1, h: 2 },
        ];
        assert!(!is_guillotine(&pinwheel, region));

        let grid = [
            Span { x: 0, y: 0, w: 1, h: 1 },
            Span { x: 1, y: 0, w: 2, h: 1 },
            Span { x: 0, y: 1, w: 3, h: 2 },
        ];
        assert!(is_guillotine(&grid, region));
    }
}
