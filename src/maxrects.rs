use crate::guillotine::FreeRect;
use crate::packing::{Candidate, SheetLayout, keep_better, pick_orientation};
use crate::types::{EngineParams, Rect};

/// Free space as the set of maximal empty rectangles. They may overlap each
/// other; none is contained in another.
#[derive(Debug, Clone)]
pub struct MaxRectsBin {
    pub free_rects: Vec<FreeRect>,
}

fn right(f: &FreeRect) -> u32 {
    f.x + f.rect.w
}

fn bottom(f: &FreeRect) -> u32 {
    f.y + f.rect.h
}

fn intersects(a: &FreeRect, b: &FreeRect) -> bool {
    a.x < right(b) && b.x < right(a) && a.y < bottom(b) && b.y < bottom(a)
}

fn contains(outer: &FreeRect, inner: &FreeRect) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && right(inner) <= right(outer)
        && bottom(inner) <= bottom(outer)
}

impl MaxRectsBin {
    fn score(piece: Rect, free: Rect) -> (u64, u64) {
        let area_diff = free.area() - piece.area();
        let short_side = std::cmp::min(free.w - piece.w, free.h - piece.h) as u64;
        (area_diff, short_side)
    }

    /// Up to four maximal pieces of `free` left around `used`.
    fn split(free: &FreeRect, used: &FreeRect, out: &mut Vec<FreeRect>) {
        if used.x > free.x {
            out.push(FreeRect {
                x: free.x,
                y: free.y,
                rect: Rect::new(used.x - free.x, free.rect.h),
            });
        }
        if right(used) < right(free) {
            out.push(FreeRect {
                x: right(used),
                y: free.y,
                rect: Rect::new(right(free) - right(used), free.rect.h),
            });
        }
        if used.y > free.y {
            out.push(FreeRect {
                x: free.x,
                y: free.y,
                rect: Rect::new(free.rect.w, used.y - free.y),
            });
        }
        if bottom(used) < bottom(free) {
            out.push(FreeRect {
                x: free.x,
                y: bottom(used),
                rect: Rect::new(free.rect.w, bottom(free) - bottom(used)),
            });
        }
    }

    /// Drops every free rectangle contained in another. Of two identical
    /// rectangles the earlier one survives.
    fn prune(&mut self) {
        let rects = &self.free_rects;
        let n = rects.len();
        let mut keep = vec![true; n];
        for i in 0..n {
            for j in 0..n {
                if i == j || !keep[j] {
                    continue;
                }
                if contains(&rects[j], &rects[i]) && (rects[i] != rects[j] || j < i) {
                    keep[i] = false;
                    break;
                }
            }
        }
        let mut idx = 0;
        self.free_rects.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
    }
}

impl SheetLayout for MaxRectsBin {
    fn new(bin: Rect, _params: &EngineParams) -> Self {
        Self {
            free_rects: vec![FreeRect {
                x: 0,
                y: 0,
                rect: bin,
            }],
        }
    }

    fn find(&self, piece: Rect, allow_rotate: bool) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        let rotated = piece.rotated();

        for (idx, free) in self.free_rects.iter().enumerate() {
            let at = |rect: Rect, turned: bool| {
                rect.fits_in(&free.rect).then(|| Candidate {
                    x: free.x,
                    y: free.y,
                    rect,
                    rotated: turned,
                    score: Self::score(rect, free.rect),
                    slot: idx,
                })
            };
            let upright = at(piece, false);
            let turned = if allow_rotate { at(rotated, true) } else { None };
            if let Some(c) = pick_orientation(upright, turned) {
                keep_better(&mut best, c);
            }
        }

        best
    }

    fn commit(&mut self, candidate: &Candidate) {
        let used = FreeRect {
            x: candidate.x,
            y: candidate.y,
            rect: candidate.rect,
        };
        let mut fresh = Vec::new();
        self.free_rects.retain(|free| {
            if intersects(free, &used) {
                Self::split(free, &used, &mut fresh);
                false
            } else {
                true
            }
        });
        self.free_rects.extend(fresh);
        self.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BinSelect, GuillotineSplit, Packer, SortOrder};

    fn bin(w: u32, h: u32) -> MaxRectsBin {
        let params = EngineParams {
            packer: Packer::MaxRects,
            bin_select: BinSelect::BestFit,
            sort: SortOrder::AreaDesc,
            split: GuillotineSplit::default(),
        };
        MaxRectsBin::new(Rect::new(w, h), &params)
    }

    fn place(bin: &mut MaxRectsBin, w: u32, h: u32) -> Candidate {
        let c = bin.find(Rect::new(w, h), false).unwrap();
        bin.commit(&c);
        c
    }

    #[test]
    fn test_first_piece_leaves_two_maximal_rects() {
        let mut bin = bin(100, 100);
        place(&mut bin, 30, 40);
        assert_eq!(bin.free_rects.len(), 2);
        assert!(bin.free_rects.contains(&FreeRect {
            x: 30,
            y: 0,
            rect: Rect::new(70, 100)
        }));
        assert!(bin.free_rects.contains(&FreeRect {
            x: 0,
            y: 40,
            rect: Rect::new(100, 60)
        }));
    }

    #[test]
    fn test_no_free_rect_contains_another() {
        let mut bin = bin(200, 120);
        for (w, h) in [(50, 40), (30, 70), (60, 20), (25, 25), (80, 30)] {
            place(&mut bin, w, h);
            for (i, a) in bin.free_rects.iter().enumerate() {
                for (j, b) in bin.free_rects.iter().enumerate() {
                    if i != j {
                        assert!(!contains(a, b), "{a:?} contains {b:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_free_rects_never_cover_placed_parts() {
        let mut bin = bin(100, 100);
        let mut placed = Vec::new();
        for (w, h) in [(40, 40), (40, 40), (20, 60), (60, 20)] {
            let c = place(&mut bin, w, h);
            placed.push(FreeRect {
                x: c.x,
                y: c.y,
                rect: c.rect,
            });
        }
        for free in &bin.free_rects {
            for used in &placed {
                assert!(!intersects(free, used));
            }
        }
    }

    #[test]
    fn test_packs_tighter_than_a_single_cut() {
        // 60x60 then two 40x40: maxrects keeps the whole L-shaped remainder
        // reachable, so all three fit on a 100x100 sheet.
        let mut bin = bin(100, 100);
        place(&mut bin, 60, 60);
        place(&mut bin, 40, 40);
        place(&mut bin, 40, 40);
        assert!(bin.find(Rect::new(40, 40), false).is_some());
    }

    #[test]
    fn test_rotation_when_only_rotated_fits() {
        let bin = bin(100, 30);
        let c = bin.find(Rect::new(30, 100), true).unwrap();
        assert!(c.rotated);
    }

    #[test]
    fn test_orientation_tie_on_area_keeps_unrotated() {
        let bin = bin(100, 50);
        let c = bin.find(Rect::new(45, 40), true).unwrap();
        assert!(!c.rotated);
        assert_eq!(c.rect, Rect::new(45, 40));
    }
}
