use crate::packing::{Candidate, SheetLayout, keep_better, pick_orientation};
use crate::types::{EngineParams, GuillotineSplit, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRect {
    pub x: u32,
    pub y: u32,
    pub rect: Rect,
}

/// Free space kept as the leaves of a cut tree. Every placement splits its
/// free rectangle with one edge-to-edge cut; leaves are never merged, so the
/// final layout is always cuttable by a guillotine saw.
#[derive(Debug, Clone)]
pub struct GuillotineBin {
    split: GuillotineSplit,
    pub free_rects: Vec<FreeRect>,
}

impl GuillotineBin {
    fn score(piece: Rect, free: Rect) -> (u64, u64) {
        let area_diff = free.area() - piece.area();
        let short_side = std::cmp::min(free.w - piece.w, free.h - piece.h) as u64;
        (area_diff, short_side)
    }

    fn split(&mut self, free: FreeRect, placed: Rect) {
        let right_w = free.rect.w - placed.w;
        let bottom_h = free.rect.h - placed.h;

        if right_w > 0 && bottom_h > 0 {
            let horizontal = match self.split {
                GuillotineSplit::ShorterLeftoverAxis => right_w < bottom_h,
                GuillotineSplit::LongerLeftoverAxis => right_w >= bottom_h,
            };
            if horizontal {
                // Cut along the piece's bottom edge: the right strip is as tall
                // as the piece, the bottom strip spans the full width.
                self.free_rects.push(FreeRect {
                    x: free.x + placed.w,
                    y: free.y,
                    rect: Rect::new(right_w, placed.h),
                });
                self.free_rects.push(FreeRect {
                    x: free.x,
                    y: free.y + placed.h,
                    rect: Rect::new(free.rect.w, bottom_h),
                });
            } else {
                // Cut along the piece's right edge: the right strip spans the
                // full height, the bottom strip is as wide as the piece.
                self.free_rects.push(FreeRect {
                    x: free.x + placed.w,
                    y: free.y,
                    rect: Rect::new(right_w, free.rect.h),
                });
                self.free_rects.push(FreeRect {
                    x: free.x,
                    y: free.y + placed.h,
                    rect: Rect::new(placed.w, bottom_h),
                });
            }
        } else if right_w > 0 {
            self.free_rects.push(FreeRect {
                x: free.x + placed.w,
                y: free.y,
                rect: Rect::new(right_w, free.rect.h),
            });
        } else if bottom_h > 0 {
            self.free_rects.push(FreeRect {
                x: free.x,
                y: free.y + placed.h,
                rect: Rect::new(free.rect.w, bottom_h),
            });
        }
    }
}

impl SheetLayout for GuillotineBin {
    fn new(bin: Rect, params: &EngineParams) -> Self {
        Self {
            split: params.split,
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
        let free = self.free_rects.swap_remove(candidate.slot);
        self.split(free, candidate.rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BinSelect, Packer, SortOrder};

    fn params(split: GuillotineSplit) -> EngineParams {
        EngineParams {
            packer: Packer::Guillotine,
            bin_select: BinSelect::BestFit,
            sort: SortOrder::AreaDesc,
            split,
        }
    }

    fn bin(w: u32, h: u32) -> GuillotineBin {
        GuillotineBin::new(Rect::new(w, h), &params(GuillotineSplit::ShorterLeftoverAxis))
    }

    #[test]
    fn test_place_single_piece() {
        let mut bin = bin(100, 100);
        let piece = Rect::new(50, 30);
        let c = bin.find(piece, false).unwrap();
        bin.commit(&c);
        assert_eq!((c.x, c.y), (0, 0));
        assert_eq!(c.rect, Rect::new(50, 30));
        assert_eq!(bin.free_rects.len(), 2);
    }

    #[test]
    fn test_piece_too_large() {
        let bin = bin(100, 100);
        assert!(bin.find(Rect::new(200, 50), false).is_none());
    }

    #[test]
    fn test_rotation_fit() {
        let bin = bin(100, 50);
        let piece = Rect::new(50, 100);
        assert!(bin.find(piece, false).is_none());
        let c = bin.find(piece, true).unwrap();
        assert!(c.rotated);
        assert_eq!(c.rect, Rect::new(100, 50));
    }

    #[test]
    fn test_equal_score_keeps_unrotated() {
        let bin = bin(100, 100);
        let c = bin.find(Rect::new(40, 60), true).unwrap();
        assert!(!c.rotated);
    }

    #[test]
    fn test_fill_exact() {
        let mut bin = bin(100, 100);
        let c = bin.find(Rect::new(100, 100), false).unwrap();
        bin.commit(&c);
        assert!(bin.free_rects.is_empty());
    }

    #[test]
    fn test_split_rule_decides_full_length_strip() {
        // Leftovers: 70 to the right, 20 below.
        let piece = Rect::new(30, 80);

        let mut shorter = bin(100, 100);
        let c = shorter.find(piece, false).unwrap();
        shorter.commit(&c);
        assert!(shorter.free_rects.contains(&FreeRect {
            x: 30,
            y: 0,
            rect: Rect::new(70, 100)
        }));

        let mut longer =
            GuillotineBin::new(Rect::new(100, 100), &params(GuillotineSplit::LongerLeftoverAxis));
        let c = longer.find(piece, false).unwrap();
        longer.commit(&c);
        assert!(longer.free_rects.contains(&FreeRect {
            x: 0,
            y: 80,
            rect: Rect::new(100, 20)
        }));
    }

    #[test]
    fn test_four_quarters_fill_sheet() {
        let mut bin = bin(100, 100);
        for _ in 0..4 {
            let c = bin.find(Rect::new(50, 50), false).unwrap();
            bin.commit(&c);
        }
        assert!(bin.free_rects.is_empty());
        assert!(bin.find(Rect::new(1, 1), false).is_none());
    }

    #[test]
    fn test_orientation_tie_on_area_keeps_unrotated() {
        // Rotated leaves a shorter side of 5 against 10, but the same area.
        let bin = bin(100, 50);
        let c = bin.find(Rect::new(45, 40), true).unwrap();
        assert!(!c.rotated);
        assert_eq!(c.rect, Rect::new(45, 40));
    }
}
