use crate::packing::{Candidate, SheetLayout, keep_better, pick_orientation};
use crate::types::{EngineParams, Rect};

/// One horizontal run of the profile: columns `x..x + w` are filled down to `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub x: u32,
    pub y: u32,
    pub w: u32,
}

/// Height profile over the sheet width. Segments are contiguous, sorted by x,
/// cover the full width, and neighbours never share a height. A column's
/// height only ever grows.
#[derive(Debug, Clone)]
pub struct SkylineBin {
    bin: Rect,
    pub segments: Vec<Segment>,
}

impl SkylineBin {
    /// Resting height and area wasted underneath when `piece` is dropped with
    /// its left edge at segment `start`.
    fn fit_at(&self, start: usize, piece: Rect) -> Option<(u32, u64)> {
        let x = self.segments[start].x;
        let end = x.checked_add(piece.w).filter(|&end| end <= self.bin.w)?;

        let mut y = 0u32;
        for seg in self.segments[start..].iter().take_while(|s| s.x < end) {
            y = y.max(seg.y);
        }
        if y.checked_add(piece.h).is_none_or(|top| top > self.bin.h) {
            return None;
        }

        let mut waste = 0u64;
        for seg in self.segments[start..].iter().take_while(|s| s.x < end) {
            let span = (seg.x + seg.w).min(end) - seg.x;
            waste += (y - seg.y) as u64 * span as u64;
        }
        Some((y, waste))
    }

    fn merge(&mut self) {
        let mut i = 0;
        while i + 1 < self.segments.len() {
            if self.segments[i].y == self.segments[i + 1].y {
                self.segments[i].w += self.segments[i + 1].w;
                self.segments.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

impl SheetLayout for SkylineBin {
    fn new(bin: Rect, _params: &EngineParams) -> Self {
        Self {
            bin,
            segments: vec![Segment { x: 0, y: 0, w: bin.w }],
        }
    }

    /// Minimum-waste placement; ties go to the lower top edge, then leftmost.
    fn find(&self, piece: Rect, allow_rotate: bool) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        let rotated = piece.rotated();

        for idx in 0..self.segments.len() {
            let x = self.segments[idx].x;
            let at = |rect: Rect, turned: bool| {
                self.fit_at(idx, rect).map(|(y, waste)| Candidate {
                    x,
                    y,
                    rect,
                    rotated: turned,
                    score: (waste, (y + rect.h) as u64),
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
        let top = Segment {
            x: candidate.x,
            y: candidate.y + candidate.rect.h,
            w: candidate.rect.w,
        };
        let end = top.x + top.w;
        let at = candidate.slot;

        self.segments.insert(at, top);
        let next = at + 1;
        while next < self.segments.len() && self.segments[next].x < end {
            let seg = self.segments[next];
            let seg_end = seg.x + seg.w;
            if seg_end <= end {
                self.segments.remove(next);
            } else {
                self.segments[next] = Segment {
                    x: end,
                    y: seg.y,
                    w: seg_end - end,
                };
                break;
            }
        }
        self.merge();
    }
}
