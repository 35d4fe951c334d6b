//! The contract shared by every placement strategy: lazy sheet supply, bin
//! selection, instance ordering and cooperative deadline polling.

use std::cmp::Ordering;
use std::time::Instant;

use rand::Rng;
use rand::rngs::StdRng;

use crate::geometry::{Instance, Problem};
use crate::guillotine::GuillotineBin;
use crate::maxrects::MaxRectsBin;
use crate::skyline::SkylineBin;
use crate::types::{BinSelect, EngineParams, Item, Packer, Rect, SortOrder};

/// Lower is better. The first component is always the leftover area the
/// placement would leave in its slot, so scores compare across sheets.
pub type Score = (u64, u64);

/// A feasible position for one piece inside one sheet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub x: u32,
    pub y: u32,
    /// Oriented footprint, spacing included.
    pub rect: Rect,
    pub rotated: bool,
    pub score: Score,
    /// Strategy-private index of the free slot the candidate came from.
    pub slot: usize,
}

/// Free-space bookkeeping for one open sheet.
pub trait SheetLayout {
    fn new(bin: Rect, params: &EngineParams) -> Self;

    /// Best candidate for `piece`. With `allow_rotate` both orientations are
    /// tried at every slot and the slot keeps the one leaving less area,
    /// unrotated on a tie. Slots are then compared on the full score.
    fn find(&self, piece: Rect, allow_rotate: bool) -> Option<Candidate>;

    /// Commits a candidate previously returned by `find` on this layout.
    fn commit(&mut self, candidate: &Candidate);
}

/// Keeps `best` unless `next` scores strictly lower.
pub(crate) fn keep_better(best: &mut Option<Candidate>, next: Candidate) {
    if best.is_none_or(|b| next.score < b.score) {
        *best = Some(next);
    }
}

/// Orientation choice within one slot: the turned candidate wins only when it
/// leaves strictly less area than the upright one.
pub(crate) fn pick_orientation(
    upright: Option<Candidate>,
    turned: Option<Candidate>,
) -> Option<Candidate> {
    match (upright, turned) {
        (Some(u), Some(t)) if t.score.0 < u.score.0 => Some(t),
        (Some(u), _) => Some(u),
        (None, t) => t,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into `Problem::instances`.
    pub instance: usize,
    pub x: u32,
    pub y: u32,
    /// Oriented part size, spacing excluded.
    pub size: Rect,
    pub rotated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSheet {
    /// Index into `Problem::sheets`.
    pub spec: usize,
    /// How many sheets of this definition were opened before this one.
    pub ordinal: u32,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackingResult {
    /// Sheets in the order they were opened.
    pub sheets: Vec<PackedSheet>,
    /// Instance indices that could not be placed, in attempt order.
    pub unplaced: Vec<usize>,
}

impl PackingResult {
    pub fn placed_count(&self) -> usize {
        self.sheets.iter().map(|s| s.placements.len()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn new(at: Instant) -> Self {
        Self { at }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// The attempt ran out of its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted {
    pub placed: usize,
}

/// Runs one attempt with the strategy named in `params`.
pub fn pack(
    problem: &Problem,
    order: &[usize],
    params: &EngineParams,
    deadline: &Deadline,
) -> Result<PackingResult, Aborted> {
    match params.packer {
        Packer::Guillotine => pack_with::<GuillotineBin>(problem, order, params, deadline),
        Packer::MaxRects => pack_with::<MaxRectsBin>(problem, order, params, deadline),
        Packer::Skyline => pack_with::<SkylineBin>(problem, order, params, deadline),
    }
}

struct OpenSheet<L> {
    spec: usize,
    ordinal: u32,
    layout: L,
    placements: Vec<Placement>,
}

impl<L: SheetLayout> OpenSheet<L> {
    fn place(&mut self, instance: usize, inst: &Instance, candidate: &Candidate) {
        self.layout.commit(candidate);
        let size = if candidate.rotated {
            inst.size.rotated()
        } else {
            inst.size
        };
        self.placements.push(Placement {
            instance,
            x: candidate.x,
            y: candidate.y,
            size,
            rotated: candidate.rotated,
        });
    }
}

fn pack_with<L: SheetLayout>(
    problem: &Problem,
    order: &[usize],
    params: &EngineParams,
    deadline: &Deadline,
) -> Result<PackingResult, Aborted> {
    let mut remaining: Vec<u32> = problem.sheets.iter().map(|s| s.qty).collect();
    let mut open: Vec<OpenSheet<L>> = Vec::new();
    let mut unplaced = Vec::new();

    for (pos, &idx) in order.iter().enumerate() {
        if deadline.expired() {
            return Err(Aborted { placed: pos });
        }

        let inst = &problem.instances[idx];
        let piece = problem.footprint(inst.size);

        if let Some((si, candidate)) = select_sheet(&open, piece, inst.can_rotate, params.bin_select) {
            open[si].place(idx, inst, &candidate);
            continue;
        }

        // Nothing open fits: draw the next sheet, in stock order, that can
        // hold the piece when empty.
        let next = problem.sheets.iter().enumerate().find_map(|(spec_idx, spec)| {
            if remaining[spec_idx] == 0 {
                return None;
            }
            let layout = L::new(spec.usable, params);
            layout
                .find(piece, inst.can_rotate)
                .map(|candidate| (spec_idx, layout, candidate))
        });

        let Some((spec_idx, layout, candidate)) = next else {
            unplaced.extend_from_slice(&order[pos..]);
            break;
        };

        let ordinal = problem.sheets[spec_idx].qty - remaining[spec_idx];
        remaining[spec_idx] -= 1;
        let mut sheet = OpenSheet {
            spec: spec_idx,
            ordinal,
            layout,
            placements: Vec::new(),
        };
        sheet.place(idx, inst, &candidate);
        open.push(sheet);
    }

    Ok(PackingResult {
        sheets: open
            .into_iter()
            .map(|s| PackedSheet {
                spec: s.spec,
                ordinal: s.ordinal,
                placements: s.placements,
            })
            .collect(),
        unplaced,
    })
}

fn select_sheet<L: SheetLayout>(
    open: &[OpenSheet<L>],
    piece: Rect,
    allow_rotate: bool,
    bin_select: BinSelect,
) -> Option<(usize, Candidate)> {
    let mut best: Option<(usize, Candidate)> = None;
    for (si, sheet) in open.iter().enumerate() {
        let Some(candidate) = sheet.layout.find(piece, allow_rotate) else {
            continue;
        };
        match bin_select {
            BinSelect::FirstFit => return Some((si, candidate)),
            BinSelect::BestFit => {
                if best.is_none_or(|(_, b)| candidate.score < b.score) {
                    best = Some((si, candidate));
                }
            }
        }
    }
    best
}

/// Canonical comparison for `sort`: descending key, then item id, then instance.
fn canonical_cmp(items: &[Item], sort: SortOrder, a: &Instance, b: &Instance) -> Ordering {
    let by_key = match sort {
        SortOrder::AreaDesc => b
            .size
            .area()
            .cmp(&a.size.area())
            .then(b.size.max_side().cmp(&a.size.max_side())),
        SortOrder::MaxSideDesc => b
            .size
            .max_side()
            .cmp(&a.size.max_side())
            .then(b.size.area().cmp(&a.size.area())),
        SortOrder::None => return Ordering::Equal,
    };
    by_key
        .then_with(|| items[a.item].id.cmp(&items[b.item].id))
        .then(a.item.cmp(&b.item))
        .then(a.instance.cmp(&b.instance))
}

fn sort_key(sort: SortOrder, inst: &Instance) -> f64 {
    match sort {
        SortOrder::AreaDesc => inst.size.area() as f64,
        SortOrder::MaxSideDesc => inst.size.max_side() as f64,
        SortOrder::None => 0.0,
    }
}

/// Placement order for one attempt. Without an RNG this is the canonical
/// order; with one, each sort key is scaled by a factor in [0.8, 1.2) and
/// ties fall back to the canonical position. `SortOrder::None` always keeps
/// expansion order.
pub fn order_instances(
    problem: &Problem,
    items: &[Item],
    sort: SortOrder,
    rng: Option<&mut StdRng>,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..problem.instances.len()).collect();
    if sort == SortOrder::None {
        return order;
    }
    let instances = &problem.instances;
    order.sort_by(|&a, &b| canonical_cmp(items, sort, &instances[a], &instances[b]));

    if let Some(rng) = rng {
        let noisy: Vec<(f64, usize)> = order
            .iter()
            .map(|&i| (sort_key(sort, &instances[i]) * rng.gen_range(0.8..1.2), i))
            .collect();
        let mut ranked: Vec<(usize, f64, usize)> = noisy
            .into_iter()
            .enumerate()
            .map(|(pos, (key, i))| (pos, key, i))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        order = ranked.into_iter().map(|(_, _, i)| i).collect();
    }
    order
}
