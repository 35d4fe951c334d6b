//! Conversion of millimetre input into the integer space the packers work in.

use crate::error::{InfeasibleItem, PackingFailure};
use crate::types::{Item, Rect, StockSheet};

/// Converts millimetres to integer units, rounding half away from zero.
pub fn to_units(mm: f64, scale: u32) -> Option<u32> {
    let v = (mm * scale as f64).round();
    if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 {
        Some(v as u32)
    } else {
        None
    }
}

pub fn to_mm(units: u64, scale: u32) -> f64 {
    units as f64 / scale as f64
}

/// One stock definition as seen by the packers.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSpec {
    /// Index into the caller's stock list.
    pub stock: usize,
    /// Sheet rectangle shrunk by trim.
    pub usable: Rect,
    pub qty: u32,
}

/// One physical copy of an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    /// Index into the caller's item list.
    pub item: usize,
    /// 1-based, per item.
    pub instance: u32,
    /// Unrotated size before spacing.
    pub size: Rect,
    pub can_rotate: bool,
}

/// Integer-space view of one optimization request.
#[derive(Debug, Clone)]
pub struct Problem {
    pub scale: u32,
    pub spacing: u32,
    pub sheets: Vec<SheetSpec>,
    pub instances: Vec<Instance>,
}

impl Problem {
    pub fn new(
        stock: &[StockSheet],
        items: &[Item],
        spacing_mm: f64,
        scale: u32,
    ) -> Result<Self, PackingFailure> {
        if scale == 0 {
            return Err(PackingFailure::InvalidConfig(
                "unit_scale must be positive".to_string(),
            ));
        }
        if spacing_mm.is_nan() || spacing_mm < 0.0 {
            return Err(PackingFailure::InvalidConfig(
                "spacing must be non-negative".to_string(),
            ));
        }
        let spacing = units(spacing_mm, scale, "spacing")?;

        let mut sheets = Vec::with_capacity(stock.len());
        for (idx, s) in stock.iter().enumerate() {
            let usable_w_mm = s.width_mm - s.trim.left - s.trim.right;
            let usable_h_mm = s.height_mm - s.trim.top - s.trim.bottom;
            let degenerate = || PackingFailure::DegenerateSheet {
                stock_id: s.id.clone(),
                usable_width_mm: usable_w_mm,
                usable_height_mm: usable_h_mm,
            };
            if !(usable_w_mm > 0.0 && usable_h_mm > 0.0) {
                return Err(degenerate());
            }
            let usable = Rect::new(
                units(usable_w_mm, scale, &s.id)?,
                units(usable_h_mm, scale, &s.id)?,
            );
            if usable.w == 0 || usable.h == 0 {
                return Err(degenerate());
            }
            sheets.push(SheetSpec {
                stock: idx,
                usable,
                qty: s.qty,
            });
        }

        let mut instances = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let size = Rect::new(
                units(item.width_mm, scale, &item.id)?,
                units(item.height_mm, scale, &item.id)?,
            );
            if size.w == 0 || size.h == 0 {
                return Err(PackingFailure::InvalidConfig(format!(
                    "item {} rounds to zero at unit scale {scale}",
                    item.id
                )));
            }
            let can_rotate = item.may_rotate() && !size.is_square();
            for n in 1..=item.qty {
                instances.push(Instance {
                    item: idx,
                    instance: n,
                    size,
                    can_rotate,
                });
            }
        }

        Ok(Self {
            scale,
            spacing,
            sheets,
            instances,
        })
    }

    /// Placeable footprint of an item: its size inflated by spacing on the
    /// trailing (right and bottom) edges. Footprints are packed into the
    /// usable rectangle, so the trailing gap never crosses the trim line.
    pub fn footprint(&self, size: Rect) -> Rect {
        Rect::new(
            size.w.saturating_add(self.spacing),
            size.h.saturating_add(self.spacing),
        )
    }

    /// Items that do not fit any empty sheet in any allowed orientation.
    pub fn infeasible_items(&self, items: &[Item]) -> Vec<InfeasibleItem> {
        let mut seen = vec![false; items.len()];
        let mut out = Vec::new();
        for inst in &self.instances {
            if seen[inst.item] {
                continue;
            }
            seen[inst.item] = true;
            let piece = self.footprint(inst.size);
            let fits = self.sheets.iter().any(|s| {
                piece.fits_in(&s.usable)
                    || (inst.can_rotate && piece.rotated().fits_in(&s.usable))
            });
            if !fits {
                let item = &items[inst.item];
                let max_w = self.sheets.iter().map(|s| s.usable.w).max().unwrap_or(0);
                let max_h = self.sheets.iter().map(|s| s.usable.h).max().unwrap_or(0);
                out.push(InfeasibleItem {
                    item_id: item.id.clone(),
                    required_width_mm: to_mm(piece.w as u64, self.scale),
                    required_height_mm: to_mm(piece.h as u64, self.scale),
                    rotation_allowed: inst.can_rotate,
                    max_usable_width_mm: to_mm(max_w as u64, self.scale),
                    max_usable_height_mm: to_mm(max_h as u64, self.scale),
                });
            }
        }
        out
    }
}

fn units(mm: f64, scale: u32, what: &str) -> Result<u32, PackingFailure> {
    to_units(mm, scale).ok_or_else(|| {
        PackingFailure::InvalidConfig(format!(
            "{what}: {mm} mm is out of range at unit scale {scale}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PatternDirection, Rotation, Trim};

    fn stock(w: f64, h: f64, trim: f64) -> StockSheet {
        StockSheet {
            id: "s".into(),
            width_mm: w,
            height_mm: h,
            qty: 2,
            trim: Trim::uniform(trim),
        }
    }

    fn item(id: &str, w: f64, h: f64, rotation: Rotation) -> Item {
        Item {
            id: id.into(),
            width_mm: w,
            height_mm: h,
            qty: 3,
            rotation,
            pattern_direction: PatternDirection::None,
        }
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(to_units(12.346, 100), Some(1235));
        assert_eq!(to_units(2.5, 1), Some(3));
        assert_eq!(to_units(0.5, 1), Some(1));
        assert_eq!(to_units(0.0049, 100), Some(0));
        assert_eq!(to_units(-1.0, 100), None);
        assert_eq!(to_units(f64::NAN, 100), None);
    }

    #[test]
    fn test_usable_area_and_instances() {
        let p = Problem::new(
            &[stock(1000.0, 800.0, 10.0)],
            &[item("a", 200.0, 300.0, Rotation::Allow90)],
            2.0,
            100,
        )
        .unwrap();
        assert_eq!(p.sheets[0].usable, Rect::new(98000, 78000));
        assert_eq!(p.spacing, 200);
        assert_eq!(p.instances.len(), 3);
        assert_eq!(
            p.instances.iter().map(|i| i.instance).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(p.footprint(p.instances[0].size), Rect::new(20200, 30200));
        assert!(p.instances[0].can_rotate);
    }

    #[test]
    fn test_degenerate_trim_is_reported() {
        let err = Problem::new(&[stock(100.0, 100.0, 50.0)], &[], 0.0, 100).unwrap_err();
        assert!(matches!(err, PackingFailure::DegenerateSheet { .. }));
    }

    #[test]
    fn test_square_items_never_rotate() {
        let p = Problem::new(
            &[stock(100.0, 100.0, 0.0)],
            &[item("sq", 10.0, 10.0, Rotation::Allow90)],
            0.0,
            100,
        )
        .unwrap();
        assert!(!p.instances[0].can_rotate);
    }

    #[test]
    fn test_infeasible_items_consider_rotation() {
        let items = [
            item("tall", 50.0, 110.0, Rotation::Allow90),
            item("wide", 150.0, 50.0, Rotation::Forbid),
            item("ok", 90.0, 90.0, Rotation::Forbid),
        ];
        let p = Problem::new(&[stock(200.0, 100.0, 0.0)], &items, 0.0, 10).unwrap();
        let bad = p.infeasible_items(&items);
        assert!(bad.is_empty());

        let p = Problem::new(&[stock(120.0, 100.0, 0.0)], &items, 0.0, 10).unwrap();
        let bad = p.infeasible_items(&items);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].item_id, "wide");
        assert_eq!(bad[0].max_usable_width_mm, 120.0);
    }

    #[test]
    fn test_trailing_spacing_must_fit_inside_usable_area() {
        let items = [
            item("full", 100.0, 40.0, Rotation::Forbid),
            item("snug", 97.0, 40.0, Rotation::Forbid),
        ];
        let p = Problem::new(&[stock(100.0, 100.0, 0.0)], &items, 3.0, 100).unwrap();
        let bad = p.infeasible_items(&items);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].item_id, "full");
        assert_eq!(bad[0].required_width_mm, 103.0);
        assert_eq!(bad[0].max_usable_width_mm, 100.0);
    }
}
