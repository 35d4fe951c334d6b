use std::fmt::Write;

use crate::solution::SheetSolution;

const MAX_WIDTH: f64 = 80.0;
const MAX_HEIGHT: f64 = 40.0;

/// Horizontal gap between sheets in the SVG, in mm.
const SHEET_GAP_MM: f64 = 20.0;

const EMPTY_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"></svg>"#;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// SVG document with every sheet side by side, in mm, top-left origin.
pub fn render_svg(sheets: &[SheetSolution]) -> String {
    if sheets.is_empty() {
        return EMPTY_SVG.to_string();
    }

    let mut offsets = Vec::with_capacity(sheets.len());
    let mut cursor = 0.0;
    let mut max_height: f64 = 0.0;
    for sheet in sheets {
        offsets.push(cursor);
        cursor += sheet.width_mm + SHEET_GAP_MM;
        max_height = max_height.max(sheet.height_mm);
    }
    let total_width = (cursor - SHEET_GAP_MM).max(1.0);
    let total_height = max_height.max(1.0);

    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{total_width}" height="{total_height}" viewBox="0 0 {total_width} {total_height}">"#
    );
    svg.push_str("<style>");
    svg.push_str(".sheet{fill:none;stroke:#1f2937;stroke-width:1}");
    svg.push_str(".usable{fill:none;stroke:#9ca3af;stroke-width:0.5;stroke-dasharray:4 2}");
    svg.push_str(".item{fill:#93c5fd;stroke:#1e3a8a;stroke-width:0.8}");
    svg.push_str(".label{font-family:Arial, sans-serif;font-size:10px;fill:#111827}");
    svg.push_str("</style>");

    for (sheet, x_offset) in sheets.iter().zip(offsets) {
        let _ = write!(svg, r#"<g transform="translate({x_offset} 0)">"#);
        let _ = write!(
            svg,
            r#"<rect class="sheet" x="0" y="0" width="{}" height="{}" />"#,
            sheet.width_mm, sheet.height_mm
        );
        let t = &sheet.trim;
        let _ = write!(
            svg,
            r#"<rect class="usable" x="{}" y="{}" width="{}" height="{}" />"#,
            t.left,
            t.top,
            sheet.width_mm - t.left - t.right,
            sheet.height_mm - t.top - t.bottom
        );
        for p in &sheet.placements {
            let _ = write!(
                svg,
                r#"<rect class="item" x="{}" y="{}" width="{}" height="{}" />"#,
                p.x_mm, p.y_mm, p.width_mm, p.height_mm
            );
            let label = escape(&format!("{}#{}", p.item_id, p.instance));
            let _ = write!(
                svg,
                r#"<text class="label" x="{}" y="{}">{label}</text>"#,
                p.x_mm + 2.0,
                p.y_mm + 12.0
            );
        }
        svg.push_str("</g>");
    }

    svg.push_str("</svg>");
    svg
}

/// ASCII drawing of one sheet, scaled to fit an 80x40 character box.
pub fn render_sheet(sheet: &SheetSolution) -> String {
    let scale = f64::min(MAX_WIDTH / sheet.width_mm, MAX_HEIGHT / sheet.height_mm);
    let grid_w = (sheet.width_mm * scale).round() as usize;
    let grid_h = (sheet.height_mm * scale).round() as usize;

    if grid_w == 0 || grid_h == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];

    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    for p in &sheet.placements {
        let sx = (p.x_mm * scale).round() as usize;
        let sy = (p.y_mm * scale).round() as usize;
        let sw = (p.width_mm * scale).round() as usize;
        let sh = (p.height_mm * scale).round() as usize;

        if sw == 0 || sh == 0 {
            continue;
        }

        draw_rect(&mut grid, sx, sy, sw, sh);

        let label: Vec<char> = format!("{}#{}", p.item_id, p.instance).chars().collect();
        if sw > 2 {
            let cx = sx + sw / 2;
            let cy = sy + sh / 2;
            let start_x = cx.saturating_sub(label.len() / 2);

            for (i, &ch) in label.iter().enumerate() {
                let x = start_x + i;
                if x > sx && x < sx + sw && cy > sy && cy < sy + sh && cy < grid.len() && x < grid[cy].len() {
                    grid[cy][x] = ch;
                }
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn edge(current: char, line: char) -> char {
    let crossing = if line == '-' { '|' } else { '-' };
    if current == crossing || current == '+' { '+' } else { line }
}

fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let Some(cols) = grid.first().map(Vec::len) else {
        return;
    };

    for i in (x..=x + w).filter(|&i| i < cols) {
        for j in [y, y + h].into_iter().filter(|&j| j < rows) {
            grid[j][i] = edge(grid[j][i], '-');
        }
    }

    for j in (y..=y + h).filter(|&j| j < rows) {
        for i in [x, x + w].into_iter().filter(|&i| i < cols) {
            grid[j][i] = edge(grid[j][i], '|');
        }
    }

    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}
