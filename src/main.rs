use std::path::PathBuf;

use clap::Parser;
use rectpack::api::{self, ApiError, ItemRequest, OptimizeRequest, Params, StockRequest, Units};
use rectpack::config::Settings;
use rectpack::render;
use rectpack::types::{
    BinSelect, EngineSelection, Mode, Objective, Packer, PatternDirection, Rotation, SortOrder,
    Trim,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rectpack", about = "2D rectangular cutting stock optimizer")]
struct Cli {
    /// Read a full request (same JSON schema as the HTTP API) from this file
    #[arg(long, conflicts_with_all = ["stock", "items"])]
    input: Option<PathBuf>,

    /// Stock sheets as ID=WxH:QTY in mm (e.g. S1=2440x1220:3)
    #[arg(long = "stock", num_args = 1..)]
    stock: Vec<String>,

    /// Parts as ID=WxH:QTY with an optional :rot, :along-width or :along-height suffix
    #[arg(long = "item", num_args = 1..)]
    items: Vec<String>,

    /// Minimum gap between parts in mm
    #[arg(long, default_value_t = 0.0)]
    spacing: f64,

    /// Trim on every sheet edge in mm
    #[arg(long, default_value_t = 0.0)]
    trim: f64,

    #[arg(long)]
    time_limit_ms: Option<u64>,

    #[arg(long)]
    restarts: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    /// min_waste or min_sheets
    #[arg(long, default_value = "min_waste")]
    objective: Objective,

    /// guillotine or nested
    #[arg(long, default_value = "guillotine")]
    mode: Mode,

    /// guillotine, maxrects or skyline
    #[arg(long)]
    packer: Option<Packer>,

    /// best_fit or first_fit
    #[arg(long)]
    bin_select: Option<BinSelect>,

    /// area_desc, maxside_desc or none
    #[arg(long)]
    sort: Option<SortOrder>,

    /// Integer units per mm
    #[arg(long)]
    unit_scale: Option<u32>,

    /// Show ASCII layout of each sheet
    #[arg(long)]
    layout: bool,

    /// Write the SVG layout to this file
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Print the response as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn parse_dimensions(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("invalid dimensions '{}', expected WxH", s))?;
    let width = w
        .parse::<f64>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let height = h
        .parse::<f64>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    Ok((width, height))
}

/// Splits `ID=WxH:QTY[:FLAG]` into its parts.
fn split_entry(s: &str) -> Result<(String, f64, f64, u32, Option<&str>), String> {
    let (id, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid entry '{}', expected ID=WxH:QTY", s))?;
    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid entry '{}', expected ID=WxH:QTY", s));
    }
    let (width, height) = parse_dimensions(parts[0])?;
    let qty = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    Ok((id.to_string(), width, height, qty, parts.get(2).copied()))
}

fn parse_stock(s: &str) -> Result<StockRequest, String> {
    let (id, width_mm, height_mm, qty, flag) = split_entry(s)?;
    if flag.is_some() {
        return Err(format!("stock '{}' takes no options", s));
    }
    Ok(StockRequest {
        id,
        width_mm,
        height_mm,
        qty,
    })
}

fn parse_item(s: &str) -> Result<ItemRequest, String> {
    let (id, width_mm, height_mm, qty, flag) = split_entry(s)?;
    let (rotation, pattern_direction) = match flag {
        None => (Rotation::Forbid, PatternDirection::None),
        Some("rot") => (Rotation::Allow90, PatternDirection::None),
        Some(other) => (Rotation::Forbid, other.parse::<PatternDirection>()?),
    };
    Ok(ItemRequest {
        id,
        width_mm,
        height_mm,
        qty,
        rotation,
        pattern_direction,
    })
}

fn build_request(cli: &Cli) -> Result<OptimizeRequest, ApiError> {
    if let Some(path) = &cli.input {
        let body = std::fs::read(path)
            .map_err(|e| ApiError::validation(format!("cannot read {}: {e}", path.display())))?;
        return api::parse(&body);
    }

    let stock = cli
        .stock
        .iter()
        .map(|s| parse_stock(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::validation)?;
    let items = cli
        .items
        .iter()
        .map(|s| parse_item(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::validation)?;

    Ok(OptimizeRequest {
        units: Units::Mm,
        params: Params {
            mode: cli.mode,
            spacing_mm: cli.spacing,
            trim_mm: Trim::uniform(cli.trim),
            time_limit_ms: cli.time_limit_ms,
            restarts: cli.restarts,
            objective: cli.objective,
            seed: cli.seed,
            engine: EngineSelection {
                packer: cli.packer,
                bin_select: cli.bin_select,
                sort: cli.sort,
            },
            unit_scale: cli.unit_scale,
        },
        stock,
        items,
    })
}

fn fail(err: &ApiError) -> ! {
    eprintln!("Error: {}", err);
    if let Some(details) = err.payload().get("details") {
        eprintln!("{}", details);
    }
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let request = build_request(&cli).unwrap_or_else(|e| fail(&e));
    let response = api::run(&request, &settings).unwrap_or_else(|e| fail(&e));

    if let Some(path) = &cli.svg
        && let Err(e) = std::fs::write(path, &response.artifacts.svg)
    {
        eprintln!("Error: cannot write {}: {}", path.display(), e);
        std::process::exit(1);
    }

    if cli.json {
        match serde_json::to_string_pretty(&response) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    for sheet in &response.solutions {
        println!(
            "Sheet {} #{} ({}x{} mm):",
            sheet.stock_id,
            sheet.index + 1,
            sheet.width_mm,
            sheet.height_mm
        );
        for p in &sheet.placements {
            let rot = if p.rotated { " [rotated]" } else { "" };
            println!(
                "  {}#{} {}x{} @ ({}, {}){}",
                p.item_id, p.instance, p.width_mm, p.height_mm, p.x_mm, p.y_mm, rot
            );
        }
        if cli.layout {
            print!("{}", render::render_sheet(sheet));
        }
        println!();
    }

    let summary = &response.summary;
    println!(
        "Summary: {} sheet{} used, {:.1}% waste, {} restart{} in {} ms (seed {})",
        summary.used_stock_count,
        if summary.used_stock_count == 1 { "" } else { "s" },
        summary.waste_percent,
        summary.restarts_used,
        if summary.restarts_used == 1 { "" } else { "s" },
        summary.time_ms,
        summary.seed,
    );
}
