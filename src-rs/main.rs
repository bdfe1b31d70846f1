use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use table_slicer::config::{self, Project, PROJECT_HELP};
use table_slicer::geometry::ScreenPoint;
use table_slicer::html::replace_image_sources;
use table_slicer::overlay::{render_overlay, OverlayState};
use table_slicer::raster::ImageRaster;
use table_slicer::selection::{SelectionEdit, SelectionId, SelectionKind, SelectionStore};
use table_slicer::slice::{sanitize_base_name, slice, SliceOutput};
use table_slicer::{CoordinateMapper, InteractionOutcome, OccupantPrecedence, Session, SlicerConfig};

const EVENTS_HELP: &str = r##"Events JSON schema (array, replayed in order):
[
  {"type": "viewport", "width": 320, "height": 160},
  {"type": "new_selection", "kind": "link"},
  {"type": "down", "x": 40, "y": 10},
  {"type": "move", "x": 200, "y": 120},
  {"type": "up"},
  {"type": "edit", "index": 1},
  {"type": "update", "field": "url", "value": "https://example.com"},
  {"type": "stop_editing"},
  {"type": "delete", "index": 1},
  {"type": "leave"}
]

Notes:
- pointer coordinates are screen pixels relative to the canvas element.
- edit/delete take the 1-based "Area #N" position at the time of the event.
- update fields: x, y, width, height, url, text, text_align, font_size,
  background_color, text_color. Updates that do not parse are skipped.
"##;

#[derive(Parser, Debug)]
#[command(
    name = "table-slicer",
    version,
    about = "Slice an image into nested-table HTML with linked and text-replaced regions"
)]
struct Cli {
    /// Log debug output (RUST_LOG still wins when set)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Slice an image into HTML plus JPEG cells
    Slice(SliceArgs),
    /// Render the editing canvas with selection outlines to a PNG
    Overlay(OverlayArgs),
    /// Drive the selection editor from a recorded event script
    Replay(ReplayArgs),
    /// Point emitted <img> tags at hosted URLs
    #[command(name = "replace-urls")]
    ReplaceUrls(ReplaceUrlsArgs),
}

#[derive(Args, Debug)]
struct SliceArgs {
    /// Source image (PNG, JPEG or GIF)
    #[arg(required_unless_present = "selections_help")]
    image: Option<PathBuf>,
    /// Selections JSON file path (or - for stdin)
    #[arg(long)]
    selections: Option<String>,
    /// Base name for emitted files (default: image file stem)
    #[arg(long)]
    base_name: Option<String>,
    /// Output directory (default: $TABLE_SLICER_OUT_DIR or .table-slicer)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// JPEG quality 1-100
    #[arg(long)]
    quality: Option<u8>,
    /// Which selection owns a cell covered by several
    #[arg(long, value_enum)]
    precedence: Option<OccupantPrecedence>,
    /// Print the slice manifest JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Print selections schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    selections_help: bool,
}

#[derive(Args, Debug)]
struct OverlayArgs {
    /// Source image
    image: PathBuf,
    /// Output PNG path
    output: PathBuf,
    /// Selections JSON file path (or - for stdin)
    #[arg(long)]
    selections: Option<String>,
    /// Draw the 1-based selection N as being edited
    #[arg(long)]
    edit: Option<usize>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Source image
    #[arg(required_unless_present = "events_help")]
    image: Option<PathBuf>,
    /// Events JSON file path (or - for stdin)
    #[arg(long, required_unless_present = "events_help")]
    events: Option<String>,
    /// Write the resulting selections file here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    /// On-screen canvas width in CSS pixels
    #[arg(long)]
    css_width: Option<f64>,
    /// On-screen canvas height in CSS pixels
    #[arg(long)]
    css_height: Option<f64>,
    /// Also render the final editor canvas to this PNG
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Print events schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    events_help: bool,
}

#[derive(Args, Debug)]
struct ReplaceUrlsArgs {
    /// HTML produced by `slice`
    html: PathBuf,
    /// Text file with one URL per line, in image order (or - for stdin)
    #[arg(long)]
    urls: String,
    /// Write the rewritten HTML here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayEvent {
    Viewport { width: f64, height: f64 },
    NewSelection { kind: SelectionKind },
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Leave,
    Edit { index: usize },
    Update { field: String, value: Value },
    StopEditing,
    Delete { index: usize },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Slice(args) => command_slice(args),
        Commands::Overlay(args) => command_overlay(args),
        Commands::Replay(args) => command_replay(args),
        Commands::ReplaceUrls(args) => command_replace_urls(args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_micros()
        .init();
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "slice",
            "description": "Slice an image into nested-table HTML plus one JPEG per image cell."
        }),
        json!({
            "name": "overlay",
            "description": "Render the scaled editing canvas with labelled selection outlines."
        }),
        json!({
            "name": "replay",
            "description": "Replay pointer/edit events against the selection editor and emit selections JSON."
        }),
        json!({
            "name": "replace-urls",
            "description": "Rewrite <img src> attributes of emitted HTML to hosted URLs in file order."
        }),
    ];
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    if !path.exists() {
        bail!("input not found: {}", path.display());
    }
    image::open(path).with_context(|| format!("failed to open input image: {}", path.display()))
}

fn load_project_opt(path: Option<&str>) -> Result<Project> {
    match path {
        Some(path) => config::load_project(path),
        None => Ok(Project::default()),
    }
}

fn command_slice(args: SliceArgs) -> Result<()> {
    if args.selections_help {
        println!("{}", PROJECT_HELP.trim());
        return Ok(());
    }
    let Some(image_path) = args.image.as_deref() else {
        bail!("missing input image");
    };

    let project = load_project_opt(args.selections.as_deref())?;
    let mut cfg = project.config.clone();
    if let Some(quality) = args.quality {
        cfg.jpeg_quality = quality;
    }
    if let Some(precedence) = args.precedence {
        cfg.precedence = precedence;
    }
    cfg.validate()?;

    let source = open_image(image_path)?;
    let raster = ImageRaster::new(&source, cfg.jpeg_quality);
    let store = SelectionStore::from_records(project.selections);

    let raw_base = args.base_name.clone().unwrap_or_else(|| {
        image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string()
    });
    let base = sanitize_base_name(&raw_base);
    let output = slice(&raster, store.as_slice(), &base, &cfg)?;

    let out_dir = config::out_root(args.out_dir);
    let manifest = write_slice_output(&out_dir, &base, image_path, &source, &cfg, &output)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        println!("{}", abs_path(&out_dir.join(format!("{base}.html"))).display());
    }
    Ok(())
}

fn write_slice_output(
    out_dir: &Path,
    base: &str,
    image_path: &Path,
    source: &image::DynamicImage,
    cfg: &SlicerConfig,
    output: &SliceOutput,
) -> Result<Value> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory: {}", out_dir.display()))?;

    let html_path = out_dir.join(format!("{base}.html"));
    fs::write(&html_path, &output.html)
        .with_context(|| format!("failed to write HTML: {}", html_path.display()))?;
    for file in &output.files {
        let path = out_dir.join(&file.name);
        fs::write(&path, &file.bytes)
            .with_context(|| format!("failed to write slice: {}", path.display()))?;
    }

    let files: Vec<Value> = output
        .files
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "x": f.rect.x,
                "y": f.rect.y,
                "width": f.rect.width,
                "height": f.rect.height,
                "bytes": f.bytes.len(),
            })
        })
        .collect();
    let manifest = json!({
        "generated_at": timestamp_iso(),
        "source": abs_path(image_path).to_string_lossy(),
        "image": {"width": source.width(), "height": source.height()},
        "base_name": base,
        "html": abs_path(&html_path).to_string_lossy(),
        "config": cfg,
        "rows": output.row_count,
        "files": files,
        "cells": output.cells,
    });
    let sidecar = default_sidecar_for(&html_path);
    write_json_pretty(&sidecar, &manifest)?;
    info!(
        "wrote {} and {} image(s) to {}",
        html_path.display(),
        output.files.len(),
        out_dir.display()
    );
    Ok(manifest)
}

fn command_overlay(args: OverlayArgs) -> Result<()> {
    let project = load_project_opt(args.selections.as_deref())?;
    project.config.validate()?;
    let source = open_image(&args.image)?;
    let store = SelectionStore::from_records(project.selections);

    let editing = match args.edit {
        Some(0) => bail!("--edit is 1-based"),
        Some(n) => Some(
            store
                .id_at(n - 1)
                .with_context(|| format!("--edit {n}: only {} selection(s) loaded", store.len()))?,
        ),
        None => None,
    };

    let mapper = CoordinateMapper::new(source.width(), source.height(), project.config.display_width)?;
    let rendered = render_overlay(
        &source.to_rgba8(),
        &store,
        &mapper,
        OverlayState {
            editing,
            draft: None,
        },
    );
    ensure_parent_dir(&args.output)?;
    rendered
        .save(&args.output)
        .with_context(|| format!("failed to save overlay: {}", args.output.display()))?;
    println!("{}", abs_path(&args.output).display());
    Ok(())
}

fn command_replay(args: ReplayArgs) -> Result<()> {
    if args.events_help {
        println!("{}", EVENTS_HELP.trim());
        return Ok(());
    }
    let (Some(image_path), Some(events_path)) = (args.image.as_deref(), args.events.as_deref()) else {
        bail!("replay needs an image and --events");
    };

    let events_value = config::read_json_input(events_path, "events")?;
    let events: Vec<ReplayEvent> =
        serde_json::from_value(events_value).context("events must be a list of event objects")?;

    let source = open_image(image_path)?;
    let cfg = SlicerConfig::default();
    let raster = ImageRaster::new(&source, cfg.jpeg_quality);
    let mut session = Session::new(Arc::new(raster), "replay", cfg)?;
    if let (Some(w), Some(h)) = (args.css_width, args.css_height) {
        session.set_viewport(w, h);
    }

    for (idx, event) in events.into_iter().enumerate() {
        apply_event(&mut session, event).with_context(|| format!("event #{}", idx + 1))?;
    }

    if let Some(path) = args.preview.as_deref() {
        let state = OverlayState {
            editing: session.controller().editing(),
            draft: session.controller().draft(),
        };
        let rendered = render_overlay(&source.to_rgba8(), session.store(), session.controller().mapper(), state);
        ensure_parent_dir(path)?;
        rendered
            .save(path)
            .with_context(|| format!("failed to save preview: {}", path.display()))?;
    }

    let project = Project {
        config: session.config().clone(),
        selections: session.store().records(),
    };
    let value = project.to_json()?;
    match args.out {
        Some(path) => {
            write_json_pretty(&path, &value)?;
            println!("{}", abs_path(&path).display());
        }
        None => println!("{}", serde_json::to_string_pretty(&value)?),
    }
    Ok(())
}

/// Id of the selection currently labelled "Area #index".
fn selection_at(session: &Session, index: usize) -> Result<SelectionId> {
    index
        .checked_sub(1)
        .and_then(|i| session.store().id_at(i))
        .with_context(|| format!("no selection at position {index}"))
}

fn apply_event(session: &mut Session, event: ReplayEvent) -> Result<()> {
    match event {
        ReplayEvent::Viewport { width, height } => session.set_viewport(width, height),
        ReplayEvent::NewSelection { kind } => session.new_selection(kind)?,
        ReplayEvent::Down { x, y } => {
            let outcome = session.pointer_down(ScreenPoint::new(x, y));
            debug!("down ({x}, {y}) -> {outcome:?}");
        }
        ReplayEvent::Move { x, y } => {
            let outcome = session.pointer_move(ScreenPoint::new(x, y));
            debug!("move ({x}, {y}) -> {outcome:?}");
        }
        ReplayEvent::Up => {
            let outcome = session.pointer_up();
            log_release(session, "up", &outcome);
        }
        ReplayEvent::Leave => {
            let outcome = session.pointer_leave();
            log_release(session, "leave", &outcome);
        }
        ReplayEvent::Edit { index } => {
            let id = selection_at(session, index)?;
            session.edit(id);
        }
        ReplayEvent::Update { field, value } => {
            let raw = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let Some(edit) = SelectionEdit::parse(&field, &raw) else {
                warn!("update {field}={raw:?} skipped: unknown field or unparseable value");
                return Ok(());
            };
            if !session.apply_edit(&edit)? {
                debug!("update {field} ignored: nothing is being edited");
            }
        }
        ReplayEvent::StopEditing => session.stop_editing(),
        ReplayEvent::Delete { index } => {
            let id = selection_at(session, index)?;
            session.delete(id)?;
        }
    }
    Ok(())
}

fn log_release(session: &Session, event: &str, outcome: &InteractionOutcome) {
    match outcome {
        InteractionOutcome::Committed(id) => {
            let label = session.store().label(*id).unwrap_or_default();
            info!("{event}: committed {label}");
        }
        other => debug!("{event} -> {other:?}"),
    }
}

fn command_replace_urls(args: ReplaceUrlsArgs) -> Result<()> {
    let html = fs::read_to_string(&args.html)
        .with_context(|| format!("failed to read HTML: {}", args.html.display()))?;
    let raw_urls = if args.urls == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read URLs from stdin")?;
        buf
    } else {
        fs::read_to_string(&args.urls).with_context(|| format!("failed to read URLs file: {}", args.urls))?
    };
    let urls: Vec<String> = raw_urls.lines().map(ToString::to_string).collect();
    let rewritten = replace_image_sources(&html, &urls);

    match args.out {
        Some(path) => {
            ensure_parent_dir(&path)?;
            fs::write(&path, rewritten)
                .with_context(|| format!("failed to write HTML: {}", path.display()))?;
            println!("{}", abs_path(&path).display());
        }
        None => println!("{rewritten}"),
    }
    Ok(())
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}
