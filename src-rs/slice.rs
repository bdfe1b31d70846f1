//! The slice operation: selection snapshot in, table markup and named JPEG
//! crops out.
//!
//! A [`SlicePlan`] fixes cell order and file names once. The emitter and the
//! rasterizer both walk the same plan, so `<img src>` references and emitted
//! files cannot drift apart.

use log::info;
use serde::Serialize;

use crate::config::SlicerConfig;
use crate::error::SliceError;
use crate::geometry::PixelRect;
use crate::grid::{merged_grid, MergedCell, OccupantPrecedence};
use crate::html::{emit_html, CellContent};
use crate::raster::{rasterize, RasterSource};
use crate::selection::{display_label, Selection, SelectionId};

pub const FALLBACK_BASE_NAME: &str = "slice";

/// Keep ASCII letters and digits only; an empty result falls back to
/// `slice`.
pub fn sanitize_base_name(raw: &str) -> String {
    let out: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
    if out.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        out
    }
}

pub fn file_name(base: &str, index: usize) -> String {
    format!("{base}_{index}.jpeg")
}

pub fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCell<'a> {
    pub cell: MergedCell<'a>,
    /// Set for every cell that renders an image.
    pub file_name: Option<String>,
    /// Share of the row width, percent, two decimals.
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow<'a> {
    pub top: u32,
    pub bottom: u32,
    pub cells: Vec<PlannedCell<'a>>,
}

#[derive(Debug, Clone)]
pub struct SlicePlan<'a> {
    pub width: u32,
    pub height: u32,
    pub rows: Vec<PlannedRow<'a>>,
    selections: &'a [Selection],
}

impl<'a> SlicePlan<'a> {
    pub fn build(
        width: u32,
        height: u32,
        selections: &'a [Selection],
        precedence: OccupantPrecedence,
        base_name: &str,
    ) -> Result<Self, SliceError> {
        if width == 0 || height == 0 {
            return Err(SliceError::EmptyImage { width, height });
        }

        let mut next_index = 0usize;
        let rows = merged_grid(width, height, selections, precedence)
            .into_iter()
            .map(|row| {
                let total = f64::from(row.total_width());
                let cells = row
                    .cells
                    .into_iter()
                    .map(|cell| {
                        let file_name = CellContent::of(cell.occupant).needs_file().then(|| {
                            next_index += 1;
                            file_name(base_name, next_index)
                        });
                        let percent = round_to(100.0 * f64::from(cell.width()) / total, 2);
                        PlannedCell {
                            cell,
                            file_name,
                            percent,
                        }
                    })
                    .collect();
                PlannedRow {
                    top: row.top,
                    bottom: row.bottom,
                    cells,
                }
            })
            .collect();

        Ok(Self {
            width,
            height,
            rows,
            selections,
        })
    }

    /// Cells that need a crop, in file order.
    pub fn image_cells(&self) -> impl Iterator<Item = (&str, PixelRect)> + '_ {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .filter_map(|c| c.file_name.as_deref().map(|name| (name, c.cell.pixel_rect())))
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.image_cells().map(|(name, _)| name).collect()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).sum()
    }

    /// "Area #N" label of `id` within the snapshot this plan was built from.
    pub fn label(&self, id: SelectionId) -> String {
        self.selections
            .iter()
            .position(|s| s.id() == id)
            .map(|pos| display_label(pos, &self.selections[pos]))
            .unwrap_or_else(|| format!("selection {id}"))
    }
}

/// One encoded crop.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceFile {
    pub name: String,
    pub rect: PixelRect,
    pub bytes: Vec<u8>,
}

/// Summary row for the manifest sidecar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSummary {
    pub row: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub percent: f64,
    pub content: &'static str,
    pub file: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SliceOutput {
    pub html: String,
    pub files: Vec<SliceFile>,
    pub cells: Vec<CellSummary>,
    pub row_count: usize,
}

fn summarize(plan: &SlicePlan<'_>) -> Vec<CellSummary> {
    let mut out = Vec::with_capacity(plan.cell_count());
    for (row_idx, row) in plan.rows.iter().enumerate() {
        for planned in &row.cells {
            let rect = planned.cell.pixel_rect();
            let content = CellContent::of(planned.cell.occupant);
            out.push(CellSummary {
                row: row_idx + 1,
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                percent: planned.percent,
                content: match content {
                    CellContent::Image => "image",
                    CellContent::Link(_) => "link",
                    CellContent::Replace(_) => "replace",
                },
                file: planned.file_name.clone(),
                link: match content {
                    CellContent::Link(url) => Some(url.to_string()),
                    _ => None,
                },
            });
        }
    }
    out
}

/// Run the whole slice over a selection snapshot. Markup is produced first so
/// input errors surface before any pixels are encoded; the call returns only
/// once every crop has finished encoding.
pub fn slice(
    raster: &dyn RasterSource,
    selections: &[Selection],
    base_name: &str,
    config: &SlicerConfig,
) -> Result<SliceOutput, SliceError> {
    let (width, height) = raster.dimensions();
    let base = sanitize_base_name(base_name);
    let plan = SlicePlan::build(width, height, selections, config.precedence, &base)?;
    let html = emit_html(&plan, config.max_table_width)?;
    let files = rasterize(&plan, raster)?;

    info!(
        "sliced {}x{} into {} row(s), {} cell(s), {} file(s)",
        width,
        height,
        plan.rows.len(),
        plan.cell_count(),
        files.len()
    );

    Ok(SliceOutput {
        html,
        cells: summarize(&plan),
        row_count: plan.rows.len(),
        files,
    })
}
