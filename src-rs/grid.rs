//! Partition the image into rows and cells along selection edges, resolve
//! each cell's occupant and merge runs of equally-occupied cells.
//!
//! Everything here is a pure function of the image size and a selection
//! snapshot; nothing is cached between slices.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::geometry::PixelRect;
use crate::selection::{Selection, SelectionId};

/// Which selection owns a cell whose center lies in several selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OccupantPrecedence {
    /// The earliest-created selection wins (store order).
    #[default]
    FirstCreated,
    /// The most recently created selection wins.
    LastCreated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell<'a> {
    pub row_start: u32,
    pub row_end: u32,
    pub col_start: u32,
    pub col_end: u32,
    pub occupant: Option<&'a Selection>,
}

impl Cell<'_> {
    pub fn width(&self) -> u32 {
        self.col_end - self.col_start
    }

    pub fn height(&self) -> u32 {
        self.row_end - self.row_start
    }

    pub fn occupant_id(&self) -> Option<SelectionId> {
        self.occupant.map(Selection::id)
    }

    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect {
            x: self.col_start,
            y: self.row_start,
            width: self.width(),
            height: self.height(),
        }
    }
}

/// A contiguous run of cells in one row sharing an occupant.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCell<'a> {
    pub row_start: u32,
    pub row_end: u32,
    pub col_start: u32,
    pub col_end: u32,
    pub occupant: Option<&'a Selection>,
    /// Column boundaries of the member cells that were joined, exclusive of
    /// the outer edges.
    pub seams: Vec<u32>,
}

impl<'a> MergedCell<'a> {
    fn from_cell(cell: &Cell<'a>) -> Self {
        Self {
            row_start: cell.row_start,
            row_end: cell.row_end,
            col_start: cell.col_start,
            col_end: cell.col_end,
            occupant: cell.occupant,
            seams: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.col_end - self.col_start
    }

    pub fn height(&self) -> u32 {
        self.row_end - self.row_start
    }

    pub fn occupant_id(&self) -> Option<SelectionId> {
        self.occupant.map(Selection::id)
    }

    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect {
            x: self.col_start,
            y: self.row_start,
            width: self.width(),
            height: self.height(),
        }
    }

    /// The whole merged span as a single cell.
    pub fn as_cell(&self) -> Cell<'a> {
        Cell {
            row_start: self.row_start,
            row_end: self.row_end,
            col_start: self.col_start,
            col_end: self.col_end,
            occupant: self.occupant,
        }
    }

    /// Undo the merge: one cell per original member.
    pub fn split(&self) -> Vec<Cell<'a>> {
        let mut edges = Vec::with_capacity(self.seams.len() + 2);
        edges.push(self.col_start);
        edges.extend(&self.seams);
        edges.push(self.col_end);
        edges
            .windows(2)
            .map(|w| Cell {
                row_start: self.row_start,
                row_end: self.row_end,
                col_start: w[0],
                col_end: w[1],
                occupant: self.occupant,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow<'a> {
    pub top: u32,
    pub bottom: u32,
    pub cells: Vec<Cell<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow<'a> {
    pub top: u32,
    pub bottom: u32,
    pub cells: Vec<MergedCell<'a>>,
}

impl MergedRow<'_> {
    pub fn total_width(&self) -> u32 {
        self.cells.iter().map(MergedCell::width).sum()
    }
}

fn clamp_edge(value: i32, limit: u32) -> u32 {
    value.clamp(0, limit.min(i32::MAX as u32) as i32) as u32
}

/// Selections that can contribute edges; zero or negative spans never reach
/// the grid.
fn usable<'a>(selections: &'a [Selection]) -> impl Iterator<Item = &'a Selection> + 'a {
    selections.iter().filter(|s| s.rect().has_area())
}

/// Sorted distinct row boundaries: image edges plus every selection's clamped
/// top and bottom.
pub fn rows_of(image_height: u32, selections: &[Selection]) -> Vec<u32> {
    let mut edges = BTreeSet::from([0, image_height]);
    for sel in usable(selections) {
        let rect = sel.rect();
        edges.insert(clamp_edge(rect.y, image_height));
        edges.insert(clamp_edge(rect.bottom(), image_height));
    }
    edges.into_iter().collect()
}

/// Sorted distinct column boundaries for the row `[row_start, row_end)`,
/// counting only selections that reach into that row.
pub fn cols_of(row_start: u32, row_end: u32, image_width: u32, selections: &[Selection]) -> Vec<u32> {
    let mut edges = BTreeSet::from([0, image_width]);
    for sel in usable(selections) {
        let rect = sel.rect();
        if rect.spans_rows(row_start, row_end) {
            edges.insert(clamp_edge(rect.x, image_width));
            edges.insert(clamp_edge(rect.right(), image_width));
        }
    }
    edges.into_iter().collect()
}

/// Find the selection owning the point `(cx, cy)`.
pub fn resolve_occupant(
    cx: f64,
    cy: f64,
    selections: &[Selection],
    precedence: OccupantPrecedence,
) -> Option<&Selection> {
    let hit = |s: &&Selection| s.rect().has_area() && s.rect().contains(cx, cy);
    match precedence {
        OccupantPrecedence::FirstCreated => selections.iter().find(hit),
        OccupantPrecedence::LastCreated => selections.iter().rev().find(hit),
    }
}

/// Cut the image into rows and per-row cells and resolve every occupant once.
pub fn build_grid(
    image_width: u32,
    image_height: u32,
    selections: &[Selection],
    precedence: OccupantPrecedence,
) -> Vec<GridRow<'_>> {
    let skipped = selections.iter().filter(|s| !s.rect().has_area()).count();
    if skipped > 0 {
        warn!("{skipped} selection(s) without positive area ignored by the grid");
    }

    let rows = rows_of(image_height, selections);
    let mut out = Vec::with_capacity(rows.len().saturating_sub(1));
    for pair in rows.windows(2) {
        let (top, bottom) = (pair[0], pair[1]);
        if bottom <= top {
            continue;
        }
        let cy = f64::from(top) + f64::from(bottom - top) / 2.0;
        let cols = cols_of(top, bottom, image_width, selections);
        let cells: Vec<Cell<'_>> = cols
            .windows(2)
            .filter(|c| c[1] > c[0])
            .map(|c| {
                let cx = f64::from(c[0]) + f64::from(c[1] - c[0]) / 2.0;
                Cell {
                    row_start: top,
                    row_end: bottom,
                    col_start: c[0],
                    col_end: c[1],
                    occupant: resolve_occupant(cx, cy, selections, precedence),
                }
            })
            .collect();
        if !cells.is_empty() {
            out.push(GridRow { top, bottom, cells });
        }
    }
    debug!(
        "grid {}x{}: {} row(s), {} cell(s)",
        image_width,
        image_height,
        out.len(),
        out.iter().map(|r| r.cells.len()).sum::<usize>()
    );
    out
}

/// Join adjacent cells whose occupant is the same selection (or both none).
/// Equality is by identity; two selections with equal payloads never merge.
pub fn merge_row<'a>(cells: &[Cell<'a>]) -> Vec<MergedCell<'a>> {
    let mut out: Vec<MergedCell<'a>> = Vec::new();
    for cell in cells {
        match out.last_mut() {
            Some(run)
                if run.occupant_id() == cell.occupant_id() && run.col_end == cell.col_start =>
            {
                run.seams.push(cell.col_start);
                run.col_end = cell.col_end;
            }
            _ => out.push(MergedCell::from_cell(cell)),
        }
    }
    out
}

/// Build the grid and merge every row.
pub fn merged_grid(
    image_width: u32,
    image_height: u32,
    selections: &[Selection],
    precedence: OccupantPrecedence,
) -> Vec<MergedRow<'_>> {
    build_grid(image_width, image_height, selections, precedence)
        .into_iter()
        .map(|row| MergedRow {
            top: row.top,
            bottom: row.bottom,
            cells: merge_row(&row.cells),
        })
        .collect()
}
