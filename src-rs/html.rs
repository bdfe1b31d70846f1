//! Nested-table markup for a slice plan, and the follow-up rewrite that
//! points `<img src>` at hosted copies of the files.

use crate::error::SliceError;
use crate::selection::{FontSize, Selection, SelectionContent, TextAlign};
use crate::slice::{PlannedCell, SlicePlan};

const IMG_STYLE: &str = "display:block; border:0; width: 100%;";

/// Text block standing in for the pixels of a replace selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBlock<'a> {
    pub selection: &'a Selection,
    pub text: &'a str,
    pub text_align: TextAlign,
    pub font_size: &'a str,
    pub background_color: &'a str,
    pub text_color: &'a str,
}

/// What a merged cell renders as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellContent<'a> {
    Image,
    Link(&'a str),
    Replace(TextBlock<'a>),
}

impl<'a> CellContent<'a> {
    /// Empty-url links render exactly like unoccupied cells.
    pub fn of(occupant: Option<&'a Selection>) -> Self {
        match occupant {
            None => CellContent::Image,
            Some(sel) => match sel.content() {
                SelectionContent::Link { .. } => match sel.link_url() {
                    Some(url) => CellContent::Link(url),
                    None => CellContent::Image,
                },
                SelectionContent::Replace {
                    text,
                    text_align,
                    font_size,
                    background_color,
                    text_color,
                } => CellContent::Replace(TextBlock {
                    selection: sel,
                    text,
                    text_align: *text_align,
                    font_size,
                    background_color,
                    text_color,
                }),
            },
        }
    }

    pub fn needs_file(&self) -> bool {
        !matches!(self, CellContent::Replace(_))
    }
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Style values end up inside `style="..."`; a stray `;` would start a new
/// declaration.
fn style_value(s: &str) -> String {
    escape_attr(s.trim()).replace(';', "")
}

/// Render `plan` as one outer table holding one inner table per row.
pub fn emit_html(plan: &SlicePlan<'_>, max_table_width: u32) -> Result<String, SliceError> {
    let mut html = format!(
        "<table cellpadding=\"0\" cellspacing=\"0\" border=\"0\" style=\"max-width:{max_table_width}px;\">\n"
    );

    for row in &plan.rows {
        html.push_str("  <tr>\n");
        html.push_str("    <td>\n");
        html.push_str("      <table cellpadding=\"0\" cellspacing=\"0\" border=\"0\" width=\"100%\">\n");
        html.push_str("        <tr>\n");
        for cell in &row.cells {
            html.push_str("          ");
            emit_cell(&mut html, plan, cell)?;
            html.push('\n');
        }
        html.push_str("        </tr>\n");
        html.push_str("      </table>\n");
        html.push_str("    </td>\n");
        html.push_str("  </tr>\n");
    }

    html.push_str("</table>");
    Ok(html)
}

fn emit_cell(out: &mut String, plan: &SlicePlan<'_>, planned: &PlannedCell<'_>) -> Result<(), SliceError> {
    let width = format!("{}%", planned.percent);
    match CellContent::of(planned.cell.occupant) {
        CellContent::Replace(block) => {
            let id = block.selection.id();
            let size: FontSize = block
                .font_size
                .parse()
                .map_err(|_| SliceError::InvalidFontSize {
                    id,
                    label: plan.label(id),
                    value: block.font_size.to_string(),
                })?;
            out.push_str(&format!(
                "<td width=\"{width}\" height=\"{}\"><div style=\"text-align:{};font-size:{};background-color:{};color:{};\">{}</div></td>",
                size.line_height(),
                block.text_align.as_css(),
                size,
                style_value(block.background_color),
                style_value(block.text_color),
                escape_text(block.text),
            ));
        }
        content => {
            let name = planned.file_name.as_deref().unwrap_or_default();
            let name = escape_attr(name);
            let img = format!("<img src=\"{name}\" alt=\"{name}\" style=\"{IMG_STYLE}\" />");
            match content {
                CellContent::Link(url) => {
                    out.push_str(&format!(
                        "<td width=\"{width}\"><a href=\"{}\" target=\"_blank\">{img}</a></td>",
                        escape_attr(url)
                    ));
                }
                _ => {
                    out.push_str(&format!("<td width=\"{width}\">{img}</td>"));
                }
            }
        }
    }
    Ok(())
}

/// `src` values of every `<img>` in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(pos) = rest.find("<img") {
        rest = &rest[pos + 4..];
        let tag_end = rest.find('>').unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if let Some(src) = attr_value(tag, "src") {
            out.push(src.to_string());
        }
        rest = &rest[tag_end..];
    }
    out
}

fn attr_value<'t>(tag: &'t str, name: &str) -> Option<&'t str> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

/// Point the n-th image at the n-th hosted URL. Blank or missing entries keep
/// the original file name; only `src` attributes are touched.
pub fn replace_image_sources(html: &str, urls: &[String]) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let mut index = 0usize;
    while let Some(pos) = rest.find("<img") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let tag_end = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        let replacement = urls
            .get(index)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty());
        match (replacement, attr_value(tag, "src")) {
            (Some(url), Some(src)) => {
                let old = format!(" src=\"{src}\"");
                let new = format!(" src=\"{}\"", escape_attr(url));
                out.push_str(&tag.replacen(&old, &new, 1));
            }
            _ => out.push_str(tag),
        }
        index += 1;
        rest = &rest[tag_end..];
    }
    out.push_str(rest);
    out
}
