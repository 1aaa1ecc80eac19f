//! Table rendering for enrichment

use crate::config::TableRenderMode;
use crate::tokens::TokenCounter;
use crate::types::ExtractedTable;
use tracing::warn;

/// Renders extracted tables to text.
///
/// Merged cells appear once at their origin. Plain mode pads the
/// covered positions with empty placeholders; markdown and HTML omit
/// them — HTML carries rowspan/colspan attributes, markdown simply
/// emits no cell for a covered position.
pub struct TableRenderer {
    mode: TableRenderMode,
}

/// Grid cell state after span resolution
#[derive(Clone)]
enum Slot {
    Empty,
    Origin { index: usize },
    Covered,
}

impl TableRenderer {
    pub fn new(mode: TableRenderMode) -> Self {
        Self { mode }
    }

    /// Render the table and fill in `rendered_text` and `token_count`.
    ///
    /// A table whose cells do not fit its declared grid falls back to a
    /// plain cell join rather than failing the document.
    pub fn enrich(&self, table: &mut ExtractedTable, counter: &dyn TokenCounter) {
        let rendered = match self.resolve_grid(table) {
            Some(grid) => match self.mode {
                TableRenderMode::Plain => Self::render_plain(table, &grid),
                TableRenderMode::Markdown => Self::render_markdown(table, &grid),
                TableRenderMode::Html => Self::render_html(table, &grid),
            },
            None => {
                warn!(
                    "Table {} cells exceed its {}x{} grid, using plain fallback",
                    table.table_id, table.row_count, table.col_count
                );
                Self::render_fallback(table)
            }
        };

        table.token_count = counter.count_tokens(&rendered);
        table.rendered_text = Some(rendered);
    }

    /// Place cells on the grid, marking positions covered by spans
    fn resolve_grid(&self, table: &ExtractedTable) -> Option<Vec<Vec<Slot>>> {
        let rows = table.row_count as usize;
        let cols = table.col_count as usize;
        if rows == 0 || cols == 0 {
            return None;
        }

        let mut grid = vec![vec![Slot::Empty; cols]; rows];
        for (index, cell) in table.cells.iter().enumerate() {
            let r = cell.row as usize;
            let c = cell.col as usize;
            let r_end = r + cell.row_span.max(1) as usize;
            let c_end = c + cell.col_span.max(1) as usize;
            if r_end > rows || c_end > cols {
                return None;
            }

            for rr in r..r_end {
                for cc in c..c_end {
                    if !matches!(grid[rr][cc], Slot::Empty) {
                        return None;
                    }
                    grid[rr][cc] = if rr == r && cc == c {
                        Slot::Origin { index }
                    } else {
                        Slot::Covered
                    };
                }
            }
        }
        Some(grid)
    }

    fn cell_text<'a>(table: &'a ExtractedTable, slot: &Slot) -> &'a str {
        match slot {
            Slot::Origin { index } => table.cells[*index].text.as_str(),
            _ => "",
        }
    }

    fn caption_line(table: &ExtractedTable) -> Option<String> {
        table.caption.as_ref().map(|c| format!("Table: {}", c))
    }

    fn render_plain(table: &ExtractedTable, grid: &[Vec<Slot>]) -> String {
        let mut lines = Vec::new();
        if let Some(caption) = Self::caption_line(table) {
            lines.push(caption);
        }
        for row in grid {
            let cells: Vec<&str> = row.iter().map(|slot| Self::cell_text(table, slot)).collect();
            lines.push(cells.join("\t"));
        }
        lines.join("\n")
    }

    fn render_markdown(table: &ExtractedTable, grid: &[Vec<Slot>]) -> String {
        let mut lines = Vec::new();
        if let Some(caption) = Self::caption_line(table) {
            lines.push(caption);
            lines.push(String::new());
        }

        for (i, row) in grid.iter().enumerate() {
            // Span-covered positions are omitted entirely; only empty
            // grid positions keep a blank cell
            let cells: Vec<String> = row
                .iter()
                .filter(|slot| !matches!(slot, Slot::Covered))
                .map(|slot| Self::cell_text(table, slot).replace('|', "\\|"))
                .collect();
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 {
                let sep: Vec<&str> = cells.iter().map(|_| "---").collect();
                lines.push(format!("| {} |", sep.join(" | ")));
            }
        }
        lines.join("\n")
    }

    fn render_html(table: &ExtractedTable, grid: &[Vec<Slot>]) -> String {
        let mut out = String::from("<table>");
        if let Some(caption) = &table.caption {
            out.push_str(&format!("<caption>{}</caption>", escape_html(caption)));
        }
        for row in grid {
            out.push_str("<tr>");
            for slot in row {
                if let Slot::Origin { index } = slot {
                    let cell = &table.cells[*index];
                    let mut attrs = String::new();
                    if cell.row_span > 1 {
                        attrs.push_str(&format!(" rowspan=\"{}\"", cell.row_span));
                    }
                    if cell.col_span > 1 {
                        attrs.push_str(&format!(" colspan=\"{}\"", cell.col_span));
                    }
                    out.push_str(&format!("<td{}>{}</td>", attrs, escape_html(&cell.text)));
                }
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>");
        out
    }

    /// Best-effort rendering for tables with inconsistent grids
    fn render_fallback(table: &ExtractedTable) -> String {
        let mut lines = Vec::new();
        if let Some(caption) = Self::caption_line(table) {
            lines.push(caption);
        }
        let cells: Vec<&str> = table.cells.iter().map(|c| c.text.as_str()).collect();
        lines.push(cells.join("\t"));
        lines.join("\n")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
