use crate::catalog::Catalog;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

pub const COLUMNS: usize = 3;
const BUY_LABEL: &str = "Buy Now";

/// Purchase trigger bound to one rendered item. Dispatched through
/// `Storefront::purchase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseControl {
    /// Position of the item in the rendered catalog.
    pub item: usize,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridCell {
    pub name: String,
    pub color: String,
    pub category: String,
    pub price: u32,
    /// Price with the catalog's currency symbol.
    pub price_label: String,
    pub image: String,
    pub purchase: PurchaseControl,
}

/// Items laid out row by row, `COLUMNS` per row; the last row may be short.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedGrid {
    pub rows: Vec<Vec<GridCell>>,
}

/// Lay out `catalog` as a grid. Pure: same catalog, same grid.
pub fn render(catalog: &Catalog, image_prefix: &str) -> RenderedGrid {
    let rows = catalog
        .iter()
        .enumerate()
        .map(|(idx, item)| GridCell {
            name: item.name.clone(),
            color: item.color.clone(),
            category: item.category.clone(),
            price: item.price,
            price_label: item.price_label(),
            image: format!("{image_prefix}{}", item.image_ref),
            purchase: PurchaseControl {
                item: idx,
                label: BUY_LABEL,
            },
        })
        .chunks(COLUMNS)
        .into_iter()
        .map(|row| row.collect())
        .collect();
    RenderedGrid { rows }
}

impl RenderedGrid {
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.rows.iter().flatten()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Find the purchase control for the item at `item`.
    pub fn control(&self, item: usize) -> Option<PurchaseControl> {
        self.cells()
            .map(|c| c.purchase)
            .find(|p| p.item == item)
    }

    /// HTML `<table>` markup for the grid. Buttons carry `data-item` so a page
    /// script can bind them; there is no inline handler.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<table>");
        for row in &self.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str(&format!(
                    "<td><div>{} in {}<br><b>{}, {}</b><img src=\"{}\" >\
                     <button class=\"red-button buy-button\" data-item=\"{}\">{}</button></div></td>",
                    escape_html(&cell.name),
                    escape_html(&cell.color),
                    escape_html(&cell.category),
                    escape_html(&cell.price_label),
                    escape_html(&cell.image),
                    cell.purchase.item,
                    cell.purchase.label,
                ));
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>");
        out
    }
}

impl fmt::Display for RenderedGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let line = row
                .iter()
                .map(|c| {
                    format!(
                        "[{}] {} in {} | {}, {} | {}",
                        c.purchase.item, c.name, c.color, c.category, c.price_label, c.image
                    )
                })
                .join("    ");
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
