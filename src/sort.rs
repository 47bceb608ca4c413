use crate::catalog::Catalog;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Field the shopper can order the grid by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Price,
    Category,
}

impl SortField {
    pub const ALL: [SortField; 2] = [SortField::Price, SortField::Category];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::Category => "category",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortField::Price => "Price",
            SortField::Category => "Category",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" => Ok(SortField::Price),
            "category" => Ok(SortField::Category),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

/// Return a new catalog ordered by `field`. Stable: equal keys keep their
/// relative input order.
pub fn sort_by(catalog: &Catalog, field: SortField) -> Catalog {
    let sorted = match field {
        SortField::Price => catalog.iter().sorted_by_key(|item| item.price),
        SortField::Category => catalog
            .iter()
            .sorted_by(|a, b| a.category.cmp(&b.category)),
    };
    sorted.cloned().collect()
}

/// The sort dropdown as mounted in the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSelector {
    pub label: &'static str,
    pub options: Vec<SortField>,
    /// Nothing is selected until the shopper picks an option.
    pub selected: Option<SortField>,
}

impl Default for SortSelector {
    fn default() -> Self {
        Self {
            label: "Sort Items By: ",
            options: SortField::ALL.to_vec(),
            selected: None,
        }
    }
}
