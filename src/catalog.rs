use crate::errors::{Result, StorefrontError};
use serde::Serialize;
use std::path::PathBuf;

/// One purchasable item, parsed from a `name,color,category,$price,image` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    pub name: String,
    pub color: String,
    pub category: String,
    pub price: u32,
    /// Symbol the price was written with, e.g. `$` or `€`.
    pub currency: Option<char>,
    pub image_ref: String,
}

const FIELD_COUNT: usize = 5;

impl ItemRecord {
    /// Parse a single catalog line. `line_no` is 1-based and only used for
    /// error reporting.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let malformed = |reason: String| StorefrontError::MalformedRecord {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(malformed(format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        }

        let (currency, price) = PriceParser::new(fields[3])
            .parse()
            .map_err(|e| malformed(format!("price {:?}: {e}", fields[3])))?;

        Ok(Self {
            name: fields[0].to_string(),
            color: fields[1].to_string(),
            category: fields[2].to_string(),
            price,
            currency,
            image_ref: fields[4].to_string(),
        })
    }

    /// Price as written in the catalog, symbol included.
    pub fn price_label(&self) -> String {
        match self.currency {
            Some(symbol) => format!("{symbol}{}", self.price),
            None => self.price.to_string(),
        }
    }

    /// Serialize back into the catalog line format.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.name,
            self.color,
            self.category,
            self.price_label(),
            self.image_ref
        )
    }
}

/// Cursor over a price field. Accepts one optional leading currency symbol
/// followed by ASCII digits only. Whitespace is never a currency symbol.
struct PriceParser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> PriceParser<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn parse(&mut self) -> std::result::Result<(Option<char>, u32), &'static str> {
        let currency = self.skip_currency();
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += c.len_utf8();
            } else {
                return Err("unexpected character");
            }
        }
        if self.i == start {
            return Err("expected digits");
        }
        let price = self.s[start..self.i]
            .parse::<u32>()
            .map_err(|_| "out of range")?;
        Ok((currency, price))
    }

    fn skip_currency(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        if c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == '+' {
            return None;
        }
        self.i += c.len_utf8();
        Some(c)
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }
}

/// Items in source order. Never mutated in place; sorting produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    items: Vec<ItemRecord>,
}

impl Catalog {
    pub fn new(items: Vec<ItemRecord>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&ItemRecord> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ItemRecord> {
        self.items.iter()
    }

    /// Re-serialize every record, one per line.
    pub fn to_text(&self) -> String {
        self.items
            .iter()
            .map(ItemRecord::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<ItemRecord> for Catalog {
    fn from_iter<I: IntoIterator<Item = ItemRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ItemRecord;
    type IntoIter = std::slice::Iter<'a, ItemRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Result of a lenient load: the good records plus what was skipped.
#[derive(Debug, Default)]
pub struct CatalogLoad {
    pub catalog: Catalog,
    pub rejected: Vec<StorefrontError>,
}

/// Parse newline-delimited catalog text. Blank lines are ignored; malformed
/// lines are skipped, logged and returned in `rejected`.
pub fn load(raw: &str) -> CatalogLoad {
    let mut items = Vec::new();
    let mut rejected = Vec::new();

    for (idx, line) in raw.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match ItemRecord::parse_line(line, idx + 1) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(error = %e, "skipping catalog record");
                rejected.push(e);
            }
        }
    }

    tracing::debug!(items = items.len(), rejected = rejected.len(), "catalog loaded");
    CatalogLoad {
        catalog: Catalog::new(items),
        rejected,
    }
}

/// Like [`load`] but fails on the first malformed record.
pub fn load_strict(raw: &str) -> Result<Catalog> {
    let CatalogLoad { catalog, mut rejected } = load(raw);
    if rejected.is_empty() {
        Ok(catalog)
    } else {
        Err(rejected.remove(0))
    }
}

/// Where catalog text comes from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Inline(String),
    File(PathBuf),
    Url(String),
}

impl CatalogSource {
    /// Interpret a CLI argument: `http(s)://` means a URL, anything else a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.to_string())
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Inline(_) => "<inline>".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    /// Retrieve the raw catalog text.
    pub async fn fetch(&self) -> Result<String> {
        let fetch_err = |reason: String| StorefrontError::CatalogFetch {
            source_name: self.name(),
            reason,
        };
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| fetch_err(e.to_string())),
            Self::Url(url) => {
                let response = reqwest::get(url)
                    .await
                    .map_err(|e| fetch_err(e.to_string()))?;
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    return Err(fetch_err(format!("HTTP status {status}")));
                }
                response.text().await.map_err(|e| fetch_err(e.to_string()))
            }
        }
    }

    /// Fetch and leniently parse.
    pub async fn load(&self) -> Result<CatalogLoad> {
        let raw = self.fetch().await?;
        Ok(load(&raw))
    }
}
