//! Deterministic product extraction from a fetched page.
//!
//! Sources are tried from most to least structured: schema.org JSON-LD,
//! product meta tags, the page heading next to a price, and finally
//! name/price line pairs in the visible text.

use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;
use serde_json::Value;

use super::price::{count_prices, parse_price_expr, parse_sale_pair, ExtractionTier, PriceKind};
use crate::model::Product;
use crate::scraper::PageSnapshot;

const JSON_LD_CONFIDENCE: u8 = 95;
const META_CONFIDENCE: u8 = 85;
const HEADING_CONFIDENCE: u8 = 65;
const LINE_PAIR_CONFIDENCE: u8 = 55;

/// Visible-text lines inspected by the text heuristics.
const TEXT_LINE_LIMIT: usize = 600;

const NON_NAME_LINES: &[&str] = &[
    "add to bag",
    "add to cart",
    "quick view",
    "quick shop",
    "sold out",
    "new arrivals",
    "shop now",
    "shop all",
    "sale",
    "menu",
    "search",
    "sign in",
    "log in",
    "cart",
    "wishlist",
    "free shipping",
    "view all",
    "select size",
    "size guide",
];

pub fn extract_from_page(url: &str, page: &PageSnapshot) -> Vec<Product> {
    let document = kuchikiki::parse_html().one(page.html.as_str());

    let from_json_ld = json_ld_products(&document, url);
    if !from_json_ld.is_empty() {
        return from_json_ld;
    }

    if let Some(product) = meta_product(&document, url) {
        return vec![product];
    }

    let text = if page.text.trim().is_empty() {
        document.text_contents()
    } else {
        page.text.clone()
    };

    if count_prices(&text) <= 2 {
        if let Some(product) = heading_product(&document, &text, url) {
            return vec![product];
        }
    }

    line_pair_products(&text, url, ExtractionTier::Pattern, LINE_PAIR_CONFIDENCE)
}

fn json_ld_products(document: &NodeRef, url: &str) -> Vec<Product> {
    let Ok(scripts) = document.select(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for script in scripts {
        let raw = script.as_node().text_contents();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => collect_ld_products(&value, url, &mut found),
            Err(e) => tracing::debug!("Skipping malformed JSON-LD on {}: {}", url, e),
        }
    }
    found
}

fn is_product_type(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

fn collect_ld_products(value: &Value, url: &str, out: &mut Vec<Product>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_ld_products(v, url, out)),
        Value::Object(map) => {
            if is_product_type(value) {
                if let Some(product) = ld_product(value, url) {
                    out.push(product);
                }
                return;
            }
            for key in ["@graph", "itemListElement", "item", "mainEntity"] {
                if let Some(nested) = map.get(key) {
                    collect_ld_products(nested, url, out);
                }
            }
        }
        _ => {}
    }
}

fn ld_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn ld_image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => ld_image(items.first()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// List or strikethrough price from an offer's `priceSpecification`.
/// `highPrice` is only the top of an aggregate offer and never counts.
fn ld_list_price(offer: &Value) -> Option<f64> {
    let specs = match offer.get("priceSpecification")? {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        single => vec![single],
    };
    specs.into_iter().find_map(|spec| {
        let kind = spec.get("priceType")?.as_str()?;
        (kind.ends_with("ListPrice") || kind.ends_with("StrikethroughPrice"))
            .then(|| ld_number(spec.get("price")))
            .flatten()
    })
}

fn ld_product(value: &Value, page_url: &str) -> Option<Product> {
    let name = clean_name(value.get("name")?.as_str()?);
    if name.is_empty() {
        return None;
    }
    let url = value
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or(page_url)
        .to_string();

    let offer = match value.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };
    let band = ExtractionTier::Pattern.band();
    let price = offer.and_then(|o| {
        ld_number(o.get("price"))
            .or_else(|| ld_number(o.get("lowPrice")))
            .filter(|p| band.contains(*p))
    });
    let original = offer.and_then(ld_list_price).filter(|p| band.contains(*p));

    let mut product = Product::direct(name, url, JSON_LD_CONFIDENCE).with_image(ld_image(value.get("image")));
    if let Some(original) = original {
        product = product.with_original_price(original);
    }
    if let Some(price) = price {
        product = product.with_price(price);
    }
    Some(product)
}

fn meta_content(document: &NodeRef, selector: &str) -> Option<String> {
    let node = document.select_first(selector).ok()?;
    let attrs = node.attributes.borrow();
    attrs
        .get("content")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn meta_product(document: &NodeRef, url: &str) -> Option<Product> {
    let amount = meta_content(document, r#"meta[property="product:price:amount"]"#)
        .or_else(|| meta_content(document, r#"meta[property="og:price:amount"]"#))?;
    let price: f64 = amount.replace(',', "").parse().ok()?;
    if !ExtractionTier::Pattern.band().contains(price) {
        return None;
    }

    let name = meta_content(document, r#"meta[property="og:title"]"#)
        .or_else(|| first_text(document, "h1"))
        .map(|n| clean_name(&n))
        .filter(|n| !n.is_empty())?;
    let image = meta_content(document, r#"meta[property="og:image"]"#);

    Some(
        Product::direct(name, url, META_CONFIDENCE)
            .with_image(image)
            .with_price(price),
    )
}

fn first_text(document: &NodeRef, selector: &str) -> Option<String> {
    let node = document.select_first(selector).ok()?;
    let text = node.as_node().text_contents();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn heading_product(document: &NodeRef, text: &str, url: &str) -> Option<Product> {
    let name = clean_name(&first_text(document, "h1")?);
    if !looks_like_name(&name) {
        return None;
    }

    let lines: Vec<&str> = text.lines().take(TEXT_LINE_LIMIT).collect();
    let start = lines
        .iter()
        .position(|l| l.contains(name.as_str()))
        .unwrap_or(0);

    for line in &lines[start..] {
        if let Some((price, original)) = parse_sale_pair(line, ExtractionTier::Pattern) {
            return Some(
                Product::direct(name, url, HEADING_CONFIDENCE)
                    .with_original_price(original)
                    .with_price(price),
            );
        }
        if let Some(expr) = parse_price_expr(line, ExtractionTier::Pattern) {
            let confidence = if expr.kind == PriceKind::Literal {
                HEADING_CONFIDENCE
            } else {
                HEADING_CONFIDENCE - 10
            };
            return Some(Product::direct(name, url, confidence).with_price(expr.value));
        }
    }
    None
}

/// Name line immediately followed by a price line, as on listing grids.
pub fn line_pair_products(text: &str, url: &str, tier: ExtractionTier, confidence: u8) -> Vec<Product> {
    let lines: Vec<&str> = text
        .lines()
        .take(TEXT_LINE_LIMIT)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut products = Vec::new();
    for pair in lines.windows(2) {
        let (name_line, price_line) = (pair[0], pair[1]);
        if !looks_like_name(name_line) {
            continue;
        }
        let name = clean_name(name_line);
        if let Some((price, original)) = parse_sale_pair(price_line, tier) {
            products.push(
                Product::direct(name, url, confidence)
                    .with_original_price(original)
                    .with_price(price),
            );
        } else if let Some(expr) = parse_price_expr(price_line, tier) {
            products.push(Product::direct(name, url, confidence).with_price(expr.value));
        }
    }
    products
}

pub fn looks_like_name(line: &str) -> bool {
    let line = line.trim();
    let lower = line.to_lowercase();
    let words = line.split_whitespace().count();
    (3..=90).contains(&line.len())
        && (1..=12).contains(&words)
        && line.chars().any(char::is_alphabetic)
        && count_prices(line) == 0
        && !lower.contains('%')
        && !NON_NAME_LINES.iter().any(|n| lower == *n || lower.starts_with(&format!("{n} ")))
}

/// Collapses whitespace and drops trailing site or brand segments.
pub fn clean_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut name = collapsed.as_str();
    for sep in [" | ", " – ", " — ", " - "] {
        if let Some((head, _)) = name.split_once(sep) {
            if head.len() >= 3 {
                name = head;
            }
        }
    }
    name.chars().take(120).collect::<String>().trim().to_string()
}
