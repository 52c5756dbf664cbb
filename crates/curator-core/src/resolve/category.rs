use std::collections::BTreeSet;

use crate::model::Provenance;

use super::Evidence;

/// Tag and the word stems that suggest it. Stems of four or more letters
/// match as prefixes; shorter ones must match a whole word or its plural.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("swimwear", &["swim", "bikini", "beachwear", "cover-up"]),
    ("dresses", &["dress", "gown", "sundress", "kaftan"]),
    ("tops", &["top", "tee", "blouse", "shirt", "tank", "cami", "sweater", "knit", "cardigan", "hoodie", "bodysuit"]),
    ("bottoms", &["pant", "trouser", "jean", "denim", "skirt", "shorts", "legging"]),
    ("outerwear", &["coat", "jacket", "blazer", "parka", "trench", "outerwear", "puffer"]),
    ("activewear", &["activewear", "athletic", "yoga", "sport", "gym", "workout"]),
    ("lingerie", &["lingerie", "bra", "underwear", "brief", "sleepwear", "pajama", "robe"]),
    ("menswear", &["men", "mens", "menswear"]),
    ("kids", &["kid", "children", "child", "baby", "toddler"]),
    ("shoes", &["shoe", "sneaker", "boot", "sandal", "heel", "loafer", "footwear", "mule"]),
    ("bags", &["bag", "handbag", "tote", "clutch", "backpack", "purse"]),
    ("jewelry", &["jewel", "necklace", "earring", "ring", "bracelet", "pendant"]),
    ("accessories", &["accessor", "hat", "scarf", "scarves", "belt", "sunglass", "glove", "wallet"]),
    ("beauty", &["beauty", "skincare", "makeup", "fragrance", "perfume", "cosmetic"]),
    ("home", &["homeware", "housewares", "candle", "bedding", "decor"]),
];

/// Tags that never carry clothing sizes.
pub const NON_APPAREL_CATEGORIES: &[&str] = &["bags", "jewelry", "accessories", "beauty", "home"];

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResolution {
    pub categories: BTreeSet<String>,
    pub provenance: Provenance,
}

impl CategoryResolution {
    /// False only when every tag is unambiguously non-clothing.
    pub fn may_have_sizes(&self) -> bool {
        self.provenance == Provenance::Default
            || self.categories.is_empty()
            || self
                .categories
                .iter()
                .any(|c| !NON_APPAREL_CATEGORIES.contains(&c.as_str()))
    }
}

fn stem_matches(word: &str, stem: &str) -> bool {
    if stem.len() >= 4 {
        word.starts_with(stem)
    } else {
        word == stem || word.strip_suffix('s') == Some(stem)
    }
}

/// Tags suggested by free text.
pub fn categories_in(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .collect();

    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, stems)| {
            stems
                .iter()
                .any(|stem| words.iter().any(|word| stem_matches(word, stem)))
        })
        .map(|(tag, _)| tag.to_string())
        .collect()
}

/// Tags from product names and search results combined. When neither
/// source suggests anything, `default_category` is applied.
pub fn resolve_categories(evidence: &Evidence, default_category: &str) -> CategoryResolution {
    let names = evidence
        .products
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let from_products = categories_in(&names);
    let from_snippets = categories_in(&evidence.snippet_text());

    let provenance = if !from_products.is_empty() {
        Provenance::Products
    } else if !from_snippets.is_empty() {
        Provenance::Snippets
    } else {
        return CategoryResolution {
            categories: BTreeSet::from([default_category.to_string()]),
            provenance: Provenance::Default,
        };
    };

    CategoryResolution {
        categories: from_products.into_iter().chain(from_snippets).collect(),
        provenance,
    }
}
