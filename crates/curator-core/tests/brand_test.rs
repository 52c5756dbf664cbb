mod common;

use common::*;
use curator_core::completion::NoopCompletion;
use curator_core::dedup::{DedupConfig, DedupResolver};
use curator_core::{
    CompletenessField, CuratorError, DedupRecord, ExtractionMethod, PriceBucket, Provenance, RecordKind,
};
use serde_json::json;
use std::sync::Arc;

fn tove_search() -> Arc<StubSearch> {
    let search = StubSearch::new();
    search.on(
        "Tove clothing",
        vec![
            snippet("Alba Dress | Tove", "Silk midi dress. $695", "https://tove-studio.com/products/alba"),
            snippet("Mira Coat | Tove", "Wool wrap coat $895", "https://tove-studio.com/products/mira"),
            snippet("Juno Skirt | Tove", "Pleated skirt $1,295", "https://tove-studio.com/products/juno"),
            snippet("Tove review", "A London label", "https://www.vogue.com/article/tove"),
        ],
    );
    search
}

#[tokio::test]
async fn test_three_products_use_median_without_estimation() {
    let completion = StubCompletion::new(None, Some(json!({"priceRange": "$"})));
    let service = service(test_config(2), None, tove_search(), completion.clone());

    let profile = service.resolve_brand("Tove").await.unwrap();

    assert_eq!(profile.products.len(), 3);
    assert_eq!(profile.median_price, Some(895.0));
    assert_eq!(profile.price_range_bucket, Some(PriceBucket::Luxury));
    assert_eq!(profile.data_completeness[&CompletenessField::PriceRange], Provenance::Products);
    assert_eq!(completion.estimates(), 0);
    assert_eq!(completion.extractions(), 0);
    assert_eq!(profile.domain.as_deref(), Some("tove-studio.com"));
    assert!(profile.categories.contains("dresses"));
    assert_eq!(profile.data_completeness[&CompletenessField::Categories], Provenance::Products);

    let json = serde_json::to_value(&profile).unwrap();
    assert_eq!(json["priceRangeBucket"], "$$$$");
    assert_eq!(json["dataCompleteness"]["priceRange"], "products");
}

#[tokio::test]
async fn test_shipping_threshold_does_not_skew_median() {
    let search = StubSearch::new();
    let shipping = "Free shipping on orders over $150.";
    search.on(
        "Tove clothing",
        vec![
            snippet("Alba Dress $695 | Tove", shipping, "https://tove-studio.com/products/alba"),
            snippet("Mira Coat $895 | Tove", shipping, "https://tove-studio.com/products/mira"),
            snippet("Juno Skirt $1,295 | Tove", shipping, "https://tove-studio.com/products/juno"),
        ],
    );
    let service = service(test_config(2), None, search, Arc::new(NoopCompletion));

    let profile = service.resolve_brand("Tove").await.unwrap();

    assert_eq!(profile.median_price, Some(895.0));
    assert_eq!(profile.price_range_bucket, Some(PriceBucket::Luxury));
    assert!(profile.products.iter().all(|p| p.original_price.is_none()));
}

#[tokio::test]
async fn test_no_evidence_falls_back_to_default_and_estimate() {
    let search = StubSearch::new();
    search.on(
        "Acme Label clothing",
        vec![snippet("Acme Label | About", "Founded in Brooklyn", "https://acmelabel.com/about")],
    );
    let completion = StubCompletion::new(
        Some(json!({"products": []})),
        Some(json!({"priceRange": "$$", "confidence": "medium"})),
    );
    let service = service(test_config(2), None, search.clone(), completion.clone());

    let profile = service.resolve_brand("Acme Label").await.unwrap();

    assert!(profile.products.is_empty());
    assert_eq!(profile.categories.iter().collect::<Vec<_>>(), vec!["fashion"]);
    assert_eq!(profile.data_completeness[&CompletenessField::Categories], Provenance::Default);
    assert_eq!(profile.price_range_bucket, Some(PriceBucket::Moderate));
    assert_eq!(profile.data_completeness[&CompletenessField::PriceRange], Provenance::Estimated);
    assert_eq!(completion.estimates(), 1);
    assert_eq!(search.call_count(), 2);
}

#[tokio::test]
async fn test_failed_estimate_is_an_annotation_not_an_error() {
    let service = service(test_config(2), None, StubSearch::new(), Arc::new(NoopCompletion));
    let profile = service.resolve_brand("Nobody Knows").await.unwrap();

    assert_eq!(profile.price_range_bucket, None);
    assert_eq!(profile.data_completeness[&CompletenessField::PriceRange], Provenance::None);
    assert_eq!(profile.data_completeness[&CompletenessField::Products], Provenance::None);
    assert!(!profile.categories.is_empty());
}

#[tokio::test]
async fn test_assisted_products_are_tagged_and_do_not_set_price_tier() {
    let completion = StubCompletion::new(
        Some(json!({"products": [
            {"name": "Alba Dress", "price": "about $700", "priceConfidence": "low"},
            {"name": "Mira Coat", "price": 900, "priceConfidence": "medium"}
        ]})),
        Some(json!({"priceRange": "$$$$", "typicalPrice": 800})),
    );
    let service = service(test_config(2), None, StubSearch::new(), completion.clone());
    let profile = service.resolve_brand("Tove").await.unwrap();

    assert_eq!(profile.products.len(), 2);
    assert!(profile
        .products
        .iter()
        .all(|p| p.extraction_method == ExtractionMethod::AiEstimate && p.price_confidence.is_some()));
    assert_eq!(profile.data_completeness[&CompletenessField::PriceRange], Provenance::Estimated);
    assert_eq!(profile.data_completeness[&CompletenessField::Products], Provenance::Estimated);
    assert_eq!(completion.estimates(), 1);
}

#[tokio::test]
async fn test_brand_site_sizes_preferred_over_snippets() {
    let browser = StubBrowser::new();
    browser.page(
        "https://tove-studio.com",
        &product_html("Alba Dress", 695.0),
        "Alba Dress\n$695\nSize guide: XS-XXL",
    );
    let search = tove_search();
    search.on(
        "new arrivals",
        vec![snippet("Tove sizing", "Dresses in sizes 2-12", "https://tove-studio.com/pages/sizing")],
    );
    let service = service(test_config(2), Some(browser.clone()), search, Arc::new(NoopCompletion));

    let profile = service.resolve_brand("Tove").await.unwrap();

    assert!(browser.navigated("https://tove-studio.com"));
    assert_eq!(profile.size_range_label.as_deref(), Some("XS-XXL"));
    assert_eq!(profile.data_completeness[&CompletenessField::SizeRange], Provenance::FullPage);
    assert!(profile
        .products
        .iter()
        .any(|p| p.extraction_method == ExtractionMethod::Direct));
}

#[tokio::test]
async fn test_quality_score_is_repeatable() {
    let service = service(test_config(2), None, tove_search(), Arc::new(NoopCompletion));
    let first = service.resolve_brand("Tove").await.unwrap();
    let second = service.resolve_brand("Tove").await.unwrap();
    assert_eq!(first.quality_score, second.quality_score);
    assert_eq!(first.data_completeness, second.data_completeness);
    assert!(first.quality_score > 0);
}

#[tokio::test]
async fn test_empty_brand_name_is_rejected() {
    let service = service(test_config(2), None, StubSearch::new(), Arc::new(NoopCompletion));
    assert!(matches!(
        service.resolve_brand("   ").await,
        Err(CuratorError::EmptyBrandName)
    ));
}

#[test]
fn test_duplicates_are_symmetric_for_overlapping_sales() {
    let resolver = DedupResolver::new(DedupConfig::default());
    let day = |d: u32| chrono::NaiveDate::from_ymd_opt(2026, 5, d);
    let record = |id: &str, name: &str, start: u32, end: u32| DedupRecord {
        id: id.into(),
        company_name: name.into(),
        kind: RecordKind::Sale,
        starts_on: day(start),
        ends_on: day(end),
    };

    let pairs = [
        (record("a", "Tove Studio Ltd.", 1, 10), record("b", "tove studio", 10, 20), true),
        (record("c", "The Frankie Shop", 1, 5), record("d", "Frankie Shop LLC", 3, 4), true),
        (record("e", "Tove Studio", 1, 5), record("f", "Tove Studio", 6, 9), false),
    ];
    for (left, right, expected) in pairs {
        let forward = resolver.find_duplicates(&left, std::slice::from_ref(&right));
        let backward = resolver.find_duplicates(&right, std::slice::from_ref(&left));
        assert_eq!(!forward.is_empty(), expected, "{} vs {}", left.id, right.id);
        assert_eq!(!backward.is_empty(), expected, "{} vs {}", right.id, left.id);
    }
}
