//! Property-based testing for content extraction and store pagination.
//!
//! Uses proptest to generate page fragments and query parameters and verify
//! the invariants that must hold for any input.

use proptest::prelude::*;

use plin_web::extraction::{normalize_text, ContentExtractor, MAX_IMAGES, MAX_LINKS};
use plin_web::store::{ListQuery, NewClient, Store, MAX_LIMIT};

// ============================================================================
// STRATEGIES
// ============================================================================

/// Strategy for generating text with arbitrary whitespace runs
pub fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-zA-Z0-9éü]{1,12}", "[ \t\n]{1,4}"), 0..60)
        .prop_map(|parts| parts.into_iter().map(|(w, ws)| w + &ws).collect())
}

/// Strategy for generating an element wrapping text
pub fn arb_block() -> impl Strategy<Value = String> {
    (
        prop_oneof![
            Just("p"),
            Just("div"),
            Just("article"),
            Just("main"),
            Just("section"),
            Just("nav"),
            Just("script"),
            Just("footer"),
        ],
        arb_text(),
    )
        .prop_map(|(tag, text)| format!("<{tag}>{text}</{tag}>"))
}

/// Strategy for generating a whole page with references
pub fn arb_page() -> impl Strategy<Value = String> {
    (
        prop::option::of("[a-zA-Z ]{0,40}"),
        prop::collection::vec(arb_block(), 0..8),
        0usize..30,
        0usize..40,
    )
        .prop_map(|(title, blocks, images, links)| {
            let head = title
                .map(|t| format!("<head><title>{}</title></head>", t))
                .unwrap_or_default();
            let imgs: String = (0..images).map(|i| format!("<img src=\"/i{}.png\">", i)).collect();
            let anchors: String = (0..links).map(|i| format!("<a href=\"p{}\">l</a>", i)).collect();
            format!(
                "<html>{}<body>{}{}{}</body></html>",
                head,
                blocks.concat(),
                imgs,
                anchors
            )
        })
}

// ============================================================================
// EXTRACTION PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_extraction_is_deterministic(html in arb_page()) {
        let first = ContentExtractor::extract(&html, "https://example.com/a/b").unwrap();
        let second = ContentExtractor::extract(&html, "https://example.com/a/b").unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_content_length_counts_body_chars(html in arb_page()) {
        let result = ContentExtractor::extract(&html, "https://example.com/").unwrap();
        prop_assert_eq!(result.metadata.content_length, result.body.chars().count());
    }

    #[test]
    fn prop_body_is_normalized(html in arb_page()) {
        let result = ContentExtractor::extract(&html, "https://example.com/").unwrap();
        prop_assert_eq!(normalize_text(&result.body), result.body.clone());
        prop_assert!(!result.body.contains('\n'));
        prop_assert!(!result.body.contains("  "));
    }

    #[test]
    fn prop_title_is_never_empty(html in arb_page()) {
        let result = ContentExtractor::extract(&html, "https://example.com/").unwrap();
        prop_assert!(!result.title.trim().is_empty());
    }

    #[test]
    fn prop_reference_lists_are_capped_and_absolute(html in arb_page()) {
        let result = ContentExtractor::extract(&html, "https://example.com/dir/").unwrap();
        prop_assert!(result.metadata.images.len() <= MAX_IMAGES);
        prop_assert!(result.metadata.links.len() <= MAX_LINKS);
        for url in result.metadata.images.iter().chain(result.metadata.links.iter()) {
            prop_assert!(url.starts_with("https://example.com/"));
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(text in arb_text()) {
        let once = normalize_text(&text);
        prop_assert_eq!(normalize_text(&once), once);
    }
}

// ============================================================================
// PAGINATION PROPERTIES
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pagination_bounds(
        clients in 0usize..40,
        page in proptest::option::of(0u32..10),
        limit in proptest::option::of(0u32..200),
    ) {
        let query = ListQuery { page, limit, search: None };

        let result = runtime().block_on(async {
            let store = Store::in_memory().await.unwrap();
            for i in 0..clients {
                store
                    .create_client(NewClient {
                        name: format!("Client {}", i),
                        email: format!("c{}@example.com", i),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
            }
            store.list_clients(&query).await.unwrap()
        });

        prop_assert_eq!(result.total, clients);
        prop_assert!(result.count <= query.limit() as usize);
        prop_assert!(query.limit() >= 1 && query.limit() <= MAX_LIMIT);
        prop_assert!(result.current_page >= 1);
        prop_assert_eq!(result.count, result.data.len());
        prop_assert_eq!(
            result.total_pages,
            clients.div_ceil(query.limit() as usize)
        );
        let expected = clients
            .saturating_sub((result.current_page as usize - 1) * query.limit() as usize)
            .min(query.limit() as usize);
        prop_assert_eq!(result.count, expected);
    }
}
