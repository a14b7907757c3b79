// tests/providers_rss.rs
use factfirst_news::ingest::collect_articles;
use factfirst_news::ingest::providers::RssFeedSource;
use factfirst_news::ArticleSource;

fn fixture() -> String {
    std::fs::read_to_string("tests/fixtures/world_feed.xml").expect("fixture")
}

#[tokio::test]
async fn fixture_items_are_parsed_and_stripped() {
    let p = RssFeedSource::from_fixture_str("world", &fixture());
    let items = p.fetch_articles().await.expect("fixture parse");
    assert_eq!(items.len(), 5);

    let first = &items[0];
    assert_eq!(first.source, "Example World News");
    assert_eq!(first.link, "https://news.example.com/hurricane-delta-landfall");
    assert_eq!(
        first.body,
        "The storm came ashore near Creole with winds of 100 mph.\n\nThousands lost power."
    );
    assert_eq!(first.published_at, Some(1_749_556_800));

    let third = &items[2];
    assert!(!third.body.contains('<'));
    assert!(third.body.contains("\"Cajun coast\""));
    assert!(items[3].published_at.is_none());
}

#[tokio::test]
async fn duplicate_feeds_are_deduplicated_by_link() {
    let xml = fixture();
    let sources: Vec<Box<dyn ArticleSource>> = vec![
        Box::new(RssFeedSource::from_fixture_str("a", &xml)),
        Box::new(RssFeedSource::from_fixture_str("b", &xml)),
    ];
    let all = collect_articles(&sources).await.unwrap();
    assert_eq!(all.len(), 5);
}
