use async_trait::async_trait;
use cast_memory::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// Feed that serves `sizes` pages and drops the cursor after the last one.
struct PagedFeed {
    sizes: Vec<usize>,
    calls: Mutex<usize>,
}

#[async_trait]
impl FeedApi for PagedFeed {
    async fn user_casts(&self, request: &FeedRequest) -> std::result::Result<FeedPage, TransportError> {
        let mut calls = self.calls.lock();
        let page_no = *calls;
        *calls += 1;
        let size = self.sizes.get(page_no).copied().unwrap_or(0).min(request.limit);
        let casts = (0..size)
            .map(|i| RawCast {
                hash: Some(format!("0x{page_no:02}{i:04}")),
                author: Some(RawAuthor {
                    fid: Some(request.fid),
                    username: Some("builder".into()),
                    display_name: None,
                }),
                text: Some(format!("shipping rust on farcaster, post {i}")),
                timestamp: Some("2024-10-01T12:00:00Z".into()),
                ..Default::default()
            })
            .collect();
        let next_cursor = (page_no + 1 < self.sizes.len()).then(|| format!("cursor-{page_no}"));
        Ok(FeedPage { casts, next_cursor })
    }
}

struct Likes(Vec<ReactionEvent>);

#[async_trait]
impl ReactionApi for Likes {
    async fn liked_casts(&self, _limit: usize) -> std::result::Result<ReactionPage, TransportError> {
        Ok(ReactionPage {
            reactions: self.0.clone(),
        })
    }
}

fn like(hash: &str, text: Option<&str>) -> ReactionEvent {
    ReactionEvent {
        cast_hash: Some(hash.into()),
        liked_at: None,
        cast: RawCast {
            hash: Some(hash.into()),
            author: Some(RawAuthor {
                fid: Some(99),
                ..Default::default()
            }),
            text: text.map(String::from),
            ..Default::default()
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_pipeline() {
    let feed = Arc::new(PagedFeed {
        sizes: vec![150, 150, 40],
        calls: Mutex::new(0),
    });
    let fetcher = FeedFetcher::new(feed.clone(), Pacing::default());
    let casts = fetcher.fetch_user_casts(12021, 500).await.unwrap();
    assert_eq!(casts.len(), 340);
    assert_eq!(*feed.calls.lock(), 3);

    let reactions = ReactionFetcher::new(
        Arc::new(Likes(vec![
            like("0xl1", Some("rust async on farcaster")),
            like("0xl2", None),
            like("0xl3", Some("frames and rust")),
        ])),
        DEFAULT_REACTION_LIMIT,
    );
    let liked = reactions.fetch_liked_casts().await.unwrap();
    assert_eq!(liked.len(), 3);

    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open_in_memory().unwrap());
    let builder = TierBuilder::new(store, Arc::new(HashingEmbedder::default()));
    let long = builder.build_tier(TierKind::LongTerm, &casts).await.unwrap();
    let short = builder.build_tier(TierKind::ShortTerm, &liked).await.unwrap();
    assert_eq!(long.report.inserted, 340);
    assert_eq!(short.report.inserted, 2);
    assert_eq!(short.report.skipped.len(), 1);

    let analytics = Arc::new(SqliteScoreStore::open_in_memory().unwrap());
    let scorer = SimilarityScorer::new(analytics.clone());
    let score = scorer
        .compute_alignment(&long.handle, &short.handle)
        .await
        .unwrap();

    assert!(score.value > 0.5, "related tiers should align, got {}", score.value);
    assert_eq!(score.long_term_size, 340);
    assert_eq!(score.short_term_size, 2);
    assert_eq!(analytics.latest().unwrap(), Some(score));

    let hits = long.handle.nearest("rust on farcaster", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn same_cast_may_live_in_both_tiers() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let builder = TierBuilder::new(store, Arc::new(HashingEmbedder::default()));
    let own = vec![like("0xsame", Some("my own cast that I also liked")).cast];

    let long = builder.build_tier(TierKind::LongTerm, &own).await.unwrap();
    let short = builder.build_tier(TierKind::ShortTerm, &own).await.unwrap();
    assert_eq!(long.handle.len().await.unwrap(), 1);
    assert_eq!(short.handle.len().await.unwrap(), 1);

    let analytics = Arc::new(SqliteScoreStore::open_in_memory().unwrap());
    let score = SimilarityScorer::new(analytics)
        .compute_alignment(&long.handle, &short.handle)
        .await
        .unwrap();
    assert!((score.value - 1.0).abs() < 1e-6);
}
