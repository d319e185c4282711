use drape_core::models::ProductRecord;
use drape_core::traits::ProductSink;
use drape_db::ProductRepository;

use crate::integration::common::setup_test_db;

fn record(size: &str, price: &str) -> ProductRecord {
    ProductRecord {
        brand: "Maison Margiela".into(),
        name: "Tabi ankle boots".into(),
        size: size.into(),
        price: price.into(),
        note: "Last 1 left".into(),
        url: "https://www.farfetch.com/kr/shopping/men/item-1.aspx".into(),
        images: vec![
            "https://cdn-images.farfetch-contents.com/1_front.jpg".into(),
            "https://cdn-images.farfetch-contents.com/1_back.jpg".into(),
        ],
        source: "farfetch".into(),
    }
}

#[tokio::test]
async fn batch_is_stored_with_source_and_images() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProductRepository::new(pool);

    let batch = vec![record("IT 41", "₩ 1,200,000"), record("IT 42", "₩ 1,250,000")];
    let report = repo.save(&batch, "farfetch").await.unwrap();
    assert_eq!(report.stored, 2);

    assert_eq!(repo.count("farfetch").await.unwrap(), 2);
    let mut stored = repo.recent("farfetch", 10).await.unwrap();
    stored.sort_by(|a, b| a.size.cmp(&b.size));
    assert_eq!(stored, batch);
}

#[tokio::test]
async fn empty_batch_stores_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProductRepository::new(pool);

    let report = repo.save(&[], "farfetch").await.unwrap();
    assert_eq!(report.stored, 0);
    assert_eq!(repo.count("farfetch").await.unwrap(), 0);
}

#[tokio::test]
async fn sources_are_kept_apart() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProductRepository::new(pool);

    repo.save(&[record("S", "₩ 1")], "farfetch").await.unwrap();
    repo.save(&[record("M", "₩ 2"), record("L", "₩ 3")], "ssense")
        .await
        .unwrap();

    assert_eq!(repo.count("farfetch").await.unwrap(), 1);
    assert_eq!(repo.count("ssense").await.unwrap(), 2);
    let recent = repo.recent("ssense", 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].source, "ssense");
}

#[tokio::test]
async fn health_check_passes_on_live_database() {
    let (pool, _container) = setup_test_db().await;
    let repo = ProductRepository::new(pool);

    repo.health_check().await.unwrap();
}
