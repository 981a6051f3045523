mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{FakeTransport, Reply};
use plan_snapshot::error::ExtractError;
use plan_snapshot::pagination::{fetch_all, PageLimits};

const PATH: &str = "Fabrikam/_apis/test/Runs/1/results";

fn items(n: usize) -> Vec<serde_json::Value> {
    (0..n).map(|i| json!({"id": i})).collect()
}

#[tokio::test]
async fn test_short_last_page_stops() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(items(250)));

    let all = fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(all.len(), 250);
    assert_eq!(fake.calls().len(), 3);
    // Response order is preserved
    assert_eq!(all[0]["id"], 0);
    assert_eq!(all[249]["id"], 249);
}

#[tokio::test]
async fn test_offsets_advance_by_received_count() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(items(230)));

    fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    let skips: Vec<String> = fake
        .calls()
        .iter()
        .map(|c| c.param("$skip").unwrap().to_string())
        .collect();
    assert_eq!(skips, vec!["0", "100", "200"]);
    assert!(fake.calls().iter().all(|c| c.param("$top") == Some("100")));
}

#[tokio::test]
async fn test_exact_multiple_fetches_one_more_page() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(items(200)));

    let all = fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    // A full page might be followed by more, so the empty third page is requested.
    assert_eq!(all.len(), 200);
    assert_eq!(fake.calls().len(), 3);
}

#[tokio::test]
async fn test_empty_collection_single_fetch() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(Vec::new()));

    let all = fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(all.is_empty());
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn test_safety_ceiling_stops_runaway_endpoint() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Endless);

    let all = fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fake.calls().len(), 50);
    assert_eq!(all.len(), 5000);
}

#[tokio::test]
async fn test_custom_limits() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Endless);
    let limits = PageLimits {
        page_size: 10,
        skip_ceiling: 35,
    };

    let all = fetch_all(&fake, PATH, &[], limits, &CancellationToken::new())
        .await
        .unwrap();

    // skip goes 10, 20, 30, 40 -> stops once it reaches the ceiling
    assert_eq!(fake.calls().len(), 4);
    assert_eq!(all.len(), 40);
}

#[tokio::test]
async fn test_base_params_forwarded_and_paging_params_replaced() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(items(5)));
    let base = vec![
        ("outcomes".to_string(), "Failed".to_string()),
        ("$top".to_string(), "9999".to_string()),
    ];

    fetch_all(&fake, PATH, &base, PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap();

    let call = &fake.calls()[0];
    assert_eq!(call.param("outcomes"), Some("Failed"));
    assert_eq!(call.param("$top"), Some("100"));
    assert_eq!(call.query.iter().filter(|(k, _)| k == "$top").count(), 1);
}

#[tokio::test]
async fn test_error_propagates() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Status(500));

    let err = fetch_all(&fake, PATH, &[], PageLimits::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExtractError::Transport {
            status: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_before_first_page() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Paged(items(10)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetch_all(&fake, PATH, &[], PageLimits::default(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_between_pages() {
    let fake = FakeTransport::new();
    fake.reply(PATH, Reply::Endless);
    let cancel = CancellationToken::new();
    fake.cancel_when(PATH, cancel.clone());

    let err = fetch_all(&fake, PATH, &[], PageLimits::default(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fake.calls().len(), 1);
}
