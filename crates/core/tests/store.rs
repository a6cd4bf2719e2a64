use chime_core::{PAGE_SIZE, StoreError, TimeStore};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

const TIME_ZONE: &str = "America/New_York";

fn hour(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 16, 13, 0, 0).unwrap() + TimeDelta::hours(n)
}

async fn store_with(count: i64) -> TimeStore {
    let store = TimeStore::in_memory().await.unwrap();
    for n in 0..count {
        store.append(TIME_ZONE, hour(n)).await.unwrap();
    }
    store
}

#[tokio::test]
async fn append_assigns_increasing_ids() {
    let store = TimeStore::in_memory().await.unwrap();

    let id1 = store.append(TIME_ZONE, hour(0)).await.unwrap();
    let id2 = store.append(TIME_ZONE, hour(1)).await.unwrap();

    assert!(id2 > id1);
    assert_eq!(store.count_in_partition(TIME_ZONE).await.unwrap(), 2);
    assert_eq!(store.count_in_partition("America/Phoenix").await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_appends_are_kept() {
    let store = TimeStore::in_memory().await.unwrap();

    let id1 = store.append(TIME_ZONE, hour(0)).await.unwrap();
    let id2 = store.append(TIME_ZONE, hour(0)).await.unwrap();

    assert_ne!(id1, id2);
    assert_eq!(store.count_in_partition(TIME_ZONE).await.unwrap(), 2);
}

#[tokio::test]
async fn fetch_page_returns_oldest_first() {
    let store = store_with(30).await;

    let first = store.fetch_page(TIME_ZONE, 1).await.unwrap();
    assert_eq!(first.len() as i64, PAGE_SIZE);
    assert_eq!(first[0].timestamp_utc, hour(0));
    assert_eq!(first[23].timestamp_utc, hour(23));

    let second = store.fetch_page(TIME_ZONE, 2).await.unwrap();
    assert_eq!(second.len(), 6);
    assert_eq!(second[0].timestamp_utc, hour(24));

    assert!(store.fetch_page(TIME_ZONE, 3).await.unwrap().is_empty());
    assert!(store.fetch_page(TIME_ZONE, i64::MAX).await.unwrap().is_empty());
    assert!(store.fetch_page(TIME_ZONE, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn partitions_are_paged_independently() {
    let store = TimeStore::in_memory().await.unwrap();
    for n in 0..3 {
        store.append(TIME_ZONE, hour(n)).await.unwrap();
        store.append("Asia/Tokyo", hour(n)).await.unwrap();
    }

    let page = store.fetch_page("Asia/Tokyo", 1).await.unwrap();
    assert_eq!(page.len(), 3);
    assert!(page.iter().all(|r| r.partition_key == "Asia/Tokyo"));
    assert!(page.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn fetch_by_id_is_scoped_to_partition() {
    let store = TimeStore::in_memory().await.unwrap();
    let id = store.append(TIME_ZONE, hour(0)).await.unwrap();

    let record = store.fetch_by_id(TIME_ZONE, id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.partition_key, TIME_ZONE);
    assert_eq!(record.timestamp_utc, hour(0));

    assert!(store.fetch_by_id("America/Phoenix", id).await.unwrap().is_none());
    assert!(store.fetch_by_id(TIME_ZONE, id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn index_query_of_empty_partition() {
    let store = TimeStore::in_memory().await.unwrap();

    let result = store.query(TIME_ZONE, None).await.unwrap();
    assert_eq!(result.requested_page, 0);
    assert_eq!(result.total_records, 0);
    assert_eq!(result.start_page, None);
    assert_eq!(result.end_page, None);
    assert!(result.records.is_empty());
}

#[tokio::test]
async fn empty_partition_pages() {
    let store = TimeStore::in_memory().await.unwrap();
    for page in [Some(0), Some(1), Some(2)] {
        let result = store.query(TIME_ZONE, page).await.unwrap();
        assert_eq!(result.total_records, 0);
        assert_eq!(result.next_page, None);
        assert_eq!(result.previous_page, None);
    }
}

#[tokio::test]
async fn single_record_query() {
    let store = store_with(1).await;

    let result = store.query(TIME_ZONE, Some(1)).await.unwrap();
    assert_eq!(result.start_page, Some(1));
    assert_eq!(result.end_page, Some(1));
    assert_eq!(result.next_page, None);
    assert_eq!(result.previous_page, None);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].timestamp_utc, hour(0));
}

#[tokio::test]
async fn full_day_then_second_page() {
    let store = store_with(24).await;

    let result = store.query(TIME_ZONE, Some(2)).await.unwrap();
    assert_eq!(result.end_page, Some(1));
    assert_eq!(result.next_page, None);
    assert_eq!(result.previous_page, Some(1));
    assert!(result.records.is_empty());
}

#[tokio::test]
async fn day_and_one_hour() {
    let store = store_with(25).await;

    let first = store.query(TIME_ZONE, Some(1)).await.unwrap();
    assert_eq!(first.end_page, Some(2));
    assert_eq!(first.next_page, Some(2));
    assert_eq!(first.previous_page, None);
    let expected: Vec<_> = (0..24).map(hour).collect();
    let actual: Vec<_> = first.records.iter().map(|r| r.timestamp_utc).collect();
    assert_eq!(actual, expected);

    let second = store.query(TIME_ZONE, Some(2)).await.unwrap();
    assert_eq!(second.end_page, Some(2));
    assert_eq!(second.next_page, None);
    assert_eq!(second.previous_page, Some(1));
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].timestamp_utc, hour(24));
}

#[tokio::test]
async fn far_out_of_range_page_snaps_back() {
    let store = store_with(12).await;

    for page in [2, 3, 4, 1000] {
        let result = store.query(TIME_ZONE, Some(page)).await.unwrap();
        assert_eq!(result.requested_page, page);
        assert_eq!(result.start_page, Some(1));
        assert_eq!(result.end_page, Some(1));
        assert_eq!(result.next_page, None);
        assert_eq!(result.previous_page, Some(1));
        assert_eq!(result.total_records, 12);
        assert!(result.records.is_empty());
    }
}

#[tokio::test]
async fn walking_next_links_yields_every_record_once() {
    for count in [1, 24, 47, 48, 73] {
        let store = store_with(count).await;

        let mut seen = Vec::new();
        let mut page = store.query(TIME_ZONE, None).await.unwrap().start_page;
        while let Some(current) = page {
            let result = store.query(TIME_ZONE, Some(current)).await.unwrap();
            seen.extend(result.records.iter().map(|r| r.timestamp_utc));
            page = result.next_page;
        }

        let expected: Vec<_> = (0..count).map(hour).collect();
        assert_eq!(seen, expected, "count = {count}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = TimeStore::open_path(dir.path().join("chimes.db")).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for tz in ["America/New_York", "America/Phoenix", "Asia/Tokyo", "Europe/London"] {
        let store = store.clone();
        tasks.spawn(async move {
            for n in 0..10 {
                store.append(tz, hour(n)).await.unwrap();
                // 自分の書き込みはすぐに見える
                assert!(store.count_in_partition(tz).await.unwrap() >= n + 1);
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    for tz in ["America/New_York", "America/Phoenix", "Asia/Tokyo", "Europe/London"] {
        assert_eq!(store.count_in_partition(tz).await.unwrap(), 10);
    }
    store.close().await;
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chimes.db");

    let store = TimeStore::open_path(&path).await.unwrap();
    let id = store.append(TIME_ZONE, hour(0)).await.unwrap();
    store.close().await;

    let url = format!("sqlite://{}", path.display());
    let store = TimeStore::open(&url).await.unwrap();
    assert_eq!(store.count_in_partition(TIME_ZONE).await.unwrap(), 1);
    assert!(store.fetch_by_id(TIME_ZONE, id).await.unwrap().is_some());
    store.close().await;
}

#[tokio::test]
async fn malformed_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");

    {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
        sqlx::query("CREATE TABLE time_records (id INTEGER PRIMARY KEY, note TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let err = TimeStore::open_path(&path).await.unwrap_err();
    assert!(
        matches!(err, StoreError::InvalidPartitionState(ref msg) if msg.contains("partition_key")),
        "unexpected error: {err}"
    );
}
