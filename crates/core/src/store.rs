//! 時報の発火時刻を追記していく SQLite ストア。

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::page::{self, PAGE_SIZE, PageResult};

const REQUIRED_COLUMNS: [&str; 3] = ["id", "partition_key", "timestamp_utc"];

/// 一度の時報の発火を表す記録。作成後に変更・削除されることはない。
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TimeRecord {
    /// ストアが採番する ID（挿入順に単調増加）
    pub id: i64,
    /// パーティションキー（IANA タイムゾーン名）
    pub partition_key: String,
    /// 発火時刻
    pub timestamp_utc: DateTime<Utc>,
}

/// 追記専用の時報記録ストア。
///
/// 各操作はプールから接続を 1 本借りて実行し、終了時（エラー時を含む）に返却する。
/// `Clone` はプールを共有する。
#[derive(Debug, Clone)]
pub struct TimeStore {
    pool: SqlitePool,
}

impl TimeStore {
    /// `sqlite://...` 形式の URL からストアを開く。
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(pool).await
    }

    /// ファイルパスからストアを開く。ファイルが無ければ作成する。
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(pool).await
    }

    /// インメモリのストアを開く。
    ///
    /// 接続ごとに別のデータベースになるため、接続は 1 本に固定して破棄させない。
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS time_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                partition_key TEXT NOT NULL,
                timestamp_utc TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        verify_schema(&pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_time_records_partition
                ON time_records (partition_key, id)",
        )
        .execute(&pool)
        .await?;

        info!("Time store initialized");
        Ok(Self { pool })
    }

    /// 記録を追記し、採番された ID を返す。
    ///
    /// 同じ時刻の記録が既にあっても別の記録として追加する。
    pub async fn append(&self, partition_key: &str, timestamp_utc: DateTime<Utc>) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let id = sqlx::query("INSERT INTO time_records (partition_key, timestamp_utc) VALUES (?, ?)")
            .bind(partition_key)
            .bind(timestamp_utc)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        debug!(partition_key, id, %timestamp_utc, "Time record appended");
        Ok(id)
    }

    /// パーティション内の総件数を返す。
    pub async fn count_in_partition(&self, partition_key: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM time_records WHERE partition_key = ?")
            .bind(partition_key)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// `page_number` ページ目（1 始まり、古い順）の記録を返す。
    ///
    /// パーティションの末尾を越えた分は返さない。`page_number` が 1 未満なら空。
    pub async fn fetch_page(&self, partition_key: &str, page_number: i64) -> Result<Vec<TimeRecord>> {
        if page_number < 1 {
            return Ok(Vec::new());
        }
        let offset = (page_number - 1).saturating_mul(PAGE_SIZE);

        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, TimeRecord>(
            "SELECT id, partition_key, timestamp_utc FROM time_records
                WHERE partition_key = ?
                ORDER BY id ASC
                LIMIT ? OFFSET ?",
        )
        .bind(partition_key)
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok(records)
    }

    /// ID から記録を取得する。別のパーティションの記録は返さない。
    pub async fn fetch_by_id(&self, partition_key: &str, id: i64) -> Result<Option<TimeRecord>> {
        let mut conn = self.pool.acquire().await?;
        let record = sqlx::query_as::<_, TimeRecord>(
            "SELECT id, partition_key, timestamp_utc FROM time_records
                WHERE partition_key = ? AND id = ?",
        )
        .bind(partition_key)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record)
    }

    /// 総件数を数え、必要ならページの記録を取得して [`PageResult`] を返す。
    ///
    /// インデックスページ（None または 0 以下）では記録を取得しない。
    pub async fn query(&self, partition_key: &str, requested_page: Option<i64>) -> Result<PageResult> {
        let total_records = self.count_in_partition(partition_key).await?;
        let records = match requested_page {
            Some(page) if page > 0 => self.fetch_page(partition_key, page).await?,
            _ => Vec::new(),
        };
        Ok(page::resolve(total_records, requested_page, records))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info('time_records')")
            .fetch_all(pool)
            .await?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c == required))
        .collect();

    if !missing.is_empty() {
        return Err(StoreError::InvalidPartitionState(format!(
            "table time_records is missing columns: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
