//! 毎正時に時報を記録・送信するジョブ。

use std::time::Duration;

use chime_core::{TimeStore, chime_message_at};
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::config::TowerConfig;
use crate::publish::Publisher;
use crate::telemetry::ChimeMetrics;

/// スケジューラの誤発火による重複を抑えるためのガード。
///
/// 最後に受け付けた発火時刻を明示的に保持する。
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    last_fired: Option<DateTime<Utc>>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self::with_last_fired(window, None)
    }

    pub fn with_last_fired(window: Duration, last_fired: Option<DateTime<Utc>>) -> Self {
        Self { window, last_fired }
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    /// `at` の発火を受け付けるなら記録して true を返す。
    ///
    /// 直前の発火から `window` 以内（時刻が巻き戻った場合を含む）なら false。
    pub fn try_fire(&mut self, at: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_fired {
            let too_soon = match (at - last).to_std() {
                Ok(elapsed) => elapsed <= self.window,
                Err(_) => true,
            };
            if too_soon {
                return false;
            }
        }
        self.last_fired = Some(at);
        true
    }
}

/// `now` より後で、`tz` の現地時刻がちょうど正時になる最初の時刻。
///
/// UTC からのずれが 30 分・45 分単位のタイムゾーンでも現地の正時に合わせる。
pub fn next_chime_after(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let into_hour = TimeDelta::minutes(i64::from(local.minute()))
        + TimeDelta::seconds(i64::from(local.second()))
        + TimeDelta::nanoseconds(i64::from(local.nanosecond()));
    now - into_hour + TimeDelta::hours(1)
}

/// 1 回の発火の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// 直前の発火に近すぎるため無視した
    Debounced,
    /// 記録に失敗したため送信しなかった
    StoreFailed,
    Chimed {
        id: i64,
        published: usize,
        failed: usize,
    },
}

impl FireOutcome {
    /// 記録はできたが、送信先がすべて失敗した。
    pub fn all_failed(&self) -> bool {
        matches!(self, Self::Chimed { published: 0, failed, .. } if *failed > 0)
    }
}

/// 1 つの時計塔の時報ジョブ。
pub struct ChimeJob {
    tower: TowerConfig,
    store: TimeStore,
    publishers: Vec<Publisher>,
    debounce: Debounce,
    metrics: ChimeMetrics,
}

impl ChimeJob {
    pub fn new(
        tower: TowerConfig,
        store: TimeStore,
        publishers: Vec<Publisher>,
        debounce: Debounce,
        metrics: ChimeMetrics,
    ) -> Self {
        Self {
            tower,
            store,
            publishers,
            debounce,
            metrics,
        }
    }

    /// 発火時刻 `fired_at` の時報を記録し、すべての送信先に送る。
    ///
    /// 記録や送信に失敗してもログに残すだけで、次の発火には影響しない。
    /// 送信に失敗しても記録は取り消さない。
    /// 記録の失敗と送信先ごとの失敗はメトリクスに数え、すべて成功したら連続失敗数を戻す。
    pub async fn fire(&mut self, fired_at: DateTime<Utc>) -> FireOutcome {
        let tower = self.tower.id.as_str();
        let local = fired_at.with_timezone(&self.tower.time_zone);

        if !self.debounce.try_fire(fired_at) {
            warn!(
                tower,
                fired_at = %local,
                last_fired = ?self.debounce.last_fired(),
                "Fired too quickly, ignoring"
            );
            return FireOutcome::Debounced;
        }

        let id = match self.store.append(self.tower.partition_key(), fired_at).await {
            Ok(id) => id,
            Err(e) => {
                error!(tower, error = %e, "Failed to record chime");
                self.metrics.record_exception();
                return FireOutcome::StoreFailed;
            }
        };

        let message = chime_message_at(fired_at, self.tower.time_zone, &self.tower.location);

        let mut published = 0;
        let mut failed = 0;
        for publisher in &self.publishers {
            match publisher.publish(&message).await {
                Ok(()) => published += 1,
                Err(e) => {
                    failed += 1;
                    self.metrics.record_exception();
                    error!(tower, publisher = publisher.kind(), error = %e, "Failed to publish chime");
                }
            }
        }

        if failed == 0 {
            self.metrics.record_success();
        }

        info!(tower, id, published, failed, fired_at = %local, "Chime fired");
        FireOutcome::Chimed {
            id,
            published,
            failed,
        }
    }

    /// 現地の正時ごとに [`ChimeJob::fire`] を呼び続ける。
    pub async fn run(mut self) {
        info!(
            tower = %self.tower.id,
            time_zone = %self.tower.time_zone,
            publishers = self.publishers.len(),
            debounce = %humantime::format_duration(self.debounce.window),
            "Starting chime job"
        );

        loop {
            let now = Utc::now();
            let next = next_chime_after(now, self.tower.time_zone);
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let outcome = self.fire(next).await;
            if outcome.all_failed() {
                warn!(tower = %self.tower.id, ?outcome, "Chime recorded but every publisher failed");
            }
        }
    }
}
