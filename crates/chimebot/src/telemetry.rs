//! 時報ジョブの Prometheus メトリクス。

use metrics::{Counter, Gauge, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const CONSECUTIVE_EXCEPTIONS: &str = "consecutive_exceptions";
const TOTAL_EXCEPTIONS: &str = "total_exceptions";

/// `/metrics` の Content-Type。
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// 時報の成功・失敗を記録するメトリクス。
///
/// グローバルなレコーダーには登録せず、インスタンスごとにレジストリを持つ。
/// `Clone` は同じレジストリを共有する。
#[derive(Clone)]
pub struct ChimeMetrics {
    handle: PrometheusHandle,
    consecutive_exceptions: Gauge,
    total_exceptions: Counter,
}

impl ChimeMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let (consecutive_exceptions, total_exceptions) =
            metrics::with_local_recorder(&recorder, || {
                describe_gauge!(
                    CONSECUTIVE_EXCEPTIONS,
                    "How many exceptions we got in a row. Reset on a successful chime."
                );
                describe_counter!(
                    TOTAL_EXCEPTIONS,
                    "Running total of exceptions while this service is running."
                );
                (
                    metrics::gauge!(CONSECUTIVE_EXCEPTIONS),
                    metrics::counter!(TOTAL_EXCEPTIONS),
                )
            });

        consecutive_exceptions.set(0.0);
        total_exceptions.absolute(0);

        Self {
            handle,
            consecutive_exceptions,
            total_exceptions,
        }
    }

    pub fn record_success(&self) {
        self.consecutive_exceptions.set(0.0);
    }

    pub fn record_exception(&self) {
        self.consecutive_exceptions.increment(1.0);
        self.total_exceptions.increment(1);
    }

    /// Prometheus のテキスト形式で出力する。
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `render` の出力から `name` の値を読む。
    #[cfg(test)]
    pub fn sample(&self, name: &str) -> Option<f64> {
        self.render()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (metric, value) = line.rsplit_once(' ')?;
                (metric == name).then(|| value.parse().ok()).flatten()
            })
    }
}

impl Default for ChimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
