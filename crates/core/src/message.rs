//! 時報メッセージの整形。

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

const BONG: &str = "BONG!";

/// 現地時刻と場所名から時報メッセージを組み立てる。
///
/// 12 時間制の時（0 時と 12 時はどちらも 12）の回数だけ `BONG!` を並べ、
/// 空行を挟んで現在時刻の説明を続ける。
pub fn chime_message(local: NaiveDateTime, location: &str) -> String {
    let (_, hour) = local.hour12();
    let bongs = vec![BONG; hour as usize].join(" ");
    format!(
        "{bongs}\n\nThe time at {location} currently is: {}.",
        local.format("%A, %B %-d %Y, %-I:00%p")
    )
}

/// UTC の時刻を `tz` の現地時刻に変換してから時報メッセージを組み立てる。
pub fn chime_message_at(timestamp_utc: DateTime<Utc>, tz: Tz, location: &str) -> String {
    chime_message(timestamp_utc.with_timezone(&tz).naive_local(), location)
}
