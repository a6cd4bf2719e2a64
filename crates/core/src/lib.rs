//! 時報の記録と、その記録をページ単位で辿るためのナビゲーション計算を提供する。
//!
//! - [`TimeStore`]: タイムゾーンごとに時報の発火時刻を追記していくストア
//! - [`page::resolve`]: 総件数とページ番号からページ範囲と前後リンクを求める純粋関数
//! - [`message`]: 時報メッセージの整形

mod error;
pub mod message;
pub mod page;
mod store;

pub use error::{Result, StoreError};
pub use message::{chime_message, chime_message_at};
pub use page::{PAGE_SIZE, PageResult, resolve};
pub use store::{TimeRecord, TimeStore};
