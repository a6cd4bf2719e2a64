//! 時報記録のページ分割ナビゲーション。
//!
//! ページ境界は保存せず、パーティション内の総件数と要求ページ番号だけから
//! 先頭・末尾・前後ページを計算する。ページ 1 が最も古い記録を持つ。

use crate::store::TimeRecord;

/// 1 ページあたりの記録数（1 日分の時報）。
pub const PAGE_SIZE: i64 = 24;

/// ページ解決の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 要求されたページ番号。インデックスページの場合は 0
    pub requested_page: i64,
    /// パーティション内の総件数（このページの件数ではない）
    pub total_records: i64,
    /// 最初のページ。記録が無ければ None
    pub start_page: Option<i64>,
    /// 記録を持つ最後のページ。記録が無ければ None
    pub end_page: Option<i64>,
    pub previous_page: Option<i64>,
    pub next_page: Option<i64>,
    /// このページの記録（古い順）。インデックスページでは常に空
    pub records: Vec<TimeRecord>,
}

impl PageResult {
    /// インデックスページ（要約のみで記録を持たないページ）かどうか。
    pub fn is_index(&self) -> bool {
        self.requested_page == 0
    }
}

/// 総件数から最後のページ番号を求める。
pub fn end_page(total_records: i64) -> Option<i64> {
    (total_records > 0).then(|| (total_records - 1) / PAGE_SIZE + 1)
}

/// 総件数・要求ページ・取得済みの記録から [`PageResult`] を組み立てる。
///
/// `requested_page` が None または 0 以下の場合はインデックスページとして扱い、
/// `records` は無視される。どのような入力でも失敗しない。
pub fn resolve(
    total_records: i64,
    requested_page: Option<i64>,
    records: Vec<TimeRecord>,
) -> PageResult {
    let start_page = (total_records > 0).then_some(1);
    let end_page = end_page(total_records);

    let page = match requested_page {
        Some(page) if page > 0 => page,
        _ => {
            return PageResult {
                requested_page: 0,
                total_records,
                start_page,
                end_page,
                previous_page: None,
                next_page: None,
                records: Vec::new(),
            };
        }
    };

    let is_empty = records.is_empty();
    let is_full = records.len() as i64 >= PAGE_SIZE;

    let next_page = if is_empty || !is_full {
        None
    } else if page.checked_mul(PAGE_SIZE) == Some(total_records) {
        None
    } else {
        page.checked_add(1)
    };

    // 範囲外のページは記録を持つ最後のページへ戻す
    let previous_page = if page <= 1 || total_records <= 0 {
        None
    } else if is_empty {
        end_page
    } else {
        Some(page - 1)
    };

    PageResult {
        requested_page: page,
        total_records,
        start_page,
        end_page,
        previous_page,
        next_page,
        records,
    }
}
