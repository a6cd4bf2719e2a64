//! 時報記録の [`PageResult`] を ActivityStreams の outbox ドキュメントに変換する。

use chime_core::PageResult;
use serde::Serialize;

const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

pub const CONTENT_TYPE: &str = "application/activity+json";

/// 1 つの時計塔の公開 URL。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TowerLinks {
    pub outbox: String,
    pub post: String,
}

impl TowerLinks {
    pub fn new(public_url: &str, tower_id: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        Self {
            outbox: format!("{base}/profile/{tower_id}/outbox.json"),
            post: format!("{base}/profile/{tower_id}/post"),
        }
    }

    pub fn page_url(&self, page: i64) -> String {
        format!("{}?index={page}", self.outbox)
    }

    pub fn post_url(&self, id: i64) -> String {
        format!("{}?id={id}", self.post)
    }
}

/// インデックスページ。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollection {
    #[serde(rename = "@context")]
    pub context: &'static str,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub total_items: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

/// 記録を持つ（または範囲外の）個別ページ。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCollectionPage {
    #[serde(rename = "@context")]
    pub context: &'static str,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub total_items: i64,
    pub part_of: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub ordered_items: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutboxDocument {
    Collection(OrderedCollection),
    Page(OrderedCollectionPage),
}

/// ページ番号 0 ならコレクション、それ以外ならコレクションページを返す。
pub fn outbox_document(links: &TowerLinks, result: &PageResult) -> OutboxDocument {
    let link = |page: Option<i64>| page.map(|p| links.page_url(p));

    if result.is_index() {
        return OutboxDocument::Collection(OrderedCollection {
            context: ACTIVITY_STREAMS_CONTEXT,
            id: links.outbox.clone(),
            kind: "OrderedCollection",
            total_items: result.total_records,
            current: link(result.start_page),
            first: link(result.start_page),
            last: link(result.end_page),
        });
    }

    OutboxDocument::Page(OrderedCollectionPage {
        context: ACTIVITY_STREAMS_CONTEXT,
        id: links.page_url(result.requested_page),
        kind: "OrderedCollectionPage",
        total_items: result.total_records,
        part_of: links.outbox.clone(),
        current: link(result.start_page),
        first: link(result.start_page),
        last: link(result.end_page),
        prev: link(result.previous_page),
        next: link(result.next_page),
        ordered_items: result.records.iter().map(|r| links.post_url(r.id)).collect(),
    })
}
