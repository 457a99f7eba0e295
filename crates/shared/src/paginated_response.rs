//! # ページネーション付きレスポンス
//!
//! ページ番号ベースのページネーションに対応した API レスポンス型。
//! 配信ログや購読者一覧のような管理画面の一覧表示で使用する。

use serde::{Deserialize, Serialize};

/// 1 ページあたりの最大件数
pub const MAX_PER_PAGE: u32 = 100;

/// 1 ページあたりのデフォルト件数
pub const DEFAULT_PER_PAGE: u32 = 20;

/// ページ指定
///
/// `page` は 1 始まり。範囲外の値は [`PageRequest::new`] で丸められる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page:     u32,
    pub per_page: u32,
}

impl PageRequest {
    /// ページ指定を作成する
    ///
    /// - `page` が 0 の場合は 1 に丸める
    /// - `per_page` は 1〜[`MAX_PER_PAGE`] に丸める
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page:     page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    /// SQL の OFFSET 値
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// SQL の LIMIT 値
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// ページネーション付きレスポンス
///
/// `ApiResponse<T>` が単一データ用であるのに対し、
/// `PaginatedResponse<T>` はリスト + ページ情報の形式。
///
/// ## JSON 形式
///
/// ```json
/// {
///   "data": [...],
///   "page": 1,
///   "per_page": 20,
///   "total": 42,
///   "total_pages": 3
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data:        Vec<T>,
    pub page:        u32,
    pub per_page:    u32,
    pub total:       u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    /// ページ指定と総件数からレスポンスを組み立てる
    pub fn new(data: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = u64::from(request.per_page);
        Self {
            data,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: total.div_ceil(per_page),
        }
    }

    /// 要素を変換した新しいレスポンスを返す（ページ情報は維持）
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            data:        self.data.into_iter().map(f).collect(),
            page:        self.page,
            per_page:    self.per_page,
            total:       self.total,
            total_pages: self.total_pages,
        }
    }
}
