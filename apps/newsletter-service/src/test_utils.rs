//! テストユーティリティ
//!
//! ユースケース・ハンドラ・統合テストで共有するセットアップ。

mod newsletter_test_builder;

pub use newsletter_test_builder::{NewsletterTestBuilder, NewsletterTestSetup};
