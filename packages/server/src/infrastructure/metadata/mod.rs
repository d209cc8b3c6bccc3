//! MetadataLookup 実装
//!
//! - `http`: 外部のメタデータプロバイダへ HTTP で問い合わせる実装
//! - `catalog`: 開発・テスト用のインメモリカタログ

pub mod catalog;
pub mod http;

pub use catalog::StaticMetadataCatalog;
pub use http::HttpMetadataClient;
