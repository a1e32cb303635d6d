//! Content acquisition: resolve a book reference, fetch metadata, cover and
//! chapters from the remote API, normalize both content shapes to HTML with
//! locally stored images, and serialize the intermediate record.
//!
//! Everything network-facing lives behind [`ApiClient`]; chapter and image
//! fetches run a bounded fixed-backoff retry loop and degrade per-item
//! instead of failing the run.

pub mod api;
pub mod content;
pub mod run;

pub use api::{ApiClient, BookInfo, ChapterData, ChapterStub, resolve_book_id};
pub use content::{ChapterContent, normalize_content};
pub use run::acquire_book;
