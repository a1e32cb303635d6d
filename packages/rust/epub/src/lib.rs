//! Document assembly: turn a saved record into a single EPUB file.
//!
//! [`EpubBuilder`] loads the record, compresses every referenced image once,
//! lays out cover, title page and per-volume sections, and hands the result
//! to the zip-backed [`writer`].

pub mod builder;
pub mod images;
pub mod writer;

pub use builder::EpubBuilder;
pub use images::ImageStore;
pub use writer::{EpubDocument, Page, Resource, TocEntry};
