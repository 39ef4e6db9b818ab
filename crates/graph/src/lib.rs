//! CiteGraph graph engine
//!
//! Turns an open document into a citation graph around the paper it
//! matches, caches each traversal depth, and reveals depth changes on a
//! live graph one node at a time.

pub mod bibliography;
pub mod builder;
pub mod document;
pub mod similarity;
pub mod sink;

pub use bibliography::{BibliographicSource, SemanticScholarClient, StaticBibliography};
pub use builder::{DepthChange, GraphBuilder, RootGraph};
pub use document::{Document, DocumentMetadata, PdfDocument};
pub use similarity::TitleMatcher;
pub use sink::{GraphSink, LiveGraph, RecordingSink, RevealOutcome, RevealToken, WatchSink};
