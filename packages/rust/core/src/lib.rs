//! Pipeline orchestration for sourcebank.
//!
//! This crate ties discovery, fetching, extraction, and markdown
//! conversion together behind the per-URL stage state machine: every
//! stage entry is validated against the allowed-transition table, and
//! batch runs isolate failures per URL.

pub mod pipeline;

pub use pipeline::{
    ConvertSummary, CrawlOutcome, DomainRegistration, ExtractSummary, Pipeline, ProcessOutcome,
    RegisterOptions, ScrapeSummary,
};
