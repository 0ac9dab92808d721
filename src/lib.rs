//! ShortNews - a Telugu short-news aggregator
//!
//! Fetches Telugu RSS feeds, summarizes each new article through a pluggable
//! LLM provider (falling back to trimmed text), stores items for a limited
//! time and serves them through a small JSON API and a single-page frontend.

pub mod config;
pub mod db;
pub mod fetcher;
pub mod routes;
pub mod summarizer;
pub mod text;
