//! Integration tests for kb-harvest
//!
//! `crawl_tests` drives the executor and harvester with a scripted fetcher;
//! `http_tests` runs whole crawls against wiremock servers.

mod crawl_tests;
mod http_tests;
mod support;
