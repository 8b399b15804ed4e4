//! Integration tests for Bazaar
//!
//! These tests drive the full router (rate limiting middleware, operational
//! routes) and the cache services over the in-memory backend, plus a set of
//! store tests that run against a real Redis when one is reachable.

mod cache_admin;
mod caching;
mod health;
mod rate_limiting;
mod redis_store;
mod sessions;
