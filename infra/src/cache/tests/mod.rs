//! Tests for the Redis cache adapters
