//! Tests for key lifecycle services

#[cfg(test)]
mod manager_tests;
