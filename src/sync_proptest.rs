//! Property-based tests for pattern resolution, content transformation and
//! change aggregation.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.
