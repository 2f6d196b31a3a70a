//! Tests for token issuance, verification and revocation
