//! Property-based tests for docsign-api
//!
//! Tests the wire formats the API exchanges with web clients using proptest.

use docsign_core::finalize::artifact_url;
use docsign_core::links::{generate_token, public_url};
use docsign_core::{PlacementPolicy, Scale};
use proptest::prelude::*;
use shared_types::{Coordinates, PositionUpdate, SignatureStatus, StatusUpdate};
use uuid::Uuid;

// ============================================================
// Strategies
// ============================================================

fn base_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{3,12}",
        prop_oneof![Just(".com"), Just(".io"), Just(":5173")],
        prop_oneof![Just(""), Just("/")],
    )
        .prop_map(|(scheme, host, suffix, slash)| {
            format!("{}://{}{}{}", scheme, host, suffix, slash)
        })
}

fn status() -> impl Strategy<Value = SignatureStatus> {
    prop_oneof![
        Just(SignatureStatus::Pending),
        Just(SignatureStatus::Signed),
        Just(SignatureStatus::Rejected),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Signing Link Tests
    // ============================================================

    #[test]
    fn public_urls_point_at_signing_page(base in base_url()) {
        let token = generate_token();
        let url = public_url(&base, &token);

        let expected = format!("/sign/public/{}", token);
        prop_assert!(url.ends_with(&expected), "url {} lacks {}", url, expected);
        prop_assert!(!url.contains("//sign"), "double slash in {}", url);
    }

    #[test]
    fn artifact_urls_embed_uuid(bytes in any::<[u8; 16]>()) {
        let id = Uuid::from_bytes(bytes);
        let pattern = regex::Regex::new(
            r"^/api/artifacts/[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
        ).unwrap();
        prop_assert!(pattern.is_match(&artifact_url(id)));
    }

    // ============================================================
    // Request Body Tests
    // ============================================================

    #[test]
    fn position_updates_use_snake_case(
        x in 0.0f64..400.0,
        y in 0.0f64..600.0,
        page in 1u32..50
    ) {
        let body = format!(
            r#"{{"coordinates":{{"x":{},"y":{},"width":220.0,"height":110.0}},"page_number":{}}}"#,
            x, y, page
        );
        let update: PositionUpdate = serde_json::from_str(&body).unwrap();
        prop_assert_eq!(update.page_number, page);
        prop_assert_eq!(update.coordinates, Coordinates::new(x, y, 220.0, 110.0));
    }

    #[test]
    fn status_updates_accept_either_image_field(
        payload in "[A-Za-z0-9+/]{8,64}",
        use_alias in any::<bool>()
    ) {
        let data_url = format!("data:image/png;base64,{}", payload);
        let field = if use_alias { "signature_data" } else { "signature_image" };
        let body = format!(r#"{{"status":"signed","{}":"{}"}}"#, field, data_url);

        let update: StatusUpdate = serde_json::from_str(&body).unwrap();
        prop_assert_eq!(update.status, SignatureStatus::Signed);
        let image = update.signature_image.expect("image field parsed");
        prop_assert_eq!(image.as_str(), data_url.as_str());
    }

    #[test]
    fn status_wire_names_parse_back(status in status()) {
        let json = serde_json::to_string(&status).unwrap();
        prop_assert_eq!(json, format!("\"{}\"", status));
        prop_assert_eq!(status.as_str().parse::<SignatureStatus>(), Ok(status));
    }

    // ============================================================
    // Configuration Tests
    // ============================================================

    #[test]
    fn non_positive_scales_are_rejected(value in -10.0f64..=0.0) {
        let json = format!("{}", value);
        prop_assert!(serde_json::from_str::<Scale>(&json).is_err());
    }

    #[test]
    fn link_ttl_must_be_positive(hours in -1000i64..1000) {
        let policy = PlacementPolicy::default().with_link_ttl_hours(hours);
        prop_assert_eq!(policy.validate().is_ok(), hours > 0);
    }
}

// ============================================================
// Unit Tests (non-property)
// ============================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_tokens_are_opaque_hex() {
        let pattern = regex::Regex::new(r"^[0-9a-f]{32}$").unwrap();
        let a = generate_token();
        let b = generate_token();
        assert!(pattern.is_match(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_policy_defaults_from_partial_json() {
        let policy: PlacementPolicy =
            serde_json::from_str(r#"{"link_ttl_hours": 24, "leave_policy": "revert"}"#).unwrap();
        assert_eq!(policy.link_ttl_hours, 24);
        assert_eq!(policy.default_placement, Coordinates::DEFAULT_PLACEMENT);
        assert_eq!(policy.size_bounds.min_width, 100.0);
    }
}
