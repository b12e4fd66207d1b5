//! Tier admission holds for every privilege combination.

use axum::http::StatusCode;
use keyrelay_testkit::generators::privileges;
use keyrelay_testkit::TestBroker;
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn tier_admission_follows_flags(privileges in privileges()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tier_a, tier_b) = runtime.block_on(async {
            let broker = TestBroker::new().await;
            let passkey = broker.grant(privileges).await;
            let tier_a = broker.get("/v1/", Some(&passkey)).await.status;
            let tier_b = broker
                .post("/v1/revoke", Some(&passkey), json!({ "token": "someone-else" }))
                .await
                .status;
            (tier_a, tier_b)
        });

        let expected_a = if privileges.super_user || privileges.sudoer {
            StatusCode::OK
        } else {
            StatusCode::FORBIDDEN
        };
        let expected_b = if privileges.super_user {
            StatusCode::OK
        } else {
            StatusCode::FORBIDDEN
        };
        prop_assert_eq!(tier_a, expected_a);
        prop_assert_eq!(tier_b, expected_b);
    }
}
