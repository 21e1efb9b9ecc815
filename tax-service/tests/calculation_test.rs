//! Calculation integration tests for tax-service.

mod common;

use axum::http::StatusCode;
use common::{rule_body, tenant_path, test_config, us_request, TestApp};
use serde_json::{json, Value};
use tax_service::models::TaxMethod;

#[tokio::test]
async fn single_percentage_rule_exclusive() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("VAT10", "10", 0)).await;

    let (status, body) = app.post(&tenant_path("/tax/calculate"), us_request("100")).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["taxableAmount"], "100.00");
    assert_eq!(body["taxAmount"], "10.00");
    assert_eq!(body["totalAmount"], "110.00");
    assert_eq!(body["effectiveRate"], "10.00");
    assert_eq!(body["method"], "exclusive");
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["location"], "US");
    assert!(body["taxId"].is_string());
    assert_eq!(body["appliedRules"].as_array().unwrap().len(), 1);
    assert_eq!(body["appliedRules"][0]["ruleCode"], "VAT10");
}

#[tokio::test]
async fn country_mismatch_returns_no_applicable_rules() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("VAT10", "10", 0)).await;

    let (status, body) = app
        .post(
            &tenant_path("/tax/calculate"),
            json!({ "amount": "100", "country": "GB" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_APPLICABLE_RULES");
}

#[tokio::test]
async fn fixed_rule_is_independent_of_amount() {
    let app = TestApp::spawn().await;
    let mut rule = rule_body("LEVY", "5", 0);
    rule["taxType"] = json!("fixed");
    app.create_rule(rule).await;

    for amount in ["50", "500"] {
        let (status, body) = app.post(&tenant_path("/tax/preview"), us_request(amount)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["taxAmount"], "5.00");
    }
}

#[tokio::test]
async fn inclusive_method_backs_tax_out_of_amount() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("VAT10", "10", 0)).await;

    let (status, body) = app
        .post(
            &tenant_path("/tax/calculate"),
            json!({ "amount": 110, "country": "US", "method": "inclusive" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["taxableAmount"], "100.00");
    assert_eq!(body["taxAmount"], "10.00");
    assert_eq!(body["totalAmount"], "110.00");
    assert_eq!(body["method"], "inclusive");
}

#[tokio::test]
async fn rules_apply_highest_priority_first() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("LOW", "2", 5)).await;
    app.create_rule(rule_body("HIGH", "8", 10)).await;

    let (status, body) = app.post(&tenant_path("/tax/calculate"), us_request("100")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["taxAmount"], "10.00");
    assert_eq!(body["appliedRules"][0]["priority"], 10);
    assert_eq!(body["appliedRules"][0]["taxAmount"], "8.00");
    assert_eq!(body["appliedRules"][1]["ruleCode"], "LOW");
}

#[tokio::test]
async fn compound_rule_taxes_prior_tax() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("BASE", "10", 10)).await;
    let mut surcharge = rule_body("SURCHARGE", "5", 5);
    surcharge["isCompound"] = json!(true);
    app.create_rule(surcharge).await;

    let (status, body) = app.post(&tenant_path("/tax/calculate"), us_request("100")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appliedRules"][1]["taxAmount"], "5.50");
    assert_eq!(body["appliedRules"][1]["isCompound"], true);
    assert_eq!(body["taxAmount"], "15.50");
    assert_eq!(body["totalAmount"], "115.50");
}

#[tokio::test]
async fn compound_tax_type_is_a_flat_amount() {
    let app = TestApp::spawn().await;
    let mut levy = rule_body("LEVY", "5", 0);
    levy["taxType"] = json!("compound");
    app.create_rule(levy).await;

    let (status, body) = app.post(&tenant_path("/tax/preview"), us_request("200")).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["taxAmount"], "5.00");
    assert_eq!(body["totalAmount"], "205.00");
    assert_eq!(body["appliedRules"][0]["isCompound"], false);
}

#[tokio::test]
async fn invalid_inputs_are_rejected_with_codes() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("VAT10", "10", 0)).await;

    let (status, body) = app.post(&tenant_path("/tax/calculate"), us_request("-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (status, body) = app
        .post(
            &tenant_path("/tax/calculate"),
            json!({ "amount": "10", "country": "USA" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_LOCATION");

    let (status, body) = app
        .post(
            &tenant_path("/tax/calculate"),
            json!({ "amount": "10", "country": "US", "method": "gross" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_METHOD");
}

#[tokio::test]
async fn preview_is_repeatable_and_records_nothing() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("A", "7.25", 10)).await;
    app.create_rule(rule_body("B", "1.5", 1)).await;

    let request = json!({ "amount": "99.99", "country": "US", "date": "2026-06-01T00:00:00Z" });
    let (_, mut first) = app.post(&tenant_path("/tax/preview"), request.clone()).await;
    let (_, mut second) = app.post(&tenant_path("/tax/preview"), request).await;

    assert!(first.get("taxId").is_none());
    for body in [&mut first, &mut second] {
        body.as_object_mut().unwrap().remove("calculatedAt");
    }
    assert_eq!(first, second);

    let (status, history) = app.get(&tenant_path("/tax/calculations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, Value::Array(vec![]));
}

#[tokio::test]
async fn monetary_outputs_have_two_decimals() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("ODD", "7.5", 0)).await;

    let (_, body) = app.post(&tenant_path("/tax/preview"), us_request("0.07")).await;

    for field in ["amount", "taxableAmount", "taxAmount", "totalAmount", "effectiveRate"] {
        let value = body[field].as_str().unwrap();
        let decimals = value.split('.').nth(1).map(str::len);
        assert_eq!(decimals, Some(2), "{} = {}", field, value);
    }
    assert_eq!(body["taxAmount"], "0.01");
}

#[tokio::test]
async fn category_scope_only_applies_when_categories_are_supplied() {
    let app = TestApp::spawn().await;
    let mut rule = rule_body("FOOTWEAR", "10", 0);
    rule["categoryIds"] = json!(["footwear"]);
    app.create_rule(rule).await;

    let (status, _) = app.post(&tenant_path("/tax/preview"), us_request("100")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &tenant_path("/tax/preview"),
            json!({ "amount": "100", "country": "US", "categoryIds": ["books"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_APPLICABLE_RULES");

    let (status, _) = app
        .post(
            &tenant_path("/tax/preview"),
            json!({ "amount": "100", "country": "US", "categoryIds": ["footwear"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn applicable_rules_lists_matches_in_priority_order() {
    let app = TestApp::spawn().await;
    app.create_rule(rule_body("LOW", "2", 1)).await;
    app.create_rule(rule_body("HIGH", "8", 9)).await;
    let mut other = rule_body("GB", "20", 50);
    other["countries"] = json!(["GB"]);
    app.create_rule(other).await;

    let (status, body) = app
        .post(&tenant_path("/tax/rules/applicable"), us_request("100"))
        .await;

    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|rule| rule["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["HIGH", "LOW"]);
}

#[tokio::test]
async fn validity_window_uses_request_date() {
    let app = TestApp::spawn().await;
    let mut rule = rule_body("NEW", "10", 0);
    rule["validFrom"] = json!("2026-07-01T00:00:00Z");
    app.create_rule(rule).await;

    let (status, _) = app
        .post(
            &tenant_path("/tax/preview"),
            json!({ "amount": "100", "country": "US", "date": "2026-06-30T23:59:59Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &tenant_path("/tax/preview"),
            json!({ "amount": "100", "country": "US", "date": "2026-07-01T00:00:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn configured_default_method_applies_when_request_omits_it() {
    let mut config = test_config();
    config.tax.default_method = TaxMethod::Inclusive;
    let app = TestApp::spawn_with(config).await;
    app.create_rule(rule_body("VAT10", "10", 0)).await;

    let (status, body) = app.post(&tenant_path("/tax/preview"), us_request("110")).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["method"], "inclusive");
    assert_eq!(body["taxableAmount"], "100.00");
}

#[tokio::test]
async fn large_amounts_and_fine_rates_are_kept_exactly() {
    let app = TestApp::spawn().await;
    let rule = app.create_rule(rule_body("FINE", "7.12345", 0)).await;
    assert_eq!(rule["rate"], "7.12345");

    let (status, body) = app
        .post(&tenant_path("/tax/calculate"), us_request("1000000000000000"))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["taxAmount"], "71234500000000.00");

    let tax_id = body["taxId"].as_str().unwrap();
    let (status, record) = app
        .get(&tenant_path(&format!("/tax/calculations/{}", tax_id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["amount"], "1000000000000000.00");
    assert_eq!(record["applications"][0]["rate"], "7.12345");
}
