mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{body_text, dec_str, decimal, TestApp};
use shoe_inventory_api::entities::TransactionType;

/// Two products with one import and two exports between them.
async fn seeded() -> TestApp {
    let app = TestApp::new().await;
    let runner = app
        .create_product_with("RUN-1", "Running", 20, "100000", None)
        .await;
    let boot = app
        .create_product_with("BOOT-1", "Boots", 4, "300000", None)
        .await;

    app.record(&app.manager.token, TransactionType::Import, runner.id, 10, "100000")
        .await;
    app.record(&app.user.token, TransactionType::Export, runner.id, 5, "180000")
        .await;
    app.record(&app.user.token, TransactionType::Export, boot.id, 1, "450000")
        .await;
    app
}

fn today_range() -> String {
    let today = Utc::now().date_naive();
    format!(
        "startDate={}&endDate={}",
        today - Duration::days(1),
        today + Duration::days(1)
    )
}

#[tokio::test]
async fn dashboard_summarises_recent_activity() {
    let app = seeded().await;

    let (status, body) = app.get("/api/reports/dashboard?days=7", &app.manager.token).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];

    assert_eq!(data["days"], 7);
    assert_eq!(data["product_count"], 2);
    assert_eq!(data["summary"]["total_transactions"], 3);
    assert_eq!(decimal(&data["summary"]["total_export_amount"]), dec_str("1350000"));

    // RUN-1: 25 x 100000, BOOT-1: 3 x 300000
    assert_eq!(decimal(&data["inventory_value"]), dec_str("3400000"));

    let low = data["low_stock_products"].as_array().unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["sku"], "BOOT-1");

    let top = data["top_selling_products"].as_array().unwrap();
    assert_eq!(top[0]["sku"], "RUN-1");
    assert_eq!(top[0]["quantity_sold"], 5);
    assert_eq!(decimal(&top[0]["revenue"]), dec_str("900000"));

    let days = data["revenue_by_day"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(decimal(&days[0]["revenue"]), dec_str("1350000"));
}

#[tokio::test]
async fn dashboard_rejects_out_of_range_days() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/api/reports/dashboard?days=0", &app.manager.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revenue_groups_exports_against_imports() {
    let app = seeded().await;

    let uri = format!("/api/reports/revenue?{}&groupBy=month", today_range());
    let (status, body) = app.get(&uri, &app.manager.token).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["group_by"], "month");

    let periods = data["periods"].as_array().unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0]["period"], Utc::now().format("%Y-%m").to_string());
    assert_eq!(decimal(&data["total_revenue"]), dec_str("1350000"));
    assert_eq!(decimal(&data["total_cost"]), dec_str("1000000"));
    assert_eq!(decimal(&data["total_profit"]), dec_str("350000"));
}

#[tokio::test]
async fn revenue_requires_a_valid_range() {
    let app = TestApp::new().await;

    let (status, _) = app.get("/api/reports/revenue", &app.manager.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get(
            "/api/reports/revenue?startDate=2024-05-01&endDate=2024-04-01",
            &app.manager.token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get(
            "/api/reports/revenue?startDate=2024-04-01&endDate=2024-05-01&groupBy=fortnight",
            &app.manager.token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_report_values_stock_by_category() {
    let app = seeded().await;

    let (status, body) = app.get("/api/reports/inventory", &app.admin.token).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];

    assert_eq!(data["count"], 2);
    assert_eq!(data["items"][0]["sku"], "RUN-1");
    assert_eq!(decimal(&data["items"][0]["inventory_value"]), dec_str("2500000"));
    assert_eq!(decimal(&data["total_value"]), dec_str("3400000"));

    let categories = data["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["category"], "Boots");
    assert_eq!(categories[0]["total_quantity"], 3);
}

#[tokio::test]
async fn transaction_report_totals_filtered_entries() {
    let app = seeded().await;

    let (status, body) = app
        .get("/api/reports/transactions?type=export", &app.manager.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(decimal(&body["data"]["total_amount"]), dec_str("1350000"));
}

#[tokio::test]
async fn reports_are_for_managers_and_admins() {
    let app = TestApp::new().await;

    for uri in [
        "/api/reports/dashboard",
        "/api/reports/inventory",
        "/api/reports/inventory/export",
        "/api/reports/transactions",
    ] {
        let (status, _) = app.get(uri, &app.user.token).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn csv_exports_are_downloads() {
    let app = seeded().await;

    let revenue_uri = format!("/api/reports/revenue/export?{}", today_range());
    for (uri, header) in [
        (revenue_uri.as_str(), "period,revenue,cost,profit"),
        (
            "/api/reports/inventory/export",
            "sku,name,category,supplier,quantity,cost_price,inventory_value,status",
        ),
        ("/api/reports/transactions/export", "date,reference_number,type,sku"),
    ] {
        let response = app
            .request(Method::GET, uri, None, Some(&app.manager.token))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");

        let disposition = response
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename="), "{disposition}");
        assert!(disposition.ends_with(".csv\""), "{disposition}");

        let csv = body_text(response).await;
        assert!(csv.starts_with(header), "{uri}: {csv}");
    }
}
