mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, body_text, dec_str, decimal, TestApp};
use serde_json::json;
use shoe_inventory_api::entities::{ProductStatus, TransactionType};
use uuid::Uuid;

fn product_body(sku: &str) -> serde_json::Value {
    json!({
        "name": "Road Runner",
        "sku": sku,
        "category": "Running",
        "size": "42",
        "color": "Black",
        "quantity": 12,
        "cost_price": "650000",
        "selling_price": "990000",
    })
}

#[tokio::test]
async fn manager_creates_and_reads_product() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Saigon Footwear").await;

    let mut body = product_body("RUN-001-42-BLK");
    body["supplier_id"] = json!(supplier.id);
    let (status, created) = app
        .call(Method::POST, "/api/products", Some(body), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["quantity"], 12);
    assert_eq!(created["data"]["status"], "available");
    assert_eq!(created["data"]["quantity_source"], "initial");
    assert_eq!(created["data"]["created_by"], json!(app.manager.id));

    let id = created["data"]["id"].as_str().unwrap();
    let (status, fetched) = app.get(&format!("/api/products/{id}"), &app.user.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["sku"], "RUN-001-42-BLK");
    assert_eq!(fetched["data"]["supplier_name"], "Saigon Footwear");
    assert_eq!(decimal(&fetched["data"]["selling_price"]), dec_str("990000"));
}

#[tokio::test]
async fn product_writes_are_role_gated() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/products",
            Some(product_body("USR-1")),
            Some(&app.user.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let product = app.create_product("DEL-1", 0, "1000").await;
    let uri = format!("/api/products/{}", product.id);
    let (status, _) = app.call(Method::DELETE, &uri, None, Some(&app.manager.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call(Method::DELETE, &uri, None, Some(&app.admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Product deleted");

    let (status, _) = app.get(&uri, &app.user.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_validates_input() {
    let app = TestApp::new().await;

    let mut missing_sku = product_body("X");
    missing_sku.as_object_mut().unwrap().remove("sku");
    let (status, body) = app
        .call(Method::POST, "/api/products", Some(missing_sku), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("sku"));

    let mut negative = product_body("NEG-1");
    negative["quantity"] = json!(-3);
    let (status, _) = app
        .call(Method::POST, "/api/products", Some(negative), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_supplier = product_body("SUP-1");
    bad_supplier["supplier_id"] = json!(Uuid::new_v4());
    let (status, _) = app
        .call(Method::POST, "/api/products", Some(bad_supplier), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_product("DUP-1", 1, "1000").await;
    let (status, body) = app
        .call(Method::POST, "/api/products", Some(product_body("DUP-1")), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn zero_opening_stock_starts_out_of_stock() {
    let app = TestApp::new().await;

    let mut body = product_body("ZERO-1");
    body["quantity"] = json!(0);
    body["status"] = json!("available");
    let (status, created) = app
        .call(Method::POST, "/api/products", Some(body), Some(&app.manager.token))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["status"], "out_of_stock");
}

#[tokio::test]
async fn update_edits_details_but_not_stock_or_sku() {
    let app = TestApp::new().await;
    let product = app.create_product("UPD-1", 8, "1000").await;
    let uri = format!("/api/products/{}", product.id);

    let (status, body) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "name": "Trail Runner", "selling_price": "1250000" })),
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Trail Runner");
    assert_eq!(body["data"]["quantity"], 8);
    assert_eq!(body["data"]["updated_by"], json!(app.manager.id));

    for patch in [json!({ "quantity": 100 }), json!({ "sku": "UPD-2" })] {
        let (status, _) = app
            .call(Method::PUT, &uri, Some(patch), Some(&app.manager.token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let stored = app.product(product.id).await;
    assert_eq!(stored.quantity, 8);
    assert_eq!(stored.sku, "UPD-1");
}

#[tokio::test]
async fn discontinued_status_survives_stock_changes() {
    let app = TestApp::new().await;
    let product = app.create_product("DISC-1", 4, "1000").await;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/products/{}", product.id),
            Some(json!({ "status": "discontinued" })),
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.record(&app.user.token, TransactionType::Import, product.id, 10, "1000")
        .await;
    assert_eq!(app.product(product.id).await.status, ProductStatus::Discontinued);
}

#[tokio::test]
async fn product_with_ledger_history_cannot_be_deleted() {
    let app = TestApp::new().await;
    let product = app.create_product("HIST-9", 5, "1000").await;
    app.record(&app.user.token, TransactionType::Export, product.id, 1, "2000")
        .await;

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/products/{}", product.id),
            None,
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "conflict");
    assert_eq!(app.ledger_count(product.id).await, 1);
}

#[tokio::test]
async fn list_filters_sorts_and_searches() {
    let app = TestApp::new().await;
    app.create_product_with("RUN-A", "Running", 30, "1000", None).await;
    app.create_product_with("RUN-B", "Running", 5, "1000", None).await;
    app.create_product_with("BOOT-A", "Boots", 0, "1000", None).await;

    let (status, all) = app.get("/api/products", &app.user.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["data"]["count"], 3);

    let (_, running) = app.get("/api/products?category=Running", &app.user.token).await;
    assert_eq!(running["data"]["count"], 2);

    let (_, out) = app.get("/api/products?status=out_of_stock", &app.user.token).await;
    assert_eq!(out["data"]["count"], 1);
    assert_eq!(out["data"]["items"][0]["sku"], "BOOT-A");

    let (_, sorted) = app
        .get("/api/products?sort=quantity&order=desc", &app.user.token)
        .await;
    assert_eq!(sorted["data"]["items"][0]["sku"], "RUN-A");

    let (status, _) = app.get("/api/products?sort=colour", &app.user.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, found) = app.get("/api/products/search?keyword=BOOT", &app.user.token).await;
    assert_eq!(found["data"]["count"], 1);

    let (status, _) = app.get("/api/products/search", &app.user.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn csv_export_then_import() {
    let app = TestApp::new().await;
    app.create_product("CSV-1", 3, "1000").await;

    let response = app
        .request(Method::GET, "/api/products/export", None, Some(&app.user.token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let csv = body_text(response).await;
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "sku,name,category,size,color,quantity,cost_price,selling_price,status"
    );
    assert!(lines.next().unwrap().starts_with("CSV-1,"));

    let upload = "ma_sp,ten_sp,danh_muc,kich_co,mau_sac,so_luong,gia_nhap,gia_ban\n\
                  CSV-1,Renamed Shoe,Running,42,Black,999,1000,1800\n\
                  CSV-2,Court Classic,Sneakers,40,Red,6,420000,690000\n\
                  CSV-3,Broken,Sneakers,40,Red,lots,1,2\n";
    let response = app
        .request_raw(
            Method::POST,
            "/api/products/import",
            "text/csv",
            upload,
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["data"]["created"], 1);
    assert_eq!(report["data"]["updated"], 1);
    assert_eq!(report["data"]["errors"][0]["row"], 4);
    assert_eq!(report["data"]["errors"][0]["sku"], "CSV-3");

    // Import refreshes details but never stock of existing products
    let existing = app
        .state
        .services
        .products
        .find_by_sku("CSV-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(existing.name, "Renamed Shoe");
    assert_eq!(existing.quantity, 3);

    let response = app
        .request_raw(
            Method::POST,
            "/api/products/import",
            "text/csv",
            "name,size\nNo Sku,40\n",
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn supplier_crud_and_search() {
    let app = TestApp::new().await;

    let (status, created) = app
        .call(
            Method::POST,
            "/api/suppliers",
            Some(json!({
                "name": "Hanoi Leather",
                "contact_person": "Pham Minh Duc",
                "email": "orders@hanoileather.test",
                "phone": "0241234567",
            })),
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["status"], "active");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            "/api/suppliers",
            Some(json!({ "name": "No Phone" })),
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .call(
            Method::PUT,
            &format!("/api/suppliers/{id}"),
            Some(json!({ "address": "5 Hang Gai, Hoan Kiem" })),
            Some(&app.manager.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["address"], "5 Hang Gai, Hoan Kiem");

    let (_, found) = app.get("/api/suppliers/search?keyword=Leather", &app.user.token).await;
    assert_eq!(found["data"]["count"], 1);

    let (_, detail) = app.get(&format!("/api/suppliers/{id}"), &app.user.token).await;
    assert_eq!(detail["data"]["product_count"], 0);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/suppliers",
            Some(json!({ "name": "Staff Supplier", "phone": "1" })),
            Some(&app.user.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn supplier_in_use_cannot_be_deleted() {
    let app = TestApp::new().await;
    let supplier = app.create_supplier("Binh Duong Soles").await;
    app.create_product_with("SOLE-1", "Running", 1, "1000", Some(supplier.id))
        .await;
    let uri = format!("/api/suppliers/{}", supplier.id);

    let (status, body) = app.call(Method::DELETE, &uri, None, Some(&app.admin.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("1 products"));

    let unused = app.create_supplier("Unused Co").await;
    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/suppliers/{}", unused.id),
            None,
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Supplier deleted");
}
