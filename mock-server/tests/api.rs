use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Product, UploadReceipt, BEARER_TOKEN};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- products ---

#[tokio::test]
async fn list_products_empty() {
    let resp = app().oneshot(get("/products")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let products: Vec<Product> = body_json(resp).await;
    assert!(products.is_empty());
}

#[tokio::test]
async fn create_product_returns_201() {
    let resp = app()
        .oneshot(json_request("POST", "/products", r#"{"name":"Lamp","price_cents":1999}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let product: Product = body_json(resp).await;
    assert_eq!(product.name, "Lamp");
    assert_eq!(product.price_cents, 1999);
}

#[tokio::test]
async fn create_product_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/products", r#"{"not_name":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_product_not_found() {
    let resp = app()
        .oneshot(get("/products/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_product_bad_uuid_returns_400() {
    let resp = app().oneshot(get("/products/not-a-uuid")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_unknown_product_return_404() {
    let resp = app()
        .oneshot(json_request(
            "PUT",
            "/products/00000000-0000-0000-0000-000000000000",
            r#"{"name":"Nope"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/products/00000000-0000-0000-0000-000000000000")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn product_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/products", r#"{"name":"Desk"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Product = body_json(resp).await;
    let id = created.id;

    // update
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("PUT", &format!("/products/{id}"), r#"{"price_cents":15000}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Product = body_json(resp).await;
    assert_eq!(updated.name, "Desk");
    assert_eq!(updated.price_cents, 15000);

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(
            Request::builder()
                .method("DELETE")
                .uri(&format!("/products/{id}"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/products/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_products_filters_and_orders_the_catalog() {
    use tower::Service;

    let mut app = app().into_service();
    for body in [
        r#"{"name":"Floor lamp","price_cents":9000}"#,
        r#"{"name":"Desk","price_cents":15000}"#,
        r#"{"name":"Desk lamp","price_cents":2500}"#,
    ] {
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(json_request("POST", "/products", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = ServiceExt::ready(&mut app).await.unwrap().call(get("/products")).await.unwrap();
    let names: Vec<String> = body_json::<Vec<Product>>(resp).await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Desk lamp", "Floor lamp", "Desk"]);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get("/products?max_price_cents=10000&search=floor"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let names: Vec<String> = body_json::<Vec<Product>>(resp).await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Floor lamp"]);
}

#[tokio::test]
async fn blank_product_names_are_rejected() {
    use tower::Service;

    let mut app = app().into_service();
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/products", r#"{"name":"   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/products", r#"{"name":" Chair ","price_cents":4000}"#))
        .await
        .unwrap();
    let created: Product = body_json(resp).await;
    assert_eq!(created.name, "Chair");

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("PUT", &format!("/products/{}", created.id), r#"{"name":""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/products/{}", created.id)))
        .await
        .unwrap();
    let unchanged: Product = body_json(resp).await;
    assert_eq!(unchanged.name, "Chair");
}

// --- files ---

#[tokio::test]
async fn seeded_file_is_served() {
    let resp = app().oneshot(get("/files/report.pdf")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"%PDF-1.4 mock report");
}

#[tokio::test]
async fn missing_file_returns_404() {
    let resp = app().oneshot(get("/files/nope.bin")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_file_then_get_it() {
    use tower::Service;

    let mut app = app().into_service();
    let put = Request::builder()
        .method("PUT")
        .uri("/files/notes.txt")
        .body(String::from("hello"))
        .unwrap();
    let resp = ServiceExt::ready(&mut app).await.unwrap().call(put).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get("/files/notes.txt"))
        .await
        .unwrap();
    assert_eq!(&body_bytes(resp).await[..], b"hello");
}

// --- uploads ---

#[tokio::test]
async fn upload_returns_a_receipt() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/uploads")
                .header(http::header::CONTENT_TYPE, "text/plain")
                .body(String::from("abcd"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let receipt: UploadReceipt = body_json(resp).await;
    assert_eq!(receipt.bytes, 4);
    assert_eq!(receipt.content_type.as_deref(), Some("text/plain"));
}

// --- secure ---

#[tokio::test]
async fn secure_products_require_the_bearer_token() {
    let resp = app().oneshot(get("/secure/products")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/secure/products")
                .header(http::header::AUTHORIZATION, format!("Bearer {BEARER_TOKEN}"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let products: Vec<Product> = body_json(resp).await;
    assert!(products.is_empty());
}
