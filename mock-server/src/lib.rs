use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Token accepted by the `/secure` routes.
pub const BEARER_TOKEN: &str = "secret-token";

/// Files served from `/files` on a fresh server.
pub const SEEDED_FILES: &[(&str, &[u8])] = &[
    ("report.pdf", b"%PDF-1.4 mock report"),
    ("logo.png", b"\x89PNG\r\n\x1a\nmock-logo"),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_cents: u64,
}

#[derive(Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub price_cents: u64,
}

#[derive(Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub price_cents: Option<u64>,
}

/// Query string accepted by `GET /products`.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFilter {
    pub max_price_cents: Option<u64>,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
}

impl CatalogFilter {
    fn matches(&self, product: &Product) -> bool {
        let cheap_enough = self.max_price_cents.map_or(true, |max| product.price_cents <= max);
        let named = self
            .search
            .as_deref()
            .map_or(true, |needle| product.name.to_lowercase().contains(&needle.to_lowercase()));
        cheap_enough && named
    }
}

/// Trimmed product name, or 422 for a blank one.
fn product_name(name: &str) -> Result<String, StatusCode> {
    match name.trim() {
        "" => Err(StatusCode::UNPROCESSABLE_ENTITY),
        trimmed => Ok(trimmed.to_string()),
    }
}

/// Answer to an upload: what the server stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub bytes: usize,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct Store {
    products: RwLock<HashMap<Uuid, Product>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
    uploads: RwLock<HashMap<Uuid, Vec<u8>>>,
}

pub type Db = Arc<Store>;

pub fn app() -> Router {
    let files = SEEDED_FILES
        .iter()
        .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
        .collect();
    let db: Db = Arc::new(Store {
        files: RwLock::new(files),
        ..Store::default()
    });
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/files/{name}", get(get_file).put(put_file))
        .route("/uploads", post(create_upload))
        .route("/secure/products", get(list_secure_products))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Catalog order: cheapest first, ties broken by name.
fn catalog<'a>(products: impl Iterator<Item = &'a Product>, filter: &CatalogFilter) -> Vec<Product> {
    let mut listed: Vec<Product> = products.filter(|product| filter.matches(product)).cloned().collect();
    listed.sort_by(|a, b| a.price_cents.cmp(&b.price_cents).then_with(|| a.name.cmp(&b.name)));
    listed
}

async fn list_products(State(db): State<Db>, Query(filter): Query<CatalogFilter>) -> Json<Vec<Product>> {
    Json(catalog(db.products.read().await.values(), &filter))
}

async fn create_product(
    State(db): State<Db>,
    Json(input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>), StatusCode> {
    let product = Product {
        id: Uuid::new_v4(),
        name: product_name(&input.name)?,
        price_cents: input.price_cents,
    };
    tracing::debug!(id = %product.id, name = %product.name, "added product to catalog");
    db.products.write().await.insert(product.id, product.clone());
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, StatusCode> {
    db.products.read().await.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Partial update; a blank name is rejected before the catalog is touched.
async fn update_product(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>, StatusCode> {
    let name = input.name.as_deref().map(product_name).transpose()?;
    let mut products = db.products.write().await;
    let product = products.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    product.name = name.unwrap_or_else(|| product.name.clone());
    product.price_cents = input.price_cents.unwrap_or(product.price_cents);
    Ok(Json(product.clone()))
}

async fn delete_product(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    match db.products.write().await.remove(&id) {
        Some(product) => {
            tracing::debug!(id = %id, name = %product.name, "removed product from catalog");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_file(
    State(db): State<Db>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let files = db.files.read().await;
    let bytes = files.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

async fn put_file(State(db): State<Db>, Path(name): Path<String>, body: Bytes) -> StatusCode {
    let created = db.files.write().await.insert(name, body.to_vec()).is_none();
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn create_upload(
    State(db): State<Db>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<UploadReceipt>) {
    let receipt = UploadReceipt {
        id: Uuid::new_v4(),
        bytes: body.len(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };
    tracing::debug!(id = %receipt.id, bytes = receipt.bytes, "stored upload");
    db.uploads.write().await.insert(receipt.id, body.to_vec());
    (StatusCode::CREATED, Json(receipt))
}

async fn list_secure_products(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, StatusCode> {
    if !is_authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(list_products(State(db), Query(CatalogFilter::default())).await)
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        == Some(BEARER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_serializes_to_json() {
        let product = Product {
            id: Uuid::nil(),
            name: "Lamp".to_string(),
            price_cents: 1999,
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["name"], "Lamp");
        assert_eq!(json["price_cents"], 1999);
    }

    #[test]
    fn create_product_defaults_price_to_zero() {
        let input: CreateProduct = serde_json::from_str(r#"{"name":"Free sample"}"#).unwrap();
        assert_eq!(input.name, "Free sample");
        assert_eq!(input.price_cents, 0);
    }

    #[test]
    fn create_product_rejects_missing_name() {
        let result: Result<CreateProduct, _> = serde_json::from_str(r#"{"price_cents":5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_product_all_fields_optional() {
        let input: UpdateProduct = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.name.is_none());
        assert!(input.price_cents.is_none());
    }

    fn product(name: &str, price_cents: u64) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price_cents,
        }
    }

    #[test]
    fn catalog_sorts_by_price_then_name() {
        let products = [product("Lamp", 1999), product("Desk", 15000), product("Bulb", 1999)];
        let names: Vec<String> = catalog(products.iter(), &CatalogFilter::default())
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Bulb", "Lamp", "Desk"]);
    }

    #[test]
    fn catalog_filter_combines_price_and_search() {
        let products = [product("Desk lamp", 2500), product("Floor lamp", 9000), product("Desk", 15000)];
        let filter = CatalogFilter {
            max_price_cents: Some(10000),
            search: Some("LAMP".to_string()),
        };
        let names: Vec<String> = catalog(products.iter(), &filter).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Desk lamp", "Floor lamp"]);
    }

    #[test]
    fn product_names_are_trimmed_and_must_not_be_blank() {
        assert_eq!(product_name("  Lamp ").unwrap(), "Lamp");
        assert_eq!(product_name("   ").unwrap_err(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn bearer_check_requires_exact_token() {
        let mut headers = HeaderMap::new();
        assert!(!is_authorized(&headers));

        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(!is_authorized(&headers));

        headers.insert(header::AUTHORIZATION, format!("Bearer {BEARER_TOKEN}").parse().unwrap());
        assert!(is_authorized(&headers));
    }
}
