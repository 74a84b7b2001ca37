use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, QueryDsl, QueryResult, SelectableHelper, result::DatabaseErrorKind,
};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    error::{AppError, DieselError, FieldError, StdResponse},
    models::{CreateProductEntity, ProductEntity, UpdateProductEntity},
    schema::{categories, products},
    state::AppState,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api/admin/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_product))
            .routes(utoipa_axum::routes!(update_product))
            .routes(utoipa_axum::routes!(delete_product)),
    )
}

#[derive(Deserialize, ToSchema)]
struct CreateProductReq {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub promo_price: Option<f64>,
    pub estoque: Option<i32>,
    pub estoque_minimo: Option<i32>,
    pub featured: Option<bool>,
    pub category_id: i32,
}

/// Create a product.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Admin / Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Product created", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Validation failed")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateProductReq>,
) -> Result<impl IntoResponse, AppError> {
    let errors = validate_create(&body);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category_exists: i64 = categories::table
        .find(body.category_id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check category")?;
    if category_exists == 0 {
        return Err(AppError::invalid("category_id", "Unknown category"));
    }

    let product: QueryResult<ProductEntity> = diesel::insert_into(products::table)
        .values(CreateProductEntity {
            name: body.name.trim().to_owned(),
            description: body.description,
            sku: body.sku,
            price: body.price,
            promo_price: body.promo_price,
            estoque: body.estoque.unwrap_or(0),
            estoque_minimo: body.estoque_minimo,
            featured: body.featured.unwrap_or(false),
            category_id: body.category_id,
        })
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await;

    let product = match product {
        Ok(product) => product,
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::invalid("sku", "SKU is already in use"));
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(product),
            message: Some("Product created successfully"),
        },
    ))
}

/// Partially update a product. The legacy `estoque` scalar is deliberately
/// not patchable here; stock goes through the stock endpoints so the
/// per-location table stays in sync. Patching only one of `price` and
/// `promo_price` validates the pair against the stored row, so a promotion
/// can never end up at or above the list price.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Admin / Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to update")
    ),
    responses(
        (status = 200, description = "Product updated", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Product not found")
    )
)]
async fn update_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    axum::Json(body): axum::Json<UpdateProductEntity>,
) -> Result<impl IntoResponse, AppError> {
    if !body.has_changes() {
        return Err(AppError::invalid("body", "No fields to update"));
    }
    let errors = validate_patch(&body);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if let Some(category_id) = body.category_id {
        let category_exists: i64 = categories::table
            .find(category_id)
            .count()
            .get_result(conn)
            .await
            .context("Failed to check category")?;
        if category_exists == 0 {
            return Err(AppError::invalid("category_id", "Unknown category"));
        }
    }

    if body.price.is_some() || body.promo_price.is_some() {
        let current: QueryResult<ProductEntity> = products::table
            .find(id)
            .select(ProductEntity::as_select())
            .get_result(conn)
            .await;

        let current = match current {
            Ok(current) => current,
            Err(DieselError::NotFound) => return Err(AppError::NotFound),
            Err(err) => return Err(AppError::Other(err.into())),
        };

        let price = body.price.unwrap_or(current.price);
        let promo_price = body.promo_price.or(current.promo_price);
        if !promo_price_is_valid(price, promo_price) {
            return Err(AppError::invalid(
                "promo_price",
                "Promotional price must be positive and below the list price",
            ));
        }
    }

    let product: QueryResult<ProductEntity> = diesel::update(products::table.find(id))
        .set((&body, products::updated_at.eq(diesel::dsl::now)))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Product updated successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(AppError::invalid("sku", "SKU is already in use"))
        }
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// Delete a product. Products referenced by order history are protected.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Admin / Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to delete")
    ),
    responses(
        (status = 200, description = "Product deleted", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Product is referenced by existing orders"),
        (status = 404, description = "Product not found")
    )
)]
async fn delete_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = diesel::delete(products::table.find(id))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Product deleted successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => Err(
            AppError::invalid("id", "Product is referenced by existing orders"),
        ),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

/// A promotional price only makes sense strictly below the list price.
/// `None` means the product is not on promotion.
fn promo_price_is_valid(price: f64, promo_price: Option<f64>) -> bool {
    promo_price.is_none_or(|promo| promo.is_finite() && promo > 0.0 && promo < price)
}

fn validate_create(body: &CreateProductReq) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if body.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name must not be empty"));
    }
    if !(body.price.is_finite() && body.price > 0.0) {
        errors.push(FieldError::new("price", "Price must be greater than zero"));
    }
    if !promo_price_is_valid(body.price, body.promo_price) {
        errors.push(FieldError::new(
            "promo_price",
            "Promotional price must be positive and below the list price",
        ));
    }
    if body.estoque.is_some_and(|stock| stock < 0) {
        errors.push(FieldError::new("estoque", "Stock must not be negative"));
    }
    if body.estoque_minimo.is_some_and(|min| min < 0) {
        errors.push(FieldError::new(
            "estoque_minimo",
            "Stock minimum must not be negative",
        ));
    }

    errors
}

fn validate_patch(body: &UpdateProductEntity) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if body.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        errors.push(FieldError::new("name", "Name must not be empty"));
    }
    if body
        .price
        .is_some_and(|price| !(price.is_finite() && price > 0.0))
    {
        errors.push(FieldError::new("price", "Price must be greater than zero"));
    }
    if let (Some(price), Some(promo)) = (body.price, body.promo_price) {
        if !promo_price_is_valid(price, Some(promo)) {
            errors.push(FieldError::new(
                "promo_price",
                "Promotional price must be positive and below the list price",
            ));
        }
    }
    if body.estoque_minimo.is_some_and(|min| min < 0) {
        errors.push(FieldError::new(
            "estoque_minimo",
            "Stock minimum must not be negative",
        ));
    }
    if body
        .rating
        .is_some_and(|rating| !(rating.is_finite() && (0.0..=5.0).contains(&rating)))
    {
        errors.push(FieldError::new("rating", "Rating must be between 0 and 5"));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req() -> CreateProductReq {
        CreateProductReq {
            name: "Caneca".into(),
            description: None,
            sku: None,
            price: 49.9,
            promo_price: None,
            estoque: Some(10),
            estoque_minimo: Some(5),
            featured: None,
            category_id: 1,
        }
    }

    #[test]
    fn valid_create_passes() {
        assert!(validate_create(&create_req()).is_empty());
    }

    #[test]
    fn create_rejects_promo_at_or_above_price() {
        let mut req = create_req();
        req.promo_price = Some(49.9);
        assert_eq!(validate_create(&req)[0].field, "promo_price");

        req.promo_price = Some(60.0);
        assert_eq!(validate_create(&req)[0].field, "promo_price");
    }

    #[test]
    fn create_rejects_negative_stock_fields() {
        let mut req = create_req();
        req.estoque = Some(-1);
        req.estoque_minimo = Some(-2);
        let fields: Vec<&str> = validate_create(&req).iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["estoque", "estoque_minimo"]);
    }

    #[test]
    fn promo_must_stay_below_list_price() {
        assert!(promo_price_is_valid(49.9, None));
        assert!(promo_price_is_valid(49.9, Some(39.9)));
        assert!(!promo_price_is_valid(49.9, Some(49.9)));
        assert!(!promo_price_is_valid(49.9, Some(100.0)));
    }

    #[test]
    fn promo_must_be_a_positive_finite_number() {
        assert!(!promo_price_is_valid(49.9, Some(0.0)));
        assert!(!promo_price_is_valid(49.9, Some(-1.0)));
        assert!(!promo_price_is_valid(49.9, Some(f64::NAN)));
    }

    // A patch touching only one of the pair is resolved against the stored
    // row before the update, the same way the handler merges them.
    #[test]
    fn merged_patch_rejects_promo_above_stored_price() {
        let stored_price = 50.0;
        let patch_promo = Some(100.0);
        assert!(!promo_price_is_valid(stored_price, patch_promo));
    }

    #[test]
    fn merged_patch_rejects_price_below_stored_promo() {
        let patch_price = 30.0;
        let stored_promo = Some(39.9);
        assert!(!promo_price_is_valid(patch_price, stored_promo));
    }

    #[test]
    fn patch_rejects_out_of_range_rating() {
        let patch = UpdateProductEntity {
            name: None,
            description: None,
            sku: None,
            price: None,
            promo_price: None,
            estoque_minimo: None,
            rating: Some(5.5),
            featured: None,
            category_id: None,
        };
        assert_eq!(validate_patch(&patch)[0].field, "rating");
    }
}
