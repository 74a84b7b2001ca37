use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Users

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

// Sessions

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionEntity {
    pub token: Uuid,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::sessions)]
pub struct CreateSessionEntity {
    pub token: Uuid,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

// Categories

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CategoryEntity {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::categories)]
pub struct CreateCategoryEntity {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::categories)]
pub struct UpdateCategoryEntity {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
}

impl UpdateCategoryEntity {
    pub fn has_changes(&self) -> bool {
        self.name.is_some() || self.description.is_some() || self.parent_id.is_some()
    }
}

// Products

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub promo_price: Option<f64>,
    /// Legacy stock scalar, mirrored from `product_stock` on every stock write.
    pub estoque: i32,
    pub estoque_minimo: Option<i32>,
    pub rating: f64,
    pub sales_count: i32,
    pub featured: bool,
    pub category_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductEntity {
    /// Price a buyer actually pays: the promotional price when one is set.
    pub fn effective_price(&self) -> f64 {
        self.promo_price.unwrap_or(self.price)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub promo_price: Option<f64>,
    pub estoque: i32,
    pub estoque_minimo: Option<i32>,
    pub featured: bool,
    pub category_id: i32,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::products)]
pub struct UpdateProductEntity {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub promo_price: Option<f64>,
    pub estoque_minimo: Option<i32>,
    pub rating: Option<f64>,
    pub featured: Option<bool>,
    pub category_id: Option<i32>,
}

impl UpdateProductEntity {
    pub fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.sku.is_some()
            || self.price.is_some()
            || self.promo_price.is_some()
            || self.estoque_minimo.is_some()
            || self.rating.is_some()
            || self.featured.is_some()
            || self.category_id.is_some()
    }
}

// Product images

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::product_images)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductImageEntity {
    pub id: i32,
    pub product_id: i32,
    pub url: String,
    pub position: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::product_images)]
pub struct CreateProductImageEntity {
    pub product_id: i32,
    pub url: String,
    pub position: i32,
    pub is_primary: bool,
}

// Product stock

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::product_stock)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductStockEntity {
    pub id: i32,
    pub product_id: i32,
    pub location: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Tags

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TagEntity {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::tags)]
pub struct CreateTagEntity {
    pub name: String,
}

// Cart items

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub user_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub user_id: i32,
    pub status: String,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub user_id: i32,
    pub status: String,
    pub total: f64,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: f64, promo_price: Option<f64>) -> ProductEntity {
        ProductEntity {
            id: 1,
            name: "Caneca".into(),
            description: None,
            sku: None,
            price,
            promo_price,
            estoque: 0,
            estoque_minimo: None,
            rating: 0.0,
            sales_count: 0,
            featured: false,
            category_id: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn effective_price_prefers_promo() {
        assert_eq!(product(49.9, Some(39.9)).effective_price(), 39.9);
    }

    #[test]
    fn effective_price_falls_back_to_list_price() {
        assert_eq!(product(49.9, None).effective_price(), 49.9);
    }

    #[test]
    fn empty_product_patch_has_no_changes() {
        let patch = UpdateProductEntity {
            name: None,
            description: None,
            sku: None,
            price: None,
            promo_price: None,
            estoque_minimo: None,
            rating: None,
            featured: None,
            category_id: None,
        };
        assert!(!patch.has_changes());
    }
}
