use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::products::repo::Product;
use crate::storage::UploadedImage;

/// Product as returned to the client, for the list and for edit-form prefill.
#[derive(Debug, Serialize)]
pub struct ProductItem {
    pub id: i32,
    pub nombre: String,
    pub descripcion: String,
    pub precio: Decimal,
    pub imagen: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Product> for ProductItem {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            nombre: p.nombre,
            descripcion: p.descripcion,
            precio: p.precio,
            imagen: p.imagen,
            created_at: p.created_at,
        }
    }
}

/// Fields parsed out of the multipart create/edit form.
#[derive(Debug)]
pub struct ProductForm {
    pub nombre: String,
    pub descripcion: String,
    pub precio: Decimal,
    pub imagen: Option<UploadedImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_item_serializes_all_fields() {
        let item = ProductItem {
            id: 3,
            nombre: "Mate imperial".into(),
            descripcion: "Calabaza forrada en cuero".into(),
            precio: "1499.90".parse().unwrap(),
            imagen: Some("d2c0ffee.jpg".into()),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("Mate imperial"));
        assert!(json.contains("1499.90"));
        assert!(json.contains("d2c0ffee.jpg"));
        assert!(json.contains("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn missing_image_serializes_as_null() {
        let item = ProductItem {
            id: 1,
            nombre: "Termo".into(),
            descripcion: String::new(),
            precio: "10".parse().unwrap(),
            imagen: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains(r#""imagen":null"#));
    }
}
