use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// Catalog entry. `imagen` holds the generated filename of the stored image,
/// if one was uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub nombre: String,
    pub descripcion: String,
    pub precio: Decimal,
    pub imagen: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Product>> {
    let rows = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, nombre, descripcion, precio, imagen, created_at
        FROM products
        ORDER BY id
        "#,
    )
    .fetch_all(db)
    .await
    .context("list products")?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: i32) -> anyhow::Result<Option<Product>> {
    let row = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, nombre, descripcion, precio, imagen, created_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find product")?;
    Ok(row)
}

pub async fn insert(
    db: &PgPool,
    nombre: &str,
    descripcion: &str,
    precio: Decimal,
    imagen: Option<&str>,
) -> anyhow::Result<Product> {
    let row = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (nombre, descripcion, precio, imagen)
        VALUES ($1, $2, $3, $4)
        RETURNING id, nombre, descripcion, precio, imagen, created_at
        "#,
    )
    .bind(nombre)
    .bind(descripcion)
    .bind(precio)
    .bind(imagen)
    .fetch_one(db)
    .await
    .context("insert product")?;
    Ok(row)
}

pub async fn update(
    db: &PgPool,
    id: i32,
    nombre: &str,
    descripcion: &str,
    precio: Decimal,
    imagen: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET nombre = $1,
            descripcion = $2,
            precio = $3,
            imagen = $4
        WHERE id = $5
        "#,
    )
    .bind(nombre)
    .bind(descripcion)
    .bind(precio)
    .bind(imagen)
    .bind(id)
    .execute(db)
    .await
    .context("update product")?;
    Ok(())
}

pub async fn delete(db: &PgPool, id: i32) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete product")?;
    Ok(())
}
