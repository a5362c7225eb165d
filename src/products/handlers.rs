use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::{Html, Redirect},
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::{
    auth::session::SessionUser,
    error::AppError,
    products::dto::{ProductForm, ProductItem},
    products::repo,
    state::AppState,
    storage::UploadedImage,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/productos", get(list_products))
        .route("/productos/crear", get(create_page).post(create_product))
        .route("/productos/editar/:id", get(edit_data).post(update_product))
        .route("/productos/eliminar/:id", get(delete_product))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

const CREATE_PAGE: &str = r#"<!doctype html>
<html lang="es"><head><meta charset="utf-8"><title>Crear producto</title></head>
<body>
  <h1>Crear producto</h1>
  <form method="post" action="/productos/crear" enctype="multipart/form-data">
    <label>Nombre <input name="nombre" required></label>
    <label>Descripción <textarea name="descripcion"></textarea></label>
    <label>Precio <input name="precio" required></label>
    <label>Imagen <input name="imagen" type="file"></label>
    <button type="submit">Guardar</button>
  </form>
  <p><a href="/productos">Volver al listado</a></p>
</body></html>
"#;

pub async fn create_page(SessionUser(_user): SessionUser) -> Html<&'static str> {
    Html(CREATE_PAGE)
}

#[instrument(skip_all)]
pub async fn list_products(
    State(state): State<AppState>,
    SessionUser(_user): SessionUser,
) -> Result<Json<Vec<ProductItem>>, AppError> {
    let products = repo::list_all(&state.db).await?;
    Ok(Json(products.into_iter().map(ProductItem::from).collect()))
}

#[instrument(skip_all)]
pub async fn edit_data(
    State(state): State<AppState>,
    SessionUser(_user): SessionUser,
    Path(id): Path<i32>,
) -> Result<Json<ProductItem>, AppError> {
    let product = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("producto"))?;
    Ok(Json(product.into()))
}

#[instrument(skip_all)]
pub async fn create_product(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    mp: Multipart,
) -> Result<Redirect, AppError> {
    let form = read_product_form(mp).await?;

    let imagen = state.images.save(form.imagen.as_ref()).await?;
    let product = repo::insert(
        &state.db,
        &form.nombre,
        &form.descripcion,
        form.precio,
        imagen.as_deref(),
    )
    .await?;

    info!(
        user_id = user.id,
        product_id = product.id,
        imagen = ?product.imagen,
        "product created"
    );
    Ok(Redirect::to("/productos"))
}

#[instrument(skip_all)]
pub async fn update_product(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i32>,
    mp: Multipart,
) -> Result<Redirect, AppError> {
    let current = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("producto"))?;
    let form = read_product_form(mp).await?;

    let imagen = state
        .images
        .replace(form.imagen.as_ref(), current.imagen.as_deref())
        .await?;
    repo::update(
        &state.db,
        id,
        &form.nombre,
        &form.descripcion,
        form.precio,
        imagen.as_deref(),
    )
    .await?;

    info!(user_id = user.id, product_id = id, imagen = ?imagen, "product updated");
    Ok(Redirect::to("/productos"))
}

#[instrument(skip_all)]
pub async fn delete_product(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i32>,
) -> Result<Redirect, AppError> {
    match repo::find_by_id(&state.db, id).await? {
        Some(product) => {
            // The file goes first; a missing file is not an error.
            state.images.delete(product.imagen.as_deref()).await?;
            repo::delete(&state.db, id).await?;
            info!(user_id = user.id, product_id = id, "product deleted");
        }
        None => {
            warn!(product_id = id, "delete of unknown product");
        }
    }
    Ok(Redirect::to("/productos"))
}

async fn read_product_form(mut mp: Multipart) -> Result<ProductForm, AppError> {
    let mut nombre = None;
    let mut descripcion = None;
    let mut precio = None;
    let mut imagen = None;

    while let Some(field) = mp.next_field().await.map_err(malformed)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("nombre") => nombre = Some(field.text().await.map_err(malformed)?),
            Some("descripcion") => descripcion = Some(field.text().await.map_err(malformed)?),
            Some("precio") => precio = Some(field.text().await.map_err(malformed)?),
            Some("imagen") => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                imagen = Some(UploadedImage {
                    original_name,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let nombre = nombre
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("nombre is required".into()))?;
    let descripcion = descripcion.unwrap_or_default();
    let precio = precio
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| AppError::Validation("precio is required".into()))?
        .parse::<Decimal>()
        .map_err(|_| AppError::Validation("precio must be a decimal number".into()))?;

    Ok(ProductForm {
        nombre,
        descripcion,
        precio,
        imagen,
    })
}

fn malformed(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("malformed form: {e}"))
}
