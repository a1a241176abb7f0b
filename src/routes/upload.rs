use axum::{Json, extract::Multipart, extract::State};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    state::AppState,
};

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "pdf"];

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub file_name: String,
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/upload",
    responses(
        (status = 200, description = "File stored, public URL returned", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Missing file or disallowed extension"),
        (status = 403, description = "Forbidden"),
    ),
    security(("cookie_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadResponse>>> {
    ensure_admin(&user)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("missing file name".into()))?;
        let extension = original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| AppError::BadRequest("missing file extension".into()))?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::BadRequest(format!(
                "file type {extension:?} is not allowed"
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let file_name = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::create_dir_all(&state.config.upload_dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        tokio::fs::write(state.config.upload_dir.join(&file_name), &data)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let url = format!("{}/uploads/{file_name}", state.config.public_url);

        if let Err(err) = log_audit(
            &state.pool,
            Some(user.user_id),
            "file_upload",
            Some("uploads"),
            Some(serde_json::json!({ "file_name": file_name, "original": original_name })),
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }

        return Ok(Json(ApiResponse::success(
            "Uploaded",
            UploadResponse { file_name, url },
            Some(Meta::empty()),
        )));
    }

    Err(AppError::BadRequest("no file field in request".into()))
}
