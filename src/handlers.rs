// src/handlers.rs
use crate::AppState;
use crate::cost::estimate;
use crate::errors::StudioError;
use crate::layout::{ContainerSize, DragMode, EditorView, PointerPosition};
use crate::models::{ArtDirectionRequest, DesignPlan};
use crate::services::GeminiClient;
use crate::services::image_processor::export;
use crate::session::{GenerateOptions, Session};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/estimate", web::post().to(estimate_cost))
            .route("/pricing", web::get().to(pricing))
            .route("/export", web::post().to(export_image))
            .route("/sessions", web::post().to(login))
            .service(
                web::scope("/sessions/{id}")
                    .route("", web::delete().to(logout))
                    .route("/state", web::get().to(session_state))
                    .route("/brief", web::put().to(update_brief))
                    .route("/brief/reset", web::post().to(reset_brief))
                    .route("/assets", web::post().to(upload_assets))
                    .route("/analyze", web::post().to(analyze))
                    .route("/plan", web::post().to(update_plan))
                    .route("/generate", web::post().to(generate))
                    .route("/images/select", web::post().to(select_image))
                    .route("/separate", web::post().to(separate_layers))
                    .route("/remove", web::post().to(smart_remove))
                    .route("/upscale", web::post().to(upscale))
                    .route("/layout", web::get().to(layout_view))
                    .route("/layout/select", web::post().to(layout_select))
                    .route("/layout/pointer", web::post().to(layout_pointer))
                    .route("/layout/undo", web::post().to(layout_undo))
                    .route("/layout/redo", web::post().to(layout_redo))
                    .route("/layout/confirm", web::post().to(layout_confirm))
                    .route("/layout/elements/{eid}/image", web::post().to(attach_image))
                    .route("/layout/elements/{eid}/image", web::delete().to(detach_image))
                    .route("/designs", web::post().to(save_design))
                    .route("/designs", web::get().to(list_designs))
                    .route("/designs", web::delete().to(delete_all_designs))
                    .route("/designs/{design_id}", web::delete().to(delete_design)),
            ),
    );
}

async fn session(data: &AppState, id: Uuid) -> Result<Arc<Session>, StudioError> {
    data.sessions.get(&id).await
}

pub async fn estimate_cost(
    data: web::Data<AppState>,
    body: web::Json<ArtDirectionRequest>,
) -> HttpResponse {
    HttpResponse::Ok().json(estimate(&body, &data.pricing))
}

pub async fn pricing(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&data.pricing)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub author: String,
    pub api_key: Option<String>,
}

pub async fn login(
    data: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, StudioError> {
    let body = body.into_inner();
    let api_key = body
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| data.config.default_api_key.clone())
        .ok_or_else(|| StudioError::Unauthorized("An API key is required".to_string()))?;
    let client = Arc::new(GeminiClient::new(
        api_key,
        data.config.gemini_base_url.clone(),
        data.config.models.clone(),
    ));
    let session = data.sessions.open(&body.author, client).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "sessionId": session.id,
        "author": session.author,
    })))
}

pub async fn logout(data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    if !data.sessions.close(&id).await {
        return Err(StudioError::NotFound(format!("Session {}", id)));
    }
    Ok(HttpResponse::NoContent().finish())
}

pub async fn session_state(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let brief = session.brief.lock().await.clone();
    let cost = estimate(&brief, &data.pricing);
    let studio = session.studio.snapshot().await;
    let layout = session.editor.lock().await.as_ref().map(|e| e.view());
    let confirmed_layout = session.confirmed_layout.lock().await.clone();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "sessionId": session.id,
        "author": session.author,
        "brief": brief,
        "cost": cost,
        "studio": studio,
        "layout": layout,
        "confirmedLayout": confirmed_layout,
    })))
}

pub async fn update_brief(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ArtDirectionRequest>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let brief = body.into_inner();
    let cost = estimate(&brief, &data.pricing);
    *session.brief.lock().await = brief;
    Ok(HttpResponse::Ok().json(cost))
}

pub async fn reset_brief(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    session.reset_brief().await;
    info!("Session {} started a new brief", session.id);
    Ok(HttpResponse::Ok().json(&*session.brief.lock().await))
}

pub async fn upload_assets(
    mut payload: Multipart,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    session(&data, path.into_inner()).await?;
    let mut uploaded = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }

        let data_url = data.image_processor.prepare_upload(&image_data)?;
        uploaded.push(serde_json::json!({
            "filename": filename,
            "dataUrl": data_url,
        }));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": uploaded.len(),
        "files": uploaded,
    })))
}

/// Orchestration calls report through their slice; the reply is the
/// refreshed studio state.
async fn studio_reply(session: &Session, applied: bool) -> HttpResponse {
    let studio = session.studio.snapshot().await;
    HttpResponse::Ok().json(serde_json::json!({
        "applied": applied,
        "studio": studio,
    }))
}

pub async fn analyze(data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let applied = session.analyze().await?;
    Ok(studio_reply(&session, applied).await)
}

pub async fn update_plan(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<DesignPlan>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let brief = session.brief.lock().await.clone();
    let applied = session.studio.update_plan(&brief, body.into_inner()).await?;
    Ok(studio_reply(&session, applied).await)
}

pub async fn generate(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<GenerateOptions>>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let options = body.map(|b| b.into_inner()).unwrap_or_default();
    let applied = session.generate(options).await?;
    Ok(studio_reply(&session, applied).await)
}

#[derive(Debug, Deserialize)]
pub struct SelectImageRequest {
    pub index: usize,
}

pub async fn select_image(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<SelectImageRequest>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    session.studio.select_image(body.index).await?;
    Ok(studio_reply(&session, true).await)
}

pub async fn separate_layers(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let quality = session.brief.lock().await.quality;
    let aspect_ratio = session.working_aspect_ratio().await;
    let applied = session.studio.separate_layers(aspect_ratio, quality).await?;
    Ok(studio_reply(&session, applied).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    /// Defaults to the selected image.
    pub image: Option<String>,
    pub mask: String,
    #[serde(default)]
    pub hint: String,
}

pub async fn smart_remove(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RemoveRequest>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let body = body.into_inner();
    let image = match body.image {
        Some(image) => image,
        None => session
            .studio
            .snapshot()
            .await
            .selected_image_url()
            .map(str::to_string)
            .ok_or_else(|| StudioError::InvalidState("No image selected".to_string()))?,
    };
    if body.mask.trim().is_empty() {
        return Err(StudioError::Validation("A mask is required".to_string()));
    }
    let applied = session.studio.smart_remove(&image, &body.mask, &body.hint).await;
    Ok(studio_reply(&session, applied).await)
}

pub async fn upscale(data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let aspect_ratio = session.working_aspect_ratio().await;
    let applied = session.studio.upscale(aspect_ratio).await?;
    Ok(studio_reply(&session, applied).await)
}

fn layout_reply(view: EditorView, changed: bool) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "changed": changed,
        "layout": view,
    }))
}

pub async fn layout_view(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let view = session.edit_layout(|editor| Ok(editor.view())).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSelectRequest {
    pub element_id: Option<String>,
}

pub async fn layout_select(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<LayoutSelectRequest>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let view = session
        .edit_layout(|editor| {
            match &body.element_id {
                Some(id) => editor.select(id)?,
                None => editor.clear_selection(),
            }
            Ok(editor.view())
        })
        .await?;
    Ok(layout_reply(view, false))
}

/// Pointer stream of one drag gesture, plus the per-frame flush tick.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PointerEvent {
    Down {
        #[serde(rename = "elementId")]
        element_id: String,
        mode: DragMode,
        position: PointerPosition,
        container: ContainerSize,
    },
    Move {
        position: PointerPosition,
    },
    Frame,
    Up,
}

pub async fn layout_pointer(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<PointerEvent>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let (view, changed) = session
        .edit_layout(|editor| {
            let changed = match body.into_inner() {
                PointerEvent::Down {
                    element_id,
                    mode,
                    position,
                    container,
                } => {
                    editor.pointer_down(&element_id, mode, position, container)?;
                    false
                }
                PointerEvent::Move { position } => {
                    if !editor.pointer_move(position) {
                        return Err(StudioError::InvalidState("No element is being dragged".to_string()));
                    }
                    false
                }
                PointerEvent::Frame => editor.flush_frame(),
                PointerEvent::Up => editor.pointer_up(),
            };
            Ok((editor.view(), changed))
        })
        .await?;
    Ok(layout_reply(view, changed))
}

pub async fn layout_undo(data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let (view, changed) = session
        .edit_layout(|editor| {
            let changed = editor.undo();
            Ok((editor.view(), changed))
        })
        .await?;
    Ok(layout_reply(view, changed))
}

pub async fn layout_redo(data: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let (view, changed) = session
        .edit_layout(|editor| {
            let changed = editor.redo();
            Ok((editor.view(), changed))
        })
        .await?;
    Ok(layout_reply(view, changed))
}

pub async fn layout_confirm(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let confirmed = session.confirm_layout().await?;
    Ok(HttpResponse::Ok().json(confirmed))
}

#[derive(Debug, Deserialize)]
pub struct AttachImageRequest {
    /// Image as a data URL.
    pub image: String,
}

pub async fn attach_image(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
    body: web::Json<AttachImageRequest>,
) -> Result<HttpResponse, StudioError> {
    let (id, element_id) = path.into_inner();
    let session = session(&data, id).await?;
    let image = body.into_inner().image;
    let ratio = data.image_processor.aspect_ratio(&image)?;
    let view = session
        .edit_layout(|editor| {
            editor.attach_image(&element_id, Arc::from(image), ratio)?;
            Ok(editor.view())
        })
        .await?;
    Ok(layout_reply(view, true))
}

pub async fn detach_image(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, StudioError> {
    let (id, element_id) = path.into_inner();
    let session = session(&data, id).await?;
    let view = session
        .edit_layout(|editor| {
            editor.detach_image(&element_id)?;
            Ok(editor.view())
        })
        .await?;
    Ok(layout_reply(view, true))
}

#[derive(Debug, Deserialize)]
pub struct SaveDesignRequest {
    pub thumbnail: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

pub async fn save_design(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<SaveDesignRequest>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let body = body.into_inner();
    let design = session
        .save_design(data.designs.as_ref(), body.thumbnail, body.seed)
        .await?;
    Ok(HttpResponse::Created().json(design))
}

pub async fn list_designs(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let designs = session.refresh_designs(data.designs.as_ref()).await?;
    Ok(HttpResponse::Ok().json(designs))
}

pub async fn delete_design(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, u64)>,
) -> Result<HttpResponse, StudioError> {
    let (id, design_id) = path.into_inner();
    let session = session(&data, id).await?;
    session.delete_design(data.designs.as_ref(), design_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn delete_all_designs(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, StudioError> {
    let session = session(&data, path.into_inner()).await?;
    let deleted = session.delete_all_designs(data.designs.as_ref()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub data_url: String,
    #[serde(default)]
    pub prefix: String,
}

pub async fn export_image(body: web::Json<ExportRequest>) -> Result<HttpResponse, StudioError> {
    let file = export(&body.data_url, &body.prefix, chrono::Utc::now())?;
    Ok(HttpResponse::Ok()
        .content_type(file.mime_type)
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", file.filename),
        ))
        .body(file.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::cost::PricingTable;
    use crate::services::ImageProcessor;
    use crate::services::image_processor::encode_data_url;
    use crate::services::memory_store::MemoryDesignStore;
    use crate::session::{SessionManager, SessionSettings};
    use actix_web::{App, http::StatusCode, test};
    use std::time::Duration;

    fn app_state(default_api_key: Option<&str>) -> AppState {
        let config = AppConfig {
            default_api_key: default_api_key.map(str::to_string),
            ..AppConfig::default()
        };
        AppState {
            sessions: Arc::new(SessionManager::new(
                Duration::from_secs(60),
                SessionSettings {
                    history_limit: config.history_limit,
                    mask_width: 64,
                },
            )),
            config: Arc::new(config),
            designs: Arc::new(MemoryDesignStore::default()),
            image_processor: Arc::new(ImageProcessor::new()),
            pricing: Arc::new(PricingTable::default()),
        }
    }

    #[actix_web::test]
    async fn estimate_is_stateless() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(None)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/estimate")
            .set_json(serde_json::json!({ "mainHeadline": "Hello", "batchSize": 2 }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["totalCostVND"].as_u64().unwrap() > 0);
        assert_eq!(body["generationCostVND"], 2 * 3_350);
    }

    #[actix_web::test]
    async fn login_requires_a_credential() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(None)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(serde_json::json!({ "author": "Linh" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn session_lifecycle_over_http() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(Some("key"))))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(serde_json::json!({ "author": "Linh" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let id = body["sessionId"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/state", id))
            .to_request();
        let state: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(state["author"], "Linh");
        assert_eq!(state["brief"]["batchSize"], 1);
        assert!(state["layout"].is_null());

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/layout", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/sessions/{}/analyze", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/sessions/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/sessions/{}/state", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn export_returns_attachment() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(None)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/export")
            .set_json(serde_json::json!({
                "dataUrl": encode_data_url("image/jpeg", b"jpeg-bytes"),
                "prefix": "poster",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get("Content-Disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"poster-"));
        assert!(disposition.ends_with(".jpg\""));
        assert_eq!(&test::read_body(resp).await[..], b"jpeg-bytes");

        let req = test::TestRequest::post()
            .uri("/api/v1/export")
            .set_json(serde_json::json!({ "dataUrl": "not a data url" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
