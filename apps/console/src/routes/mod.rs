pub mod form;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::export::handlers as export;
use crate::jobs::handlers as jobs;
use crate::merge::handlers as merge;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/master/default-info", get(health::handle_master_info))
        // Merge
        .route("/api/v1/merge", post(merge::handle_start_merge))
        // Export sessions
        .route("/api/v1/export/sessions", post(export::handle_create_session))
        .route(
            "/api/v1/export/sessions/:id",
            get(export::handle_get_session).delete(export::handle_delete_session),
        )
        .route(
            "/api/v1/export/sessions/:id/analyze",
            post(export::handle_analyze),
        )
        .route(
            "/api/v1/export/sessions/:id/blocks/:index/move",
            post(export::handle_move_block),
        )
        .route(
            "/api/v1/export/sessions/:id/blocks/toggle",
            post(export::handle_toggle_block),
        )
        .route(
            "/api/v1/export/sessions/:id/default-order",
            post(export::handle_default_order),
        )
        .route(
            "/api/v1/export/sessions/:id/export",
            post(export::handle_start_export),
        )
        // Jobs
        .route(
            "/api/v1/jobs/:id",
            get(jobs::handle_get_job).delete(jobs::handle_cancel_job),
        )
        .route("/api/v1/jobs/:id/download", get(jobs::handle_download_job))
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use bytes::Bytes;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::backend_client::{
        BackendError, ExportRequest, MergeRequest, ProgressFn, SpreadsheetBackend, UploadFile,
    };
    use crate::config::Config;
    use crate::export::session::SessionStore;
    use crate::jobs::JobStore;
    use crate::models::block::{PreviewBlock, PreviewResponse};
    use crate::models::master::MasterInfo;

    const BOUNDARY: &str = "cobranza-test-boundary";

    #[derive(Default)]
    struct FakeBackend {
        fail_preview: bool,
        slow_export: bool,
        previews: Mutex<Vec<Option<String>>>,
        exports: Mutex<Vec<ExportRequest>>,
        merges: Mutex<Vec<MergeRequest>>,
    }

    #[async_trait]
    impl SpreadsheetBackend for FakeBackend {
        async fn default_info(&self) -> Result<MasterInfo, BackendError> {
            Ok(MasterInfo {
                exists: true,
                name: Some("COBRANZA-formateado.XLS".to_string()),
                debug_path: None,
            })
        }

        async fn preview(
            &self,
            _excel: &UploadFile,
            hoja_base: Option<&str>,
        ) -> Result<PreviewResponse, BackendError> {
            self.previews
                .lock()
                .unwrap()
                .push(hoja_base.map(str::to_string));
            if self.fail_preview {
                return Err(BackendError::Api {
                    status: 400,
                    message: "No existe la hoja solicitada: X".to_string(),
                });
            }
            let blocks = [("a", "RAUL ARROYO"), ("b", "UNKNOWN VENDOR"), ("c", "MANUEL CARRASCO")]
                .iter()
                .map(|(id, name)| PreviewBlock {
                    id: id.to_string(),
                    name: name.to_string(),
                    sheet: "OFICINA (VES)".to_string(),
                })
                .collect();
            Ok(PreviewResponse { blocks, count: 3 })
        }

        async fn export(
            &self,
            request: ExportRequest,
            progress: ProgressFn,
        ) -> Result<Bytes, BackendError> {
            progress(70);
            self.exports.lock().unwrap().push(request);
            if self.slow_export {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(Bytes::from_static(b"PK\x03\x04"))
        }

        async fn merge(
            &self,
            request: MergeRequest,
            progress: ProgressFn,
        ) -> Result<Bytes, BackendError> {
            progress(70);
            self.merges.lock().unwrap().push(request);
            Ok(Bytes::from_static(b"\xd0\xcf\x11\xe0"))
        }
    }

    fn test_app(backend: Arc<FakeBackend>) -> Router {
        let state = AppState {
            backend,
            sessions: SessionStore::default(),
            jobs: JobStore::default(),
            config: Config {
                backend_url: "http://backend.test".to_string(),
                backend_timeout: Duration::from_secs(5),
                max_upload_bytes: 1024 * 1024,
                retention: Duration::from_secs(3600),
                port: 0,
                rust_log: "debug".to_string(),
            },
        };
        build_router(state)
    }

    enum FormPart<'a> {
        File(&'a str, &'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart(uri: &str, parts: &[FormPart]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                FormPart::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/vnd.ms-excel\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                FormPart::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn block_ids(view: &Value) -> Vec<String> {
        view["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_str().unwrap().to_string())
            .collect()
    }

    async fn create_session(app: &Router, file_name: &str) -> Value {
        let response = app
            .clone()
            .oneshot(multipart(
                "/api/v1/export/sessions",
                &[FormPart::File("excel", file_name, b"xls-bytes")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    async fn wait_for_job(app: &Router, job_id: &str) -> Value {
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}")))
                .await
                .unwrap();
            let job = body_json(response).await;
            if job["status"] != "running" {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_master_info_includes_hint() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app
            .oneshot(empty_request("GET", "/api/v1/master/default-info"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["exists"], true);
        assert_eq!(body["hint"], "Usar COBRANZA-formateado.XLS");
    }

    #[tokio::test]
    async fn test_create_session_orders_blocks_and_infers_date() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let view = create_session(&app, "COBRANZA_14-03-25.xls").await;

        assert_eq!(block_ids(&view), vec!["c", "a", "b"]);
        assert_eq!(view["pdf_date"], "2025-03-14");
        assert_eq!(view["analysis"]["ok"], true);
        assert_eq!(view["analysis"]["message"], "Detectados 3 vendedores.");
        assert_eq!(view["blocks"][0]["position"], 1);
    }

    #[tokio::test]
    async fn test_create_session_rejects_non_xls() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app
            .oneshot(multipart(
                "/api/v1/export/sessions",
                &[FormPart::File("excel", "COBRANZA.xlsx", b"zip")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["error"]["message"],
            "Solo se permiten archivos .XLS en esta pantalla."
        );
    }

    #[tokio::test]
    async fn test_create_session_requires_file() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app
            .oneshot(multipart(
                "/api/v1/export/sessions",
                &[FormPart::Text("hoja_base", "OFICINA (VES)")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Adjunta el XLS previamente generado en /merge."
        );
    }

    #[tokio::test]
    async fn test_failed_analysis_still_opens_session() {
        let app = test_app(Arc::new(FakeBackend {
            fail_preview: true,
            ..Default::default()
        }));
        let view = create_session(&app, "COBRANZA.xls").await;
        assert_eq!(view["analysis"]["ok"], false);
        assert_eq!(view["analysis"]["message"], "No existe la hoja solicitada: X");
        assert!(block_ids(&view).is_empty());
    }

    #[tokio::test]
    async fn test_reorder_toggle_and_reset() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let view = create_session(&app, "COBRANZA_14-03-25.xls").await;
        let id = view["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/blocks/2/move"),
                json!({"direction": "up"}),
            ))
            .await
            .unwrap();
        assert_eq!(block_ids(&body_json(response).await), vec!["c", "b", "a"]);

        // top block cannot move further up
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/blocks/0/move"),
                json!({"direction": "up"}),
            ))
            .await
            .unwrap();
        assert_eq!(block_ids(&body_json(response).await), vec!["c", "b", "a"]);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/blocks/toggle"),
                json!({"id": "b"}),
            ))
            .await
            .unwrap();
        let view = body_json(response).await;
        assert_eq!(view["excluded_count"], 1);

        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/default-order"),
            ))
            .await
            .unwrap();
        let view = body_json(response).await;
        assert_eq!(block_ids(&view), vec!["c", "a", "b"]);
        assert_eq!(view["blocks"][2]["include"], false);
    }

    #[tokio::test]
    async fn test_move_unknown_index_is_not_found() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let view = create_session(&app, "COBRANZA_14-03-25.xls").await;
        let id = view["id"].as_str().unwrap();
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/blocks/9/move"),
                json!({"direction": "down"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_sends_order_and_exclusions() {
        let backend = Arc::new(FakeBackend::default());
        let app = test_app(backend.clone());
        let view = create_session(&app, "COBRANZA_14-03-25.xls").await;
        let id = view["id"].as_str().unwrap().to_string();

        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/blocks/toggle"),
                json!({"id": "b"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/export"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let job = wait_for_job(&app, &job_id).await;
        assert_eq!(job["status"], "done");
        assert_eq!(job["pct"], 100);

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"PDFS_COBRANZA_14-03-25.zip\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");

        let exports = backend.exports.lock().unwrap();
        let selection = exports[0].selection.clone().unwrap();
        assert_eq!(selection.orden, vec!["c", "a", "b"]);
        assert_eq!(selection.excluir, vec!["b"]);
        assert_eq!(
            exports[0].pdf_date,
            chrono::NaiveDate::from_ymd_opt(2025, 3, 14)
        );
    }

    #[tokio::test]
    async fn test_export_requires_pdf_date() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let view = create_session(&app, "COBRANZA.xls").await;
        let id = view["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/export"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/export"),
                json!({"pdf_date": "2025-03-14"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    async fn start_export(app: &Router) -> String {
        let view = create_session(app, "COBRANZA_14-03-25.xls").await;
        let id = view["id"].as_str().unwrap().to_string();
        let response = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/api/v1/export/sessions/{id}/export"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_download_running_job_conflicts() {
        let app = test_app(Arc::new(FakeBackend {
            slow_export: true,
            ..Default::default()
        }));
        let job_id = start_export(&app).await;

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}")))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "running");
    }

    #[tokio::test]
    async fn test_cancel_job_over_http() {
        let app = test_app(Arc::new(FakeBackend {
            slow_export: true,
            ..Default::default()
        }));
        let job_id = start_export(&app).await;

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/api/v1/jobs/{job_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = body_json(response).await;
        assert_eq!(job["status"], "cancelled");
        assert_eq!(job["msg"], "Proceso cancelado por el usuario.");
        assert_eq!(job["pct"], 0);

        let job = wait_for_job(&app, &job_id).await;
        assert_eq!(job["status"], "cancelled");

        let response = app
            .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_analyze_updates_and_clears_sheet_filter() {
        let backend = Arc::new(FakeBackend::default());
        let app = test_app(backend.clone());
        let view = create_session(&app, "COBRANZA_14-03-25.xls").await;
        let id = view["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/export/sessions/{id}/analyze");

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"hoja_base": " OFICINA (VES) "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["hoja_base"], "OFICINA (VES)");
        assert_eq!(block_ids(&view), vec!["c", "a", "b"]);

        // no body keeps the stored filter
        let response = app
            .clone()
            .oneshot(empty_request("POST", &uri))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["hoja_base"], "OFICINA (VES)");

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"hoja_base": ""})))
            .await
            .unwrap();
        assert!(body_json(response).await["hoja_base"].is_null());

        let response = app
            .oneshot(empty_request("GET", &format!("/api/v1/export/sessions/{id}")))
            .await
            .unwrap();
        assert!(body_json(response).await["hoja_base"].is_null());

        let previews = backend.previews.lock().unwrap();
        assert_eq!(
            *previews,
            vec![
                None,
                Some("OFICINA (VES)".to_string()),
                Some("OFICINA (VES)".to_string()),
                None,
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_job_downloads_under_source_name() {
        let backend = Arc::new(FakeBackend::default());
        let app = test_app(backend.clone());

        let response = app
            .clone()
            .oneshot(multipart(
                "/api/v1/merge",
                &[
                    FormPart::File("source", "tecnicos 14-03-25.xls", b"src"),
                    FormPart::Text("hdr_date", "2025-03-14"),
                    FormPart::Text("use_default_master", "1"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let job = wait_for_job(&app, &job_id).await;
        assert_eq!(job["status"], "done");
        assert_eq!(job["kind"], "merge");

        let response = app
            .oneshot(empty_request("GET", &format!("/api/v1/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"tecnicos 14-03-25.xls\""
        );
        assert!(backend.merges.lock().unwrap()[0].use_default_master);
    }

    #[tokio::test]
    async fn test_merge_without_master_is_rejected() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app
            .oneshot(multipart(
                "/api/v1/merge",
                &[
                    FormPart::File("source", "tecnicos.xls", b"src"),
                    FormPart::Text("use_default_master", "0"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_job_and_session() {
        let app = test_app(Arc::new(FakeBackend::default()));
        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/jobs/deadbeef0000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(empty_request(
                "DELETE",
                "/api/v1/export/sessions/00000000-0000-0000-0000-000000000000",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
