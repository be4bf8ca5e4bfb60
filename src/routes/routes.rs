//! Routes for the storage model.
//!
//! ## Structure
//! - **Service endpoints** (mounted at root)
//!   - `GET /healthz`, `GET /readyz`
//!   - `GET /methods`: the remote method table
//!
//! - **Model endpoints** (mounted under the model path, e.g. `/attachments`)
//!   - `GET    /`: list files, optionally filtered by `where.id`
//!   - `GET    /{id}`: files of one record
//!   - `GET    /{id}/exists`
//!   - `POST /`, `GET /count`, `PUT|PATCH|DELETE /{id}`: refused with 403
//!
//! - **Instance endpoints** (built from `REMOTE_METHODS`)
//!   - `GET    /{id}/files/{file}`: file metadata
//!   - `DELETE /{id}/files/{file}`: remove file
//!   - `POST   /{id}/files/upload`: multipart upload
//!   - `GET    /{id}/download/{file}`: stream file body

use crate::{
    handlers::{
        AppState, file_handlers,
        health_handlers::{healthz, readyz},
        model_handlers::{
            count, create, destroy, exists, find_by_id, list_all, list_methods, replace_by_id,
            update_attributes,
        },
    },
    routes::remote_methods::{REMOTE_METHODS, RemoteMethod},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{MethodRouter, get, on},
};
use tracing::warn;

/// Build the router with the model mounted at `model_path`.
pub fn routes(model_path: &str) -> Router<AppState> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/methods", get(list_methods));

    let mount = normalize_mount(model_path);
    if mount.is_empty() {
        router.merge(model_routes())
    } else {
        router.nest(&mount, model_routes())
    }
}

fn model_routes() -> Router<AppState> {
    let mut router = Router::new()
        .route("/", get(list_all).post(create))
        .route("/count", get(count))
        .route(
            "/{id}",
            get(find_by_id)
                .put(replace_by_id)
                .patch(update_attributes)
                .delete(destroy),
        )
        .route("/{id}/exists", get(exists));

    for method in REMOTE_METHODS {
        match instance_handler(method) {
            Some(handler) => router = router.route(&method.route_path(), handler),
            None => warn!(method = method.name, "remote method has no handler, skipped"),
        }
    }

    // Upload size is enforced per part while streaming.
    router.layer(DefaultBodyLimit::disable())
}

fn instance_handler(method: &RemoteMethod) -> Option<MethodRouter<AppState>> {
    let filter = method.http.verb.method_filter();
    let handler = match method.name {
        "file" => on(filter, file_handlers::get_file),
        "removeFile" => on(filter, file_handlers::remove_file),
        "upload" => on(filter, file_handlers::upload),
        "download" => on(filter, file_handlers::download),
        _ => return None,
    };
    Some(handler)
}

/// `attachments/` -> `/attachments`; `/` and `` mount at root.
fn normalize_mount(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connector::{ModelDefinition, options::StorageOptions, storage_connector::StorageConnector},
        services::client_factory::{ClientOptions, ProviderRegistry},
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-STORAGE-BOUNDARY";

    fn app(root: &TempDir, configure: impl FnOnce(&mut StorageOptions)) -> Router {
        let client = ClientOptions {
            provider: Some("filesystem".into()),
            root: Some(root.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let mut options = StorageOptions::new(client, "attachments");
        configure(&mut options);
        let connector = StorageConnector::new(options, &ProviderRegistry::new()).unwrap();
        let state = AppState::new(connector, ModelDefinition::new("Attachment"));
        routes("/attachments").with_state(state)
    }

    fn multipart_body(parts: &[(&str, Option<(&str, &str)>, &str)]) -> String {
        let mut body = String::new();
        for (field, file, content) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match file {
                Some((filename, content_type)) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        field, filename
                    ));
                    body.push_str(&format!("Content-Type: {}\r\n\r\n", content_type));
                }
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    field
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn upload_request(id: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/attachments/{}/files/upload", id))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn normalizes_mount_points() {
        assert_eq!(normalize_mount("attachments/"), "/attachments");
        assert_eq!(normalize_mount("/a/b"), "/a/b");
        assert_eq!(normalize_mount("/"), "");
        assert_eq!(normalize_mount(""), "");
    }

    #[tokio::test]
    async fn mutation_verbs_are_forbidden() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |_| {});

        for (method, uri) in [
            ("POST", "/attachments"),
            ("PUT", "/attachments/1"),
            ("PATCH", "/attachments/1"),
            ("DELETE", "/attachments/1"),
            ("GET", "/attachments/count"),
        ] {
            let response = app.clone().oneshot(request(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
            let body = json_body(response).await;
            assert_eq!(body["error"], "Operation not permitted");
        }
    }

    #[tokio::test]
    async fn upload_then_list_fetch_download_and_remove() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |_| {});

        let body = multipart_body(&[
            ("caption", None, "holiday"),
            ("photo", Some(("notes.txt", "text/plain")), "hello storage"),
        ]);
        let response = app.clone().oneshot(upload_request("42", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = json_body(response).await;
        assert_eq!(uploaded["fields"]["caption"], json!(["holiday"]));
        let photo = &uploaded["files"]["photo"][0];
        assert_eq!(photo["name"], "42/notes.txt");
        assert_eq!(photo["container"], "attachments");
        assert_eq!(photo["type"], "text/plain");
        assert_eq!(photo["size"], 13);

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record = json_body(response).await;
        assert_eq!(record["id"], json!(42));
        assert_eq!(record["folder"], "42/");
        assert_eq!(
            record["files"],
            json!([{"id": 42, "folder": "42/", "name": "notes.txt", "fullName": "42/notes.txt"}])
        );

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42/exists"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"exists": true}));

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42/files/notes.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let meta = json_body(response).await;
        assert_eq!(meta["name"], "42/notes.txt");
        assert_eq!(meta["size"], 13);
        assert!(meta.get("raw").is_none());

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42/files/notes.txt?raw=true"))
            .await
            .unwrap();
        let meta = json_body(response).await;
        assert_eq!(meta["size"], 13);
        assert_eq!(meta["raw"]["provider"], "filesystem");
        assert_eq!(meta["raw"]["mode"], "file");
        assert_eq!(meta["raw"]["path"], "attachments/42/notes.txt");

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42/download/notes.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_LENGTH], "13");
        // The filesystem provider keeps neither a content type nor an etag.
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert!(headers.get(header::ETAG).is_none());
        assert!(headers.contains_key(header::LAST_MODIFIED));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello storage");

        let response = app
            .clone()
            .oneshot(request("DELETE", "/attachments/42/files/notes.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/42/files/notes.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("GET", "/attachments/42/exists"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"exists": false}));
    }

    #[tokio::test]
    async fn list_filters_by_where_id() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |_| {});

        for (id, name) in [("1", "a.txt"), ("2", "b.txt")] {
            let body = multipart_body(&[("file", Some((name, "text/plain")), "data")]);
            let response = app.clone().oneshot(upload_request(id, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments"))
            .await
            .unwrap();
        let all = json_body(response).await;
        let names: Vec<&str> = all[0]["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["fullName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["1/a.txt", "2/b.txt"]);

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                "/attachments?filter=%7B%22where%22%3A%7B%22id%22%3A2%7D%7D",
            ))
            .await
            .unwrap();
        let scoped = json_body(response).await;
        assert_eq!(scoped[0]["id"], json!(2));
        assert_eq!(scoped[0]["files"][0]["name"], "b.txt");

        let response = app
            .oneshot(request("GET", "/attachments?filter=%7Bnope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_disallowed_content_type() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |options| {
            options.allowed_content_types = Some(vec!["image/png".into()]);
        });

        let body = multipart_body(&[("file", Some(("page.html", "text/html")), "<p>")]);
        let response = app.clone().oneshot(upload_request("5", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request("GET", "/attachments/5/exists"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"exists": false}));
    }

    #[tokio::test]
    async fn oversized_file_is_refused() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |options| options.max_file_size = Some(4));

        let body = multipart_body(&[(
            "file",
            Some(("big.bin", "application/octet-stream")),
            "0123456789",
        )]);
        let response = app.oneshot(upload_request("9", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_text_fields_are_refused() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |options| options.max_fields_size = Some(8));

        let body = multipart_body(&[
            ("title", None, "short"),
            ("caption", None, "well past the limit"),
            ("file", Some(("a.txt", "text/plain")), "data"),
        ]);
        let response = app.clone().oneshot(upload_request("3", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(
            body["error"],
            "maxFieldsSize exceeded, received more than 8 bytes of field data"
        );

        let response = app
            .oneshot(request("GET", "/attachments/3/exists"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"exists": false}));
    }

    #[tokio::test]
    async fn literal_segments_shadow_parameters() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |_| {});

        let response = app
            .clone()
            .oneshot(request("GET", "/attachments/1/files/upload"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = app
            .oneshot(request("GET", "/attachments/count"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn publishes_method_table_and_health() {
        let root = TempDir::new().unwrap();
        let app = app(&root, |_| {});

        let response = app.clone().oneshot(request("GET", "/methods")).await.unwrap();
        let methods = json_body(response).await;
        let names: Vec<&str> = methods
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["file", "removeFile", "upload", "download"]);

        let response = app.clone().oneshot(request("GET", "/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request("GET", "/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ready = json_body(response).await;
        assert_eq!(ready["provider"], "filesystem");
        assert_eq!(ready["container"], "attachments");
    }
}
