//! HTTP surface, exercised in-process over the in-memory store.
//!
//! Run with: cargo test --test api_test

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use common::{EXAMPLE_ANGLES, ts};
use pivot_tracker::routes::build_router;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }

    fn cache(&self) -> Option<&str> {
        self.headers.get("X-Cache").and_then(|v| v.to_str().ok())
    }
}

async fn call(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

async fn get(app: &Router, uri: &str) -> Reply {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Value) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(app, request).await
}

fn app() -> Router {
    let (state, _) = common::app_state();
    build_router(state)
}

async fn register(app: &Router) -> Uuid {
    let id = Uuid::new_v4();
    let reply = send(
        app,
        "PUT",
        &format!("/api/devices/{id}"),
        json!({
            "nombre": "Pivote Norte",
            "tipo": "pivote",
            "radio_cobertura_m": 400.0,
            "caudal_l_min": 600.0,
            "tiempo_vuelta_completa_min": 120.0
        }),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    id
}

fn quadrant_body() -> Value {
    json!({
        "pivot": { "latitud": -33.45, "longitud": -70.66 },
        "sectores": [
            { "numero": 0, "angulo_inicio": 0.0, "angulo_fin": 90.0 },
            { "numero": 1, "angulo_inicio": 90.0, "angulo_fin": 180.0 },
            { "numero": 2, "angulo_inicio": 180.0, "angulo_fin": 270.0 },
            { "numero": 3, "angulo_inicio": 270.0, "angulo_fin": 360.0 }
        ]
    })
}

async fn configure(app: &Router, id: Uuid) {
    let lot = Uuid::new_v4();
    let reply = send(
        app,
        "PUT",
        &format!("/api/devices/{id}/lots/{lot}/sectors"),
        quadrant_body(),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
}

fn telemetry(id: Uuid, angles: &[f64], offset: usize) -> Value {
    let samples: Vec<Value> = angles
        .iter()
        .enumerate()
        .map(|(i, angle)| {
            json!({
                "device_id": id,
                "timestamp": ts((offset + i) as i64 * 60).to_rfc3339(),
                "angle_degrees": angle,
                "pressure_psi": 30.0
            })
        })
        .collect();
    Value::Array(samples)
}

#[tokio::test]
async fn health_reports_loaded_devices() {
    let app = app();
    let reply = get(&app, "/healthz").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({ "status": "ok", "devices": 0 }));

    register(&app).await;
    assert_eq!(get(&app, "/healthz").await.json()["devices"], 1);
}

#[tokio::test]
async fn device_registration_validates_the_profile() {
    let app = app();
    let id = register(&app).await;

    let listed = get(&app, "/api/devices").await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], json!(id));
    assert_eq!(listed[0]["live"]["estado"], "detenido");

    let bad_type = send(
        &app,
        "PUT",
        &format!("/api/devices/{}", Uuid::new_v4()),
        json!({ "nombre": "X", "tipo": "helicoptero", "radio_cobertura_m": 100.0, "caudal_l_min": 1.0 }),
    )
    .await;
    assert_eq!(bad_type.status, StatusCode::BAD_REQUEST);

    let no_flow = send(
        &app,
        "PUT",
        &format!("/api/devices/{}", Uuid::new_v4()),
        json!({ "nombre": "X", "tipo": "pivote", "radio_cobertura_m": 100.0 }),
    )
    .await;
    assert_eq!(no_flow.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlapping_sectors_are_rejected_with_details() {
    let app = app();
    let id = register(&app).await;
    let lot = Uuid::new_v4();

    let reply = send(
        &app,
        "PUT",
        &format!("/api/devices/{id}/lots/{lot}/sectors"),
        json!({
            "pivot": { "latitud": -33.45, "longitud": -70.66 },
            "sectores": [
                { "numero": 1, "angulo_inicio": 350.0, "angulo_fin": 20.0 },
                { "numero": 2, "angulo_inicio": 10.0, "angulo_fin": 90.0 },
                { "numero": 3, "angulo_inicio": 90.0, "angulo_fin": 90.0 }
            ]
        }),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = reply.json();
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(body["conflicts"][0]["numero_a"], 1);
    assert_eq!(body["conflicts"][0]["numero_b"], 2);
    assert_eq!(body["invalid"][0]["reason"], "empty_range");

    let sectors = get(&app, &format!("/api/devices/{id}/sectors")).await.json();
    assert!(sectors["sectores"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn sectors_inherit_the_pivot_radius() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;

    let body = get(&app, &format!("/api/devices/{id}/sectors")).await.json();
    let sectores = body["sectores"].as_array().unwrap();
    assert_eq!(sectores.len(), 4);
    assert_eq!(sectores[0]["radio_externo_m"], 400.0);
    assert_eq!(sectores[3]["angulo_fin"], 0.0);
    assert_eq!(body["pivot"]["radio_cobertura_m"], 400.0);

    let first = sectores[0]["id"].as_str().unwrap().to_string();
    let toggled = send(
        &app,
        "PATCH",
        &format!("/api/devices/{id}/sectors/{first}"),
        json!({ "activo": false }),
    )
    .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.json()["activo"], false);

    let missing = send(
        &app,
        "PATCH",
        &format!("/api/devices/{id}/sectors/{}", Uuid::new_v4()),
        json!({ "activo": true }),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn telemetry_batch_reports_each_sample() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;

    let mut batch = telemetry(id, &EXAMPLE_ANGLES, 0);
    let items = batch.as_array_mut().unwrap();
    items.push(json!({ "device_id": id, "timestamp": ts(900).to_rfc3339(), "angle_degrees": "oeste" }));
    items.push(json!({ "device_id": Uuid::new_v4(), "timestamp": ts(900).to_rfc3339(), "angle_degrees": 1.0 }));
    items.push(json!({ "device_id": id, "timestamp": ts(300).to_rfc3339(), "angle_degrees": 9.0 }));

    let reply = send(&app, "POST", "/api/telemetry", batch).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["applied"], 6);
    assert_eq!(body["rejected"], 2);
    assert_eq!(body["dropped"], 1);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[1]["vuelta_abierta"], 1);
    assert_eq!(results[5]["vueltas_cerradas"], json!([1]));
    assert_eq!(results[5]["vuelta_abierta"], 2);
    assert_eq!(results[6]["status"], "rejected");
    assert_eq!(results[7]["status"], "rejected");
    assert_eq!(results[8]["reason"], "duplicate");

    let live = get(&app, &format!("/api/devices/{id}/live")).await.json();
    assert_eq!(live["sector_numero"], 0);
    assert_eq!(live["angulo_actual"], 9.0);
    assert_eq!(live["regando"], true);
    assert_eq!(live["estado"], "regando");

    let open = get(&app, &format!("/api/devices/{id}/vuelta")).await;
    assert_eq!(open.status, StatusCode::OK);
    assert_eq!(open.json()["vuelta"]["numero_vuelta"], 2);
}

#[tokio::test]
async fn single_object_body_is_accepted() {
    let app = app();
    let id = register(&app).await;
    let reply = send(
        &app,
        "POST",
        "/api/telemetry",
        json!({ "device_id": id, "timestamp": ts(0).to_rfc3339(), "angle_degrees": "12.5" }),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["applied"], 1);

    let open = get(&app, &format!("/api/devices/{id}/vuelta")).await;
    assert_eq!(open.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_is_cached_until_a_vuelta_closes() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;
    let uri = format!("/api/devices/{id}/vueltas");

    let empty = get(&app, &uri).await;
    assert_eq!(empty.cache(), Some("MISS"));
    assert!(empty.json()["vueltas"].as_array().unwrap().is_empty());
    assert_eq!(get(&app, &uri).await.cache(), Some("HIT"));

    send(&app, "POST", "/api/telemetry", telemetry(id, &EXAMPLE_ANGLES, 0)).await;

    let fresh = get(&app, &uri).await;
    assert_eq!(fresh.cache(), Some("MISS"));
    let vueltas = fresh.json()["vueltas"].as_array().unwrap().clone();
    assert_eq!(vueltas.len(), 1);
    assert_eq!(vueltas[0]["numero_vuelta"], 1);
    assert_eq!(vueltas[0]["completada"], true);
    assert_eq!(vueltas[0]["cierre"], "completada");
    assert_eq!(get(&app, &uri).await.cache(), Some("HIT"));
}

#[tokio::test]
async fn history_exports_csv() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;
    send(&app, "POST", "/api/telemetry", telemetry(id, &EXAMPLE_ANGLES, 0)).await;

    let csv = get(&app, &format!("/api/devices/{id}/vueltas?format=csv")).await;
    assert_eq!(csv.status, StatusCode::OK);
    assert!(
        csv.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let text = csv.text();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("id,device_id,numero_vuelta,"));
    assert_eq!(lines.count(), 1);

    let by_header = call(
        &app,
        Request::get(format!("/api/devices/{id}/vueltas"))
            .header(header::ACCEPT, "text/csv")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(by_header.text().starts_with("id,"));

    let unsupported = get(&app, &format!("/api/devices/{id}/vueltas?format=xml")).await;
    assert_eq!(unsupported.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_can_be_verified_against_history() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;
    send(&app, "POST", "/api/telemetry", telemetry(id, &EXAMPLE_ANGLES, 0)).await;

    let stats = get(&app, &format!("/api/devices/{id}/stats?verify=true")).await.json();
    assert_eq!(stats["total_vueltas"], 1);
    assert_eq!(stats["vueltas_completadas"], 1);
    assert_eq!(stats["verificado"], true);
    assert!((stats["agua_total_m3"].as_f64().unwrap() - 3.0).abs() < 1e-9);

    let plain = get(&app, &format!("/api/devices/{id}/stats")).await.json();
    assert_eq!(plain["verificado"], Value::Null);
}

#[tokio::test]
async fn stop_signal_returns_live_state() {
    let app = app();
    let id = register(&app).await;
    configure(&app, id).await;
    send(&app, "POST", "/api/telemetry", telemetry(id, &[10.0, 50.0], 0)).await;

    let at = ts(90).to_rfc3339().replace('+', "%2B");
    let reply = call(
        &app,
        Request::post(format!("/api/devices/{id}/stop?at={at}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["estado"], "detenido");
    assert_eq!(reply.json()["regando"], false);

    // The vuelta stays open until it times out
    let open = get(&app, &format!("/api/devices/{id}/vuelta")).await;
    assert_eq!(open.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_devices_are_not_found() {
    let app = app();
    let id = Uuid::new_v4();
    for path in ["live", "vuelta", "vueltas", "stats", "sectors"] {
        let reply = get(&app, &format!("/api/devices/{id}/{path}")).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{path}");
    }
}
