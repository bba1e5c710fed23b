//! # API REST
//!
//! REST surface for the creel patient-record system.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - success/error envelope wrapping around core outcomes
//! - mirroring error envelopes to the operator alerter
//!
//! The core returns plain data or typed errors; everything envelope-shaped
//! lives here.

#![warn(rust_2018_idioms)]

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use creel_core::{Alerter, PatientService};
use creel_types::{NonEmptyText, PatientRecord, TestRecord};
use serde::Deserialize;
use serde_json::{json, Value};

pub mod envelope;

use envelope::{envelope_for_error, ApiEnvelope};

/// Application state shared across REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub patients: PatientService,
    pub alerter: Arc<dyn Alerter>,
}

impl AppState {
    /// Wrap a core failure in the error envelope and mirror its message to
    /// the operator alerter. Alert delivery is fire-and-forget: a failed
    /// notification never fails the primary operation.
    fn fail(&self, err: creel_core::CoreError) -> Json<ApiEnvelope> {
        let env = envelope_for_error(&err);
        let alerter = self.alerter.clone();
        let message = env.message.clone();
        tokio::spawn(async move {
            if !alerter.alert(&message).await {
                tracing::warn!("operator alert delivery failed");
            }
        });
        Json(ApiEnvelope::Error(env))
    }
}

/// Build the REST router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/validate", post(validate_master_key))
        .route("/patients", post(add_patient).get(list_patients))
        .route("/patients/query", post(query_patients))
        .route(
            "/patients/:patient_id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/patients/:patient_id/test_result", put(insert_test_result))
        .route(
            "/patients/:patient_id/test_result/:test_id",
            put(update_test_result),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct MasterKeyPayload {
    pub key_data: NonEmptyText,
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    #[serde(default)]
    master_key_string: String,
}

#[derive(Debug, Deserialize)]
struct AddPatientBody {
    patient: PatientRecord,
    master_key_string: MasterKeyPayload,
}

#[derive(Debug, Deserialize)]
struct UpdatePatientBody {
    patient: PatientRecord,
    master_key_string: MasterKeyPayload,
}

#[derive(Debug, Deserialize)]
struct InsertResultBody {
    test_result: TestRecord,
    master_key_string: MasterKeyPayload,
}

#[derive(Debug, Deserialize)]
struct UpdateResultBody {
    test_result_updates: Value,
    master_key_string: MasterKeyPayload,
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    master_key_string: MasterKeyPayload,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: Value,
    decrypt: bool,
    master_key_string: MasterKeyPayload,
}

async fn validate_master_key(
    State(state): State<AppState>,
    Json(body): Json<MasterKeyPayload>,
) -> Json<bool> {
    Json(state.patients.validate_master_key(body.key_data.as_str()))
}

async fn add_patient(
    State(state): State<AppState>,
    Json(body): Json<AddPatientBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .add_patient(body.patient, body.master_key_string.key_data.as_str())
        .await
    {
        Ok(outcome) => {
            let first_name = outcome.patient.first_name.clone();
            let pid = outcome.patient.patient_id.clone().unwrap_or_default();
            let data = json!({
                "patient_data": outcome.patient,
                "pid_altered": outcome.pid_altered,
                "pid": pid,
            });
            Json(ApiEnvelope::ok(
                data,
                format!("Patient {first_name} added successfully!"),
            ))
        }
        Err(e) => state.fail(e),
    }
}

async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Json<ApiEnvelope> {
    match state.patients.list_patients(&query.master_key_string).await {
        Ok(patients) => Json(ApiEnvelope::ok(
            json!(patients),
            "Patient data retrieved successfully",
        )),
        Err(e) => state.fail(e),
    }
}

async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .get_patient(&patient_id, &query.master_key_string)
        .await
    {
        Ok(patient) => Json(ApiEnvelope::ok(
            json!(patient),
            "Patient data retrieved successfully",
        )),
        Err(e) => state.fail(e),
    }
}

async fn update_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(body): Json<UpdatePatientBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .update_patient(
            &patient_id,
            body.patient,
            body.master_key_string.key_data.as_str(),
        )
        .await
    {
        Ok(updated) => Json(ApiEnvelope::ok(
            json!(updated),
            "Patient updated successfully",
        )),
        Err(e) => state.fail(e),
    }
}

async fn insert_test_result(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(body): Json<InsertResultBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .insert_test_result(
            &patient_id,
            body.test_result,
            body.master_key_string.key_data.as_str(),
        )
        .await
    {
        Ok(merged) => Json(ApiEnvelope::ok(
            json!(merged),
            format!("Patient with PID {patient_id} updated successfully"),
        )),
        Err(e) => state.fail(e),
    }
}

async fn update_test_result(
    State(state): State<AppState>,
    Path((patient_id, test_id)): Path<(String, String)>,
    Json(body): Json<UpdateResultBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .update_test_result(
            &patient_id,
            &test_id,
            &body.test_result_updates,
            body.master_key_string.key_data.as_str(),
        )
        .await
    {
        Ok(merged) => Json(ApiEnvelope::ok(
            json!(merged),
            format!("Test {test_id} updated successfully"),
        )),
        Err(e) => state.fail(e),
    }
}

async fn delete_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(body): Json<DeleteBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .delete_patient(&patient_id, body.master_key_string.key_data.as_str())
        .await
    {
        Ok(()) => Json(ApiEnvelope::ok(
            json!(format!("Patient with PID {patient_id} removed")),
            "Patient deleted successfully",
        )),
        Err(e) => state.fail(e),
    }
}

async fn query_patients(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Json<ApiEnvelope> {
    match state
        .patients
        .query_patients(
            &body.query,
            body.decrypt,
            body.master_key_string.key_data.as_str(),
        )
        .await
    {
        Ok(hits) => Json(ApiEnvelope::ok(json!(hits), "Query performed successfully")),
        Err(e) => state.fail(e),
    }
}
