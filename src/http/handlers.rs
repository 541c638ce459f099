//! Kernel management handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::services::kernels::{IdleCuller, KernelHandle, LaunchParams};
use crate::services::kernelspecs::{KernelSpec, KernelSpecCatalog};
use crate::services::sessions::KernelSessionManager;

/// State for the kernel routes.
#[derive(Clone)]
pub struct KernelApiState {
    pub specs: Arc<dyn KernelSpecCatalog>,
    pub sessions: Arc<KernelSessionManager>,
    pub culler: Option<Arc<dyn IdleCuller>>,
    pub default_kernel_name: String,
}

pub fn kernel_routes(state: KernelApiState) -> Router {
    Router::new()
        .route("/api/kernelspecs", get(list_kernelspecs))
        .route("/api/kernels", get(list_kernels).post(start_kernel))
        .route("/api/kernels/{kernel_id}", get(get_kernel).delete(delete_kernel))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelModel {
    pub id: String,
    pub name: String,
    pub owner: String,
}

impl From<KernelHandle> for KernelModel {
    fn from(handle: KernelHandle) -> Self {
        Self {
            id: handle.kernel_id,
            name: handle.kernel_name,
            owner: handle.username,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartKernelRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct KernelSpecsResponse {
    default: String,
    kernelspecs: BTreeMap<String, KernelSpec>,
}

async fn list_kernelspecs(State(state): State<KernelApiState>) -> impl IntoResponse {
    let kernelspecs = state.specs.all().into_iter().map(|s| (s.name.clone(), s)).collect();
    Json(KernelSpecsResponse {
        default: state.default_kernel_name,
        kernelspecs,
    })
}

async fn list_kernels(State(state): State<KernelApiState>) -> impl IntoResponse {
    let kernels: Vec<KernelModel> = state
        .sessions
        .kernel_manager()
        .list()
        .into_iter()
        .map(KernelModel::from)
        .collect();
    Json(kernels)
}

async fn start_kernel(
    State(state): State<KernelApiState>,
    Json(request): Json<StartKernelRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let name = request.name.unwrap_or(state.default_kernel_name);
    let spec = state.specs.get(&name)?;
    let record = state
        .sessions
        .start_kernel(&spec, LaunchParams { env: request.env })
        .await?;
    Ok((StatusCode::CREATED, Json(KernelModel::from(record.kernel))))
}

async fn get_kernel(
    State(state): State<KernelApiState>,
    Path(kernel_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let handle = state
        .sessions
        .kernel_manager()
        .get(&kernel_id)
        .ok_or_else(|| GatewayError::NotFound(format!("no such kernel: {}", kernel_id)))?;
    if let Some(culler) = &state.culler {
        culler.touch(&kernel_id);
    }
    Ok(Json(KernelModel::from(handle)))
}

async fn delete_kernel(
    State(state): State<KernelApiState>,
    Path(kernel_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    state.sessions.shutdown_kernel(&kernel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
