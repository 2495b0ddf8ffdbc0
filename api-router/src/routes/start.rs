use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use common::storage::types::{
    generation_job::{ItemContext, ItemSubmission},
    user::User,
};
use generation_pipeline::StartJobRequest;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StartJobParams {
    pub items: Vec<ItemParams>,
    pub fields: Vec<String>,
    pub agent_id: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemParams {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub edit_ref: Option<String>,
}

pub async fn start_job(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(input): Json<StartJobParams>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        user_id = %user.id,
        item_count = input.items.len(),
        field_count = input.fields.len(),
        agent_id = %input.agent_id,
        "Received bulk generation request"
    );

    let request = StartJobRequest {
        owner_id: user.id.clone(),
        agent_id: input.agent_id,
        fields: input.fields,
        keywords: input.keywords,
        items: input
            .items
            .into_iter()
            .map(|item| ItemSubmission {
                item_id: item.id,
                name: item.name,
                edit_ref: item.edit_ref,
                context: ItemContext {
                    description: item.description,
                    categories: item.categories,
                },
            })
            .collect(),
    };

    let job_id = state.orchestrator.start(request).await?;

    Ok((StatusCode::CREATED, Json(json!({ "job_id": job_id }))))
}
