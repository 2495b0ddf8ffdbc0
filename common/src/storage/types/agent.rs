use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Agent, "agent", {
    name: String,
    /// Model identifier passed straight to the generation API.
    model: String,
    tone: Option<String>,
    system_prompt: String
});

impl Agent {
    pub fn new(name: &str, model: &str, tone: Option<&str>, system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            model: model.to_string(),
            tone: tone.map(str::to_string),
            system_prompt: system_prompt.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Option<Agent>, AppError> {
        Ok(db.get_item::<Agent>(id).await?)
    }
}
