use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use common::{error::AppError, storage::types::shot_plan::PromptVariant};

use crate::{
    pipeline::ShotPlanRequest,
    utils::llm_instructions::{
        get_shot_plan_schema, HARD_FIDELITY_SYSTEM_ADDENDUM, SHOT_PLAN_SYSTEM_MESSAGE,
    },
};

/// Shot planning through a chat model with a strict JSON schema response.
pub struct OpenAiShotPlanner {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiShotPlanner {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub async fn plan(&self, request: &ShotPlanRequest) -> Result<String, AppError> {
        let llm_request = self.build_request(request)?;
        let response = self.client.chat().create(llm_request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))
    }

    fn build_request(
        &self,
        request: &ShotPlanRequest,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let system_message = match request.variant {
            PromptVariant::Standard => SHOT_PLAN_SYSTEM_MESSAGE.to_string(),
            PromptVariant::HardFidelity => {
                format!("{SHOT_PLAN_SYSTEM_MESSAGE}\n\n{HARD_FIDELITY_SYSTEM_ADDENDUM}")
            }
        };

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Shot plan for a short product video".into()),
                name: "shot_plan".into(),
                schema: Some(get_shot_plan_schema()),
                strict: Some(true),
            },
        };

        let llm_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_message).into(),
                ChatCompletionRequestUserMessage::from(user_message(request)).into(),
            ])
            .response_format(response_format)
            .build()?;

        Ok(llm_request)
    }
}

fn user_message(request: &ShotPlanRequest) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join(", ")
        }
    };

    format!(
        "Brief:\n{}\nProduct category:\n{}\nDuration in seconds:\n{}\nAllowed context settings:\n{}\nForbidden actions:\n{}",
        request.brief,
        request.niche,
        request.duration_seconds,
        list(&request.allowed_context_tokens),
        list(&request.forbidden_actions),
    )
}
