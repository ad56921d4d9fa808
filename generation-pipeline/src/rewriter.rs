use std::time::Duration;

use common::{
    error::AppError,
    storage::types::shot_plan::{PlanSource, PromptVariant, ShotPlan},
};
use tracing::{instrument, warn};

use crate::pipeline::{bounded, PipelineServices, ShotPlanRequest};

pub const HARD_FIDELITY_CLAUSE: &str = "Maintain exact product appearance and label fidelity: \
the product's shape, colours, proportions and printed label text must match the reference image in every frame.";

const FALLBACK_OPENING: &str = "Product revealed in a clean studio setting";
const FALLBACK_CLOSING: &str = "Closing hero shot of the product centred in frame";
const FALLBACK_CAMERA: &str = "slow push-in";
const FALLBACK_LIGHTING: &str = "soft key light with gentle rim light";

#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub plan: ShotPlan,
    pub source: PlanSource,
    pub prompt: String,
}

/// Expands a brief into a shot plan. Provider failures, timeouts and invalid output all
/// resolve to the brief-derived plan; this never returns an error.
#[instrument(level = "trace", skip_all, fields(niche = %request.niche, variant = ?request.variant))]
pub async fn rewrite(
    request: &ShotPlanRequest,
    services: &dyn PipelineServices,
    timeout: Duration,
) -> RewriteOutcome {
    let attempt = async {
        let raw = bounded("language model", timeout, services.plan_shots(request)).await?;
        parse_plan(&raw, request.duration_seconds, &request.forbidden_actions)
    };

    let (plan, source) = match attempt.await {
        Ok(plan) => (plan, PlanSource::LanguageModel),
        Err(err) => {
            warn!(error = %err, "shot plan unavailable; using brief-derived plan");
            (
                fallback_plan(&request.brief, request.duration_seconds),
                PlanSource::BriefFallback,
            )
        }
    };

    let prompt = render_prompt(&plan, request.variant);
    RewriteOutcome {
        plan,
        source,
        prompt,
    }
}

/// Parses structured output into a plan, pins the duration to the requested one and
/// rejects plans that describe a forbidden action.
pub fn parse_plan(
    raw: &str,
    requested_duration: u32,
    forbidden_actions: &[String],
) -> Result<ShotPlan, AppError> {
    let mut plan: ShotPlan = serde_json::from_str(raw.trim()).map_err(|e| {
        AppError::LLMParsing(format!("Failed to parse LLM response into shot plan: {e}"))
    })?;

    if plan.duration_seconds != requested_duration {
        tracing::debug!(
            proposed = plan.duration_seconds,
            requested = requested_duration,
            "overriding shot plan duration"
        );
        plan.duration_seconds = requested_duration;
    }
    plan.style_tokens.retain(|token| !token.trim().is_empty());
    plan.validate()?;

    if let Some(phrase) = plan.find_forbidden(forbidden_actions) {
        return Err(AppError::LLMParsing(format!(
            "shot plan contains forbidden action `{phrase}`"
        )));
    }

    Ok(plan)
}

pub fn fallback_plan(brief: &str, duration_seconds: u32) -> ShotPlan {
    ShotPlan {
        opening: FALLBACK_OPENING.to_string(),
        main_action: brief.to_string(),
        closing: FALLBACK_CLOSING.to_string(),
        camera_movement: FALLBACK_CAMERA.to_string(),
        lighting_notes: FALLBACK_LIGHTING.to_string(),
        duration_seconds,
        style_tokens: Vec::new(),
    }
}

/// Flattens a plan into the text prompt sent to the render provider.
pub fn render_prompt(plan: &ShotPlan, variant: PromptVariant) -> String {
    let mut prompt = String::new();
    if variant == PromptVariant::HardFidelity {
        prompt.push_str(HARD_FIDELITY_CLAUSE);
        prompt.push(' ');
    }

    prompt.push_str(&format!(
        "Opening: {}. Main action: {}. Closing: {}. Camera: {}. Lighting: {}. Duration: {} seconds.",
        plan.opening.trim_end_matches('.'),
        plan.main_action.trim_end_matches('.'),
        plan.closing.trim_end_matches('.'),
        plan.camera_movement.trim_end_matches('.'),
        plan.lighting_notes.trim_end_matches('.'),
        plan.duration_seconds
    ));

    if !plan.style_tokens.is_empty() {
        prompt.push_str(&format!(" Style: {}.", plan.style_tokens.join(", ")));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> String {
        serde_json::json!({
            "opening": "Bottle rises into frame",
            "main_action": "Condensation drips down the label",
            "closing": "Logo lock-up",
            "camera_movement": "slow orbit",
            "lighting_notes": "bright daylight",
            "duration_seconds": 12,
            "style_tokens": ["fresh", " "]
        })
        .to_string()
    }

    #[test]
    fn parse_pins_duration_and_drops_blank_tokens() {
        let plan = parse_plan(&valid_json(), 6, &[]).expect("valid plan");
        assert_eq!(plan.duration_seconds, 6);
        assert_eq!(plan.style_tokens, vec!["fresh".to_string()]);
    }

    #[test]
    fn parse_rejects_malformed_and_forbidden() {
        assert!(matches!(
            parse_plan("{not json", 6, &[]),
            Err(AppError::LLMParsing(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"opening": "only"}"#, 6, &[]),
            Err(AppError::LLMParsing(_))
        ));

        let forbidden = vec!["drips".to_string()];
        let err = parse_plan(&valid_json(), 6, &forbidden).expect_err("forbidden");
        assert!(err.to_string().contains("drips"));
    }

    #[test]
    fn fallback_plan_keeps_brief_verbatim() {
        let plan = fallback_plan("Sparkling water on a picnic table", 8);
        assert_eq!(plan.main_action, "Sparkling water on a picnic table");
        assert_eq!(plan.camera_movement, "slow push-in");
        assert_eq!(plan.duration_seconds, 8);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn hard_fidelity_prompt_is_a_distinct_variant() {
        let plan = fallback_plan("A bottle", 6);
        let standard = render_prompt(&plan, PromptVariant::Standard);
        let strict = render_prompt(&plan, PromptVariant::HardFidelity);

        assert!(!standard.contains("label fidelity"));
        assert!(strict.starts_with("Maintain exact product appearance and label fidelity"));
        assert!(strict.ends_with(&standard));
    }
}
