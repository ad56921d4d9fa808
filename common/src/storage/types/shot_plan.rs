use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_DURATION_SECONDS: u32 = 1;
pub const MAX_DURATION_SECONDS: u32 = 60;

/// Structured decomposition of a brief, produced by the prompt rewriter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShotPlan {
    pub opening: String,
    pub main_action: String,
    pub closing: String,
    pub camera_movement: String,
    pub lighting_notes: String,
    pub duration_seconds: u32,
    pub style_tokens: Vec<String>,
}

/// Which instruction set a plan was produced under.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    #[default]
    Standard,
    /// Used for the single retry after no candidate cleared the QA threshold.
    HardFidelity,
}

/// Where the attached plan came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    LanguageModel,
    BriefFallback,
}

impl ShotPlan {
    /// Checks required fields and bounds; returns the first violation found.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("opening", &self.opening),
            ("main_action", &self.main_action),
            ("closing", &self.closing),
            ("camera_movement", &self.camera_movement),
            ("lighting_notes", &self.lighting_notes),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AppError::LLMParsing(format!(
                "shot plan field `{field}` is empty"
            )));
        }

        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.duration_seconds) {
            return Err(AppError::LLMParsing(format!(
                "shot plan duration {}s is outside {MIN_DURATION_SECONDS}-{MAX_DURATION_SECONDS}s",
                self.duration_seconds
            )));
        }

        Ok(())
    }

    /// Returns the first forbidden phrase that appears in the plan's action text, if any.
    pub fn find_forbidden<'a>(&self, forbidden: &'a [String]) -> Option<&'a str> {
        let haystack = format!(
            "{} {} {}",
            self.opening, self.main_action, self.closing
        )
        .to_lowercase();

        forbidden
            .iter()
            .map(String::as_str)
            .filter(|phrase| !phrase.trim().is_empty())
            .find(|phrase| haystack.contains(&phrase.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ShotPlan {
        ShotPlan {
            opening: "Bottle fades in on marble".into(),
            main_action: "Slow rotation showing the label".into(),
            closing: "Hero shot with logo".into(),
            camera_movement: "slow orbit".into(),
            lighting_notes: "soft key light".into(),
            duration_seconds: 6,
            style_tokens: vec!["studio".into()],
        }
    }

    #[test]
    fn valid_plan_passes() {
        assert!(plan().validate().is_ok());
    }

    #[test]
    fn empty_field_is_rejected() {
        let mut invalid = plan();
        invalid.lighting_notes = "  ".into();
        let err = invalid.validate().expect_err("empty lighting");
        assert!(err.to_string().contains("lighting_notes"));
    }

    #[test]
    fn duration_out_of_range_is_rejected() {
        let mut invalid = plan();
        invalid.duration_seconds = 0;
        assert!(invalid.validate().is_err());
        invalid.duration_seconds = 61;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn forbidden_phrase_is_found_case_insensitively() {
        let mut with_pour = plan();
        with_pour.main_action = "Liquid POURING from the bottle".into();
        let forbidden = vec!["pouring".to_string(), "opening the cap".to_string()];

        assert_eq!(with_pour.find_forbidden(&forbidden), Some("pouring"));
        assert_eq!(plan().find_forbidden(&forbidden), None);
    }
}
