use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const DEFAULT_NICHE: &str = "default";

/// Weights applied to the four QA axes. They are not required to sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QaWeights {
    pub fidelity: f64,
    pub label: f64,
    pub quality: f64,
    pub temporal: f64,
}

impl Default for QaWeights {
    fn default() -> Self {
        Self {
            fidelity: 0.40,
            label: 0.30,
            quality: 0.30,
            temporal: 0.00,
        }
    }
}

stored_object!(CategoryProfile, "category_profile", {
    niche: String,
    weights: QaWeights,
    threshold: f64,
    allowed_context_tokens: Vec<String>,
    forbidden_actions: Vec<String>
});

/// Where a resolved profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Stored,
    BuiltIn,
    Default,
}

impl CategoryProfile {
    pub fn new(
        niche: &str,
        weights: QaWeights,
        threshold: f64,
        allowed_context_tokens: Vec<String>,
        forbidden_actions: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let niche = normalize_niche(niche);
        Self {
            id: niche.clone(),
            niche,
            weights,
            threshold,
            allowed_context_tokens,
            forbidden_actions,
            created_at: now,
            updated_at: now,
        }
    }

    /// Profile used when no niche-specific configuration exists.
    pub fn fallback() -> Self {
        Self::new(DEFAULT_NICHE, QaWeights::default(), 0.70, Vec::new(), Vec::new())
    }

    /// Resolves the profile for a niche: stored override, then built-in preset, then the default.
    ///
    /// A missing profile is never an error.
    pub async fn resolve(
        db: &SurrealDbClient,
        niche: &str,
    ) -> Result<(Self, ProfileSource), AppError> {
        let key = normalize_niche(niche);
        if key.is_empty() {
            return Ok((Self::fallback(), ProfileSource::Default));
        }

        if let Some(stored) = db.get_item::<Self>(&key).await? {
            return Ok((stored, ProfileSource::Stored));
        }

        if let Some(preset) = Self::builtin(&key) {
            return Ok((preset, ProfileSource::BuiltIn));
        }

        tracing::debug!(niche = %key, "no category profile configured; using default");
        Ok((Self::fallback(), ProfileSource::Default))
    }

    pub fn builtin(niche: &str) -> Option<Self> {
        let tokens = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

        let profile = match normalize_niche(niche).as_str() {
            "packaged_goods" => Self::new(
                "packaged_goods",
                QaWeights::default(),
                0.70,
                tokens(&["kitchen counter", "pantry shelf", "studio tabletop", "picnic blanket"]),
                tokens(&["opening the package", "eating", "pouring", "crushing"]),
            ),
            "cosmetics" => Self::new(
                "cosmetics",
                QaWeights {
                    fidelity: 0.45,
                    label: 0.25,
                    quality: 0.20,
                    temporal: 0.10,
                },
                0.75,
                tokens(&["vanity table", "marble surface", "bathroom shelf", "silk fabric"]),
                tokens(&["applying to skin", "before and after", "squeezing", "spilling"]),
            ),
            "apparel" => Self::new(
                "apparel",
                QaWeights {
                    fidelity: 0.35,
                    label: 0.10,
                    quality: 0.35,
                    temporal: 0.20,
                },
                0.65,
                tokens(&["studio backdrop", "city street", "wardrobe rack"]),
                tokens(&["tearing", "cutting fabric", "burning"]),
            ),
            "electronics" => Self::new(
                "electronics",
                QaWeights {
                    fidelity: 0.40,
                    label: 0.25,
                    quality: 0.25,
                    temporal: 0.10,
                },
                0.72,
                tokens(&["desk setup", "living room", "studio tabletop"]),
                tokens(&["disassembling", "screen cracking", "water splash", "dropping"]),
            ),
            "food_beverage" => Self::new(
                "food_beverage",
                QaWeights {
                    fidelity: 0.35,
                    label: 0.25,
                    quality: 0.30,
                    temporal: 0.10,
                },
                0.68,
                tokens(&["cafe table", "kitchen", "outdoor picnic"]),
                tokens(&["spilling", "throwing", "smashing"]),
            ),
            _ => return None,
        };

        Some(profile)
    }
}

fn normalize_niche(niche: &str) -> String {
    niche.trim().to_lowercase().replace([' ', '-'], "_")
}
