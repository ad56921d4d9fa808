use serde_json::json;

pub static SHOT_PLAN_SYSTEM_MESSAGE: &str = r"You are a creative director planning a short product video for an e-commerce catalog.
Decompose the marketing brief into a single continuous shot plan with an opening, a main action and a closing beat.
Keep the product the hero of every beat. Describe camera movement and lighting in plain production language.
Only place the product in the listed context settings when any are provided.
Never describe any of the forbidden actions, even indirectly.
Return the requested duration unchanged unless it is impossible to honour.";

pub static HARD_FIDELITY_SYSTEM_ADDENDUM: &str = r"A previous attempt drifted from the real product.
This time the product's exact shape, colours, proportions and printed label text must be preserved in every beat.
Prefer slow, simple camera moves and neutral settings that keep the label readable. Avoid stylisation of the product itself.";

pub fn get_shot_plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "opening": { "type": "string" },
            "main_action": { "type": "string" },
            "closing": { "type": "string" },
            "camera_movement": { "type": "string" },
            "lighting_notes": { "type": "string" },
            "duration_seconds": { "type": "integer" },
            "style_tokens": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": [
            "opening",
            "main_action",
            "closing",
            "camera_movement",
            "lighting_notes",
            "duration_seconds",
            "style_tokens"
        ],
        "additionalProperties": false
    })
}
