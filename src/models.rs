//! Shared data models for the scoring contract

use serde::{Deserialize, Serialize};

/// Audience-reach bucket predicted by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictedReach {
    Low,
    Medium,
    High,
    Explosive,
}

impl PredictedReach {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictedReach::Low => "Low",
            PredictedReach::Medium => "Medium",
            PredictedReach::High => "High",
            PredictedReach::Explosive => "Explosive",
        }
    }
}

/// The ten named sub-scores contributing to the overall score, each 0-100.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Factors {
    #[serde(default)]
    pub hook_strength: u8,
    #[serde(default)]
    pub clarity_and_structure: u8,
    #[serde(default)]
    pub emotional_intensity: u8,
    #[serde(default)]
    pub controversy_polarization: u8,
    #[serde(default)]
    pub novelty_originality: u8,
    #[serde(default)]
    pub shareability: u8,
    #[serde(default)]
    pub format_fit_for_x: u8,
    #[serde(default)]
    pub media_boost: u8,
    #[serde(default)]
    pub author_leverage: u8,
    #[serde(default)]
    pub trend_alignment: u8,
}

/// Validated scoring payload extracted from the model's JSON reply.
///
/// `overall_score` and `factors` are mandatory; everything else is
/// tolerated as missing since model replies drop fields now and then.
#[derive(Debug, Clone, Deserialize)]
pub struct ScorePayload {
    pub overall_score: u8,
    #[serde(default)]
    pub predicted_reach: Option<PredictedReach>,
    pub factors: Factors,
    #[serde(default)]
    pub short_explanation: Option<String>,
    #[serde(default)]
    pub detailed_reasons: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

/// Finished analysis returned to the client: the validated AI payload plus
/// the input echo, the record id, and the persistence outcome. Built once,
/// after all collaborator calls have settled.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub overall_score: u8,
    pub predicted_reach: Option<PredictedReach>,
    pub factors: Factors,
    pub short_explanation: Option<String>,
    pub detailed_reasons: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub text_content: Option<String>,
    pub image_urls: Vec<String>,
    pub analysis_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_save_error: Option<String>,
}

impl AnalysisResult {
    /// Assemble the response value from the validated payload and the
    /// outcome of the post-analysis record update. A failed update is
    /// carried as a diagnostic; the analysis itself still succeeds.
    pub fn assemble(
        payload: ScorePayload,
        text_content: Option<String>,
        image_urls: Vec<String>,
        analysis_id: i64,
        save_outcome: Result<(), String>,
    ) -> Self {
        let (db_saved, db_save_error) = match save_outcome {
            Ok(()) => (Some(true), None),
            Err(message) => (None, Some(message)),
        };

        AnalysisResult {
            overall_score: payload.overall_score,
            predicted_reach: payload.predicted_reach,
            factors: payload.factors,
            short_explanation: payload.short_explanation,
            detailed_reasons: payload.detailed_reasons,
            improvement_suggestions: payload.improvement_suggestions,
            text_content,
            image_urls,
            analysis_id,
            db_saved,
            db_save_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ScorePayload {
        serde_json::from_value(serde_json::json!({
            "overall_score": 72,
            "predicted_reach": "High",
            "factors": { "hook_strength": 80, "media_boost": 0 },
            "short_explanation": "Strong hook, no media.",
            "detailed_reasons": ["Opens with a question"],
            "improvement_suggestions": ["Attach a photo"]
        }))
        .expect("payload deserializes")
    }

    #[test]
    fn missing_factor_keys_default_to_zero() {
        let p = payload();
        assert_eq!(p.factors.hook_strength, 80);
        assert_eq!(p.factors.trend_alignment, 0);
    }

    #[test]
    fn assemble_marks_saved_on_success() {
        let result = AnalysisResult::assemble(
            payload(),
            Some("Great launch today!".to_string()),
            vec![],
            41,
            Ok(()),
        );
        assert_eq!(result.analysis_id, 41);
        assert_eq!(result.db_saved, Some(true));
        assert!(result.db_save_error.is_none());
        assert!(result.image_urls.is_empty());
    }

    #[test]
    fn assemble_carries_save_error_alongside_score() {
        let result = AnalysisResult::assemble(
            payload(),
            None,
            vec!["https://x/img.png".to_string()],
            7,
            Err("Database update returned no data".to_string()),
        );
        assert_eq!(result.overall_score, 72);
        assert_eq!(
            result.db_save_error.as_deref(),
            Some("Database update returned no data")
        );
        assert!(result.db_saved.is_none());
        assert_eq!(result.image_urls, vec!["https://x/img.png".to_string()]);
    }

    #[test]
    fn diagnostics_are_omitted_from_json_when_absent() {
        let result = AnalysisResult::assemble(payload(), None, vec![], 1, Ok(()));
        let json = serde_json::to_string(&result).expect("serialize result");
        assert!(json.contains("\"db_saved\":true"));
        assert!(!json.contains("db_save_error"));
        assert!(json.contains("\"predicted_reach\":\"High\""));
    }
}
