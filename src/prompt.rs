//! Prompt construction for the scoring completion.
//!
//! Pure string builders so the media-boost rules can be asserted in tests
//! without calling the model.

/// System prompt describing the analyst role and rubric.
pub fn system_prompt(image_count: usize) -> String {
    let mut prompt = String::from(
        "You are an X (Twitter) virality analyst. Analyze text and visual content to predict viral potential.\n\
         \n\
         **Key Factors:**\n\
         - Text: content, tone, structure, topic\n\
         - Visuals: composition, quality, emotional impact, relevance\n\
         - Context: current X trends, audience appeal\n",
    );

    if image_count > 0 {
        prompt.push_str(
            "\n**CRITICAL**: Images provided - analyze visuals carefully and score media_boost > 0 based on quality.\n",
        );
    }

    prompt
}

/// User prompt embedding the post content and the expected reply schema.
pub fn user_prompt(text: &str, image_count: usize) -> String {
    let text_section = if text.is_empty() {
        "**Text:** None (image-only post)\n".to_string()
    } else {
        format!("**Text:**\n{text}\n")
    };

    let image_section = if image_count > 0 {
        format!("**Images:** {image_count} image(s) provided (analyze carefully)")
    } else {
        "**Images:** None".to_string()
    };

    let media_boost_rule = if image_count > 0 {
        "media_boost MUST be > 0 (min 20-30 basic, 50-70 good, 80+ exceptional)"
    } else {
        "media_boost = 0 (no images)"
    };

    let visual_reasons = if image_count > 0 {
        " (include visual impact)"
    } else {
        ""
    };
    let visual_suggestions = if image_count > 0 {
        " (include visual if needed)"
    } else {
        ""
    };

    format!(
        r#"Analyze this post:

{text_section}
{image_section}

Return ONLY JSON in this schema:
{{
  "overall_score": number,           // 0-100
  "predicted_reach": "Low" | "Medium" | "High" | "Explosive",
  "factors": {{
    "hook_strength": number,        // 0-100
    "clarity_and_structure": number,
    "emotional_intensity": number,
    "controversy_polarization": number,
    "novelty_originality": number,
    "shareability": number,
    "format_fit_for_x": number,     // line breaks, length, thread vs single, etc.
    "media_boost": number,          // CRITICAL: If images are present, this MUST be > 0. Score 0-100 based on visual quality, composition, relevance to text, emotional impact, and attention-grabbing power. If no images, this should be 0.
    "author_leverage": number,      // perceived audience size / influence
    "trend_alignment": number       // how much it seems to sit on top of current topics
  }},
  "short_explanation": string,      // 1-2 sentences summary (mention visual elements if impactful)
  "detailed_reasons": string[],     // EXACTLY 3-4 most important bullet points only
  "improvement_suggestions": string[] // EXACTLY 3 most actionable and impactful suggestions
}}

**Rules:**
- Score 0-100: most posts 20-70, 80+ = viral potential
- {media_boost_rule}
- detailed_reasons: Top 3-4 impactful points only{visual_reasons}
- improvement_suggestions: Top 3 actionable suggestions{visual_suggestions}
- Output ONLY valid JSON, no markdown blocks or extra text"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_boost_required_above_zero_with_images() {
        let prompt = user_prompt("Check this out", 2);
        assert!(prompt.contains("media_boost MUST be > 0"));
        assert!(prompt.contains("**Images:** 2 image(s) provided"));
        assert!(system_prompt(2).contains("score media_boost > 0"));
    }

    #[test]
    fn media_boost_pinned_to_zero_without_images() {
        let prompt = user_prompt("Great launch today!", 0);
        assert!(prompt.contains("media_boost = 0 (no images)"));
        assert!(prompt.contains("**Images:** None"));
        assert!(!system_prompt(0).contains("CRITICAL"));
    }

    #[test]
    fn empty_text_gets_a_placeholder() {
        let prompt = user_prompt("", 1);
        assert!(prompt.contains("**Text:** None (image-only post)"));
    }

    #[test]
    fn schema_lists_all_ten_factors() {
        let prompt = user_prompt("hello", 0);
        for key in [
            "hook_strength",
            "clarity_and_structure",
            "emotional_intensity",
            "controversy_polarization",
            "novelty_originality",
            "shareability",
            "format_fit_for_x",
            "media_boost",
            "author_leverage",
            "trend_alignment",
        ] {
            assert!(prompt.contains(key), "schema is missing {key}");
        }
    }
}
