use crate::models::{CampaignBrief, Product};

pub const MAX_PROMPT_CHARS: usize = 800;

/// Subject, action, style, camera and ambiance, followed by the product and
/// campaign details the clip should carry. Truncated to [`MAX_PROMPT_CHARS`]
/// characters with a trailing `...`.
pub fn build_video_prompt(product: &Product, brief: &CampaignBrief) -> String {
    let mut subject = product.name.clone();
    if !product.description.is_empty() {
        subject.push_str(" - ");
        subject.push_str(&product.description);
    }

    let mut prompt = format!(
        "A dynamic composition with multiple angles of {subject} being showcased in a professional \
         advertisement in cinematic commercial style, professional lighting, modern aesthetic. \
         Smooth camera movements, close-up shots transitioning to wide shots. \
         Warm, inviting lighting with professional studio setup."
    );

    if !product.category.is_empty() {
        prompt.push_str(&format!(" The product is in the {} category.", product.category));
    }
    if !product.features.is_empty() {
        let features: Vec<&str> = product.features.iter().take(3).map(String::as_str).collect();
        prompt.push_str(&format!(" Highlighting key features: {}.", features.join(", ")));
    }
    if !brief.campaign_message.is_empty() {
        prompt.push_str(&format!(" The campaign message is: '{}'.", brief.campaign_message));
    }
    if let Some(primary) = brief
        .brand_guidelines
        .as_ref()
        .and_then(|guidelines| guidelines.primary_color.as_deref())
    {
        prompt.push_str(&format!(" Use {primary} as the primary brand color."));
    }
    if !brief.target_audience.is_empty() {
        prompt.push_str(&format!(" The video should appeal to {}.", brief.target_audience));
    }
    if let Some(price) = product.price.filter(|price| *price > 0.0) {
        prompt.push_str(&format!(" Display the price ${price:.2} prominently."));
    }
    if brief.include_voice_over && !brief.campaign_message.is_empty() {
        prompt.push_str(&format!(" Include voice-over saying: '{}'.", brief.campaign_message));
    }
    if brief.include_music {
        prompt.push_str(" Include upbeat, modern background music that enhances the product appeal.");
    }

    truncate(prompt)
}

fn truncate(prompt: String) -> String {
    if prompt.chars().count() <= MAX_PROMPT_CHARS {
        return prompt;
    }
    let mut cut: String = prompt.chars().take(MAX_PROMPT_CHARS).collect();
    cut.push_str("...");
    cut
}
