use crate::{
    brand::BrandRegistry,
    models::{AspectRatio, CampaignBrief, Product},
};

const STYLE_BASE: &str = ", clean minimal background, professional studio lighting, high quality, modern commercial photography style";

/// Builds the image-model prompt. Pure: identical inputs give identical text.
pub fn build_image_prompt(
    brief: &CampaignBrief,
    product: &Product,
    aspect_ratio: AspectRatio,
    brands: &BrandRegistry,
) -> String {
    let mut prompt = format!(
        "generate social media ad marketing post image to promote {} for a social advertising campaign for {}",
        product.name, brief.campaign_name
    );

    if !product.description.trim().is_empty() {
        prompt.push_str(&format!(" with a description: {}", product.description));
    }
    if !product.category.trim().is_empty() {
        prompt.push_str(&format!(" in the {} category", product.category));
    }
    if !product.features.is_empty() {
        prompt.push_str(&format!(
            ". Highlight key features: {}",
            product.features.join(", ")
        ));
    }
    if let Some(demographic) = product.target_demographic.as_deref() {
        prompt.push_str(&format!(". Target audience: {demographic}"));
    }

    prompt.push_str(&format!(
        ". Campaign: \"{}\" ({}) for region {}, aimed at {}.",
        brief.campaign_name, brief.campaign_id, brief.target_region, brief.target_audience
    ));
    if !brief.campaign_message.trim().is_empty() {
        prompt.push_str(&format!(
            " Main campaign message: \"{}\".",
            brief.campaign_message
        ));
    }

    if let Some(params) = brief.asset_params() {
        if aspect_ratio == AspectRatio::Portrait {
            if params.selected_avatar.is_some() {
                prompt.push_str(&format!(
                    " Use the person from the provided avatar image as the model wearing/using the {name}. The person should be the main focus of the image, demonstrating the product in use. Maintain the same person's appearance, facial features, and characteristics from the reference image.",
                    name = product.name
                ));
            } else if let Some(persona) = params.persona.as_deref() {
                let persona = persona.to_lowercase();
                prompt.push_str(&format!(
                    " Show a {persona} person wearing/using the {name}. The person should be the main focus of the image, demonstrating the product in use. Style should appeal to {persona}.",
                    name = product.name
                ));
            }
        }

        if let Some(custom) = params.custom_prompt.as_deref() {
            prompt.push_str(&format!(" Additional context: {custom}."));
        }

        if let Some(brand) = params.brand.as_deref() {
            prompt.push_str(&format!(
                " Brand: {brand}. Apply {brand} brand styling and guidelines."
            ));
            if let Some(tagline) = brands.guidelines_for(brief) {
                prompt.push_str(&format!(" Brand voice: {tagline}."));
            }
        }
    }

    if let Some(guidelines) = brief.brand_guidelines.as_ref() {
        let parts: Vec<String> = [
            ("primary color", guidelines.primary_color.as_deref()),
            ("secondary color", guidelines.secondary_color.as_deref()),
            ("accent color", guidelines.accent_color.as_deref()),
            ("font family", guidelines.font_family.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|value| format!("{label} {value}")))
        .collect();

        if !parts.is_empty() {
            prompt.push_str(&format!(" Follow brand guidelines: {}.", parts.join(", ")));
        }
    }

    prompt.push_str(STYLE_BASE);
    prompt.push_str(aspect_ratio.style_descriptor());
    if !brief.language.trim().is_empty() {
        prompt.push_str(&format!(", text and style localized for {}", brief.language));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetParams, fixtures};
    use std::path::PathBuf;

    #[test]
    fn prompt_is_deterministic() {
        let brief = fixtures::brief(&["Trail Watch"]);
        let registry = BrandRegistry::default();
        for ratio in AspectRatio::ALL {
            let first = build_image_prompt(&brief, &brief.products[0], ratio, &registry);
            let second = build_image_prompt(&brief, &brief.products[0], ratio, &registry);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn prompt_carries_product_campaign_and_ratio_context() {
        let brief = fixtures::brief(&["Trail Watch"]);
        let prompt = build_image_prompt(
            &brief,
            &brief.products[0],
            AspectRatio::Landscape,
            &BrandRegistry::default(),
        );

        assert!(prompt.starts_with("generate social media ad marketing post image to promote Trail Watch"));
        assert!(prompt.contains("Highlight key features: Long battery, Water resistant"));
        assert!(prompt.contains("(summer-2025) for region North America"));
        assert!(prompt.contains("primary color #4682B4"));
        assert!(prompt.contains("landscape orientation, product-focused"));
        assert!(prompt.ends_with("text and style localized for en"));
    }

    #[test]
    fn persona_and_avatar_only_apply_to_portrait() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            persona: Some("Urban Runner".to_string()),
            brand: Some("Nike".to_string()),
            ..Default::default()
        });
        let registry = BrandRegistry::default();
        let product = &brief.products[0];

        let portrait = build_image_prompt(&brief, product, AspectRatio::Portrait, &registry);
        assert!(portrait.contains("Show a urban runner person wearing/using the Trail Watch"));
        assert!(portrait.contains("Brand voice: Just Do It"));

        let square = build_image_prompt(&brief, product, AspectRatio::Square, &registry);
        assert!(!square.contains("urban runner person"));

        brief.asset_params.as_mut().unwrap().selected_avatar = Some(PathBuf::from("avatar.png"));
        let portrait = build_image_prompt(&brief, &brief.products[0], AspectRatio::Portrait, &registry);
        assert!(portrait.contains("provided avatar image"));
        assert!(!portrait.contains("urban runner person"));
    }
}
