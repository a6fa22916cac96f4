//! Prompt construction for proto-app mockup images.

use crate::db::models::{Feature, StyleAttributes};

use super::types::Priority;

const STYLE_PRESETS: [(&str, &str, &str); 4] = [
    ("deep indigo with coral accents", "card-based dashboard", "calm and focused"),
    ("warm neutrals with forest green", "single-column feed", "friendly and organic"),
    ("high-contrast black and electric lime", "bold split-screen hero", "energetic"),
    ("soft pastels", "floating panels with generous whitespace", "playful"),
];

/// Style for the `index`-th image of a request. An explicit style wins;
/// otherwise presets rotate so one request yields distinct looks.
pub fn style_for(index: usize, requested: Option<&StyleAttributes>) -> StyleAttributes {
    if let Some(style) = requested {
        return style.clone();
    }
    let (palette, layout, vibe) = STYLE_PRESETS[index % STYLE_PRESETS.len()];
    StyleAttributes {
        palette: palette.into(),
        layout: layout.into(),
        vibe: vibe.into(),
    }
}

pub fn build_visual_prompt(
    title: &str,
    description: &str,
    features: &[Feature],
    style: &StyleAttributes,
) -> String {
    let highlighted: Vec<&str> = features
        .iter()
        .filter(|f| matches!(f.priority, Priority::Must | Priority::Should))
        .chain(features.iter().filter(|f| matches!(f.priority, Priority::Could)))
        .take(4)
        .map(|f| f.name.as_str())
        .collect();

    let mut prompt = format!(
        "High-fidelity mobile app mockup for \"{title}\". {description}\n"
    );
    if !highlighted.is_empty() {
        prompt.push_str(&format!("Show these features on screen: {}.\n", highlighted.join(", ")));
    }
    prompt.push_str(&format!(
        "Palette: {}. Layout: {}. Mood: {}. Clean UI, no lorem ipsum, no device frame.",
        style.palette, style.layout, style.vibe
    ));
    prompt
}
