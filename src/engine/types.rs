use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declares a string-backed enum with `as_str`, `Display` and `FromStr`
/// matching the values stored in the database.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("invalid {}: '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

string_enum!(
    /// Swipe gesture on a candidate card.
    SwipeDirection {
        Left => "left",
        Right => "right",
        Up => "up",
    }
);

string_enum!(
    /// Deliberation-time bucket derived from swipe duration.
    SpeedBucket {
        Fast => "fast",
        Medium => "medium",
        Slow => "slow",
    }
);

string_enum!(
    SessionStatus {
        InProgress => "in_progress",
        Completed => "completed",
    }
);

string_enum!(
    MutationType {
        Crossover => "crossover",
        Repurposing => "repurposing",
    }
);

impl MutationType {
    /// Parent count carried by mutations of this type.
    pub fn parent_count(&self) -> usize {
        match self {
            MutationType::Crossover => 2,
            MutationType::Repurposing => 1,
        }
    }
}

string_enum!(
    /// MoSCoW feature priority.
    Priority {
        Must => "must",
        Should => "should",
        Could => "could",
        Wont => "wont",
    }
);

impl Priority {
    /// Case-insensitive mapping of model output; anything unrecognized is
    /// treated as `Could`.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "must" | "musthave" => Priority::Must,
            "should" | "shouldhave" => Priority::Should,
            "could" | "couldhave" => Priority::Could,
            "wont" | "wonthave" | "willnot" => Priority::Wont,
            _ => Priority::Could,
        }
    }
}

string_enum!(
    /// Fixed, ordered set of feature-expansion themes.
    VariationTheme {
        MinimalistMvp => "Minimalist MVP",
        EnterpriseReady => "Enterprise-Ready",
        PrivacyFirst => "Privacy-First",
        SocialHeavy => "Social-Heavy",
        AiPowered => "AI-Powered",
    }
);

impl VariationTheme {
    pub const ALL: [VariationTheme; 5] = [
        VariationTheme::MinimalistMvp,
        VariationTheme::EnterpriseReady,
        VariationTheme::PrivacyFirst,
        VariationTheme::SocialHeavy,
        VariationTheme::AiPowered,
    ];

    /// The first `count` themes in canonical order (at most five).
    pub fn first(count: usize) -> &'static [VariationTheme] {
        &Self::ALL[..count.min(Self::ALL.len())]
    }

    /// Match a theme name loosely ("privacy first", "AI powered", …).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let key = |s: &str| -> String {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        };
        let wanted = key(raw);
        Self::ALL.into_iter().find(|t| key(t.as_str()) == wanted)
    }

    pub fn focus(&self) -> &'static str {
        match self {
            VariationTheme::MinimalistMvp => "the smallest feature set that proves the core value",
            VariationTheme::EnterpriseReady => "admin controls, SSO, audit trails and team scale",
            VariationTheme::PrivacyFirst => "local-first data, encryption and minimal collection",
            VariationTheme::SocialHeavy => "sharing, communities, feeds and collaboration",
            VariationTheme::AiPowered => "automation, recommendations and generative assistance",
        }
    }
}

string_enum!(
    /// Which refinement interview a question belongs to.
    RefinementRole {
        ProductManager => "product_manager",
        Architect => "architect",
    }
);

// =============================================================================
// Generation outcomes
// =============================================================================

/// Result of a generation step that may have fallen back to deterministic
/// content. Callers and tests can tell the two apart.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome<T> {
    Genuine(T),
    Degraded { value: T, reason: String },
}

impl<T> GenerationOutcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Why the fallback path was taken, for degraded outcomes.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Genuine(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Genuine(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Genuine(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GenerationOutcome<U> {
        match self {
            Self::Genuine(v) => GenerationOutcome::Genuine(f(v)),
            Self::Degraded { value, reason } => GenerationOutcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
