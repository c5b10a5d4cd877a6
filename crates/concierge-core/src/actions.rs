//! Action tags embedded in assistant replies
//!
//! The model is prompted to append bracketed markers such as `[VIEW_MENU]` or
//! `[ADD_TO_CART: Duck Confit]`. Front-ends turn each into a button. Tags are
//! only read from the final assembled reply, never from partial deltas.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A UI action requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantAction {
    AddToCart { item: String },
    ViewMenu,
    ViewPlans,
    ContactWhatsapp,
    StartOrder,
    ViewGallery,
    ViewChef,
    ViewReviews,
    /// No tag was present in the reply
    None,
}

impl AssistantAction {
    fn from_fixed_tag(tag: &str) -> Option<Self> {
        match tag {
            "VIEW_MENU" => Some(AssistantAction::ViewMenu),
            "VIEW_PLANS" => Some(AssistantAction::ViewPlans),
            "CONTACT_WHATSAPP" => Some(AssistantAction::ContactWhatsapp),
            "START_ORDER" => Some(AssistantAction::StartOrder),
            "VIEW_GALLERY" => Some(AssistantAction::ViewGallery),
            "VIEW_CHEF" => Some(AssistantAction::ViewChef),
            "VIEW_REVIEWS" => Some(AssistantAction::ViewReviews),
            _ => None,
        }
    }

    /// Button caption for front-ends.
    pub fn label(&self) -> String {
        match self {
            AssistantAction::AddToCart { item } => format!("Add {} to cart", item),
            AssistantAction::ViewMenu => "View menu".to_string(),
            AssistantAction::ViewPlans => "Meal plans".to_string(),
            AssistantAction::ContactWhatsapp => "Chat on WhatsApp".to_string(),
            AssistantAction::StartOrder => "Start order".to_string(),
            AssistantAction::ViewGallery => "Gallery".to_string(),
            AssistantAction::ViewChef => "Meet the chef".to_string(),
            AssistantAction::ViewReviews => "Reviews".to_string(),
            AssistantAction::None => String::new(),
        }
    }
}

const INLINE_SPACE: [char; 2] = [' ', '\t'];

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| {
        Regex::new(
            r"\[(?:ADD_TO_CART:\s*(?P<item>[^\]]*[^\]\s])\s*|(?P<fixed>VIEW_MENU|VIEW_PLANS|CONTACT_WHATSAPP|START_ORDER|VIEW_GALLERY|VIEW_CHEF|VIEW_REVIEWS))\]",
        )
        .expect("tag pattern is valid")
    })
}

/// Actions in order of first appearance, or `[None]` when the text has no tags.
///
/// Every `ADD_TO_CART` occurrence counts; fixed tags count once.
pub fn extract_actions(text: &str) -> Vec<AssistantAction> {
    let mut actions = Vec::new();

    for caps in tag_regex().captures_iter(text) {
        let action = if let Some(item) = caps.name("item") {
            AssistantAction::AddToCart {
                item: item.as_str().trim().to_string(),
            }
        } else {
            match caps
                .name("fixed")
                .and_then(|m| AssistantAction::from_fixed_tag(m.as_str()))
            {
                Some(action) if !actions.contains(&action) => action,
                _ => continue,
            }
        };
        actions.push(action);
    }

    if actions.is_empty() {
        actions.push(AssistantAction::None);
    }
    actions
}

/// Remove every recognised tag, collapsing the whitespace left where each
/// tag stood. All other text is kept as is.
pub fn strip_actions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in tag_regex().find_iter(text) {
        out.push_str(&text[last..m.start()]);
        last = m.end();

        let rest = &text[m.end()..];
        let rest_trimmed = rest.trim_start_matches(INLINE_SPACE);
        let skip_rest_space = m.end() + (rest.len() - rest_trimmed.len());

        let closes_clause = rest_trimmed.chars().next().map_or(true, |c| {
            matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '\n' | '\r')
        });

        if closes_clause {
            out.truncate(out.trim_end_matches(INLINE_SPACE).len());
            last = skip_rest_space;
        } else if out.is_empty() || out.ends_with(INLINE_SPACE) || out.ends_with('\n') {
            last = skip_rest_space;
        }
    }
    out.push_str(&text[last..]);

    out.trim().to_string()
}
