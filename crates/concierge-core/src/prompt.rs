//! System prompt assembly
//!
//! Menu, plan and review text come from the site's static data and are passed
//! in as plain strings; this module only frames them and documents the action
//! tags the model may use.

use serde::{Deserialize, Serialize};

const TAG_INSTRUCTIONS: &str = "\
When it helps the guest, end your reply with one or more of these tags:
[VIEW_MENU] to open the menu, [VIEW_PLANS] for meal plans,
[CONTACT_WHATSAPP] to reach staff, [START_ORDER] to begin checkout,
[VIEW_GALLERY] for photos, [VIEW_CHEF] for the chef's story,
[VIEW_REVIEWS] for guest reviews, and [ADD_TO_CART: <exact dish name>]
once per dish the guest wants. Never invent dishes that are not on the menu.";

/// Static site content the assistant may quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptContext {
    pub restaurant: String,
    pub menu: String,
    pub plans: String,
    pub reviews: String,
}

impl PromptContext {
    pub fn build(&self) -> String {
        let name = if self.restaurant.trim().is_empty() {
            "the restaurant"
        } else {
            self.restaurant.trim()
        };

        let mut prompt = format!(
            "You are the friendly ordering assistant for {}. \
Answer briefly and help guests choose dishes and place orders.\n\n",
            name
        );

        for (title, body) in [
            ("Menu", &self.menu),
            ("Meal plans", &self.plans),
            ("Reviews", &self.reviews),
        ] {
            if !body.trim().is_empty() {
                prompt.push_str(title);
                prompt.push_str(":\n");
                prompt.push_str(body.trim());
                prompt.push_str("\n\n");
            }
        }

        prompt.push_str(TAG_INSTRUCTIONS);
        prompt
    }
}

/// Prompt used when no configuration supplies one.
pub fn default_system_prompt() -> String {
    PromptContext::default().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_lists_tags() {
        let prompt = default_system_prompt();
        assert!(prompt.contains("the restaurant"));
        assert!(prompt.contains("[ADD_TO_CART: <exact dish name>]"));
        assert!(!prompt.contains("Menu:"));
    }

    #[test]
    fn test_sections_included_when_present() {
        let context = PromptContext {
            restaurant: "Bistro Lumière".to_string(),
            menu: "Duck Confit - $24\nOnion Soup - $9\n".to_string(),
            plans: String::new(),
            reviews: "  ".to_string(),
        };
        let prompt = context.build();
        assert!(prompt.starts_with("You are the friendly ordering assistant for Bistro Lumière."));
        assert!(prompt.contains("Menu:\nDuck Confit - $24\nOnion Soup - $9\n\n"));
        assert!(!prompt.contains("Meal plans:"));
        assert!(!prompt.contains("Reviews:"));
    }
}
