//! Prompt assembly for the medical assistant.

use crate::session::{ChatMessage, Role};

use super::Message;

/// Default number of prior turns sent to the model as context.
pub const DEFAULT_CONTEXT_MESSAGES: usize = 5;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful medical assistant chatbot. Your role is to provide general health information and guidance.

IMPORTANT DISCLAIMERS:
- You are NOT a doctor and cannot provide medical diagnosis
- Always recommend consulting healthcare professionals for serious concerns
- Provide general information only, not specific medical advice
- If someone has urgent symptoms, direct them to seek immediate medical attention

RESPONSE FORMAT:
- Use clear, simple language
- Emphasize important safety information
- Use plain text with clear structure
- Highlight critical warnings and safety notes";

/// Placeholder replaced by the user's text in a user template.
pub const USER_MESSAGE_PLACEHOLDER: &str = "{user_message}";

/// Default wrapper around the newest user message.
pub const DEFAULT_USER_TEMPLATE: &str = "\
User Question: {user_message}

Please provide a helpful, informative response while keeping the above disclaimers in mind. Focus on general information and safety.";

/// Builds the message list for one completion.
///
/// Layout: optional system prompt, then the most recent prior turns, then the
/// new user text (wrapped in the user template when one is set). The new user
/// text is always last and always present.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: Option<String>,
    user_template: Option<String>,
    context_messages: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SYSTEM_PROMPT.to_string()), DEFAULT_CONTEXT_MESSAGES)
            .with_user_template(Some(DEFAULT_USER_TEMPLATE.to_string()))
    }
}

impl PromptBuilder {
    /// An empty or whitespace-only system prompt disables it.
    #[must_use]
    pub fn new(system_prompt: Option<String>, context_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
            user_template: None,
            context_messages,
        }
    }

    /// Wrap the newest user message in `template`.
    ///
    /// `{user_message}` marks where the text goes; a template without it gets
    /// the text appended on its own line. Blank templates disable wrapping.
    #[must_use]
    pub fn with_user_template(mut self, template: Option<String>) -> Self {
        self.user_template = template.filter(|t| !t.trim().is_empty());
        self
    }

    fn wrap_user_text(&self, user_text: &str) -> String {
        match &self.user_template {
            Some(t) if t.contains(USER_MESSAGE_PLACEHOLDER) => {
                t.replace(USER_MESSAGE_PLACEHOLDER, user_text)
            }
            Some(t) => format!("{t}\n{user_text}"),
            None => user_text.to_string(),
        }
    }

    /// Build the prompt for `user_text` given the history before it.
    #[must_use]
    pub fn build(&self, prior: &[ChatMessage], user_text: &str) -> Vec<Message> {
        let skip = prior.len().saturating_sub(self.context_messages);
        let mut out = Vec::with_capacity(self.context_messages + 2);

        if let Some(system) = &self.system_prompt {
            out.push(Message::system(system.clone()));
        }
        out.extend(prior[skip..].iter().map(|m| match m.role {
            Role::User => Message::user(m.content.clone()),
            Role::Assistant => Message::assistant(m.content.clone()),
        }));
        out.push(Message::user(self.wrap_user_text(user_text)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[test]
    fn test_first_turn() {
        let prompt = PromptBuilder::default().build(&[], "What is fever?");

        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, MessageRole::System);
        assert_eq!(prompt[1].role, MessageRole::User);
        assert!(prompt[1].content.starts_with("User Question: What is fever?\n"));
        assert!(prompt[1].content.ends_with("general information and safety."));
    }

    #[test]
    fn test_template_wraps_only_newest_message() {
        let builder = PromptBuilder::new(None, 5)
            .with_user_template(Some("Q: {user_message} (be brief)".into()));

        let prompt = builder.build(&[ChatMessage::user("old"), ChatMessage::assistant("a")], "new");

        let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["old", "a", "Q: new (be brief)"]);
    }

    #[test]
    fn test_template_without_placeholder_appends_text() {
        let builder = PromptBuilder::new(None, 0).with_user_template(Some("Answer kindly.".into()));
        assert_eq!(builder.build(&[], "hi"), vec![Message::user("Answer kindly.\nhi")]);

        let plain = PromptBuilder::new(None, 0).with_user_template(Some(" ".into()));
        assert_eq!(plain.build(&[], "hi"), vec![Message::user("hi")]);
    }

    #[test]
    fn test_context_window_keeps_latest_turns() {
        let prior: Vec<ChatMessage> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{i}"))
                } else {
                    ChatMessage::assistant(format!("a{i}"))
                }
            })
            .collect();

        let prompt = PromptBuilder::new(None, 3).build(&prior, "next");

        let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a5", "q6", "a7", "next"]);
        assert_eq!(prompt[0].role, MessageRole::Assistant);
    }

    #[test]
    fn test_blank_system_prompt_is_dropped() {
        let prompt = PromptBuilder::new(Some("  ".into()), 0).build(&[ChatMessage::user("old")], "new");
        assert_eq!(prompt, vec![Message::user("new")]);
    }
}
