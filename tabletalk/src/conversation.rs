//! Conversation assembly - turns stored history plus a new user message
//! into the single ordered sequence the agent expects.

use crate::models::ChatMessage;

/// Caller-supplied conversation context from a chat request. All fields
/// are optional; precedence when several are present is handled by
/// [`assemble`].
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    /// Explicit full conversation, used verbatim as the prefix.
    pub conversation: Option<Vec<ChatMessage>>,
    /// System prompt to place first when no full conversation is given.
    pub system_prompt: Option<String>,
    /// Initial message list to use instead of stored history.
    pub messages: Option<Vec<ChatMessage>>,
}

impl TurnContext {
    /// Whether the caller supplied any explicit context at all.
    fn is_empty(&self) -> bool {
        self.conversation.is_none() && self.system_prompt.is_none() && self.messages.is_none()
    }
}

/// Build the agent input for one turn. The new user message is always
/// appended last. Prefix precedence:
///
/// 1. explicit full `conversation`
/// 2. `system_prompt` and/or `messages`
/// 3. stored session history
/// 4. nothing (bare user message)
pub fn assemble(
    context: &TurnContext,
    history: Option<&[ChatMessage]>,
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut items = if let Some(conversation) = &context.conversation {
        conversation.clone()
    } else if !context.is_empty() {
        let mut prefix = Vec::new();
        if let Some(prompt) = &context.system_prompt {
            prefix.push(ChatMessage::system(prompt.clone()));
        }
        if let Some(messages) = &context.messages {
            prefix.extend(messages.iter().cloned());
        }
        prefix
    } else {
        history.map(<[ChatMessage]>::to_vec).unwrap_or_default()
    };

    items.push(ChatMessage::user(user_message));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    #[test]
    fn bare_message_with_no_context() {
        let items = assemble(&TurnContext::default(), None, "Hello");
        assert_eq!(items, vec![ChatMessage::user("Hello")]);
    }

    #[test]
    fn stored_history_is_prefixed() {
        let history = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi! How can I help?"),
        ];
        let items = assemble(&TurnContext::default(), Some(&history), "Follow-up");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], history[0]);
        assert_eq!(items[1], history[1]);
        assert_eq!(items[2], ChatMessage::user("Follow-up"));
    }

    #[test]
    fn system_prompt_and_messages_replace_history() {
        let history = vec![ChatMessage::user("ignored")];
        let context = TurnContext {
            conversation: None,
            system_prompt: Some("You are terse.".to_string()),
            messages: Some(vec![ChatMessage::user("earlier")]),
        };
        let items = assemble(&context, Some(&history), "now");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].role, MessageRole::System);
        assert_eq!(items[0].content, "You are terse.");
        assert_eq!(items[1], ChatMessage::user("earlier"));
        assert_eq!(items[2], ChatMessage::user("now"));
    }

    #[test]
    fn explicit_conversation_wins_over_everything() {
        let context = TurnContext {
            conversation: Some(vec![ChatMessage::assistant("carried over")]),
            system_prompt: Some("ignored".to_string()),
            messages: Some(vec![ChatMessage::user("ignored too")]),
        };
        let history = vec![ChatMessage::user("also ignored")];
        let items = assemble(&context, Some(&history), "next");
        assert_eq!(
            items,
            vec![
                ChatMessage::assistant("carried over"),
                ChatMessage::user("next"),
            ]
        );
    }

    #[test]
    fn system_prompt_alone_is_a_valid_prefix() {
        let context = TurnContext {
            conversation: None,
            system_prompt: Some("prompt".to_string()),
            messages: None,
        };
        let items = assemble(&context, None, "hi");
        assert_eq!(
            items,
            vec![ChatMessage::system("prompt"), ChatMessage::user("hi")]
        );
    }
}
