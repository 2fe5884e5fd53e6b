//! Chat message types and the synthesis prompt builder (§4.9).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

const SYSTEM_PROMPT: &str = "You answer only from the provided context. Cite every factual \
claim with a [^n] marker matching the numbered context passages. If the context does not \
contain enough information to answer, say so plainly instead of guessing.";

/// Build the two-message prompt (`system`, `user`) for a synthesis call: the
/// fixed grounding instruction plus the query and serialized context pack.
pub fn build_messages(query: &str, packed_context: &str) -> Vec<Message> {
    vec![
        Message {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: Role::User,
            content: format!("Context:\n{packed_context}\n\nQuestion: {query}"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_includes_query_and_context() {
        let messages = build_messages("what is the rate?", "[^1] some context");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("what is the rate?"));
        assert!(messages[1].content.contains("[^1] some context"));
    }
}
