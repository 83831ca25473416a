//! Conversation avec l'assistant

pub mod backend;
pub mod session;

pub use backend::{AssistantBackend, AssistantError, AssistantRequest, OpenAiBackend};
pub use session::{ConversationSession, SessionError, FALLBACK_REPLY, HISTORY_WINDOW};

/// Auteur d'un tour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// Un message de la conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    /// Monotone au sein d'une session
    pub ordinal: u64,
}

/// Statut de la session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AwaitingResponse,
    /// Au repos, avec un message d'erreur encore affiché
    Error,
}
