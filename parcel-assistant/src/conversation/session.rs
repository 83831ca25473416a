//! Session de conversation avec l'assistant
//!
//! Envois strictement sérialisés: un second envoi pendant qu'une réponse
//! est attendue est refusé. Le tour utilisateur est ajouté avant la
//! réponse; l'attente est suivie par un drapeau séparé, de sorte qu'un
//! échec n'a jamais à retirer ce tour.

use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use super::backend::{AssistantBackend, AssistantRequest};
use super::{ConversationTurn, Role, SessionStatus};
use crate::context::ContextSummary;

/// Nombre maximal de tours antérieurs repris dans une requête
pub const HISTORY_WINDOW: usize = 6;

/// Réponse substituée quand le backend ne renvoie aucun texte exploitable
pub const FALLBACK_REPLY: &str =
    "I couldn't produce an answer for that. Please try rephrasing your question.";

/// Instructions système fixes
pub const SYSTEM_INSTRUCTION: &str = "You are a land-use and property assistant. \
Answer questions about the location and parcel the user selected on the map. \
Base parcel facts on the map selection provided with the latest message; \
if it lacks the information, say so instead of guessing.";

/// Erreurs d'envoi
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Refusé localement, aucune requête émise
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// Une réponse est déjà attendue
    #[error("A response is already pending")]
    Busy,

    /// Échec du backend; le message reste affiché dans la session
    #[error("Assistant request failed: {0}")]
    Backend(String),
}

#[derive(Debug, Default)]
struct SessionState {
    turns: Vec<ConversationTurn>,
    pending: bool,
    error: Option<String>,
    draft: String,
}

/// Session de conversation
pub struct ConversationSession {
    backend: Arc<dyn AssistantBackend>,
    model: String,
    state: Mutex<SessionState>,
}

impl ConversationSession {
    pub fn new(backend: Arc<dyn AssistantBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        if state.pending {
            SessionStatus::AwaitingResponse
        } else if state.error.is_some() {
            SessionStatus::Error
        } else {
            SessionStatus::Idle
        }
    }

    /// Historique complet, du plus ancien au plus récent
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    /// Dernier message d'erreur, jusqu'à fermeture ou prochain envoi
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.lock().draft = text.into();
    }

    /// Envoie le brouillon; il est vidé dès que l'envoi est accepté
    pub async fn send_draft(
        &self,
        context: Option<&ContextSummary>,
    ) -> Result<ConversationTurn, SessionError> {
        let draft = self.draft();
        self.send_with(&draft, context, true).await
    }

    /// Envoie un message et attend la réponse
    ///
    /// `context` est ajouté au message courant uniquement, jamais à l'historique.
    pub async fn send(
        &self,
        prompt: &str,
        context: Option<&ContextSummary>,
    ) -> Result<ConversationTurn, SessionError> {
        self.send_with(prompt, context, false).await
    }

    async fn send_with(
        &self,
        prompt: &str,
        context: Option<&ContextSummary>,
        clear_draft: bool,
    ) -> Result<ConversationTurn, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }

        let request = {
            let mut state = self.lock();
            if state.pending {
                warn!("Send rejected: a response is already pending");
                return Err(SessionError::Busy);
            }

            let window_start = state.turns.len().saturating_sub(HISTORY_WINDOW);
            let input = compose_input(&state.turns[window_start..], prompt, context);

            let ordinal = state.turns.len() as u64;
            state.turns.push(ConversationTurn {
                role: Role::User,
                text: prompt.to_string(),
                ordinal,
            });
            state.pending = true;
            state.error = None;
            if clear_draft {
                state.draft.clear();
            }

            AssistantRequest {
                model: self.model.clone(),
                input,
            }
        };

        let guard = PendingGuard { session: self };
        let result = self.backend.complete(&request).await;
        guard.defuse();

        let mut state = self.lock();
        state.pending = false;
        match result {
            Ok(segments) => {
                let turn = ConversationTurn {
                    role: Role::Assistant,
                    text: extract_reply(&segments),
                    ordinal: state.turns.len() as u64,
                };
                info!(ordinal = turn.ordinal, chars = turn.text.len(), "Assistant replied");
                state.turns.push(turn.clone());
                Ok(turn)
            }
            Err(e) => {
                warn!(error = %e, "Assistant request failed");
                let message = e.to_string();
                state.error = Some(message.clone());
                Err(SessionError::Backend(message))
            }
        }
    }

    /// Vide l'historique, le brouillon et l'erreur; refusé pendant une attente
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.pending {
            return Err(SessionError::Busy);
        }
        *state = SessionState::default();
        info!("Conversation reset");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Libère le drapeau d'attente, y compris si l'envoi est abandonné en vol
struct PendingGuard<'a> {
    session: &'a ConversationSession,
}

impl PendingGuard<'_> {
    /// Envoi terminé: le drapeau sera libéré sous le verrou du résultat
    fn defuse(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().pending = false;
    }
}

/// Compose l'entrée envoyée au backend
///
/// Instructions système, puis tours antérieurs (du plus ancien au plus
/// récent), puis message courant suivi du contexte de la carte.
pub fn compose_input(
    history: &[ConversationTurn],
    prompt: &str,
    context: Option<&ContextSummary>,
) -> String {
    let mut input = String::from(SYSTEM_INSTRUCTION);

    if !history.is_empty() {
        input.push_str("\n\nConversation so far:");
        for turn in history {
            let _ = write!(input, "\n{}: {}", turn.role.label(), turn.text);
        }
    }

    let _ = write!(input, "\n\nUser: {}", prompt);
    if let Some(context) = context {
        let _ = write!(input, "\n\nCurrent map selection:\n{}", context);
    }

    input
}

/// Segments joints par des retours à la ligne, ou la réponse de repli
pub fn extract_reply(segments: &[String]) -> String {
    let text = segments.join("\n");
    let text = text.trim();
    if text.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::backend::AssistantError;
    use async_trait::async_trait;
    use parcel_lookup::LngLat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeBackend {
        reply: Result<Vec<String>, u16>,
        delay: Duration,
        calls: AtomicUsize,
        requests: Mutex<Vec<AssistantRequest>>,
    }

    impl FakeBackend {
        fn replying(segments: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(segments.iter().map(|s| s.to_string()).collect()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn slow(segments: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(segments.iter().map(|s| s.to_string()).collect()),
                delay: Duration::from_millis(50),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_input(&self) -> String {
            self.requests.lock().unwrap().last().unwrap().input.clone()
        }
    }

    #[async_trait]
    impl AssistantBackend for FakeBackend {
        async fn complete(
            &self,
            request: &AssistantRequest,
        ) -> Result<Vec<String>, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(segments) => Ok(segments.clone()),
                Err(status) => Err(AssistantError::Api {
                    status: *status,
                    message: "upstream unavailable".into(),
                }),
            }
        }
    }

    fn context() -> ContextSummary {
        crate::context::compile(Some(&LngLat::new(-73.935242, 40.730610).unwrap()), None).unwrap()
    }

    #[tokio::test]
    async fn test_send_appends_user_then_assistant() {
        let backend = FakeBackend::replying(&["Hello there"]);
        let session = ConversationSession::new(backend.clone(), "gpt-test");

        let reply = session.send("Hi", None).await.unwrap();
        assert_eq!(reply.text, "Hello there");

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role, turns[0].ordinal), (Role::User, 0));
        assert_eq!((turns[1].role, turns[1].ordinal), (Role::Assistant, 1));
        assert_eq!(turns[0].text, "Hi");
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(backend.requests.lock().unwrap()[0].model, "gpt-test");
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_locally() {
        let backend = FakeBackend::replying(&["unused"]);
        let session = ConversationSession::new(backend.clone(), "gpt-test");

        assert_eq!(session.send("   \n", None).await, Err(SessionError::EmptyPrompt));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_send_rejected() {
        let backend = FakeBackend::slow(&["Done"]);
        let session = ConversationSession::new(backend.clone(), "gpt-test");

        let first = session.send("First", None);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(session.status(), SessionStatus::AwaitingResponse);
            session.send("Second", None).await
        };

        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert_eq!(second, Err(SessionError::Busy));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_when_no_text() {
        let session = ConversationSession::new(FakeBackend::replying(&[]), "gpt-test");
        let reply = session.send("Anything?", None).await.unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);

        let session = ConversationSession::new(FakeBackend::replying(&["  ", "\n"]), "gpt-test");
        let reply = session.send("Anything?", None).await.unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_segments_joined_and_trimmed() {
        let session =
            ConversationSession::new(FakeBackend::replying(&[" One", "Two "]), "gpt-test");
        let reply = session.send("Go", None).await.unwrap();
        assert_eq!(reply.text, "One\nTwo");
    }

    #[tokio::test]
    async fn test_failure_keeps_user_turn_and_error() {
        let backend = FakeBackend::failing(503);
        let session = ConversationSession::new(backend.clone(), "gpt-test");

        let err = session.send("Hello?", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));

        let turns = session.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.error().unwrap().contains("503"));

        session.dismiss_error();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_after_failure_clears_error() {
        let session = ConversationSession::new(FakeBackend::failing(500), "gpt-test");
        session.send("One", None).await.unwrap_err();
        assert_eq!(session.status(), SessionStatus::Error);

        // Un envoi reste possible depuis l'état d'erreur
        session.send("Two", None).await.unwrap_err();
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.turns()[1].ordinal, 1);
    }

    #[tokio::test]
    async fn test_history_window_and_context_placement() {
        let backend = FakeBackend::replying(&["ok"]);
        let session = ConversationSession::new(backend.clone(), "gpt-test");

        for i in 0..4 {
            session.send(&format!("question {}", i), Some(&context())).await.unwrap();
        }
        session.send("latest", Some(&context())).await.unwrap();

        let input = backend.last_input();
        assert!(input.starts_with(SYSTEM_INSTRUCTION));
        // 8 tours antérieurs, seuls les 6 derniers sont repris
        assert!(!input.contains("question 0"));
        assert!(input.contains("User: question 1"));
        assert!(input.contains("User: question 3"));
        assert!(input.find("question 1").unwrap() < input.find("question 3").unwrap());
        // Le contexte n'apparaît qu'une fois, après le message courant
        assert_eq!(input.matches("Current map selection:").count(), 1);
        assert!(input.ends_with(&format!("User: latest\n\nCurrent map selection:\n{}", context())));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let session = ConversationSession::new(FakeBackend::failing(500), "gpt-test");
        session.set_draft("unsent");
        session.send("Hello", None).await.unwrap_err();

        session.reset().unwrap();
        assert!(session.turns().is_empty());
        assert!(session.error().is_none());
        assert!(session.draft().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_reset_rejected_while_pending() {
        let session = ConversationSession::new(FakeBackend::slow(&["Done"]), "gpt-test");

        let send = session.send("Hello", None);
        let reset = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.reset()
        };

        let (sent, reset) = tokio::join!(send, reset);
        assert!(sent.is_ok());
        assert_eq!(reset, Err(SessionError::Busy));
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_send_draft() {
        let session = ConversationSession::new(FakeBackend::replying(&["ok"]), "gpt-test");

        assert_eq!(session.send_draft(None).await, Err(SessionError::EmptyPrompt));

        session.set_draft("What is the zoning?");
        session.send_draft(None).await.unwrap();
        assert!(session.draft().is_empty());
        assert_eq!(session.turns()[0].text, "What is the zoning?");
    }

    #[test]
    fn test_compose_without_history_or_context() {
        let input = compose_input(&[], "Hi", None);
        assert_eq!(input, format!("{}\n\nUser: Hi", SYSTEM_INSTRUCTION));
    }
}
