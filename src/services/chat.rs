use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::api::ChatApi;
use crate::error::AppError;
use crate::models::{ChatMessage, ChatRequest};

#[derive(Default)]
struct Conversation {
    id: Option<String>,
    messages: Vec<ChatMessage>,
}

/// Relays chat messages to the assistant and keeps the running transcript.
pub struct ChatService {
    api: Arc<dyn ChatApi>,
    conversation: Mutex<Conversation>,
}

impl ChatService {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            conversation: Mutex::new(Conversation::default()),
        }
    }

    pub async fn send(&self, message: &str) -> Result<String, AppError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("Message cannot be empty".to_string()));
        }

        let request = {
            let mut conversation = self.conversation.lock().await;
            conversation.messages.push(ChatMessage::user(message));
            ChatRequest {
                message: message.to_string(),
                conversation_id: conversation.id.clone(),
            }
        };

        let response = self.api.send_message(&request).await.inspect_err(|e| {
            warn!("Error sending message: {}", e);
        })?;

        let mut conversation = self.conversation.lock().await;
        if response.conversation_id.is_some() {
            conversation.id = response.conversation_id.clone();
        }
        conversation
            .messages
            .push(ChatMessage::assistant(response.response.clone()));
        Ok(response.response)
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.conversation.lock().await.messages.clone()
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation.lock().await.id.clone()
    }

    pub async fn reset(&self) {
        *self.conversation.lock().await = Conversation::default();
    }
}
