//! Built-in MediMate prompt text and canned payloads
//!
//! The instruction prompt asks the model for a JSON object matching
//! [`AiPayload`](crate::conversation::AiPayload); the greeting payloads seed
//! new sessions locally and are never sent to the provider or persisted.

use crate::conversation::AiPayload;

/// The standard disclaimer attached to every AI answer.
pub const STANDARD_DISCLAIMER: &str = "Remember, this is not a substitute for professional \
medical advice. Always consult a healthcare provider for diagnosis and treatment.";

/// Default knowledge statement when the model omits its own.
pub const DEFAULT_KNOWLEDGE_SOURCES: &str = "My knowledge is based on a wide range of medical \
texts and research up to my last update. I do not perform live web searches or have access to \
real-time information.";

const INSTRUCTIONS: &str = r#"You are MediMate AI, a friendly and empathetic AI medical assistant. Your goal is to provide general medical information and suggestions in a conversational manner.

Based on the user's symptoms (and image if provided):
1. Provide clear, general medical advice. Be empathetic and understanding.
2. If the query is vague, ask a polite clarifying question as part of your advice.
3. Offer 2-3 relevant follow-up questions or suggestions the user might find helpful.
4. State what your knowledge is based on.
5. Always include a disclaimer about seeking professional medical advice.

Respond with a single JSON object with exactly these fields:
- "advice": your main conversational response and advice (string)
- "suggestions": 2-3 follow-up questions or suggestions (array of strings)
- "knowledge_sources": your statement about your knowledge base (string)
- "disclaimer": the standard medical disclaimer (string)"#;

/// Builds the full text prompt for one symptom submission.
pub fn advice_prompt(symptoms: &str) -> String {
    format!("{INSTRUCTIONS}\n\nSymptoms/Concern: {symptoms}")
}

/// Greeting shown when a session first opens.
pub fn initial_greeting() -> AiPayload {
    AiPayload {
        advice: "Hello! I am MediMate AI. How can I assist you today?".to_string(),
        suggestions: vec![
            "You can ask me about symptoms.".to_string(),
            "Tell me about a health concern.".to_string(),
            "Upload an image of a skin condition.".to_string(),
        ],
        knowledge_sources: DEFAULT_KNOWLEDGE_SOURCES.to_string(),
        disclaimer: STANDARD_DISCLAIMER.to_string(),
    }
}

/// Greeting shown when the user starts a fresh conversation.
pub fn new_chat_greeting() -> AiPayload {
    AiPayload {
        advice: "New chat started. How can I help you?".to_string(),
        suggestions: vec![
            "Describe your symptoms.".to_string(),
            "Ask about a medication (general info only).".to_string(),
        ],
        knowledge_sources: DEFAULT_KNOWLEDGE_SOURCES.to_string(),
        disclaimer: STANDARD_DISCLAIMER.to_string(),
    }
}
