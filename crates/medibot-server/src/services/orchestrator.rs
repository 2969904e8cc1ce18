//! Response orchestrator
//!
//! Turns one inbound message into one plain-text answer:
//! classify → rewrite against conversation memory → (retrieval) → inference.
//! Every path ends in a user-facing string; nothing is propagated to the channel.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::services::conversation::{ConversationMemory, ConversationState};
use crate::services::intent::{Intent, IntentClassifier, IDENTITY_PHRASES};
use crate::services::llm_service::{InferenceRequest, LlmProvider};
use crate::services::retrieval::RetrievedPassage;
use crate::services::retrieval_state::{RetrievalHandle, RetrievalState};
use crate::utils::text::{preview, truncate_chars};

pub const GREETING_REPLY: &str = "👋 Hello! How can I assist you today?";
pub const ASK_MEDICAL_FIRST: &str = "Please ask a medical question first.";
pub const NON_MEDICAL_REPLY: &str =
    "I'm here to help with medical questions. Please describe your symptoms or condition.";
pub const RAG_LOADING: &str = "⚠ RAG is loading. Try again.";
pub const GENERATION_ERROR: &str = "⚠ Error generating response. Please try again.";
pub const NO_RESPONSE: &str = "⚠ I could not generate a response. Please rephrase your question.";

const SELF_DESCRIPTION: &str =
    "I am an AI-based medical chatbot designed to provide general health information.";
const NOT_A_DOCTOR: &str = "No, I am not a doctor. I provide general medical information only.";
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const CREATOR_PHRASES: &[&str] = &[
    "who created you",
    "who made you",
    "who built you",
    "your creator",
    "your owner",
];

/// Tunables for answer generation
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    pub creator: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub answer_timeout: Duration,
    pub translate_timeout: Duration,
    pub top_k: usize,
    pub passage_max_chars: usize,
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            system_prompt: settings.prompts.system_prompt.clone(),
            creator: settings.prompts.creator.clone(),
            model: settings.llm.model.clone(),
            temperature: settings.llm.temperature,
            max_tokens: settings.llm.max_tokens,
            answer_timeout: Duration::from_secs(settings.rag.answer_timeout_seconds),
            translate_timeout: Duration::from_secs(settings.llm.timeout_seconds),
            top_k: settings.rag.top_k,
            passage_max_chars: settings.rag.passage_max_chars,
            retries: settings.rag.retries,
            initial_backoff: Duration::from_millis(settings.rag.initial_backoff_ms),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Classified message after the context rewrite
#[derive(Debug, Clone, PartialEq)]
enum Turn {
    Greeting,
    /// Canned answer, translated when a language was asked for
    Identity { translate_to: Option<String> },
    Translate { hint: String },
    /// New topic: the literal text is both topic and query
    Medical,
    /// Context-bearing prompt built from the remembered topic
    FollowUp { prompt: String },
    /// Follow-up or translation with nothing remembered
    MissingContext,
    Unrelated,
}

/// What to do with the turn once memory is settled
#[derive(Debug)]
enum Plan {
    Reply(String),
    TranslateCanned { answer: String, hint: String },
    Rag(String),
}

#[derive(Debug)]
enum Step {
    Done(Plan),
    /// Classify this synthesised prompt again
    Reenter(String),
}

/// The single rewrite step: intent + remembered state → turn.
///
/// `Other` with a remembered topic becomes a `FollowUp` carrying the
/// synthesised prompt; follow-ups without a topic need context first.
/// A translation request that asks about the bot itself ("who are you,
/// answer in hindi") is an identity turn with a target language.
fn rewrite(intent: Intent, text: &str, state: &ConversationState) -> Turn {
    match intent {
        Intent::Greeting => Turn::Greeting,
        Intent::Identity => Turn::Identity { translate_to: None },
        Intent::Translate(hint) if IntentClassifier::mentions_identity(text) => Turn::Identity {
            translate_to: Some(identity_free_hint(&hint)),
        },
        Intent::Translate(hint) => match state.last_query {
            Some(_) => Turn::Translate { hint },
            None => Turn::MissingContext,
        },
        Intent::MedicalQuestion => Turn::Medical,
        Intent::FollowUp => match &state.last_topic {
            Some(topic) => Turn::FollowUp {
                prompt: format!(
                    "The user previously asked about '{}'. This is a follow-up question: {}. \
                     Provide a detailed medical explanation.",
                    topic, text
                ),
            },
            None => Turn::MissingContext,
        },
        Intent::Other => match &state.last_topic {
            Some(topic) => Turn::FollowUp {
                prompt: format!(
                    "The user previously asked about '{}'. Now they are asking: {}. \
                     Explain treatment, recovery, and prevention.",
                    topic, text
                ),
            },
            None => Turn::Unrelated,
        },
    }
}

/// Language hint with the identity question taken out.
fn identity_free_hint(hint: &str) -> String {
    let stripped = IDENTITY_PHRASES
        .iter()
        .fold(hint.to_string(), |h, phrase| h.replace(phrase, ""));
    stripped
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_string()
}

/// Join at most `k` passages, each cut to `max_chars` characters.
pub fn build_context(passages: &[RetrievedPassage], k: usize, max_chars: usize) -> String {
    passages
        .iter()
        .take(k)
        .filter(|p| !p.content.is_empty())
        .map(|p| truncate_chars(&p.content, max_chars))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        return question.to_string();
    }
    format!(
        "Context:\n{}\n\nUser Question:\n{}\n\nProvide a clear, medically accurate answer.",
        context, question
    )
}

pub struct ResponseOrchestrator {
    llm: Arc<dyn LlmProvider>,
    retrieval: RetrievalHandle,
    memory: ConversationMemory,
    config: OrchestratorConfig,
}

impl ResponseOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        retrieval: RetrievalHandle,
        memory: ConversationMemory,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            llm,
            retrieval,
            memory,
            config,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer with the configured retry policy.
    pub async fn answer(&self, text: &str, sender_id: &str) -> String {
        self.answer_with_retries(text, sender_id, self.config.retries, self.config.initial_backoff)
            .await
    }

    /// Answer one message from `sender_id`. Never fails.
    ///
    /// Memory updates from the same sender are serialised; retrieval and
    /// generation run after the sender lock is released.
    pub async fn answer_with_retries(
        &self,
        text: &str,
        sender_id: &str,
        retries: u32,
        initial_delay: Duration,
    ) -> String {
        match self.settle(text, sender_id).await {
            Plan::Reply(reply) => reply,
            Plan::TranslateCanned { answer, hint } => self.translate_canned(&answer, &hint).await,
            Plan::Rag(query) => self.answer_with_context(&query, retries, initial_delay).await,
        }
    }

    /// Classify and apply memory side effects under the sender lock.
    async fn settle(&self, text: &str, sender_id: &str) -> Plan {
        let _guard = self.memory.lock_sender(sender_id).await;

        let mut text = text.to_string();
        let mut translated = false;

        loop {
            let intent = IntentClassifier::classify(&text);
            info!(
                "Answering sender={} intent={:?} text='{}'",
                sender_id,
                intent,
                preview(&text)
            );

            match self.plan(intent, &text, sender_id, translated) {
                Step::Done(plan) => return plan,
                Step::Reenter(prompt) => {
                    translated = true;
                    text = prompt;
                }
            }
        }
    }

    fn plan(&self, intent: Intent, text: &str, sender_id: &str, translated: bool) -> Step {
        // A synthesised translation prompt is never translated twice
        if translated && matches!(intent, Intent::Translate(_)) {
            return Step::Done(Plan::Rag(text.to_string()));
        }

        let state = self.memory.get(sender_id).unwrap_or_default();

        let plan = match rewrite(intent, text, &state) {
            Turn::Greeting => Plan::Reply(GREETING_REPLY.to_string()),
            Turn::Identity { translate_to } => {
                let answer = self.identity_answer(text);
                match translate_to {
                    Some(hint) => Plan::TranslateCanned { answer, hint },
                    None => Plan::Reply(answer),
                }
            }
            Turn::Translate { hint } => {
                let previous = state.last_query.unwrap_or_default();
                return Step::Reenter(format!("Answer this in {}:\n{}", hint, previous));
            }
            Turn::Medical => {
                self.memory.set_topic(sender_id, text, text);
                Plan::Rag(text.to_string())
            }
            Turn::FollowUp { prompt } => {
                self.memory.set_query(sender_id, &prompt);
                Plan::Rag(prompt)
            }
            Turn::MissingContext => Plan::Reply(ASK_MEDICAL_FIRST.to_string()),
            Turn::Unrelated => Plan::Reply(NON_MEDICAL_REPLY.to_string()),
        };
        Step::Done(plan)
    }

    fn identity_answer(&self, text: &str) -> String {
        let t = text.to_lowercase();
        if CREATOR_PHRASES.iter().any(|p| t.contains(p)) {
            format!(
                "I was created by {} as an AI-powered medical chatbot.",
                self.config.creator
            )
        } else if t.contains("who are you") || t.contains("what are you") {
            SELF_DESCRIPTION.to_string()
        } else if t.contains("are you a doctor") {
            NOT_A_DOCTOR.to_string()
        } else {
            SELF_DESCRIPTION.to_string()
        }
    }

    async fn translate_canned(&self, answer: &str, hint: &str) -> String {
        let request = InferenceRequest {
            system_prompt: "You are a translator.".to_string(),
            user_prompt: format!("Translate this to {}:\n{}", hint, answer),
            model: self.config.model.clone(),
            temperature: 0.3,
            max_tokens: 300,
            timeout: self.config.translate_timeout,
        };

        match self.llm.complete(&request).await {
            Ok(translated) if !translated.trim().is_empty() => translated.trim().to_string(),
            Ok(_) => answer.to_string(),
            Err(e) => {
                warn!("Translation of canned answer failed: {}", e);
                GENERATION_ERROR.to_string()
            }
        }
    }

    async fn answer_with_context(&self, query: &str, retries: u32, initial_delay: Duration) -> String {
        let retriever = match self.retrieval.state() {
            RetrievalState::Ready(provider) => provider,
            RetrievalState::Failed(reason) => {
                return format!("⚠ RAG initialization failed: {}", reason);
            }
            RetrievalState::Uninitialized | RetrievalState::Initializing => {
                return RAG_LOADING.to_string();
            }
        };

        let passages = match retriever.search(query, self.config.top_k).await {
            Ok(passages) => passages,
            Err(e) => {
                error!("Retriever error: {:#}", e);
                Vec::new()
            }
        };

        let context = build_context(&passages, self.config.top_k, self.config.passage_max_chars);
        debug!(
            "Built context from {} passages ({} chars)",
            passages.len().min(self.config.top_k),
            context.len()
        );

        let request = InferenceRequest {
            system_prompt: self.config.system_prompt.clone(),
            user_prompt: build_prompt(query, &context),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            timeout: self.config.answer_timeout,
        };

        self.generate_with_retry(&request, retries, initial_delay).await
    }

    /// Empty answers are retried at once; rate-limit errors back off
    /// exponentially; anything else gives up immediately.
    async fn generate_with_retry(
        &self,
        request: &InferenceRequest,
        retries: u32,
        initial_delay: Duration,
    ) -> String {
        let mut delay = initial_delay;

        for attempt in 1..=retries {
            match self.llm.complete(request).await {
                Ok(answer) => {
                    let answer = answer.trim();
                    if answer.is_empty() {
                        warn!("LLM returned empty response on attempt {}", attempt);
                        continue;
                    }
                    return answer.to_string();
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("RAG attempt {} rate limited: {}", attempt, e);
                    if attempt < retries {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(e) => {
                    warn!("RAG attempt {} failed: {}", attempt, e);
                    return GENERATION_ERROR.to_string();
                }
            }
        }

        NO_RESPONSE.to_string()
    }
}
