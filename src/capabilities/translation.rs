use std::{collections::HashMap, future::IntoFuture, time::Duration};

use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openai};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::Cancellation;

type OpenAiCompletionModel = <openai::Client as CompletionClient>::CompletionModel;

const TRANSLATOR_PREAMBLE: &str = "You are a professional marketing translator. You adapt short advertising copy into the requested language, keeping it concise, persuasive and culturally appropriate. Reply with the translated text only.";

pub const DEFAULT_TRANSLATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Secondary AI text call used to localize campaign messages.
///
/// Translation is strictly best effort: a missing backend, an API error, a
/// timeout or cancellation all return the input text unchanged.
pub struct MessageTranslator {
    backend: Option<TranslationBackend>,
    timeout: Duration,
    cache: RwLock<HashMap<(String, String), String>>,
}

enum TranslationBackend {
    OpenAi { agent: Agent<OpenAiCompletionModel> },
    #[cfg(test)]
    Fixed(HashMap<String, String>),
}

impl MessageTranslator {
    pub fn with_openai(client: &openai::Client, model: &str, timeout: Duration) -> Self {
        let agent = client
            .agent(model)
            .name("campaign-translator")
            .preamble(TRANSLATOR_PREAMBLE)
            .temperature(0.3)
            .build();

        Self {
            backend: Some(TranslationBackend::OpenAi { agent }),
            timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: DEFAULT_TRANSLATION_TIMEOUT,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn fixed(entries: &[(&str, &str)]) -> Self {
        Self {
            backend: Some(TranslationBackend::Fixed(
                entries
                    .iter()
                    .map(|(from, to)| (from.to_string(), to.to_string()))
                    .collect(),
            )),
            timeout: DEFAULT_TRANSLATION_TIMEOUT,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn translate(&self, text: &str, language: &str, cancel: &Cancellation) -> String {
        let language = language.trim().to_lowercase();
        if text.trim().is_empty() || language.is_empty() || language == "en" {
            return text.to_string();
        }
        let Some(backend) = &self.backend else {
            return text.to_string();
        };

        let key = (language.clone(), text.to_string());
        if let Some(hit) = self.cache.read().await.get(&key) {
            return hit.clone();
        }

        let translated = match backend {
            TranslationBackend::OpenAi { agent } => {
                let prompt = format!(
                    "Translate the following marketing message to {}. Keep it concise, impactful, and culturally appropriate for marketing purposes. Only return the translated text, no explanations:\n\n{}",
                    language_name(&language),
                    text
                );

                match tokio::time::timeout(self.timeout, cancel.guard(agent.prompt(&prompt).into_future())).await
                {
                    Ok(Some(Ok(response))) => clean_response(&response),
                    Ok(Some(Err(err))) => {
                        warn!(target: "translation", language = %language, error = ?err, "translation request failed, keeping original text");
                        None
                    }
                    Ok(None) => {
                        debug!(target: "translation", "translation cancelled");
                        return text.to_string();
                    }
                    Err(_) => {
                        warn!(target: "translation", language = %language, timeout_secs = self.timeout.as_secs(), "translation timed out, keeping original text");
                        None
                    }
                }
            }
            #[cfg(test)]
            TranslationBackend::Fixed(entries) => entries.get(text).cloned(),
        };

        match translated {
            Some(translated) => {
                debug!(target: "translation", language = %language, "message translated");
                self.cache.write().await.insert(key, translated.clone());
                translated
            }
            None => text.to_string(),
        }
    }
}

/// Human language name for the prompt; unknown codes are passed through.
pub fn language_name(code: &str) -> String {
    match code {
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        other => return other.to_string(),
    }
    .to_string()
}

fn clean_response(response: &str) -> Option<String> {
    let cleaned = response
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
