use anyhow::Context;
use rust_bert::pipelines::sentiment::{SentimentConfig, SentimentModel, SentimentPolarity};
use serde::Serialize;
use tokio::sync::Mutex;

/// Position limit of the DistilBERT encoder.
pub const MODEL_MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
}

impl From<SentimentPolarity> for Sentiment {
    fn from(polarity: SentimentPolarity) -> Self {
        match polarity {
            SentimentPolarity::Positive => Sentiment::Positive,
            SentimentPolarity::Negative => Sentiment::Negative,
        }
    }
}

/// Binary sentiment model shared across pipeline runs.
pub trait SentimentClassifier: Send + Sync {
    /// Labels every input, in order. Blocking: call it off the async workers.
    fn classify(&self, texts: &[String]) -> Vec<Sentiment>;

    /// Longest input, in tokens, the model accepts.
    fn max_input_tokens(&self) -> usize;
}

/// DistilBERT fine-tuned on SST-2, rust-bert's default sentiment model.
pub struct TransformerClassifier {
    model: Mutex<SentimentModel>,
}

impl std::fmt::Debug for TransformerClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerClassifier")
            .field("model", &"<SentimentModel>")
            .finish()
    }
}

impl TransformerClassifier {
    /// Loads the weights, downloading them into the rust-bert cache on first use.
    pub fn load() -> anyhow::Result<Self> {
        // Model creation blocks on the download, so keep it off the runtime threads.
        let model = std::thread::spawn(|| SentimentModel::new(SentimentConfig::default()))
            .join()
            .map_err(|_| anyhow::anyhow!("sentiment model loader thread panicked"))?
            .context("failed to load sentiment model")?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl SentimentClassifier for TransformerClassifier {
    /// The pipeline tokenizer truncates each input to the model's 512 positions.
    fn classify(&self, texts: &[String]) -> Vec<Sentiment> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let model = self.model.blocking_lock();
        model
            .predict(inputs.as_slice())
            .into_iter()
            .map(|label| Sentiment::from(label.polarity))
            .collect()
    }

    fn max_input_tokens(&self) -> usize {
        MODEL_MAX_TOKENS
    }
}

/// Keeps at most `max_tokens` whitespace-separated tokens.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> &str {
    let mut tokens = 0;
    let mut in_token = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_token = false;
        } else if !in_token {
            if tokens == max_tokens {
                return text[..i].trim_end();
            }
            tokens += 1;
            in_token = true;
        }
    }
    text
}
