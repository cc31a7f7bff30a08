//! Classifier construction from settings.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use convo_types::{ClassifierProvider, ClassifierSettings};

use crate::api::{ApiSentimentClassifier, ApiTopicClassifier, InferenceApiConfig};
use crate::classifier::{SentimentClassifier, TopicClassifier};
use crate::error::ClassificationError;
use crate::mock::{MockSentimentClassifier, MockTopicClassifier};

/// The pair of classifiers a pipeline run uses.
#[derive(Clone)]
pub struct Classifiers {
    pub topic: Arc<dyn TopicClassifier>,
    pub sentiment: Arc<dyn SentimentClassifier>,
}

/// Build the configured classifier pair.
pub fn from_settings(settings: &ClassifierSettings) -> Result<Classifiers, ClassificationError> {
    match settings.provider {
        ClassifierProvider::Huggingface => {
            let api_config = |model: &str| {
                let mut config = InferenceApiConfig::new(&settings.base_url, model)
                    .with_timeout(Duration::from_secs(settings.request_timeout_secs))
                    .with_max_retries(settings.max_retries);
                if let Some(key) = &settings.api_key {
                    config = config.with_api_key(key.clone());
                }
                config
            };

            info!(
                base_url = %settings.base_url,
                topic_model = %settings.topic_model,
                sentiment_model = %settings.sentiment_model,
                "Using inference API classifiers"
            );
            Ok(Classifiers {
                topic: Arc::new(ApiTopicClassifier::new(api_config(&settings.topic_model))?),
                sentiment: Arc::new(ApiSentimentClassifier::new(api_config(
                    &settings.sentiment_model,
                ))?),
            })
        }
        ClassifierProvider::Mock => {
            info!("Using mock classifiers");
            Ok(Classifiers {
                topic: Arc::new(MockTopicClassifier::new()),
                sentiment: Arc::new(MockSentimentClassifier::new()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider() {
        let settings = ClassifierSettings {
            provider: ClassifierProvider::Mock,
            ..Default::default()
        };
        let classifiers = from_settings(&settings).unwrap();
        let score = classifiers.sentiment.classify("lovely day").await.unwrap();
        assert_eq!(score.label, convo_types::SentimentLabel::Positive);
    }

    #[test]
    fn test_api_provider_builds() {
        let settings = ClassifierSettings {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(from_settings(&settings).is_ok());
    }

    #[test]
    fn test_api_provider_rejects_zero_retries() {
        let settings = ClassifierSettings {
            max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(
            from_settings(&settings),
            Err(ClassificationError::ConfigError(_))
        ));
    }
}
