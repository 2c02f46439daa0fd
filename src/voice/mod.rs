//! Voice module - ElevenLabs text-to-speech
//!
//! Synthesis returns raw MP3 bytes. The client can be built without an API
//! key so the rest of the service still starts; calls then fail with
//! [`ProviderError::MissingApiKey`].


use serde::{Deserialize, Serialize};

use crate::config::{api_key, http_client, VoiceConfig, ELEVENLABS_KEY_VARS};
use crate::error::ProviderError;

const PROVIDER: &str = "elevenlabs";
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Voice tuning sent with every synthesis request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl From<&VoiceConfig> for VoiceSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            style: config.style,
            use_speaker_boost: config.use_speaker_boost,
        }
    }
}

/// A voice available to the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

// ============================================================================
// VoiceSynthesizer
// ============================================================================

pub struct VoiceSynthesizer {
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
    voice_id: String,
    model_id: String,
    settings: VoiceSettings,
}

impl VoiceSynthesizer {
    pub fn new(api_key: Option<String>, config: &VoiceConfig) -> Result<Self, ProviderError> {
        if config.voice_id.trim().is_empty() {
            return Err(ProviderError::InvalidConfig {
                provider: PROVIDER,
                reason: "voice_id must not be empty".to_string(),
            });
        }

        let client = http_client(config.timeout_secs, PROVIDER)?;

        Ok(Self {
            api_key,
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            settings: VoiceSettings::from(config),
        })
    }

    /// Build the client with the key from `ELEVENLABS_API_KEY`, if set.
    pub fn from_env(config: &VoiceConfig) -> Result<Self, ProviderError> {
        let key = api_key(ELEVENLABS_KEY_VARS).ok();
        if key.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY not set; voice endpoints will fail");
        }
        Self::new(key, config)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    pub fn default_voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingApiKey(ELEVENLABS_KEY_VARS[0]))
    }

    fn speech_url(&self, voice_id: &str) -> String {
        format!("{}/text-to-speech/{}", self.base_url, voice_id)
    }

    /// Convert `text` to MP3 audio with `voice_id` or the default voice.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        let key = self.key()?;
        let voice_id = voice_id.filter(|v| !v.is_empty()).unwrap_or(&self.voice_id);

        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: &self.settings,
        };

        let response = self
            .client
            .post(self.speech_url(voice_id))
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, AUDIO_CONTENT_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;
        if audio.is_empty() {
            return Err(ProviderError::Empty { provider: PROVIDER });
        }

        tracing::info!(voice_id, bytes = audio.len(), "Synthesized speech");
        Ok(audio.to_vec())
    }

    /// Voices available to the account.
    pub async fn list_voices(&self) -> Result<Vec<Voice>, ProviderError> {
        let key = self.key()?;

        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", key)
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: VoicesResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::decode(PROVIDER, e))?;
        Ok(parsed.voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let synth = VoiceSynthesizer::new(None, &VoiceConfig::default()).unwrap();
        assert_eq!(synth.default_voice_id(), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(synth.settings().stability, 0.5);
        assert_eq!(synth.settings().similarity_boost, 0.75);
        assert!(synth.settings().use_speaker_boost);
        assert!(!synth.is_configured());
    }

    #[test]
    fn test_speech_request_body() {
        let settings = VoiceSettings::from(&VoiceConfig::default());
        let body = SpeechRequest {
            text: "Hello",
            model_id: "eleven_monolingual_v1",
            voice_settings: &settings,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "Hello");
        assert_eq!(json["model_id"], "eleven_monolingual_v1");
        assert_eq!(json["voice_settings"]["style"], 0.0);
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }

    #[test]
    fn test_speech_url_trims_slash() {
        let config = VoiceConfig {
            endpoint: "http://localhost:9999/v1/".to_string(),
            ..Default::default()
        };
        let synth = VoiceSynthesizer::new(Some("k".to_string()), &config).unwrap();
        assert_eq!(
            synth.speech_url("abc"),
            "http://localhost:9999/v1/text-to-speech/abc"
        );
    }

    #[test]
    fn test_empty_voice_id_rejected() {
        let config = VoiceConfig {
            voice_id: " ".to_string(),
            ..Default::default()
        };
        assert!(VoiceSynthesizer::new(None, &config).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let synth = VoiceSynthesizer::new(None, &VoiceConfig::default()).unwrap();
        let err = synth.synthesize("Hello", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey("ELEVENLABS_API_KEY")));
        assert!(synth.list_voices().await.is_err());
    }

    #[test]
    fn test_voices_response_tolerates_extra_fields() {
        let parsed: VoicesResponse = serde_json::from_str(
            r#"{"voices":[{"voice_id":"v1","name":"Rachel","labels":{"accent":"american"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.voices.len(), 1);
        assert_eq!(parsed.voices[0].name, "Rachel");
        assert!(parsed.voices[0].category.is_none());
    }
}
