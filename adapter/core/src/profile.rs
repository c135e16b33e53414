//! Provider profiles
//!
//! A profile is the whole declarative description of how to talk to one
//! provider for one purpose: transport, response mapping and workflow.
//! Profiles are loaded from JSON, validated once, then shared read-only
//! across invocations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::response::{ResponseMappingSpec, ResponseMode};
use crate::workflow::WorkflowSpec;

/// What a profile produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Conversational text
    Chat,
    /// Image generation
    Image,
    /// Speech and sound
    Audio,
    /// Video generation
    Video,
    /// Music generation
    Music,
    /// Mixed inputs or outputs
    Multimodal,
    /// Vector embeddings
    Embedding,
    /// Code assistance
    Code,
}

impl Purpose {
    /// All purposes, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Chat,
        Self::Image,
        Self::Audio,
        Self::Video,
        Self::Music,
        Self::Multimodal,
        Self::Embedding,
        Self::Code,
    ];

    /// Lower-case name as stored
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Music => "music",
            Self::Multimodal => "multimodal",
            Self::Embedding => "embedding",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Declarative provider profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier
    pub id: String,
    /// Provider name (`openai`, `replicate`, ...)
    pub provider: String,
    /// Model this profile is specific to; `None` covers the whole provider
    #[serde(default)]
    pub model: Option<String>,
    /// What the profile produces
    pub purpose: Purpose,
    /// Credential reference handed to the auth resolver
    #[serde(default)]
    pub auth_ref: Option<String>,
    /// Disabled profiles are never executed
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// First (or only) HTTP call
    #[serde(default)]
    pub transport: crate::transport::TransportSpec,
    /// Response interpretation
    #[serde(default)]
    pub response: ResponseMappingSpec,
    /// Sync call or async job
    #[serde(default)]
    pub workflow: WorkflowSpec,
}

impl Profile {
    /// Parse and validate a profile from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for malformed JSON, unknown tags or a
    /// failed [`Self::validate`].
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let profile: Self = serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("invalid profile: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Parse and validate a profile from an already decoded JSON value
    ///
    /// # Errors
    ///
    /// See [`Self::from_json`].
    pub fn from_value(value: serde_json::Value) -> EngineResult<Self> {
        let profile: Self = serde_json::from_value(value)
            .map_err(|e| EngineError::config(format!("invalid profile: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Cross-field checks serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the first problem found.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::config("profile id is empty"));
        }
        if self.provider.trim().is_empty() {
            return Err(EngineError::config(format!("profile '{}' has no provider", self.id)));
        }
        if self.transport.path.trim().is_empty() && self.transport.base_url.is_none() {
            return Err(EngineError::config(format!(
                "profile '{}' declares neither transport.path nor transport.base_url",
                self.id
            )));
        }

        let required = match self.response.mode {
            ResponseMode::JsonBase64 => Some("base64_path"),
            ResponseMode::ImageUrls => Some("urls_path"),
            ResponseMode::AudioDataUrl => Some("data_url_path"),
            ResponseMode::Text | ResponseMode::Binary | ResponseMode::RawJson => None,
        };
        if let Some(name) = required {
            if self.response.path(name).is_none() {
                return Err(EngineError::config(format!(
                    "profile '{}' response mode requires extract.{name}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Whether this profile targets a specific model
    #[must_use]
    pub fn is_model_specific(&self) -> bool {
        self.model.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

/// Pick the profile to use for a provider, purpose and (optional) model
///
/// A model-specific profile outranks a provider-wide one. Disabled profiles
/// are skipped.
#[must_use]
pub fn select_profile<'a>(
    profiles: &'a [Profile],
    provider: &str,
    purpose: Purpose,
    model: Option<&str>,
) -> Option<&'a Profile> {
    let candidates = || {
        profiles
            .iter()
            .filter(|p| p.enabled && p.purpose == purpose && p.provider.eq_ignore_ascii_case(provider))
    };

    if let Some(model) = model {
        if let Some(specific) = candidates().find(|p| p.model.as_deref() == Some(model)) {
            return Some(specific);
        }
    }
    candidates().find(|p| !p.is_model_specific())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(id: &str, model: Option<&str>) -> Profile {
        Profile::from_value(json!({
            "id": id,
            "provider": "openai",
            "model": model,
            "purpose": "image",
            "transport": {"path": "/v1/images/generations"},
            "response": {"mode": "image_urls", "extract": {"urls_path": "data[].url"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let p = profile("p1", None);
        assert!(p.enabled);
        assert_eq!(p.workflow, WorkflowSpec::Sync);
        assert!(!p.is_model_specific());
    }

    #[test]
    fn test_unknown_tags_rejected() {
        let err = Profile::from_json(r#"{"id":"x","provider":"p","purpose":"hologram","transport":{"path":"/"}}"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = Profile::from_json(
            r#"{"id":"x","provider":"p","purpose":"chat","transport":{"path":"/"},"response":{"mode":"xml"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_mode_requires_its_path() {
        let err = Profile::from_value(json!({
            "id": "x", "provider": "p", "purpose": "image",
            "transport": {"path": "/gen"},
            "response": {"mode": "json_base64"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("base64_path"));
    }

    #[test]
    fn test_async_without_poll_rejected() {
        let err = Profile::from_value(json!({
            "id": "x", "provider": "p", "purpose": "video",
            "transport": {"path": "/jobs"},
            "workflow": {"type": "async_job", "job_id_path": "id", "steps": []}
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_model_specific_outranks_provider_wide() {
        let profiles = vec![
            profile("wide", None),
            profile("dalle3", Some("dall-e-3")),
        ];
        let picked = select_profile(&profiles, "OpenAI", Purpose::Image, Some("dall-e-3")).unwrap();
        assert_eq!(picked.id, "dalle3");

        let picked = select_profile(&profiles, "openai", Purpose::Image, Some("gpt-image-1")).unwrap();
        assert_eq!(picked.id, "wide");

        let picked = select_profile(&profiles, "openai", Purpose::Image, None).unwrap();
        assert_eq!(picked.id, "wide");

        assert!(select_profile(&profiles, "openai", Purpose::Chat, None).is_none());
    }

    #[test]
    fn test_disabled_profiles_skipped() {
        let mut wide = profile("wide", None);
        wide.enabled = false;
        assert!(select_profile(&[wide], "openai", Purpose::Image, None).is_none());
    }
}
