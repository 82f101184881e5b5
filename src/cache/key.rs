//! Cache key derivation.
//!
//! Keys are SHA-256 digests over the normalised prompt, provider, model,
//! generation parameters and context digest. Unlike an in-process
//! `DefaultHasher` key, the digest is stable across processes, which the
//! snapshot export/import relies on.

use sha2::{Digest, Sha256};

use crate::types::{ContextFlags, ImageAttachment, Provider, ProviderParams};

/// Everything that identifies a cached response.
#[derive(Debug, Clone, Copy)]
pub struct CacheQuery<'a> {
    pub prompt: &'a str,
    pub provider: Provider,
    pub model: &'a str,
    pub params: &'a ProviderParams,
    /// Digest of the side-context (documents, web results) the answer
    /// depends on. Empty when there is none.
    pub context_digest: &'a str,
}

impl<'a> CacheQuery<'a> {
    pub fn new(
        prompt: &'a str,
        provider: Provider,
        model: &'a str,
        params: &'a ProviderParams,
        context_digest: &'a str,
    ) -> Self {
        Self {
            prompt,
            provider,
            model,
            params,
            context_digest,
        }
    }

    /// Hex-encoded cache key for this query.
    pub fn key(&self) -> String {
        cache_key(
            self.prompt,
            self.provider,
            self.model,
            self.params,
            self.context_digest,
        )
    }
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute the hex-encoded SHA-256 cache key.
pub fn cache_key(
    prompt: &str,
    provider: Provider,
    model: &str,
    params: &ProviderParams,
    context_digest: &str,
) -> String {
    let params = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    for part in [
        normalize_prompt(prompt).as_str(),
        provider.as_str(),
        model,
        params.as_str(),
        context_digest,
    ] {
        hasher.update(part.as_bytes());
        // unit separator keeps ("ab", "c") and ("a", "bc") apart
        hasher.update([0x1f]);
    }
    hex(&hasher.finalize())
}

/// Fold the context flags and attached images into the caller's context
/// digest.
///
/// Text-only requests without side-context keep `base` unchanged.
pub fn context_digest(base: &str, context: ContextFlags, images: &[ImageAttachment]) -> String {
    if !context.any() && images.is_empty() {
        return base.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update([
        0x1f,
        u8::from(context.has_document_context),
        u8::from(context.has_web_context),
        u8::from(context.has_image_context),
    ]);
    for image in images {
        hasher.update([0x1f]);
        hasher.update(image.mime_type.as_bytes());
        hasher.update([0x1e]);
        hasher.update(image.data.as_bytes());
    }
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ProviderParams {
        ProviderParams::defaults_for(Provider::Gemini)
    }

    #[test]
    fn cache_key_deterministic() {
        let p = params();
        let k1 = cache_key("hello", Provider::Gemini, "gemini-pro", &p, "");
        let k2 = cache_key("hello", Provider::Gemini, "gemini-pro", &p, "");
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn cache_key_ignores_case_and_spacing() {
        let p = params();
        let k1 = cache_key("Quelle est  la capitale ?", Provider::Gemini, "m", &p, "");
        let k2 = cache_key("  quelle est la CAPITALE ?\n", Provider::Gemini, "m", &p, "");
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_each_component() {
        let p = params();
        let base = cache_key("hello", Provider::Gemini, "m", &p, "");
        assert_ne!(base, cache_key("hello!", Provider::Gemini, "m", &p, ""));
        assert_ne!(
            base,
            cache_key("hello", Provider::OpenAi, "m", &ProviderParams::defaults_for(Provider::OpenAi), "")
        );
        assert_ne!(base, cache_key("hello", Provider::Gemini, "m2", &p, ""));
        assert_ne!(
            base,
            cache_key("hello", Provider::Gemini, "m", &p.clone().with_sampling(0.1, 0.9, 100), "")
        );
        assert_ne!(base, cache_key("hello", Provider::Gemini, "m", &p, "docs:abc"));
    }

    #[test]
    fn context_digest_covers_flags_and_images() {
        let none = ContextFlags::new();
        let cat = [ImageAttachment::new("image/png", "Q0FU")];
        let dog = [ImageAttachment::new("image/png", "RE9H")];
        let with_images = ContextFlags::new().images(true);

        assert_eq!(context_digest("doc-v1", none, &[]), "doc-v1");
        assert_ne!(context_digest("", none, &[]), context_digest("", ContextFlags::new().web(true), &[]));
        assert_ne!(context_digest("", with_images, &cat), context_digest("", with_images, &dog));
        assert_ne!(
            context_digest("", with_images, &cat),
            context_digest("", with_images, &[ImageAttachment::new("image/jpeg", "Q0FU")])
        );
        assert_eq!(context_digest("", with_images, &cat), context_digest("", with_images, &cat));
    }

    #[test]
    fn cache_key_separates_components() {
        let p = params();
        assert_ne!(
            cache_key("ab", Provider::Gemini, "c", &p, ""),
            cache_key("a", Provider::Gemini, "bc", &p, "")
        );
    }

    #[test]
    fn query_key_matches_free_function() {
        let p = params();
        let q = CacheQuery::new("hi", Provider::Gemini, "m", &p, "d");
        assert_eq!(q.key(), cache_key("hi", Provider::Gemini, "m", &p, "d"));
    }
}
