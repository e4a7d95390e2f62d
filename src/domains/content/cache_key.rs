//! `content_cache_key` computation (spec §4.E step 3).

use sha2::{Digest, Sha256};

pub fn content_cache_key(
    topic: &str,
    formats: &[String],
    prompt_version: &str,
    model: &str,
    moderation_version: &str,
) -> String {
    let mut sorted = formats.to_vec();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(topic.trim().to_lowercase().as_bytes());
    hasher.update(sorted.join(",").as_bytes());
    hasher.update(prompt_version.as_bytes());
    hasher.update(model.as_bytes());
    hasher.update(moderation_version.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_under_format_reordering() {
        let a = content_cache_key("topic", &["social".into(), "blog".into()], "v1", "gpt-4o", "m1");
        let b = content_cache_key("topic", &["blog".into(), "social".into()], "v1", "gpt-4o", "m1");
        assert_eq!(a, b);
    }

    #[test]
    fn key_changes_with_model() {
        let a = content_cache_key("topic", &["blog".into()], "v1", "gpt-4o", "m1");
        let b = content_cache_key("topic", &["blog".into()], "v1", "gpt-4o-mini", "m1");
        assert_ne!(a, b);
    }
}
