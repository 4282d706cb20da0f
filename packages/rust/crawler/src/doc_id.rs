//! Document id resolution.
//!
//! Resolution order: pattern match on the page URL, then on a configured
//! metadata field, then a truncated slug of the title. The source of the
//! value is kept so fallback ids (which can collide) are visible. Slugs are
//! bounded in bytes so they stay inside filesystem name limits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use archivist_shared::{ArchiveConfig, ArchivistError, Result};

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-_. ]").expect("valid regex"));

/// Where a [`DocId`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocIdSource {
    MatchedByUrl,
    MatchedByMetadata,
    FallbackSlug,
}

impl DocIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchedByUrl => "matched_by_url",
            Self::MatchedByMetadata => "matched_by_metadata",
            Self::FallbackSlug => "fallback_slug",
        }
    }
}

/// A resolved document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocId {
    pub value: String,
    pub source: DocIdSource,
}

/// Ordered id resolver built from the archive config.
#[derive(Debug, Clone)]
pub struct DocIdResolver {
    pattern: Regex,
    metadata_field: String,
    slug_max_len: usize,
}

impl DocIdResolver {
    pub fn from_config(archive: &ArchiveConfig) -> Result<Self> {
        let pattern = Regex::new(&archive.doc_id_pattern).map_err(|e| {
            ArchivistError::config(format!(
                "archive.doc_id_pattern {:?} is not a valid regex: {e}",
                archive.doc_id_pattern
            ))
        })?;
        Ok(Self {
            pattern,
            metadata_field: archive.doc_id_metadata_field.clone(),
            slug_max_len: archive.slug_max_len,
        })
    }

    pub fn resolve(&self, url: &str, metadata: &BTreeMap<String, String>, title: &str) -> DocId {
        if let Some(m) = self.pattern.find(url) {
            return DocId {
                value: file_safe(m.as_str()),
                source: DocIdSource::MatchedByUrl,
            };
        }

        if let Some(m) = metadata
            .get(&self.metadata_field)
            .and_then(|value| self.pattern.find(value))
        {
            return DocId {
                value: file_safe(m.as_str()),
                source: DocIdSource::MatchedByMetadata,
            };
        }

        let mut slug = truncate_utf8(&slugify(title), self.slug_max_len).to_string();
        if slug.is_empty() {
            slug = "untitled".into();
        }
        DocId {
            value: slug,
            source: DocIdSource::FallbackSlug,
        }
    }
}

/// Path separators in a matched id would escape the snapshot directory.
fn file_safe(id: &str) -> String {
    id.replace(['/', '\\'], "_")
}

/// Filesystem-safe form of a title: punctuation dropped, spaces to `_`.
pub fn slugify(text: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(text, "")
        .trim()
        .replace(' ', "_")
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a character.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DocIdResolver {
        DocIdResolver::from_config(&ArchiveConfig::default()).unwrap()
    }

    #[test]
    fn url_match_wins() {
        let metadata = BTreeMap::from([(
            "Document Number (FOIA) /ESDN (CREST)".to_string(),
            "CIA-RDP99-00000R000000000000-0".to_string(),
        )]);
        let id = resolver().resolve(
            "https://www.cia.gov/readingroom/document/CIA-RDP79T00975A000100010001-1",
            &metadata,
            "Bulletin",
        );
        assert_eq!(id.source, DocIdSource::MatchedByUrl);
        assert_eq!(id.value, "CIA-RDP79T00975A000100010001-1");
    }

    #[test]
    fn metadata_field_is_second() {
        let metadata = BTreeMap::from([(
            "Document Number (FOIA) /ESDN (CREST)".to_string(),
            "CIA-RDP80-00810A000100010001-2".to_string(),
        )]);
        let id = resolver().resolve(
            "https://www.cia.gov/readingroom/document/cia-rdp80-00810a000100010001-2",
            &metadata,
            "Bulletin",
        );
        assert_eq!(id.source, DocIdSource::MatchedByMetadata);
        assert_eq!(id.value, "CIA-RDP80-00810A000100010001-2");
    }

    #[test]
    fn slug_fallback_truncates() {
        let id = resolver().resolve(
            "https://www.cia.gov/readingroom/document/06753812",
            &BTreeMap::new(),
            "Soviet Missile Deployment in Cuba: Daily Report (No. 12), Annex B",
        );
        assert_eq!(id.source, DocIdSource::FallbackSlug);
        assert_eq!(id.value, "Soviet_Missile_Deployment_in_Cuba_Daily_");
        assert_eq!(id.value.chars().count(), 40);
    }

    #[test]
    fn matched_ids_never_contain_separators() {
        let id = resolver().resolve(
            "https://www.cia.gov/readingroom/docs/CIA-RDP79T00975A000100010001-1/full",
            &BTreeMap::new(),
            "",
        );
        assert_eq!(id.value, "CIA-RDP79T00975A000100010001-1_full");
    }

    #[test]
    fn empty_slug_becomes_untitled() {
        let id = resolver().resolve("https://www.cia.gov/x", &BTreeMap::new(), "?!");
        assert_eq!(id.value, "untitled");
    }

    #[test]
    fn non_ascii_slug_is_bounded_in_bytes() {
        let id = resolver().resolve(
            "https://www.cia.gov/readingroom/document/06753812",
            &BTreeMap::new(),
            &"中央情报局".repeat(20),
        );
        assert_eq!(id.source, DocIdSource::FallbackSlug);
        assert_eq!(id.value, "中央情报局中央情报局中央情");
        assert_eq!(id.value.len(), 39);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_utf8("Memo", 10), "Memo");
        assert_eq!(truncate_utf8("Memo", 2), "Me");
        assert_eq!(truncate_utf8("café", 4), "caf");
        assert_eq!(truncate_utf8("情报", 5), "情");
        assert_eq!(truncate_utf8("情报", 0), "");
    }

    #[test]
    fn slugify_keeps_word_chars_dots_and_dashes() {
        assert_eq!(slugify("  Memo re: U.S.-Cuba (draft) "), "Memo_re_U.S.-Cuba_draft");
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let archive = ArchiveConfig {
            doc_id_pattern: "(".into(),
            ..ArchiveConfig::default()
        };
        assert!(matches!(
            DocIdResolver::from_config(&archive),
            Err(ArchivistError::Config { .. })
        ));
    }
}
