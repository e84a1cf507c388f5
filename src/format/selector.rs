//! Format selection: pick an encoding for an item from user preferences.

use serde::{Deserialize, Serialize};

use crate::config::{ChapterType, DownloadConfig, Quality};
use crate::error::{Error, Result};
use crate::media::{AcquisitionItem, CodecFamily, DrmType, Encoding, QualityTier};

/// User preferences driving format selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub codec_family: CodecFamily,
    /// Widen to the alternate family when the preferred one has no encoding.
    pub fallback: bool,
    pub quality: Quality,
    /// Codec labels preferred, in order, when several encodings share a tier.
    pub quality_priority: Vec<String>,
    pub chapter_type: ChapterType,
    pub annotations: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default())
    }
}

impl Preferences {
    pub fn from_config(download: &DownloadConfig) -> Self {
        Self {
            codec_family: download.codec,
            fallback: download.fallback,
            quality: download.quality,
            quality_priority: download.quality_priority.clone(),
            chapter_type: download.chapter_type,
            annotations: download.annotations,
        }
    }

    /// Highest tier allowed by the requested quality.
    fn tier_cap(&self) -> Option<QualityTier> {
        match self.quality {
            Quality::Best => None,
            Quality::High => Some(QualityTier::High),
            Quality::Normal => Some(QualityTier::Normal),
        }
    }

    /// Families to try, in order.
    fn families(&self) -> Vec<CodecFamily> {
        let mut families = vec![self.codec_family];
        if self.fallback {
            families.push(self.codec_family.alternate());
        }
        families
    }

    fn priority_rank(&self, encoding: &Encoding) -> usize {
        self.quality_priority
            .iter()
            .position(|label| label.eq_ignore_ascii_case(&encoding.codec))
            .unwrap_or(usize::MAX)
    }
}

/// Outcome of format selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatChoice {
    /// Codec label requested from the catalog.
    pub codec: String,
    pub family: CodecFamily,
    pub drm: DrmType,
    pub tier: QualityTier,
    /// Quality requested by the user.
    pub quality: Quality,
    pub chapter_type: ChapterType,
    pub annotations: bool,
    /// The preferred family had nothing usable.
    pub fell_back: bool,
    /// Nothing satisfied the quality cap, so the best candidate was taken.
    pub cap_relaxed: bool,
}

impl FormatChoice {
    /// Identity of the format for resume-state and voucher matching.
    pub fn format_key(&self) -> String {
        format!("{}/{}/{}", self.codec, self.quality, self.chapter_type)
    }

    #[cfg(test)]
    pub fn for_tests(codec: &str, drm: DrmType) -> Self {
        Self {
            codec: codec.to_string(),
            family: drm.family(),
            drm,
            tier: QualityTier::High,
            quality: Quality::Best,
            chapter_type: ChapterType::Tree,
            annotations: false,
            fell_back: false,
            cap_relaxed: false,
        }
    }
}

/// Choose an encoding for `item` according to `prefs`.
///
/// Candidate families are evaluated in order; the first family with any
/// encoding decides. Within it the highest tier not above the cap wins, ties
/// are broken by the priority list, then by catalog order.
pub fn select(item: &AcquisitionItem, prefs: &Preferences) -> Result<FormatChoice> {
    for (index, family) in prefs.families().into_iter().enumerate() {
        // Subscription titles are never offered in the legacy family.
        if family == CodecFamily::Legacy && item.is_ayce {
            continue;
        }

        let candidates: Vec<&Encoding> = item
            .encodings
            .iter()
            .filter(|e| e.family() == family)
            .collect();

        if let Some((encoding, cap_relaxed)) = pick(&candidates, prefs) {
            return Ok(FormatChoice {
                codec: encoding.codec.clone(),
                family,
                drm: encoding.drm,
                tier: encoding.tier(),
                quality: prefs.quality,
                chapter_type: prefs.chapter_type,
                annotations: prefs.annotations,
                fell_back: index > 0,
                cap_relaxed,
            });
        }
    }

    let tried: Vec<String> = prefs.families().iter().map(|f| f.to_string()).collect();
    Err(Error::NoCompatibleFormat {
        item: item.id.clone(),
        reason: format!("no encoding in codec family {}", tried.join(" or ")),
    })
}

fn pick<'a>(candidates: &[&'a Encoding], prefs: &Preferences) -> Option<(&'a Encoding, bool)> {
    let capped: Vec<&Encoding> = match prefs.tier_cap() {
        Some(cap) => candidates.iter().copied().filter(|e| e.tier() <= cap).collect(),
        None => candidates.to_vec(),
    };

    let (pool, cap_relaxed) = if capped.is_empty() {
        (candidates.to_vec(), true)
    } else {
        (capped, false)
    };

    let best_tier = pool.iter().map(|e| e.tier()).max()?;

    pool.into_iter()
        .enumerate()
        .filter(|(_, e)| e.tier() == best_tier)
        .min_by_key(|(position, e)| (prefs.priority_rank(e), *position))
        .map(|(_, e)| (e, cap_relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ItemKind;

    fn encoding(codec: &str, drm: DrmType, bitrate: u32) -> Encoding {
        Encoding {
            codec: codec.to_string(),
            drm,
            sample_rate: 44100,
            bitrate,
        }
    }

    fn book(encodings: Vec<Encoding>) -> AcquisitionItem {
        let mut item = AcquisitionItem::new("B000000001", ItemKind::Book, "Book");
        item.encodings = encodings;
        item
    }

    fn prefs() -> Preferences {
        Preferences {
            quality_priority: Vec::new(),
            ..Preferences::default()
        }
    }

    #[test]
    fn test_picks_highest_tier_in_preferred_family() {
        let item = book(vec![
            encoding("LC_64_44100_stereo", DrmType::Adrm, 64),
            encoding("LC_128_44100_stereo", DrmType::Adrm, 128),
            encoding("AAX_44_128", DrmType::Aax, 128),
        ]);

        let choice = select(&item, &prefs()).unwrap();
        assert_eq!(choice.codec, "LC_128_44100_stereo");
        assert_eq!(choice.family, CodecFamily::Wrapped);
        assert!(!choice.fell_back);
    }

    #[test]
    fn test_fallback_to_legacy_family() {
        let item = book(vec![encoding("AAX_44_128", DrmType::Aax, 128)]);

        let choice = select(&item, &prefs()).unwrap();
        assert_eq!(choice.family, CodecFamily::Legacy);
        assert_eq!(choice.drm, DrmType::Aax);
        assert!(choice.fell_back);
    }

    #[test]
    fn test_no_fallback_fails_permanently() {
        let item = book(vec![encoding("AAX_44_128", DrmType::Aax, 128)]);
        let prefs = Preferences {
            fallback: false,
            ..prefs()
        };

        let err = select(&item, &prefs).unwrap_err();
        assert!(matches!(err, Error::NoCompatibleFormat { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_ayce_never_legacy() {
        let mut item = book(vec![encoding("AAX_44_128", DrmType::Aax, 128)]);
        item.is_ayce = true;
        let prefs = Preferences {
            codec_family: CodecFamily::Legacy,
            ..prefs()
        };

        assert!(select(&item, &prefs).is_err());

        item.encodings
            .push(encoding("LC_64_44100_stereo", DrmType::Adrm, 64));
        let choice = select(&item, &prefs).unwrap();
        assert_eq!(choice.family, CodecFamily::Wrapped);
        assert!(choice.fell_back);
    }

    #[test]
    fn test_quality_cap_and_relaxation() {
        let item = book(vec![
            encoding("LC_128_44100_stereo", DrmType::Adrm, 128),
            encoding("LC_64_44100_stereo", DrmType::Adrm, 64),
        ]);
        let normal = Preferences {
            quality: Quality::Normal,
            ..prefs()
        };

        let choice = select(&item, &normal).unwrap();
        assert_eq!(choice.codec, "LC_64_44100_stereo");
        assert!(!choice.cap_relaxed);

        let high_only = book(vec![encoding("LC_128_44100_stereo", DrmType::Adrm, 128)]);
        let choice = select(&high_only, &normal).unwrap();
        assert_eq!(choice.codec, "LC_128_44100_stereo");
        assert!(choice.cap_relaxed);
    }

    #[test]
    fn test_tie_break_priority_then_order() {
        let item = book(vec![
            encoding("LC_128_22050_stereo", DrmType::Adrm, 128),
            encoding("LC_128_44100_stereo", DrmType::Adrm, 128),
        ]);

        let choice = select(&item, &prefs()).unwrap();
        assert_eq!(choice.codec, "LC_128_22050_stereo");

        let prioritized = Preferences {
            quality_priority: vec!["lc_128_44100_stereo".to_string()],
            ..prefs()
        };
        let choice = select(&item, &prioritized).unwrap();
        assert_eq!(choice.codec, "LC_128_44100_stereo");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let item = book(vec![
            encoding("LC_64_44100_stereo", DrmType::Adrm, 64),
            encoding("LC_128_22050_stereo", DrmType::Adrm, 128),
            encoding("LC_128_44100_stereo", DrmType::Adrm, 128),
            encoding("AAX_44_128", DrmType::Aax, 128),
        ]);

        let first = select(&item, &prefs()).unwrap();
        for _ in 0..10 {
            assert_eq!(select(&item, &prefs()).unwrap(), first);
        }
    }

    #[test]
    fn test_format_key_changes_with_quality() {
        let item = book(vec![encoding("LC_64_44100_stereo", DrmType::Adrm, 64)]);
        let best = select(&item, &prefs()).unwrap();
        let normal = select(
            &item,
            &Preferences {
                quality: Quality::Normal,
                ..prefs()
            },
        )
        .unwrap();

        assert_ne!(best.format_key(), normal.format_key());
    }
}
