use std::fmt::{Display, Formatter};

/// One rung of the quality ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Low,
    Medium,
    High,
    Lossless,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Low,
        Variant::Medium,
        Variant::High,
        Variant::Lossless,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Low => "low",
            Variant::Medium => "medium",
            Variant::High => "high",
            Variant::Lossless => "lossless",
        }
    }

    /// Case-insensitive lookup by ladder name.
    pub fn parse(value: &str) -> Option<Variant> {
        let value = value.trim();
        Variant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(value))
    }

    /// Maps a client supplied quality to a variant. Missing or unknown
    /// values fall back to `Medium`.
    pub fn from_quality(quality: Option<&str>) -> Variant {
        quality.and_then(Variant::parse).unwrap_or(Variant::Medium)
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a variant is produced from the uploaded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Re-encode into an MP3 container at a fixed bitrate (kbit/s).
    Bitrate { kbps: u32 },
    /// Verbatim byte copy of the source.
    Passthrough,
}

#[derive(Debug)]
pub struct VariantSpec {
    pub variant: Variant,
    pub encoding: Encoding,
    applies_to: fn(&str) -> bool,
}

impl VariantSpec {
    pub fn applies_to(&self, source_ext: &str) -> bool {
        (self.applies_to)(&normalize_ext(source_ext))
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.encoding, Encoding::Passthrough)
    }

    /// `<stem>-<variant>.mp3` for bitrate variants, `<stem>-lossless<ext>` for passthrough.
    pub fn file_name(&self, stem: &str, source_ext: &str) -> String {
        match self.encoding {
            Encoding::Bitrate { .. } => format!("{}-{}.mp3", stem, self.variant),
            Encoding::Passthrough => {
                format!("{}-{}{}", stem, self.variant, normalize_ext(source_ext))
            }
        }
    }
}

fn always(_ext: &str) -> bool {
    true
}

fn flac_only(ext: &str) -> bool {
    ext == ".flac"
}

static REGISTRY: [VariantSpec; 4] = [
    VariantSpec {
        variant: Variant::Low,
        encoding: Encoding::Bitrate { kbps: 64 },
        applies_to: always,
    },
    VariantSpec {
        variant: Variant::Medium,
        encoding: Encoding::Bitrate { kbps: 128 },
        applies_to: always,
    },
    VariantSpec {
        variant: Variant::High,
        encoding: Encoding::Bitrate { kbps: 320 },
        applies_to: always,
    },
    VariantSpec {
        variant: Variant::Lossless,
        encoding: Encoding::Passthrough,
        applies_to: flac_only,
    },
];

/// Ladder order is fixed: low, medium, high, lossless.
pub fn applicable_variants(source_ext: &str) -> Vec<&'static VariantSpec> {
    REGISTRY
        .iter()
        .filter(|spec| spec.applies_to(source_ext))
        .collect()
}

pub fn spec_for(variant: Variant) -> &'static VariantSpec {
    REGISTRY
        .iter()
        .find(|spec| spec.variant == variant)
        .unwrap_or(&REGISTRY[1])
}

pub fn variant_file_name(stem: &str, variant: Variant, source_ext: &str) -> String {
    spec_for(variant).file_name(stem, source_ext)
}

/// Lowercase with a single leading dot, e.g. `FLAC` -> `.flac`.
pub fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.');
    format!(".{}", ext.to_ascii_lowercase())
}
