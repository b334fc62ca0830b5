//! Step catalog: the ordered phase names shown for each conversion kind.

use std::collections::HashMap;

/// Steps used for kinds the catalog does not know.
pub const DEFAULT_STEPS: &[&str] = &["Processing file"];

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "PDF_TO_WORD",
        &[
            "Uploading file",
            "Analyzing PDF structure",
            "Extracting text",
            "Extracting images",
            "Rebuilding layout",
            "Generating Word document",
            "Finalizing conversion",
        ],
    ),
    (
        "WORD_TO_PDF",
        &[
            "Uploading file",
            "Parsing document",
            "Rendering pages",
            "Embedding fonts",
            "Finalizing conversion",
        ],
    ),
    (
        "PDF_TO_IMAGE",
        &[
            "Uploading file",
            "Loading PDF",
            "Rasterizing pages",
            "Encoding images",
            "Packaging output",
            "Finalizing conversion",
        ],
    ),
    (
        "IMAGE_TO_PDF",
        &[
            "Uploading file",
            "Decoding images",
            "Composing pages",
            "Finalizing conversion",
        ],
    ),
    (
        "EPUB_TO_PDF",
        &[
            "Uploading file",
            "Unpacking e-book",
            "Parsing chapters",
            "Laying out pages",
            "Rendering PDF",
            "Finalizing conversion",
        ],
    ),
    (
        "DWG_TO_PDF",
        &[
            "Uploading file",
            "Reading drawing",
            "Resolving layers",
            "Plotting layouts",
            "Rendering PDF",
            "Finalizing conversion",
        ],
    ),
    (
        "MERGE_PDF",
        &[
            "Uploading files",
            "Validating documents",
            "Merging pages",
            "Finalizing conversion",
        ],
    ),
    (
        "COMPRESS_PDF",
        &[
            "Uploading file",
            "Analyzing content",
            "Optimizing images",
            "Rewriting streams",
            "Finalizing conversion",
        ],
    ),
];

/// Maps a conversion kind to its ordered list of step labels.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    entries: HashMap<String, Vec<String>>,
    fallback: Vec<String>,
}

impl StepCatalog {
    /// Catalog containing only the built-in kinds.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(kind, steps)| {
                (
                    kind.to_string(),
                    steps.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();

        Self {
            entries,
            fallback: DEFAULT_STEPS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Built-in catalog with `overrides` layered on top. Entries with an
    /// empty step list are skipped; config validation rejects them earlier.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut catalog = Self::builtin();
        for (kind, steps) in overrides {
            if steps.is_empty() {
                log::warn!("Ignoring empty step list for kind '{}'", kind);
                continue;
            }
            catalog.entries.insert(kind.clone(), steps.clone());
        }
        catalog
    }

    /// Steps for `kind`, falling back to the single-bucket default.
    pub fn steps(&self, kind: &str) -> &[String] {
        self.entries
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or(&self.fallback)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Position of `label` within the steps for `kind`.
    pub fn position(&self, kind: &str, label: &str) -> Option<usize> {
        self.steps(kind).iter().position(|s| s == label)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
