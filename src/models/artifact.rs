// file: src/models/artifact.rs
// description: artifact types and references resolved against a stage directory
// reference: internal data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Fasta,
    ProteinFasta,
    Tsv,
    Csv,
    Json,
    Html,
}

impl ArtifactType {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ArtifactType::Fasta => &["fasta", "fa", "fna", "fas", "aln"],
            ArtifactType::ProteinFasta => &["faa", "fasta", "fa"],
            ArtifactType::Tsv => &["tsv", "tab", "txt"],
            ArtifactType::Csv => &["csv"],
            ArtifactType::Json => &["json"],
            ArtifactType::Html => &["html", "htm"],
        }
    }

    pub fn accepts_extension(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactType::Fasta => "fasta",
            ArtifactType::ProteinFasta => "protein-fasta",
            ArtifactType::Tsv => "tsv",
            ArtifactType::Csv => "csv",
            ArtifactType::Json => "json",
            ArtifactType::Html => "html",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A file named by a manifest. `location` is the key path inside the manifest
/// (`genomes[1].fasta`), kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub location: String,
    pub declared: PathBuf,
    pub resolved: PathBuf,
    pub artifact_type: ArtifactType,
}

impl ArtifactReference {
    pub fn new(
        location: impl Into<String>,
        declared: impl Into<PathBuf>,
        artifact_type: ArtifactType,
        stage_dir: &Path,
    ) -> Self {
        let declared = declared.into();
        let resolved = resolve_artifact_path(stage_dir, &declared);
        Self {
            location: location.into(),
            declared,
            resolved,
            artifact_type,
        }
    }
}

/// Relative paths are anchored at the stage directory; absolute ones are kept.
pub fn resolve_artifact_path(stage_dir: &Path, declared: &Path) -> PathBuf {
    if declared.is_absolute() {
        declared.to_path_buf()
    } else {
        stage_dir.join(declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_inside_stage_dir() {
        let reference = ArtifactReference::new(
            "metadata_csv",
            "metadata.csv",
            ArtifactType::Csv,
            Path::new("/runs/x/01_harvester"),
        );
        assert_eq!(
            reference.resolved,
            PathBuf::from("/runs/x/01_harvester/metadata.csv")
        );
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let resolved = resolve_artifact_path(Path::new("/runs/x"), Path::new("/data/g.fasta"));
        assert_eq!(resolved, PathBuf::from("/data/g.fasta"));
    }

    #[test]
    fn test_extension_matching() {
        assert!(ArtifactType::Fasta.accepts_extension(Path::new("a.FNA")));
        assert!(ArtifactType::ProteinFasta.accepts_extension(Path::new("a.faa")));
        assert!(!ArtifactType::Csv.accepts_extension(Path::new("a.tsv")));
        assert!(!ArtifactType::Html.accepts_extension(Path::new("report")));
    }
}
