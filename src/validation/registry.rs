// file: src/validation/registry.rs
// description: per-stage manifest schemas (required keys, shapes, artifact types)
// reference: inter-stage data contract

use crate::models::{ArtifactType, Stage};

/// How the value under a required key is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// A single path to an artifact.
    Path(ArtifactType),
    /// An ordered sequence of artifact descriptors: objects carrying a logical
    /// identifier and one or more path fields.
    Entries {
        id_field: &'static str,
        path_fields: &'static [(&'static str, ArtifactType)],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub key: &'static str,
    pub shape: KeyShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestSchema {
    pub stage: Stage,
    pub keys: &'static [KeySpec],
    /// Files the stage must leave in its directory regardless of any manifest.
    pub terminal_artifacts: &'static [(&'static str, ArtifactType)],
}

impl ManifestSchema {
    pub fn key_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keys.iter().map(|spec| spec.key)
    }

    pub fn expects_manifest(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn artifact_types(&self) -> Vec<ArtifactType> {
        let mut types: Vec<ArtifactType> = Vec::new();
        let mut add = |t: ArtifactType| {
            if !types.contains(&t) {
                types.push(t);
            }
        };
        for spec in self.keys {
            match spec.shape {
                KeyShape::Path(t) => add(t),
                KeyShape::Entries { path_fields, .. } => {
                    path_fields.iter().for_each(|(_, t)| add(*t))
                }
            }
        }
        self.terminal_artifacts.iter().for_each(|(_, t)| add(*t));
        types
    }
}

pub const REPORT_FILE_NAME: &str = "dominos_report.html";

static SCHEMAS: [ManifestSchema; 7] = [
    ManifestSchema {
        stage: Stage::Harvester,
        keys: &[
            KeySpec {
                key: "genomes",
                shape: KeyShape::Entries {
                    id_field: "accession",
                    path_fields: &[("fasta", ArtifactType::Fasta)],
                },
            },
            KeySpec {
                key: "metadata_csv",
                shape: KeyShape::Path(ArtifactType::Csv),
            },
        ],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::Annotator,
        keys: &[KeySpec {
            key: "genomes",
            shape: KeyShape::Entries {
                id_field: "accession",
                path_fields: &[
                    ("fasta", ArtifactType::Fasta),
                    ("amr_results", ArtifactType::Tsv),
                ],
            },
        }],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::Extractor,
        keys: &[KeySpec {
            key: "protein_files",
            shape: KeyShape::Entries {
                id_field: "accession",
                path_fields: &[("path", ArtifactType::ProteinFasta)],
            },
        }],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::Aligner,
        keys: &[KeySpec {
            key: "alignments",
            shape: KeyShape::Entries {
                id_field: "gene",
                path_fields: &[("path", ArtifactType::Fasta)],
            },
        }],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::Analyzer,
        keys: &[KeySpec {
            key: "analysis_files",
            shape: KeyShape::Entries {
                id_field: "gene",
                path_fields: &[("path", ArtifactType::Csv)],
            },
        }],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::CoOccurrence,
        keys: &[KeySpec {
            key: "cooccurrence_matrix",
            shape: KeyShape::Path(ArtifactType::Csv),
        }],
        terminal_artifacts: &[],
    },
    ManifestSchema {
        stage: Stage::Reporter,
        keys: &[],
        terminal_artifacts: &[(REPORT_FILE_NAME, ArtifactType::Html)],
    },
];

/// Static lookup from stage to schema.
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn schema(stage: Stage) -> &'static ManifestSchema {
        &SCHEMAS[stage as usize]
    }

    pub fn all() -> &'static [ManifestSchema] {
        &SCHEMAS
    }
}
