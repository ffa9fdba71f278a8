// file: src/models/stage.rs
// description: the seven pipeline stages and their static descriptor table
// reference: internal data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One domino of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Harvester,
    Annotator,
    Extractor,
    Aligner,
    Analyzer,
    CoOccurrence,
    Reporter,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Harvester,
        Stage::Annotator,
        Stage::Extractor,
        Stage::Aligner,
        Stage::Analyzer,
        Stage::CoOccurrence,
        Stage::Reporter,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// 1-based position in the chain.
    pub fn index(self) -> usize {
        self as usize + 1
    }

    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Accepts a 1-based index or a stage name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(index) = value.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(value) || stage.slug() == value)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_index(self.index() - 1)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Reporter
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn slug(self) -> &'static str {
        self.descriptor().slug
    }

    pub fn descriptor(self) -> &'static StageDescriptor {
        &STAGE_TABLE[self as usize]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable description of a stage: what it runs, what it consumes and what it
/// must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub name: &'static str,
    pub slug: &'static str,
    pub script: &'static str,
    pub required_input_keys: &'static [&'static str],
    pub required_output_keys: &'static [&'static str],
    pub expected_extensions: &'static [&'static str],
    /// Native executables the real strategy needs on `PATH`.
    pub native_tools: &'static [&'static str],
    /// Tools in `native_tools` with no Windows build.
    pub unix_only: bool,
}

impl StageDescriptor {
    pub fn index(&self) -> usize {
        self.stage.index()
    }

    pub fn dir_name(&self) -> String {
        format!("{:02}_{}", self.index(), self.slug)
    }

    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    /// The terminal stage writes a report instead of a manifest.
    pub fn manifest_file_name(&self) -> Option<String> {
        if self.stage.is_terminal() {
            None
        } else {
            Some(format!("{}_manifest.json", self.slug))
        }
    }

    pub fn manifest_path(&self, root: &Path) -> Option<PathBuf> {
        self.manifest_file_name()
            .map(|name| self.output_dir(root).join(name))
    }

    pub fn script_path(&self, scripts_dir: &Path) -> PathBuf {
        scripts_dir.join(self.script)
    }
}

pub static STAGE_TABLE: [StageDescriptor; 7] = [
    StageDescriptor {
        stage: Stage::Harvester,
        name: "Harvester",
        slug: "harvester",
        script: "harvester.py",
        required_input_keys: &[],
        required_output_keys: &["genomes", "metadata_csv"],
        expected_extensions: &["fasta", "fna", "fa", "csv"],
        native_tools: &["datasets"],
        unix_only: false,
    },
    StageDescriptor {
        stage: Stage::Annotator,
        name: "Annotator",
        slug: "annotator",
        script: "annotator.py",
        required_input_keys: &["genomes", "metadata_csv"],
        required_output_keys: &["genomes"],
        expected_extensions: &["fasta", "fna", "fa", "tsv"],
        native_tools: &["amrfinder"],
        unix_only: true,
    },
    StageDescriptor {
        stage: Stage::Extractor,
        name: "Extractor",
        slug: "extractor",
        script: "extractor.py",
        required_input_keys: &["genomes"],
        required_output_keys: &["protein_files"],
        expected_extensions: &["faa", "fasta", "fa"],
        native_tools: &[],
        unix_only: false,
    },
    StageDescriptor {
        stage: Stage::Aligner,
        name: "Aligner",
        slug: "aligner",
        script: "aligner.py",
        required_input_keys: &["protein_files"],
        required_output_keys: &["alignments"],
        expected_extensions: &["fasta", "fa", "aln"],
        native_tools: &["mafft"],
        unix_only: true,
    },
    StageDescriptor {
        stage: Stage::Analyzer,
        name: "Analyzer",
        slug: "analyzer",
        script: "analyzer.py",
        required_input_keys: &["alignments"],
        required_output_keys: &["analysis_files"],
        expected_extensions: &["csv"],
        native_tools: &[],
        unix_only: false,
    },
    StageDescriptor {
        stage: Stage::CoOccurrence,
        name: "CoOccurrence",
        slug: "cooccurrence",
        script: "cooccurrence.py",
        required_input_keys: &["analysis_files"],
        required_output_keys: &["cooccurrence_matrix"],
        expected_extensions: &["csv"],
        native_tools: &[],
        unix_only: false,
    },
    StageDescriptor {
        stage: Stage::Reporter,
        name: "Reporter",
        slug: "reporter",
        script: "reporter.py",
        required_input_keys: &["cooccurrence_matrix"],
        required_output_keys: &[],
        expected_extensions: &["html"],
        native_tools: &[],
        unix_only: false,
    },
];
