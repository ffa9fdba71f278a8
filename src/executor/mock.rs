// file: src/executor/mock.rs
// description: deterministic placeholder output for stages that cannot run natively
// reference: https://docs.rs/sha2

use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionOutcome, StageInvocation, Strategy, ToolExecutor};
use crate::models::{
    CertifiedManifest, MOCK_MARKER, Manifest, Stage, TEST_MODE_KEY, Upstream,
};
use crate::validation::REPORT_FILE_NAME;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Two-genome sample used when a mock run gets no accessions.
pub const SAMPLE_ACCESSIONS: [&str; 2] = ["GCF_000005845.2", "GCF_000006945.2"];

/// Genes every mock annotation reports.
pub const MOCK_GENES: [&str; 3] = ["gyrA", "parC", "acrB"];

const NUCLEOTIDES: &[u8] = b"ACGT";
const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
const GENOME_LENGTH: usize = 240;
const PROTEIN_LENGTH: usize = 90;
const FASTA_WIDTH: usize = 60;

/// Synthesizes a structurally valid, scientifically inert manifest and artifact
/// set. Output depends only on the stage and the upstream manifest: no
/// timestamps, relative paths only, sorted manifest keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockExecutor;

impl MockExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Writes the stage's mock output into `invocation.output_dir`.
    pub fn generate(&self, invocation: &StageInvocation<'_>) -> Result<()> {
        let stage = invocation.descriptor.stage;
        let dir = invocation.output_dir;
        fs::create_dir_all(dir).map_err(|e| PipelineError::file(dir, e))?;

        let mut document = match (stage, invocation.upstream) {
            (Stage::Harvester, Upstream::Initial(inputs)) => {
                let mut accessions = inputs.resolve_accessions()?;
                if accessions.is_empty() {
                    accessions = SAMPLE_ACCESSIONS.iter().map(|s| s.to_string()).collect();
                }
                harvest(dir, &accessions)?
            }
            (_, Upstream::Manifest(upstream)) => match stage {
                Stage::Harvester => {
                    return Err(mock_error(stage, "first stage takes initial inputs"));
                }
                Stage::Annotator => annotate(dir, upstream)?,
                Stage::Extractor => extract(dir, upstream)?,
                Stage::Aligner => align(dir, upstream)?,
                Stage::Analyzer => analyze(dir, upstream)?,
                Stage::CoOccurrence => cooccur(dir, upstream)?,
                Stage::Reporter => {
                    report(dir, upstream)?;
                    return Ok(());
                }
            },
            (_, Upstream::Initial(_)) => {
                return Err(mock_error(stage, "requires the previous stage's manifest"));
            }
        };

        document.insert("stage".to_string(), json!(stage.slug()));
        document.insert(TEST_MODE_KEY.to_string(), json!(MOCK_MARKER));

        if let Some(path) = invocation.manifest_path() {
            Manifest::new(stage, path, document).write()?;
        }
        Ok(())
    }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Mock
    }

    async fn execute(&self, invocation: &StageInvocation<'_>) -> Result<ExecutionOutcome> {
        info!(
            "Generating mock output for {} in {}",
            invocation.descriptor.name,
            invocation.output_dir.display()
        );
        match self.generate(invocation) {
            Ok(()) => Ok(ExecutionOutcome::succeeded()),
            Err(e) => Ok(ExecutionOutcome::failed(None, format!("mock generation failed: {}", e))),
        }
    }
}

fn mock_error(stage: Stage, message: &str) -> PipelineError {
    PipelineError::Subprocess {
        stage: stage.name().to_string(),
        message: format!("mock {}", message),
    }
}

fn harvest(dir: &Path, accessions: &[String]) -> Result<Map<String, Value>> {
    let mut genomes = Vec::with_capacity(accessions.len());
    let mut metadata = String::from("accession,organism,assembly_level,source\n");

    for accession in accessions {
        let file = format!("{}.fasta", file_stem(accession));
        let sequence = mock_sequence(accession, GENOME_LENGTH, NUCLEOTIDES);
        write_artifact(
            dir,
            &file,
            &fasta_record(&format!("{} mock genome", accession), &sequence),
        )?;
        metadata.push_str(&format!("{},Mock organism,Complete Genome,mock\n", accession));
        genomes.push(json!({"accession": accession, "fasta": file}));
    }

    write_artifact(dir, "metadata.csv", &metadata)?;
    debug!("Mock harvest wrote {} genomes", genomes.len());

    let mut document = Map::new();
    document.insert("genomes".to_string(), Value::Array(genomes));
    document.insert("metadata_csv".to_string(), json!("metadata.csv"));
    Ok(document)
}

fn annotate(dir: &Path, upstream: &CertifiedManifest) -> Result<Map<String, Value>> {
    let mut genomes = Vec::new();
    for entry in upstream.entries("genomes") {
        let Some(accession) = entry.get("accession").and_then(Value::as_str) else {
            continue;
        };
        let fasta = entry
            .get("fasta")
            .and_then(Value::as_str)
            .map(|path| rebase(upstream, path))
            .unwrap_or_default();

        let mut table = String::from(
            "protein_id\tgene_symbol\tsequence_name\telement_type\tclass\tsubclass\tmethod\n",
        );
        for (n, gene) in MOCK_GENES.iter().enumerate() {
            table.push_str(&format!(
                "{}_{}\t{}\tmock {} protein\tAMR\tQUINOLONE\tQUINOLONE\tPOINTX\n",
                accession,
                n + 1,
                gene,
                gene
            ));
        }

        let file = format!("{}_amrfinder.tsv", file_stem(accession));
        write_artifact(dir, &file, &table)?;
        genomes.push(json!({"accession": accession, "fasta": fasta, "amr_results": file}));
    }

    let mut document = Map::new();
    document.insert("genomes".to_string(), Value::Array(genomes));
    Ok(document)
}

fn extract(dir: &Path, upstream: &CertifiedManifest) -> Result<Map<String, Value>> {
    let mut protein_files = Vec::new();
    for accession in upstream.entry_field("genomes", "accession") {
        let mut fasta = String::new();
        for gene in MOCK_GENES {
            let seed = format!("{}|{}", accession, gene);
            let sequence = protein_sequence(&seed);
            fasta.push_str(&fasta_record(&seed, &sequence));
        }
        let file = format!("{}_proteins.faa", file_stem(accession));
        write_artifact(dir, &file, &fasta)?;
        protein_files.push(json!({
            "accession": accession,
            "path": file,
            "genes": MOCK_GENES,
        }));
    }

    let mut document = Map::new();
    document.insert("protein_files".to_string(), Value::Array(protein_files));
    Ok(document)
}

fn align(dir: &Path, upstream: &CertifiedManifest) -> Result<Map<String, Value>> {
    let accessions: Vec<&str> = upstream.entry_field("protein_files", "accession").collect();

    let mut genes: Vec<String> = Vec::new();
    for entry in upstream.entries("protein_files") {
        let listed = entry.get("genes").and_then(Value::as_array);
        for gene in listed.into_iter().flatten().filter_map(Value::as_str) {
            if !genes.iter().any(|g| g == gene) {
                genes.push(gene.to_string());
            }
        }
    }
    if genes.is_empty() {
        genes = MOCK_GENES.iter().map(|g| g.to_string()).collect();
    }

    let mut alignments = Vec::new();
    for gene in &genes {
        let mut fasta = fasta_record(
            &format!("{}|reference", gene),
            &protein_sequence(&format!("reference|{}", gene)),
        );
        for accession in &accessions {
            let seed = format!("{}|{}", accession, gene);
            fasta.push_str(&fasta_record(&seed, &protein_sequence(&seed)));
        }
        let file = format!("{}_alignment.fasta", file_stem(gene));
        write_artifact(dir, &file, &fasta)?;
        alignments.push(json!({"gene": gene, "path": file, "members": accessions}));
    }

    let mut document = Map::new();
    document.insert("alignments".to_string(), Value::Array(alignments));
    Ok(document)
}

fn analyze(dir: &Path, upstream: &CertifiedManifest) -> Result<Map<String, Value>> {
    let mut analysis_files = Vec::new();
    for entry in upstream.entries("alignments") {
        let Some(gene) = entry.get("gene").and_then(Value::as_str) else {
            continue;
        };
        let members: Vec<&str> = entry
            .get("members")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();

        let mut table = String::from("accession,gene,position,reference,variant\n");
        for accession in &members {
            let hash = digest(&format!("mutation|{}|{}", accession, gene));
            let position = 1 + usize::from(hash[0]) % PROTEIN_LENGTH;
            let reference = AMINO_ACIDS[usize::from(hash[1]) % AMINO_ACIDS.len()] as char;
            let variant = AMINO_ACIDS[usize::from(hash[2]) % AMINO_ACIDS.len()] as char;
            table.push_str(&format!(
                "{},{},{},{},{}\n",
                accession, gene, position, reference, variant
            ));
        }

        let file = format!("{}_mutations.csv", file_stem(gene));
        write_artifact(dir, &file, &table)?;
        analysis_files.push(json!({"gene": gene, "path": file, "samples": members.len()}));
    }

    let mut document = Map::new();
    document.insert("analysis_files".to_string(), Value::Array(analysis_files));
    Ok(document)
}

fn cooccur(dir: &Path, upstream: &CertifiedManifest) -> Result<Map<String, Value>> {
    let genes: Vec<(&str, u64)> = upstream
        .entries("analysis_files")
        .iter()
        .filter_map(|entry| {
            let gene = entry.get("gene").and_then(Value::as_str)?;
            let samples = entry.get("samples").and_then(Value::as_u64).unwrap_or(0);
            Some((gene, samples))
        })
        .collect();

    let mut matrix = String::from("gene");
    for (gene, _) in &genes {
        matrix.push(',');
        matrix.push_str(gene);
    }
    matrix.push('\n');

    for (row, (gene, samples)) in genes.iter().enumerate() {
        matrix.push_str(gene);
        for (column, (_, other)) in genes.iter().enumerate() {
            let count = if row == column {
                *samples
            } else {
                (*samples).min(*other)
            };
            matrix.push_str(&format!(",{}", count));
        }
        matrix.push('\n');
    }

    write_artifact(dir, "cooccurrence_matrix.csv", &matrix)?;

    let mut document = Map::new();
    document.insert(
        "cooccurrence_matrix".to_string(),
        json!("cooccurrence_matrix.csv"),
    );
    document.insert("genes".to_string(), json!(genes.iter().map(|(g, _)| *g).collect::<Vec<_>>()));
    Ok(document)
}

fn report(dir: &Path, upstream: &CertifiedManifest) -> Result<()> {
    let matrix = upstream
        .str_value("cooccurrence_matrix")
        .map(|path| rebase(upstream, path))
        .unwrap_or_default();
    let genes: Vec<&str> = upstream
        .get("genes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let mut rows = String::new();
    for gene in &genes {
        rows.push_str(&format!("      <li>{}</li>\n", escape_html(gene)));
    }

    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n  <head>\n    <meta charset=\"utf-8\">\n    <title>Dominos report (mock)</title>\n  </head>\n  <body>\n    <h1>Dominos report</h1>\n    <p>Generated in mock mode; contents are placeholders.</p>\n    <p>Co-occurrence matrix: <code>{}</code></p>\n    <ul>\n{}    </ul>\n  </body>\n</html>\n",
        escape_html(&matrix),
        rows
    );
    write_artifact(dir, REPORT_FILE_NAME, &html)?;
    Ok(())
}

/// Points an upstream-relative path at the upstream stage directory from a
/// sibling stage directory. Absolute paths are returned unchanged.
fn rebase(upstream: &CertifiedManifest, path: &str) -> String {
    if Path::new(path).is_absolute() {
        return path.to_string();
    }
    match upstream.dir().file_name().and_then(|n| n.to_str()) {
        Some(dir_name) => format!("../{}/{}", dir_name, path),
        None => path.to_string(),
    }
}

fn write_artifact(dir: &Path, name: &str, content: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|e| PipelineError::file(&path, e))
}

/// Filesystem-safe name for `identifier`. A name that had to be rewritten
/// carries a short hash of the original, so `GCA/2` and `GCA_2` stay distinct.
fn file_stem(identifier: &str) -> String {
    let stem: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem == identifier {
        return stem;
    }

    let suffix: String = digest(identifier)[..4]
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    format!("{}-{}", stem, suffix)
}

fn digest(seed: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.finalize().into()
}

/// Residues drawn from SHA-256 of `seed` and a block counter.
pub fn mock_sequence(seed: &str, length: usize, alphabet: &[u8]) -> String {
    let mut sequence = String::with_capacity(length);
    let mut block = 0u64;
    while sequence.len() < length {
        let bytes = digest(&format!("{}#{}", seed, block));
        for byte in bytes {
            if sequence.len() == length {
                break;
            }
            sequence.push(alphabet[usize::from(byte) % alphabet.len()] as char);
        }
        block += 1;
    }
    sequence
}

fn protein_sequence(seed: &str) -> String {
    // Start with methionine like a real CDS translation.
    let mut sequence = String::from("M");
    sequence.push_str(&mock_sequence(seed, PROTEIN_LENGTH - 1, AMINO_ACIDS));
    sequence
}

fn fasta_record(header: &str, sequence: &str) -> String {
    let mut record = format!(">{}\n", header);
    for chunk in sequence.as_bytes().chunks(FASTA_WIDTH) {
        record.push_str(&String::from_utf8_lossy(chunk));
        record.push('\n');
    }
    record
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
