// file: src/validation/validator.rs
// description: certifies stage manifests against the schema registry
// reference: aggregates every violation instead of stopping at the first

use crate::models::{
    ArtifactReference, ArtifactType, CertifiedManifest, Manifest, ManifestLoadError, Stage,
};
use crate::validation::format::check_format;
use crate::validation::registry::{KeyShape, KeySpec, ManifestSchema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// A required manifest key (or entry field) is absent.
    ManifestSchemaError,
    /// A referenced artifact does not exist.
    ArtifactMissingError,
    /// A referenced artifact has zero length.
    ArtifactEmptyError,
    /// The value or the file does not have the expected structure.
    MalformedArtifactError,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Key path inside the manifest, e.g. `genomes[1].fasta`.
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub detail: String,
}

impl Violation {
    fn new(kind: ViolationKind, location: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            path: None,
            detail: detail.into(),
        }
    }

    fn at(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.location, self.detail)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub stage: Stage,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    pub fn kinds(&self) -> Vec<ViolationKind> {
        self.violations.iter().map(|v| v.kind).collect()
    }
}

pub struct Validator;

impl Validator {
    /// Loads and validates the manifest a stage left at `manifest_path`. A missing
    /// file is reported as a missing artifact, an unparsable one as malformed.
    pub fn validate_file(
        stage: Stage,
        manifest_path: &Path,
    ) -> (ValidationResult, Option<CertifiedManifest>) {
        match Manifest::load(stage, manifest_path) {
            Ok(manifest) => Self::certify(manifest),
            Err(error) => {
                let violation = match error {
                    ManifestLoadError::Missing => Violation::new(
                        ViolationKind::ArtifactMissingError,
                        "<manifest>",
                        "stage did not write its manifest",
                    ),
                    ManifestLoadError::Unreadable(reason) => Violation::new(
                        ViolationKind::ArtifactMissingError,
                        "<manifest>",
                        reason,
                    ),
                    ManifestLoadError::NotAnObject(reason) => Violation::new(
                        ViolationKind::MalformedArtifactError,
                        "<manifest>",
                        reason,
                    ),
                };
                let result = ValidationResult {
                    stage,
                    violations: vec![violation.at(manifest_path)],
                };
                (result, None)
            }
        }
    }

    /// Validates a manifest and, if it passes, wraps it as certified.
    pub fn certify(manifest: Manifest) -> (ValidationResult, Option<CertifiedManifest>) {
        let result = Self::validate(&manifest);
        let certified = result
            .passed()
            .then(|| CertifiedManifest::certify(manifest));
        (result, certified)
    }

    pub fn validate(manifest: &Manifest) -> ValidationResult {
        let stage = manifest.stage();
        let schema = SchemaRegistry::schema(stage);
        let mut violations = Vec::new();
        let mut references = Vec::new();

        for spec in schema.keys {
            collect_key(manifest, spec, &mut references, &mut violations);
        }

        for reference in &references {
            check_artifact(reference, &mut violations);
        }

        debug!(
            "Validated {} manifest: {} artifacts, {} violations",
            stage,
            references.len(),
            violations.len()
        );

        ValidationResult { stage, violations }
    }

    /// Checks the files a stage must leave in `stage_dir` independent of any
    /// manifest (the terminal report).
    pub fn validate_terminal(stage: Stage, stage_dir: &Path) -> ValidationResult {
        let schema: &ManifestSchema = SchemaRegistry::schema(stage);
        let mut violations = Vec::new();
        for (name, artifact_type) in schema.terminal_artifacts {
            let reference = ArtifactReference::new(*name, *name, *artifact_type, stage_dir);
            check_artifact(&reference, &mut violations);
        }
        ValidationResult { stage, violations }
    }

    /// Every artifact reference reachable under the schema's keys, in manifest
    /// order. Values with the wrong shape are skipped.
    pub fn artifact_references(manifest: &Manifest) -> Vec<ArtifactReference> {
        let schema = SchemaRegistry::schema(manifest.stage());
        let mut references = Vec::new();
        let mut ignored = Vec::new();
        for spec in schema.keys {
            collect_key(manifest, spec, &mut references, &mut ignored);
        }
        references
    }
}

fn collect_key(
    manifest: &Manifest,
    spec: &KeySpec,
    references: &mut Vec<ArtifactReference>,
    violations: &mut Vec<Violation>,
) {
    let Some(value) = manifest.get(spec.key) else {
        violations.push(Violation::new(
            ViolationKind::ManifestSchemaError,
            spec.key,
            "required key is missing",
        ));
        return;
    };

    match spec.shape {
        KeyShape::Path(artifact_type) => {
            if let Some(reference) =
                path_reference(manifest.dir(), spec.key, value, artifact_type, violations)
            {
                references.push(reference);
            }
        }
        KeyShape::Entries {
            id_field,
            path_fields,
        } => {
            let Some(entries) = value.as_array() else {
                violations.push(Violation::new(
                    ViolationKind::MalformedArtifactError,
                    spec.key,
                    "expected a sequence of artifact descriptors",
                ));
                return;
            };

            if entries.is_empty() {
                violations.push(Violation::new(
                    ViolationKind::MalformedArtifactError,
                    spec.key,
                    "sequence has no entries",
                ));
            }

            for (position, entry) in entries.iter().enumerate() {
                let location = format!("{}[{}]", spec.key, position);
                let Some(object) = entry.as_object() else {
                    violations.push(Violation::new(
                        ViolationKind::MalformedArtifactError,
                        location,
                        "entry is not an object",
                    ));
                    continue;
                };

                match object.get(id_field) {
                    None => violations.push(Violation::new(
                        ViolationKind::ManifestSchemaError,
                        format!("{}.{}", location, id_field),
                        "entry identifier is missing",
                    )),
                    Some(Value::String(id)) if !id.trim().is_empty() => {}
                    Some(_) => violations.push(Violation::new(
                        ViolationKind::MalformedArtifactError,
                        format!("{}.{}", location, id_field),
                        "entry identifier must be a non-empty string",
                    )),
                }

                for (field, artifact_type) in path_fields {
                    let field_location = format!("{}.{}", location, field);
                    match object.get(*field) {
                        None => violations.push(Violation::new(
                            ViolationKind::ManifestSchemaError,
                            field_location,
                            "artifact path is missing",
                        )),
                        Some(value) => {
                            if let Some(reference) = path_reference(
                                manifest.dir(),
                                &field_location,
                                value,
                                *artifact_type,
                                violations,
                            ) {
                                references.push(reference);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn path_reference(
    stage_dir: &Path,
    location: &str,
    value: &Value,
    artifact_type: ArtifactType,
    violations: &mut Vec<Violation>,
) -> Option<ArtifactReference> {
    match value.as_str() {
        Some(path) if !path.trim().is_empty() => Some(ArtifactReference::new(
            location,
            path,
            artifact_type,
            stage_dir,
        )),
        _ => {
            violations.push(Violation::new(
                ViolationKind::MalformedArtifactError,
                location,
                "artifact path must be a non-empty string",
            ));
            None
        }
    }
}

fn check_artifact(reference: &ArtifactReference, violations: &mut Vec<Violation>) {
    let path = &reference.resolved;
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => {
            violations.push(
                Violation::new(
                    ViolationKind::ArtifactMissingError,
                    &reference.location,
                    format!("{} artifact does not exist", reference.artifact_type),
                )
                .at(path),
            );
            return;
        }
    };

    if !metadata.is_file() {
        violations.push(
            Violation::new(
                ViolationKind::ArtifactMissingError,
                &reference.location,
                "path is not a regular file",
            )
            .at(path),
        );
        return;
    }

    if metadata.len() == 0 {
        violations.push(
            Violation::new(
                ViolationKind::ArtifactEmptyError,
                &reference.location,
                format!("{} artifact is empty", reference.artifact_type),
            )
            .at(path),
        );
        return;
    }

    if !reference.artifact_type.accepts_extension(path) {
        violations.push(
            Violation::new(
                ViolationKind::MalformedArtifactError,
                &reference.location,
                format!(
                    "unexpected extension for {} artifact (expected one of {:?})",
                    reference.artifact_type,
                    reference.artifact_type.extensions()
                ),
            )
            .at(path),
        );
    }

    if let Err(reason) = check_format(path, reference.artifact_type) {
        violations.push(
            Violation::new(
                ViolationKind::MalformedArtifactError,
                &reference.location,
                reason,
            )
            .at(path),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn manifest(stage: Stage, dir: &Path, value: Value) -> Manifest {
        let document: Map<String, Value> = value.as_object().cloned().unwrap();
        Manifest::new(stage, dir.join("manifest.json"), document)
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let temp = TempDir::new().unwrap();
        let result = Validator::validate(&manifest(Stage::Harvester, temp.path(), json!({})));
        assert!(!result.passed());
        assert_eq!(
            result.kinds(),
            vec![
                ViolationKind::ManifestSchemaError,
                ViolationKind::ManifestSchemaError
            ]
        );
        assert_eq!(result.violations[0].location, "genomes");
        assert_eq!(result.violations[1].location, "metadata_csv");
    }

    #[test]
    fn test_violations_aggregate_across_kinds() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.fasta", "NOT A HEADER\n");
        write(temp.path(), "b.fasta", "");
        let result = Validator::validate(&manifest(
            Stage::Harvester,
            temp.path(),
            json!({
                "genomes": [
                    {"accession": "A", "fasta": "a.fasta"},
                    {"accession": "B", "fasta": "b.fasta"},
                    {"accession": "C", "fasta": "c.fasta"},
                    {"fasta": "a.fasta"}
                ]
            }),
        ));

        assert_eq!(result.count(ViolationKind::ManifestSchemaError), 2);
        assert_eq!(result.count(ViolationKind::ArtifactEmptyError), 1);
        assert_eq!(result.count(ViolationKind::ArtifactMissingError), 1);
        assert_eq!(result.count(ViolationKind::MalformedArtifactError), 2);
    }

    #[test]
    fn test_wrong_shapes_are_malformed() {
        let temp = TempDir::new().unwrap();
        let result = Validator::validate(&manifest(
            Stage::Extractor,
            temp.path(),
            json!({"protein_files": "proteins.faa"}),
        ));
        assert_eq!(result.kinds(), vec![ViolationKind::MalformedArtifactError]);

        let result = Validator::validate(&manifest(
            Stage::CoOccurrence,
            temp.path(),
            json!({"cooccurrence_matrix": 42}),
        ));
        assert_eq!(result.kinds(), vec![ViolationKind::MalformedArtifactError]);

        let result = Validator::validate(&manifest(
            Stage::Aligner,
            temp.path(),
            json!({"alignments": []}),
        ));
        assert_eq!(result.kinds(), vec![ViolationKind::MalformedArtifactError]);
    }

    #[test]
    fn test_unexpected_extension() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "matrix.txt", "gene,gyrA\n");
        let result = Validator::validate(&manifest(
            Stage::CoOccurrence,
            temp.path(),
            json!({"cooccurrence_matrix": "matrix.txt"}),
        ));
        assert_eq!(result.kinds(), vec![ViolationKind::MalformedArtifactError]);
    }

    #[test]
    fn test_passing_manifest_is_certified() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "matrix.csv", "gene,gyrA\ngyrA,2\n");
        let (result, certified) = Validator::certify(manifest(
            Stage::CoOccurrence,
            temp.path(),
            json!({"cooccurrence_matrix": "matrix.csv", "test_mode": "mock"}),
        ));
        assert!(result.passed());
        let certified = certified.unwrap();
        assert_eq!(certified.str_value("cooccurrence_matrix"), Some("matrix.csv"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.csv", "gene,pos\n");
        let m = manifest(
            Stage::Analyzer,
            temp.path(),
            json!({"analysis_files": [{"gene": "gyrA", "path": "a.csv"}, {"gene": "parC", "path": "p.csv"}]}),
        );
        let first = Validator::validate(&m);
        let second = Validator::validate(&m);
        assert_eq!(first, second);
        assert_eq!(first.kinds(), vec![ViolationKind::ArtifactMissingError]);
    }

    #[test]
    fn test_missing_manifest_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extractor_manifest.json");
        let (result, certified) = Validator::validate_file(Stage::Extractor, &path);
        assert!(certified.is_none());
        assert_eq!(result.kinds(), vec![ViolationKind::ArtifactMissingError]);
        assert_eq!(result.violations[0].path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_undecodable_manifest_is_malformed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("harvester_manifest.json");
        fs::write(&path, b"\xff\xfe").unwrap();
        let (result, certified) = Validator::validate_file(Stage::Harvester, &path);
        assert!(certified.is_none());
        assert_eq!(result.kinds(), vec![ViolationKind::MalformedArtifactError]);
    }

    #[test]
    fn test_terminal_report() {
        let temp = TempDir::new().unwrap();
        let result = Validator::validate_terminal(Stage::Reporter, temp.path());
        assert_eq!(result.kinds(), vec![ViolationKind::ArtifactMissingError]);

        write(temp.path(), "dominos_report.html", "<html><body></body></html>");
        assert!(Validator::validate_terminal(Stage::Reporter, temp.path()).passed());
    }

    #[test]
    fn test_artifact_references_in_manifest_order() {
        let temp = TempDir::new().unwrap();
        let refs = Validator::artifact_references(&manifest(
            Stage::Annotator,
            temp.path(),
            json!({"genomes": [{"accession": "A", "fasta": "a.fasta", "amr_results": "a.tsv"}]}),
        ));
        let locations: Vec<&str> = refs.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(locations, vec!["genomes[0].fasta", "genomes[0].amr_results"]);
    }
}
