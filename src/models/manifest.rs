// file: src/models/manifest.rs
// description: stage manifests, their certified form and the upstream handed to a stage
// reference: json contract between stages

use crate::error::{PipelineError, Result};
use crate::models::stage::Stage;
use serde_json::{Map, Value};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

pub const TEST_MODE_KEY: &str = "test_mode";
pub const MOCK_MARKER: &str = "mock";

/// Outcome of reading a manifest file that exists but is not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLoadError {
    Missing,
    Unreadable(String),
    NotAnObject(String),
}

/// A manifest as a stage wrote it. Nothing about its keys is trusted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    stage: Stage,
    path: PathBuf,
    document: Map<String, Value>,
}

impl Manifest {
    pub fn new(stage: Stage, path: impl Into<PathBuf>, document: Map<String, Value>) -> Self {
        Self {
            stage,
            path: path.into(),
            document,
        }
    }

    pub fn load(stage: Stage, path: &Path) -> std::result::Result<Self, ManifestLoadError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestLoadError::Missing);
            }
            Err(e) => return Err(ManifestLoadError::Unreadable(e.to_string())),
        };

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(document)) => Ok(Self::new(stage, path, document)),
            Ok(other) => Err(ManifestLoadError::NotAnObject(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ManifestLoadError::NotAnObject(e.to_string())),
        }
    }

    /// Serializes with sorted keys and a trailing newline so identical documents
    /// always produce identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&self.document)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::file(parent, e))?;
        }
        fs::write(&self.path, self.to_bytes()?).map_err(|e| PipelineError::file(&self.path, e))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that relative artifact paths are resolved against.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn is_mock(&self) -> bool {
        self.document.get(TEST_MODE_KEY).and_then(Value::as_str) == Some(MOCK_MARKER)
    }
}

/// A manifest that passed validation against its stage's schema. Only the
/// validator can produce one, and it is the only form a downstream stage accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct CertifiedManifest(Manifest);

impl CertifiedManifest {
    pub(crate) fn certify(manifest: Manifest) -> Self {
        Self(manifest)
    }

    pub fn into_inner(self) -> Manifest {
        self.0
    }

    /// Ordered entries of a sequence key.
    pub fn entries(&self, key: &str) -> &[Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Values of one string field across the entries of a sequence key, in order.
    pub fn entry_field<'a>(&'a self, key: &str, field: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries(key)
            .iter()
            .filter_map(move |entry| entry.get(field).and_then(Value::as_str))
    }

    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl Deref for CertifiedManifest {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.0
    }
}

/// Raw inputs for the first stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialInputs {
    pub accessions: Vec<String>,
    pub accessions_file: Option<PathBuf>,
}

impl InitialInputs {
    pub fn from_accessions<I, S>(accessions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accessions: accessions.into_iter().map(Into::into).collect(),
            accessions_file: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accessions.is_empty() && self.accessions_file.is_none()
    }

    /// Inline accessions plus those listed in the accessions file, deduplicated in
    /// first-seen order. Blank lines and `#` comments in the file are ignored.
    pub fn resolve_accessions(&self) -> Result<Vec<String>> {
        let mut accessions: Vec<String> = Vec::new();
        let mut push = |value: &str| {
            let value = value.trim();
            if !value.is_empty()
                && !value.starts_with('#')
                && !accessions.iter().any(|seen| seen == value)
            {
                accessions.push(value.to_string());
            }
        };

        for accession in &self.accessions {
            push(accession);
        }

        if let Some(file) = &self.accessions_file {
            let content = fs::read_to_string(file).map_err(|e| PipelineError::file(file, e))?;
            for line in content.lines() {
                push(line);
            }
        }

        Ok(accessions)
    }
}

/// What a stage consumes: raw inputs for the first stage, the certified manifest
/// of its predecessor for every other one.
#[derive(Debug, Clone, Copy)]
pub enum Upstream<'a> {
    Initial(&'a InitialInputs),
    Manifest(&'a CertifiedManifest),
}

impl<'a> Upstream<'a> {
    pub fn manifest(&self) -> Option<&'a CertifiedManifest> {
        match *self {
            Upstream::Initial(_) => None,
            Upstream::Manifest(manifest) => Some(manifest),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let result = Manifest::load(Stage::Harvester, &temp.path().join("nope.json"));
        assert_eq!(result.unwrap_err(), ManifestLoadError::Missing);
    }

    #[test]
    fn test_load_rejects_non_object() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m.json");
        fs::write(&path, "[1, 2]").unwrap();
        let result = Manifest::load(Stage::Harvester, &path);
        assert!(matches!(result, Err(ManifestLoadError::NotAnObject(_))));
    }

    #[test]
    fn test_load_rejects_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m.json");
        fs::write(&path, b"\xff\xfe{}").unwrap();
        let result = Manifest::load(Stage::Harvester, &path);
        assert!(matches!(result, Err(ManifestLoadError::NotAnObject(_))));
    }

    #[test]
    fn test_write_then_load_preserves_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("01_harvester/harvester_manifest.json");
        let manifest = Manifest::new(
            Stage::Harvester,
            &path,
            object(json!({"metadata_csv": "metadata.csv", "test_mode": "mock"})),
        );
        manifest.write().unwrap();

        let loaded = Manifest::load(Stage::Harvester, &path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.is_mock());
        assert_eq!(loaded.dir(), temp.path().join("01_harvester"));
    }

    #[test]
    fn test_serialization_is_key_ordered() {
        let a = Manifest::new(Stage::Harvester, "m.json", object(json!({"b": 1, "a": 2})));
        let b = Manifest::new(Stage::Harvester, "m.json", object(json!({"a": 2, "b": 1})));
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_resolve_accessions_merges_and_dedups() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("acc.txt");
        fs::write(&file, "# sample\nGCF_2\n\nGCF_3\nGCF_1\n").unwrap();

        let inputs = InitialInputs {
            accessions: vec!["GCF_1".to_string(), " GCF_2 ".to_string()],
            accessions_file: Some(file),
        };
        assert_eq!(
            inputs.resolve_accessions().unwrap(),
            vec!["GCF_1", "GCF_2", "GCF_3"]
        );
    }

    #[test]
    fn test_certified_entry_fields() {
        let manifest = Manifest::new(
            Stage::Harvester,
            "m.json",
            object(json!({"genomes": [{"accession": "A"}, {"accession": "B"}]})),
        );
        let certified = CertifiedManifest::certify(manifest);
        let ids: Vec<&str> = certified.entry_field("genomes", "accession").collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(certified.entries("missing").is_empty());

        let inputs = InitialInputs::default();
        assert!(Upstream::Initial(&inputs).manifest().is_none());
        assert_eq!(Upstream::Manifest(&certified).manifest(), Some(&certified));

        let manifest = certified.into_inner();
        assert_eq!(manifest.stage(), Stage::Harvester);
        assert_eq!(manifest.path(), Path::new("m.json"));
    }
}
