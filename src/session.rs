// The caller-owned session: the currently loaded dataset, its column
// mapping and the persisted mapping store.
//
// Nothing here is process-wide. A CLI run builds one `Session`, loads a
// CSV into it and derives every view from `Session::records`.
use crate::config::AppConfig;
use crate::error::{Result, RiskError};
use crate::filter::{apply_filters, Filters};
use crate::loader::{map_rows_with_report, read_csv, LoadReport, RawTable};
use crate::mapping::{
    auto_map, detect_known_dataset_with, mapping_confidence, missing_required, SAMPLE_SOURCE,
};
use crate::types::{CanonicalField, CanonicalRecord, ColumnMapping};
use crate::util::header_fingerprint;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource {
    /// The bundled reference sample.
    Sample,
    /// A user-provided file.
    Upload,
}

/// Persistence key for a dataset's mapping: `"{name}::{fingerprint}"`.
pub fn mapping_key(dataset_name: &str, headers: &[String]) -> String {
    format!("{}::{}", dataset_name, header_fingerprint(headers))
}

/// Saved column mappings keyed by [`mapping_key`], backed by a JSON file.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, ColumnMapping>,
}

impl MappingStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable document or entry is skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self {
            path: Some(path.clone()),
            entries: BTreeMap::new(),
        };
        if !path.exists() {
            return Ok(store);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RiskError::io(&path, e))?;
        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt mapping store");
                return Ok(store);
            }
        };
        for (key, value) in raw {
            match serde_json::from_value::<ColumnMapping>(value) {
                Ok(mapping) => {
                    store.entries.insert(key, mapping);
                }
                Err(e) => tracing::warn!(%key, error = %e, "ignoring unreadable saved mapping"),
            }
        }
        tracing::debug!(path = %path.display(), entries = store.entries.len(), "opened mapping store");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The saved mapping for `key`, with fields pointing at headers that no
    /// longer exist unmapped.
    pub fn restore(&self, key: &str, headers: &[String]) -> Option<ColumnMapping> {
        let mut mapping = self.entries.get(key)?.clone();
        mapping.retain_headers(headers);
        Some(mapping)
    }

    pub fn insert(&mut self, key: impl Into<String>, mapping: ColumnMapping) {
        self.entries.insert(key.into(), mapping);
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RiskError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json).map_err(|e| RiskError::io(path, e))?;
        Ok(())
    }
}

/// What happened while loading a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub mapping_key: String,
    pub known_dataset: bool,
    pub confidence: f64,
    /// A saved mapping was found and used.
    pub restored: bool,
    /// The mapping should be confirmed by the user before use.
    pub needs_review: bool,
    /// Rows were canonicalized immediately.
    pub applied: bool,
    /// Required fields that kept the mapping from being applied.
    pub missing_required: Vec<CanonicalField>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub source: DatasetSource,
    pub mapping_key: String,
    pub table: RawTable,
    pub mapping: ColumnMapping,
    pub records: Vec<CanonicalRecord>,
    pub report: Option<LoadReport>,
}

#[derive(Debug)]
pub struct Session {
    config: AppConfig,
    store: MappingStore,
    dataset: Option<Dataset>,
}

impl Session {
    pub fn new(config: AppConfig, store: MappingStore) -> Self {
        Self {
            config,
            store,
            dataset: None,
        }
    }

    /// A session whose mapping store lives at `config.mapping_store`.
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = MappingStore::open(&config.mapping_store)?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn reset(&mut self) {
        self.dataset = None;
    }

    /// Read a CSV file and load it under its file name.
    pub fn load_csv(&mut self, path: &Path, source: DatasetSource) -> Result<LoadOutcome> {
        let table = read_csv(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.load_table(name, source, table))
    }

    /// Replace the current dataset with `table`.
    ///
    /// The mapping is auto-detected, then overridden by a saved one for
    /// uploads. Rows are canonicalized right away unless the mapping needs
    /// review or lacks a required field.
    pub fn load_table(&mut self, name: impl Into<String>, source: DatasetSource, table: RawTable) -> LoadOutcome {
        let name = name.into();
        let key = mapping_key(&name, &table.headers);
        let hint = (source == DatasetSource::Sample).then_some(SAMPLE_SOURCE);
        let known_dataset = detect_known_dataset_with(
            &table.headers,
            table.rows.len(),
            hint,
            self.config.known_dataset_min_rows,
        );

        let saved = match source {
            DatasetSource::Upload => self.store.restore(&key, &table.headers),
            DatasetSource::Sample => None,
        };
        let restored = saved.is_some();
        let mapping = saved.unwrap_or_else(|| auto_map(&table.headers, known_dataset));

        let confidence = mapping_confidence(&mapping, &table.headers);
        let needs_review =
            source == DatasetSource::Upload && (!restored || confidence < self.config.confidence_threshold);

        tracing::info!(
            dataset = %name,
            rows = table.rows.len(),
            known_dataset,
            restored,
            confidence,
            needs_review,
            "dataset loaded"
        );

        self.dataset = Some(Dataset {
            name,
            source,
            mapping_key: key.clone(),
            table,
            mapping,
            records: Vec::new(),
            report: None,
        });

        let mut missing = Vec::new();
        let applied = !needs_review
            && match self.apply_mapping() {
                Ok(_) => true,
                Err(e) => {
                    tracing::info!(error = %e, "mapping not applied on load");
                    if let RiskError::MissingRequiredMapping(fields) = e {
                        missing = fields;
                    }
                    false
                }
            };
        LoadOutcome {
            mapping_key: key,
            known_dataset,
            confidence,
            restored,
            needs_review,
            applied,
            missing_required: missing,
        }
    }

    /// Replace the current mapping. Records are cleared until it is applied.
    pub fn set_mapping(&mut self, mapping: ColumnMapping) -> Result<()> {
        let dataset = self.dataset.as_mut().ok_or(RiskError::NoDataset)?;
        dataset.mapping = mapping;
        dataset.records.clear();
        dataset.report = None;
        Ok(())
    }

    /// Canonicalize every row with the current mapping.
    pub fn apply_mapping(&mut self) -> Result<&LoadReport> {
        let dataset = self.dataset.as_mut().ok_or(RiskError::NoDataset)?;
        let missing = missing_required(&dataset.mapping, &dataset.table.headers);
        if !missing.is_empty() {
            return Err(RiskError::MissingRequiredMapping(missing));
        }
        let (records, report) = map_rows_with_report(&dataset.table.rows, &dataset.mapping);
        tracing::info!(
            records = records.len(),
            synthetic_ids = report.synthetic_ids,
            unknown_suppliers = report.unknown_suppliers,
            backfilled_costs = report.backfilled_costs,
            "mapping applied"
        );
        dataset.records = records;
        Ok(dataset.report.insert(report))
    }

    /// Remember the current mapping under the dataset's key and persist the store.
    pub fn save_mapping(&mut self) -> Result<()> {
        let dataset = self.dataset.as_ref().ok_or(RiskError::NoDataset)?;
        self.store.insert(dataset.mapping_key.clone(), dataset.mapping.clone());
        self.store.save()
    }

    /// The canonical record set; empty until a mapping has been applied.
    pub fn records(&self) -> Result<&[CanonicalRecord]> {
        self.dataset
            .as_ref()
            .map(|d| d.records.as_slice())
            .ok_or(RiskError::NoDataset)
    }

    /// A filtered copy of the record set.
    pub fn view(&self, filters: &Filters) -> Result<Vec<CanonicalRecord>> {
        Ok(apply_filters(self.records()?, filters))
    }
}
