//! Contract registry: load, validate, and order the stage declarations.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::Contract;

/// The built-in contract document describing the standard stage set.
const DEFAULT_CONTRACTS_JSON: &str = include_str!("../../contracts/pipeline.json");

/// Failure while loading or validating a contract document.
#[derive(Error, Debug)]
pub enum ContractLoadError {
    #[error("failed to read contract file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse contract document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate contract id '{0}'")]
    DuplicateId(String),

    #[error("contract '{id}' depends on undeclared stage '{dependency}'")]
    UnknownDependency { id: String, dependency: String },

    #[error("contract '{0}' depends on itself")]
    SelfDependency(String),
}

/// On-disk shape: stages grouped by ordinal category.
#[derive(Debug, Deserialize)]
struct ContractsDoc {
    stages: BTreeMap<String, CategoryDecl>,
}

#[derive(Debug, Deserialize)]
struct CategoryDecl {
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    contracts: Vec<Contract>,
}

/// Immutable registry of every declared stage.
#[derive(Debug)]
pub struct ContractRegistry {
    by_id: BTreeMap<String, Contract>,
    /// Ids sorted by (ordinal, id) - the default plan order.
    order: Vec<String>,
}

impl ContractRegistry {
    /// Load the built-in standard contract document.
    pub fn standard() -> Self {
        Self::from_json_str(DEFAULT_CONTRACTS_JSON)
            .expect("built-in contract document must be valid")
    }

    /// Parse and validate a contract document.
    pub fn from_json_str(json: &str) -> Result<Self, ContractLoadError> {
        let doc: ContractsDoc = serde_json::from_str(json)?;

        let mut by_id: BTreeMap<String, Contract> = BTreeMap::new();
        for category in doc.stages.values() {
            for contract in &category.contracts {
                if by_id
                    .insert(contract.id.clone(), contract.clone())
                    .is_some()
                {
                    return Err(ContractLoadError::DuplicateId(contract.id.clone()));
                }
            }
        }

        for contract in by_id.values() {
            for dep in &contract.depends_on {
                if dep == &contract.id {
                    return Err(ContractLoadError::SelfDependency(contract.id.clone()));
                }
                if !by_id.contains_key(dep) {
                    return Err(ContractLoadError::UnknownDependency {
                        id: contract.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut order: Vec<String> = by_id.keys().cloned().collect();
        order.sort_by(|a, b| {
            let oa = by_id[a].ordinal;
            let ob = by_id[b].ordinal;
            oa.cmp(&ob).then_with(|| a.cmp(b))
        });

        Ok(Self { by_id, order })
    }

    /// Load a contract document from disk (deployment override of the
    /// built-in set).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ContractLoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ContractLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Look up a contract by stage id.
    pub fn get(&self, stage_id: &str) -> Option<&Contract> {
        self.by_id.get(stage_id)
    }

    /// All contracts in default plan order (ordinal ascending, ties by id).
    pub fn all_in_order(&self) -> Vec<&Contract> {
        self.order.iter().map(|id| &self.by_id[id]).collect()
    }

    /// Number of declared stages.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when the document declared no stages.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
