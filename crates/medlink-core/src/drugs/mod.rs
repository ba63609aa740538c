//! Drug normalization and safety engine.
//!
//! Pipeline: surface name → alias table → reference service → cleaned
//! surface. Resolved entities feed the duplicate-therapy, interaction and
//! compliance rules.

mod aliases;
mod compliance;
mod interactions;
mod reference;
mod substitutes;

pub use aliases::*;
pub use compliance::*;
pub use interactions::*;
pub use reference::*;
pub use substitutes::*;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ComplianceVerdict, DrugEntity, InteractionFinding, ResolutionSource};

/// Drug engine errors.
#[derive(Error, Debug)]
pub enum DrugError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reference service returned status {0}")]
    Upstream(u16),

    #[error("Could not resolve drug name: {0:?}")]
    Unresolved(String),
}

pub type DrugResult<T> = Result<T, DrugError>;

/// Local tables plus an optional nomenclature service.
pub struct DrugEngine {
    aliases: AliasTable,
    known: KnownInteractions,
    compliance: ComplianceTable,
    reference: Option<Arc<dyn DrugReference>>,
    /// Generics learned from the reference service.
    learned: Mutex<HashSet<String>>,
}

impl Default for DrugEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrugEngine {
    /// Engine with local tables only.
    pub fn new() -> Self {
        Self {
            aliases: AliasTable::new(),
            known: KnownInteractions::new(),
            compliance: ComplianceTable::new(),
            reference: None,
            learned: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_reference(mut self, reference: Arc<dyn DrugReference>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    /// Local-only canonicalization. Unknown names resolve to their cleaned,
    /// lowercased surface.
    pub fn canonicalize(&self, surface: &str) -> DrugResult<DrugEntity> {
        let cleaned = clean_drug_name(surface);
        if cleaned.is_empty() || !cleaned.chars().any(char::is_alphabetic) {
            return Err(DrugError::Unresolved(surface.trim().to_string()));
        }

        if let Some((generic, resolution)) = self.aliases.lookup(&cleaned) {
            return Ok(self.entity(surface, generic, resolution));
        }
        if self.is_learned(&cleaned) {
            return Ok(self.entity(surface, cleaned, ResolutionSource::ReferenceService));
        }
        Ok(self.entity(surface, cleaned, ResolutionSource::Unresolved))
    }

    /// Canonicalize, consulting the reference service for names the local
    /// tables do not know. Reference failures degrade to the cleaned surface.
    pub async fn resolve(&self, surface: &str) -> DrugResult<DrugEntity> {
        let local = self.canonicalize(surface)?;
        if local.is_resolved() {
            return Ok(local);
        }
        let Some(reference) = &self.reference else {
            return Ok(local);
        };

        match reference.generic_name(&local.generic).await {
            Ok(Some(name)) => {
                // Re-run the reference answer through the local tables so a
                // second resolve of the generic is stable.
                let generic = match self.canonicalize(&name) {
                    Ok(entity) if entity.is_resolved() => entity.generic,
                    Ok(entity) => {
                        self.learn(&entity.generic);
                        entity.generic
                    }
                    Err(_) => return Ok(local),
                };
                debug!(surface, %generic, "resolved via reference service");
                Ok(self.entity(surface, generic, ResolutionSource::ReferenceService))
            }
            Ok(None) => Ok(local),
            Err(e) => {
                warn!(surface, error = %e, "reference lookup failed");
                Ok(local)
            }
        }
    }

    /// Resolve every name; unresolvable names are skipped.
    pub async fn resolve_all(&self, names: &[String]) -> Vec<DrugEntity> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.resolve(name).await {
                Ok(entity) => out.push(entity),
                Err(e) => debug!(error = %e, "skipping drug name"),
            }
        }
        out
    }

    pub fn duplicate_therapy(&self, entities: &[DrugEntity]) -> Vec<InteractionFinding> {
        duplicate_therapy(entities)
    }

    pub fn known_interactions(&self, entities: &[DrugEntity]) -> Vec<InteractionFinding> {
        self.known.findings_for(entities)
    }

    /// Findings from workflow or model output, keyed by canonical generics.
    pub fn parse_findings(&self, value: &Value) -> Vec<InteractionFinding> {
        findings_from_value(value, |name| match self.canonicalize(name) {
            Ok(entity) => entity.generic,
            Err(_) => name.trim().to_lowercase(),
        })
    }

    /// Verdict from the static tables alone.
    pub fn local_compliance(&self, entity: &DrugEntity) -> Option<ComplianceVerdict> {
        self.compliance.check(entity)
    }

    pub fn overlay_compliance(&self, entity: &DrugEntity, verdict: ComplianceVerdict) -> ComplianceVerdict {
        self.compliance.overlay(entity, verdict)
    }

    fn entity(&self, surface: &str, generic: String, resolution: ResolutionSource) -> DrugEntity {
        DrugEntity {
            surface: surface.trim().to_string(),
            aliases: self.aliases.brands_for(&generic),
            generic,
            resolution,
        }
    }

    fn is_learned(&self, generic: &str) -> bool {
        self.learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(generic)
    }

    fn learn(&self, generic: &str) {
        self.learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(generic.to_string());
    }
}
