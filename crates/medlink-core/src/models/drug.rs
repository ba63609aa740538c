//! Drug-safety models: resolved names, interaction findings, compliance
//! verdicts and substitutes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a surface name was mapped to its generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Exact hit in the local alias table.
    AliasTable,
    /// Typo-tolerant hit in the local alias table.
    FuzzyAlias,
    /// External nomenclature service.
    ReferenceService,
    /// No mapping; the cleaned surface name is used as-is.
    Unresolved,
}

/// A drug name as typed together with its canonical generic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugEntity {
    pub surface: String,
    /// Lowercase canonical generic name.
    pub generic: String,
    /// Known local brands for the generic.
    pub aliases: Vec<String>,
    pub resolution: ResolutionSource,
}

impl DrugEntity {
    pub fn is_resolved(&self) -> bool {
        self.resolution != ResolutionSource::Unresolved
    }
}

/// Interaction severity, ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Severe,
}

impl Severity {
    /// Lenient parse of model and workflow labels.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "minor" | "mild" | "low" => Some(Severity::Minor),
            "moderate" | "medium" => Some(Severity::Moderate),
            "major" | "high" | "serious" => Some(Severity::Major),
            "severe" | "critical" | "contraindicated" => Some(Severity::Severe),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Minor => "Minor",
            Severity::Moderate => "Moderate",
            Severity::Major => "Major",
            Severity::Severe => "Severe",
        };
        f.write_str(label)
    }
}

/// Unordered drug pair, stored alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}", self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionFinding {
    pub pair: PairKey,
    pub severity: Severity,
    pub description: String,
    pub recommendation: Option<String>,
}

/// Findings for a set of drugs. `verified` is false when the result could not
/// be confirmed by any checking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub findings: Vec<InteractionFinding>,
    pub verified: bool,
}

impl InteractionReport {
    pub fn unverified() -> Self {
        Self {
            findings: Vec::new(),
            verified: false,
        }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Regulatory status of a drug or combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub is_banned: bool,
    /// Schedule H1 restricted-sale drug.
    pub is_restricted: bool,
    pub reason: String,
    pub verified: bool,
}

impl ComplianceVerdict {
    pub const UNKNOWN_REASON: &'static str =
        "Regulatory status unknown. Verify manually before dispensing.";

    /// Conservative verdict used whenever nothing could be confirmed.
    pub fn unknown() -> Self {
        Self {
            is_banned: false,
            is_restricted: false,
            reason: Self::UNKNOWN_REASON.to_string(),
            verified: false,
        }
    }
}

impl Default for ComplianceVerdict {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A stocked item that could replace the reference item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstituteCandidate {
    pub name: String,
    pub generic: String,
    pub price: f64,
    pub margin_pct: f64,
    /// Absolute profit per unit.
    pub profit: f64,
    /// Customer saving relative to the reference price.
    pub savings: f64,
}

/// Price and substitute information for one drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReport {
    pub drug: String,
    pub generic: Option<String>,
    pub average_price: Option<f64>,
    pub substitutes: Vec<SubstituteCandidate>,
    pub notes: Option<String>,
}
