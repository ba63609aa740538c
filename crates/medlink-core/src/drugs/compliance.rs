//! Regulatory tables: banned fixed-dose combinations and Schedule H1.

use serde_json::Value;

use super::interactions::components;
use crate::models::{ComplianceVerdict, DrugEntity};

struct BannedEntry {
    /// All keywords must appear in the name.
    keywords: &'static [&'static str],
    reason: &'static str,
}

const BANNED: &[BannedEntry] = &[
    BannedEntry {
        keywords: &["nimesulide", "paracetamol"],
        reason: "Nimesulide + paracetamol fixed-dose combination is banned by CDSCO.",
    },
    BannedEntry {
        keywords: &["chlorpheniramine", "codeine"],
        reason: "Chlorpheniramine + codeine cough syrup combination is banned by CDSCO.",
    },
    BannedEntry {
        keywords: &["aceclofenac", "paracetamol", "rabeprazole"],
        reason: "Aceclofenac + paracetamol + rabeprazole combination is banned by CDSCO.",
    },
    BannedEntry {
        keywords: &["cetirizine", "phenylephrine", "paracetamol", "caffeine"],
        reason: "Cold-and-flu combination with caffeine is a banned fixed-dose combination.",
    },
    BannedEntry {
        keywords: &["phenylpropanolamine"],
        reason: "Phenylpropanolamine is prohibited for human use in India.",
    },
    BannedEntry {
        keywords: &["sibutramine"],
        reason: "Sibutramine is prohibited for human use in India.",
    },
    BannedEntry {
        keywords: &["cisapride"],
        reason: "Cisapride is prohibited for human use in India.",
    },
    BannedEntry {
        keywords: &["gatifloxacin"],
        reason: "Systemic gatifloxacin is prohibited for human use in India.",
    },
    BannedEntry {
        keywords: &["rosiglitazone"],
        reason: "Rosiglitazone is prohibited for human use in India.",
    },
    BannedEntry {
        keywords: &["dextropropoxyphene"],
        reason: "Dextropropoxyphene is prohibited for human use in India.",
    },
];

/// Schedule H1 generics.
const SCHEDULE_H1: &[&str] = &[
    "alprazolam",
    "buprenorphine",
    "cefdinir",
    "cefepime",
    "cefixime",
    "cefoperazone",
    "cefotaxime",
    "cefpodoxime",
    "ceftazidime",
    "ceftriaxone",
    "chlordiazepoxide",
    "clonazepam",
    "codeine",
    "diazepam",
    "ertapenem",
    "ethambutol",
    "isoniazid",
    "levofloxacin",
    "linezolid",
    "meropenem",
    "midazolam",
    "moxifloxacin",
    "nitrazepam",
    "pentazocine",
    "pyrazinamide",
    "rifampicin",
    "tramadol",
    "zolpidem",
];

/// Static banned and restricted lookups.
#[derive(Default)]
pub struct ComplianceTable;

impl ComplianceTable {
    pub fn new() -> Self {
        Self
    }

    fn banned_reason(&self, entity: &DrugEntity) -> Option<&'static str> {
        let surface = entity.surface.to_lowercase();
        BANNED
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .all(|kw| entity.generic.contains(kw) || surface.contains(kw))
            })
            .map(|entry| entry.reason)
    }

    fn restricted_component<'a>(&self, entity: &'a DrugEntity) -> Option<&'a str> {
        components(&entity.generic).find(|c| SCHEDULE_H1.contains(c))
    }

    /// Verdict from the local tables, or `None` when they are silent.
    pub fn check(&self, entity: &DrugEntity) -> Option<ComplianceVerdict> {
        if let Some(reason) = self.banned_reason(entity) {
            return Some(ComplianceVerdict {
                is_banned: true,
                is_restricted: self.restricted_component(entity).is_some(),
                reason: reason.to_string(),
                verified: true,
            });
        }
        self.restricted_component(entity).map(|component| ComplianceVerdict {
            is_banned: false,
            is_restricted: true,
            reason: format!(
                "{component} is a Schedule H1 drug: dispense only against a prescription and record it in the H1 register."
            ),
            verified: true,
        })
    }

    /// Apply the local tables over a verdict from any other source. A
    /// locally banned drug is always reported banned.
    pub fn overlay(&self, entity: &DrugEntity, verdict: ComplianceVerdict) -> ComplianceVerdict {
        match self.check(entity) {
            Some(local) if local.is_banned => local,
            Some(local) => ComplianceVerdict {
                is_banned: verdict.is_banned,
                is_restricted: true,
                reason: if verdict.is_banned { verdict.reason } else { local.reason },
                verified: verdict.verified || local.verified,
            },
            None => verdict,
        }
    }
}

/// Parse a verdict from workflow or model output. Requires an `is_banned`
/// flag; `is_h1` is accepted for `is_restricted`.
pub fn verdict_from_value(value: &Value, verified: bool) -> Option<ComplianceVerdict> {
    let is_banned = flag(&value["is_banned"]).or_else(|| flag(&value["banned"]))?;
    let is_restricted = flag(&value["is_restricted"])
        .or_else(|| flag(&value["is_h1"]))
        .unwrap_or(false);
    let reason = value["reason"]
        .as_str()
        .or_else(|| value["warning_level"].as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_reason(is_banned, is_restricted));
    Some(ComplianceVerdict {
        is_banned,
        is_restricted,
        reason,
        verified,
    })
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn default_reason(is_banned: bool, is_restricted: bool) -> String {
    match (is_banned, is_restricted) {
        (true, _) => "Listed as banned. Do not dispense.".to_string(),
        (false, true) => "Restricted (Schedule H1). Prescription required.".to_string(),
        (false, false) => "No regulatory restriction reported.".to_string(),
    }
}
