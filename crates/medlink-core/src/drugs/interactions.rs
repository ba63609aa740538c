//! Interaction rules: duplicate therapy, the local known-interaction table,
//! and de-duplication of findings from any source.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{DrugEntity, InteractionFinding, PairKey, Severity};

/// Components of a combination generic ("ibuprofen + paracetamol").
pub fn components(generic: &str) -> impl Iterator<Item = &str> {
    generic
        .split(['+', '/', ','])
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

/// Every unordered pair whose canonical names are equal or nested is a
/// Major duplicate-therapy finding.
pub fn duplicate_therapy(entities: &[DrugEntity]) -> Vec<InteractionFinding> {
    let mut findings = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            if a.generic.is_empty() || b.generic.is_empty() {
                continue;
            }
            let nested = a.generic == b.generic
                || a.generic.contains(b.generic.as_str())
                || b.generic.contains(a.generic.as_str());
            if !nested {
                continue;
            }
            let shared = if a.generic.len() <= b.generic.len() { &a.generic } else { &b.generic };
            findings.push(InteractionFinding {
                pair: PairKey::new(&a.generic, &b.generic),
                severity: Severity::Major,
                description: format!(
                    "Duplicate therapy: {} and {} both contain {}.",
                    a.surface, b.surface, shared
                ),
                recommendation: Some("Dispense only one of these products.".to_string()),
            });
        }
    }
    dedup_findings(findings)
}

/// Keep the highest severity per pair, drop Minor, most severe first.
pub fn dedup_findings(findings: Vec<InteractionFinding>) -> Vec<InteractionFinding> {
    let mut best: HashMap<PairKey, InteractionFinding> = HashMap::new();
    for finding in findings {
        if finding.severity < Severity::Moderate {
            continue;
        }
        match best.get(&finding.pair) {
            Some(existing) if existing.severity >= finding.severity => {}
            _ => {
                best.insert(finding.pair.clone(), finding);
            }
        }
    }
    let mut out: Vec<InteractionFinding> = best.into_values().collect();
    out.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.pair.cmp(&b.pair)));
    out
}

/// Parse findings from workflow or model output.
///
/// Accepts `{"interactions": [...]}` or a bare array. Each entry names its
/// pair as `drugs: [a, b]`, `drug1`/`drug2`, or `pair: "a + b"`. Entries
/// without a pair or a recognised severity are skipped. `canon` maps each
/// name to its canonical generic.
pub fn findings_from_value(value: &Value, canon: impl Fn(&str) -> String) -> Vec<InteractionFinding> {
    let entries = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("interactions") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| {
            let (a, b) = pair_names(entry)?;
            let severity = entry["severity"].as_str().and_then(Severity::parse)?;
            let description = entry["description"]
                .as_str()
                .or_else(|| entry["effect"].as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            let recommendation = entry["recommendation"]
                .as_str()
                .or_else(|| entry["management"].as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            Some(InteractionFinding {
                pair: PairKey::new(&canon(&a), &canon(&b)),
                severity,
                description,
                recommendation,
            })
        })
        .collect()
}

fn pair_names(entry: &Value) -> Option<(String, String)> {
    if let Some(drugs) = entry["drugs"].as_array() {
        let a = drugs.first()?.as_str()?;
        let b = drugs.get(1)?.as_str()?;
        return Some((a.to_string(), b.to_string()));
    }
    if let (Some(a), Some(b)) = (entry["drug1"].as_str(), entry["drug2"].as_str()) {
        return Some((a.to_string(), b.to_string()));
    }
    let pair = entry["pair"].as_str()?;
    let (a, b) = pair.split_once('+')?;
    Some((a.trim().to_string(), b.trim().to_string()))
}

// =========================================================================
// Known-interaction table
// =========================================================================

struct KnownEntry {
    severity: Severity,
    description: &'static str,
    recommendation: &'static str,
}

/// Curated, high-confidence interactions between generics.
pub struct KnownInteractions {
    table: HashMap<PairKey, KnownEntry>,
}

impl Default for KnownInteractions {
    fn default() -> Self {
        Self::new()
    }
}

impl KnownInteractions {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        let mut add = |a: &str, b: &str, severity, description, recommendation| {
            table.insert(
                PairKey::new(a, b),
                KnownEntry { severity, description, recommendation },
            );
        };

        add(
            "aspirin",
            "warfarin",
            Severity::Severe,
            "Aspirin adds antiplatelet effect to warfarin anticoagulation; high risk of serious bleeding.",
            "Avoid concurrent use unless directed by a physician.",
        );
        add(
            "ibuprofen",
            "warfarin",
            Severity::Major,
            "NSAIDs increase bleeding risk and can raise INR with warfarin.",
            "Prefer paracetamol for pain; monitor INR if unavoidable.",
        );
        add(
            "diclofenac",
            "warfarin",
            Severity::Major,
            "NSAIDs increase bleeding risk with warfarin.",
            "Prefer paracetamol for pain; monitor INR if unavoidable.",
        );
        add(
            "clopidogrel",
            "omeprazole",
            Severity::Moderate,
            "Omeprazole reduces activation of clopidogrel and may lower its antiplatelet effect.",
            "Consider pantoprazole instead of omeprazole.",
        );
        add(
            "nitroglycerin",
            "sildenafil",
            Severity::Severe,
            "Combined vasodilation can cause profound hypotension.",
            "Contraindicated. Do not dispense together.",
        );
        add(
            "isosorbide dinitrate",
            "sildenafil",
            Severity::Severe,
            "Combined vasodilation can cause profound hypotension.",
            "Contraindicated. Do not dispense together.",
        );
        add(
            "atorvastatin",
            "clarithromycin",
            Severity::Major,
            "Clarithromycin raises atorvastatin levels; risk of myopathy and rhabdomyolysis.",
            "Suspend the statin during the antibiotic course or choose azithromycin.",
        );
        add(
            "sertraline",
            "tramadol",
            Severity::Major,
            "Risk of serotonin syndrome and lowered seizure threshold.",
            "Avoid the combination or monitor closely.",
        );
        add(
            "ciprofloxacin",
            "theophylline",
            Severity::Major,
            "Ciprofloxacin raises theophylline levels; risk of seizures and arrhythmia.",
            "Reduce theophylline dose or choose another antibiotic.",
        );
        add(
            "alprazolam",
            "tramadol",
            Severity::Major,
            "Additive CNS and respiratory depression.",
            "Avoid the combination unless prescribed together.",
        );
        add(
            "metformin",
            "furosemide",
            Severity::Moderate,
            "Furosemide can raise metformin levels; monitor blood glucose and renal function.",
            "Monitor glucose.",
        );

        Self { table }
    }

    pub fn lookup(&self, a: &str, b: &str) -> Option<InteractionFinding> {
        let pair = PairKey::new(a, b);
        self.table.get(&pair).map(|entry| InteractionFinding {
            pair,
            severity: entry.severity,
            description: entry.description.to_string(),
            recommendation: Some(entry.recommendation.to_string()),
        })
    }

    /// Known findings across all entity pairs, checking each component of
    /// combination generics. Findings are keyed by the entities' generics.
    pub fn findings_for(&self, entities: &[DrugEntity]) -> Vec<InteractionFinding> {
        let mut findings = Vec::new();
        for (i, a) in entities.iter().enumerate() {
            for b in &entities[i + 1..] {
                for ca in components(&a.generic) {
                    for cb in components(&b.generic) {
                        if let Some(mut finding) = self.lookup(ca, cb) {
                            finding.pair = PairKey::new(&a.generic, &b.generic);
                            findings.push(finding);
                        }
                    }
                }
            }
        }
        dedup_findings(findings)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
