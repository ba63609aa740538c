//! Brand → generic alias table.
//!
//! Handles:
//! - Strength and dosage-form suffixes ("Dolo 650", "Pan 40 tablet")
//! - Regional brand expansion (dolo → paracetamol, ecosprin → aspirin)
//! - Typo-tolerant matching (jaro-winkler over the known names)

use std::collections::{BTreeSet, HashMap};

use strsim::jaro_winkler;

use crate::models::ResolutionSource;

/// Minimum jaro-winkler similarity for a fuzzy alias hit.
const FUZZY_THRESHOLD: f64 = 0.92;

/// Names shorter than this are never fuzzy-matched.
const FUZZY_MIN_LEN: usize = 4;

/// Dosage-form and packaging words dropped during cleaning.
const FORM_WORDS: &[&str] = &[
    "tab", "tabs", "tablet", "tablets", "cap", "caps", "capsule", "capsules", "syrup", "syp",
    "susp", "suspension", "inj", "injection", "drops", "cream", "gel", "ointment", "mg", "mcg",
    "ml", "gm", "g", "iu", "strip", "strips",
];

/// Alias table for Indian retail brands.
pub struct AliasTable {
    /// Brand (lowercase) → generic (lowercase)
    aliases: HashMap<String, String>,
    /// Every known generic maps to itself.
    generics: BTreeSet<String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasTable {
    pub fn new() -> Self {
        let aliases = Self::default_aliases();
        let generics = aliases.values().cloned().collect();
        Self { aliases, generics }
    }

    /// Map a surface name to its generic, if the table knows it.
    pub fn lookup(&self, surface: &str) -> Option<(String, ResolutionSource)> {
        let cleaned = clean_drug_name(surface);
        if cleaned.is_empty() {
            return None;
        }

        if let Some(generic) = self.exact(&cleaned) {
            return Some((generic, ResolutionSource::AliasTable));
        }

        // Multi-word brands: try the leading word ("crocin advance" → crocin).
        if let Some(first) = cleaned.split_whitespace().next() {
            if first != cleaned {
                if let Some(generic) = self.exact(first) {
                    return Some((generic, ResolutionSource::AliasTable));
                }
            }
        }

        self.fuzzy(&cleaned)
            .map(|generic| (generic, ResolutionSource::FuzzyAlias))
    }

    /// Known brands for a generic, sorted.
    pub fn brands_for(&self, generic: &str) -> Vec<String> {
        let generic = generic.to_lowercase();
        let mut brands: Vec<String> = self
            .aliases
            .iter()
            .filter(|(brand, g)| **g == generic && **brand != generic)
            .map(|(brand, _)| brand.clone())
            .collect();
        brands.sort();
        brands
    }

    pub fn is_known_generic(&self, name: &str) -> bool {
        self.generics.contains(&name.to_lowercase())
    }

    /// Add a custom alias mapping.
    pub fn add_alias(&mut self, alias: &str, generic: &str) {
        let generic = generic.trim().to_lowercase();
        self.generics.insert(generic.clone());
        self.aliases.insert(clean_drug_name(alias), generic);
    }

    fn exact(&self, cleaned: &str) -> Option<String> {
        if let Some(generic) = self.aliases.get(cleaned) {
            return Some(generic.clone());
        }
        self.generics.get(cleaned).cloned()
    }

    fn fuzzy(&self, cleaned: &str) -> Option<String> {
        if cleaned.chars().count() < FUZZY_MIN_LEN {
            return None;
        }
        let mut best: Option<(f64, &str)> = None;
        let candidates = self
            .aliases
            .iter()
            .map(|(brand, generic)| (brand.as_str(), generic.as_str()))
            .chain(self.generics.iter().map(|g| (g.as_str(), g.as_str())));

        for (known, generic) in candidates {
            if known.chars().count() < FUZZY_MIN_LEN {
                continue;
            }
            let score = jaro_winkler(cleaned, known);
            let better = match best {
                None => true,
                Some((s, g)) => score > s || (score == s && generic < g),
            };
            if score >= FUZZY_THRESHOLD && better {
                best = Some((score, generic));
            }
        }
        best.map(|(_, generic)| generic.to_string())
    }

    /// Default brand mappings.
    fn default_aliases() -> HashMap<String, String> {
        let mut map = HashMap::new();

        // Analgesics / antipyretics
        map.insert("dolo".into(), "paracetamol".into());
        map.insert("crocin".into(), "paracetamol".into());
        map.insert("calpol".into(), "paracetamol".into());
        map.insert("pacimol".into(), "paracetamol".into());
        map.insert("p-500".into(), "paracetamol".into());
        map.insert("tylenol".into(), "paracetamol".into());
        map.insert("acetaminophen".into(), "paracetamol".into());
        map.insert("combiflam".into(), "ibuprofen + paracetamol".into());
        map.insert("brufen".into(), "ibuprofen".into());
        map.insert("ibugesic".into(), "ibuprofen".into());
        map.insert("voveran".into(), "diclofenac".into());
        map.insert("nise".into(), "nimesulide".into());
        map.insert("zerodol".into(), "aceclofenac".into());
        map.insert("ultracet".into(), "tramadol + paracetamol".into());

        // Antiplatelets / anticoagulants
        map.insert("ecosprin".into(), "aspirin".into());
        map.insert("disprin".into(), "aspirin".into());
        map.insert("loprin".into(), "aspirin".into());
        map.insert("clopilet".into(), "clopidogrel".into());
        map.insert("plavix".into(), "clopidogrel".into());
        map.insert("warf".into(), "warfarin".into());
        map.insert("coumadin".into(), "warfarin".into());
        map.insert("acitrom".into(), "acenocoumarol".into());

        // Antibiotics
        map.insert("azithral".into(), "azithromycin".into());
        map.insert("azee".into(), "azithromycin".into());
        map.insert("zithromax".into(), "azithromycin".into());
        map.insert("augmentin".into(), "amoxicillin + clavulanic acid".into());
        map.insert("moxikind-cv".into(), "amoxicillin + clavulanic acid".into());
        map.insert("mox".into(), "amoxicillin".into());
        map.insert("novamox".into(), "amoxicillin".into());
        map.insert("ciplox".into(), "ciprofloxacin".into());
        map.insert("cifran".into(), "ciprofloxacin".into());
        map.insert("taxim-o".into(), "cefixime".into());
        map.insert("zifi".into(), "cefixime".into());
        map.insert("levoflox".into(), "levofloxacin".into());
        map.insert("claribid".into(), "clarithromycin".into());
        map.insert("flagyl".into(), "metronidazole".into());
        map.insert("metrogyl".into(), "metronidazole".into());

        // GI
        map.insert("pan".into(), "pantoprazole".into());
        map.insert("pantocid".into(), "pantoprazole".into());
        map.insert("omez".into(), "omeprazole".into());
        map.insert("rantac".into(), "ranitidine".into());
        map.insert("razo".into(), "rabeprazole".into());
        map.insert("emeset".into(), "ondansetron".into());
        map.insert("ondem".into(), "ondansetron".into());
        map.insert("digene".into(), "antacid".into());

        // Cardio-metabolic
        map.insert("glycomet".into(), "metformin".into());
        map.insert("glucophage".into(), "metformin".into());
        map.insert("amaryl".into(), "glimepiride".into());
        map.insert("januvia".into(), "sitagliptin".into());
        map.insert("telma".into(), "telmisartan".into());
        map.insert("amlong".into(), "amlodipine".into());
        map.insert("stamlo".into(), "amlodipine".into());
        map.insert("atorva".into(), "atorvastatin".into());
        map.insert("lipitor".into(), "atorvastatin".into());
        map.insert("rosuvas".into(), "rosuvastatin".into());
        map.insert("concor".into(), "bisoprolol".into());
        map.insert("lasix".into(), "furosemide".into());
        map.insert("sorbitrate".into(), "isosorbide dinitrate".into());
        map.insert("thyronorm".into(), "levothyroxine".into());
        map.insert("eltroxin".into(), "levothyroxine".into());

        // Respiratory / allergy
        map.insert("allegra".into(), "fexofenadine".into());
        map.insert("cetzine".into(), "cetirizine".into());
        map.insert("okacet".into(), "cetirizine".into());
        map.insert("montair".into(), "montelukast".into());
        map.insert("asthalin".into(), "salbutamol".into());
        map.insert("deriphyllin".into(), "theophylline".into());
        map.insert("corex".into(), "chlorpheniramine + codeine".into());

        // CNS
        map.insert("alprax".into(), "alprazolam".into());
        map.insert("restyl".into(), "alprazolam".into());
        map.insert("clonotril".into(), "clonazepam".into());
        map.insert("zolfresh".into(), "zolpidem".into());
        map.insert("ultram".into(), "tramadol".into());
        map.insert("contramal".into(), "tramadol".into());
        map.insert("serta".into(), "sertraline".into());
        map.insert("nexito".into(), "escitalopram".into());

        // Urology / misc
        map.insert("manforce".into(), "sildenafil".into());
        map.insert("viagra".into(), "sildenafil".into());
        map.insert("shelcal".into(), "calcium + vitamin d3".into());
        map.insert("becosules".into(), "vitamin b complex".into());

        map
    }
}

/// Lowercase, drop punctuation (except hyphen and '+'), strength tokens and
/// dosage-form words.
pub fn clean_drug_name(surface: &str) -> String {
    let lowered: String = surface
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '+' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    lowered
        .split_whitespace()
        .filter(|token| !is_strength_token(token) && !FORM_WORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// "650", "500mg", "2.5ml", "10%".
fn is_strength_token(token: &str) -> bool {
    let digits_end = token
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    if digits_end == 0 {
        return false;
    }
    let unit = &token[digits_end..];
    unit.is_empty() || matches!(unit, "mg" | "mcg" | "g" | "gm" | "ml" | "iu" | "%" | "k")
}
