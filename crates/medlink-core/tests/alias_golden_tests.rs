//! Golden tests for brand → generic resolution.
//!
//! These tests verify canonicalization against known Indian retail names.

use medlink_core::drugs::{clean_drug_name, DrugEngine};
use medlink_core::models::ResolutionSource;

/// Test case from golden file.
struct GoldenCase {
    id: &'static str,
    surface: &'static str,
    expected_generic: &'static str,
    expected_source: ResolutionSource,
}

fn get_golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "dolo-strength",
            surface: "Dolo 650",
            expected_generic: "paracetamol",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "generic-with-mg",
            surface: "Paracetamol 500mg",
            expected_generic: "paracetamol",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "pan-tablet",
            surface: "Pan 40 Tablet",
            expected_generic: "pantoprazole",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "ecosprin-caps",
            surface: "ECOSPRIN 75",
            expected_generic: "aspirin",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "combination-brand",
            surface: "Combiflam",
            expected_generic: "ibuprofen + paracetamol",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "multi-word-brand",
            surface: "Augmentin 625 Duo",
            expected_generic: "amoxicillin + clavulanic acid",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "hyphenated-brand",
            surface: "Taxim-O 200",
            expected_generic: "cefixime",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "inhaler-form",
            surface: "Asthalin inhaler",
            expected_generic: "salbutamol",
            expected_source: ResolutionSource::AliasTable,
        },
        GoldenCase {
            id: "typo-azithral",
            surface: "Azithrall 500",
            expected_generic: "azithromycin",
            expected_source: ResolutionSource::FuzzyAlias,
        },
        GoldenCase {
            id: "typo-crocin",
            surface: "crocine",
            expected_generic: "paracetamol",
            expected_source: ResolutionSource::FuzzyAlias,
        },
        GoldenCase {
            id: "unknown-brand",
            surface: "Zyxorin 10",
            expected_generic: "zyxorin",
            expected_source: ResolutionSource::Unresolved,
        },
    ]
}

#[test]
fn test_golden_cases() {
    let engine = DrugEngine::new();

    for case in get_golden_cases() {
        let entity = engine
            .canonicalize(case.surface)
            .unwrap_or_else(|e| panic!("Case {}: {}", case.id, e));

        assert_eq!(
            entity.generic, case.expected_generic,
            "Case {}: generic mismatch", case.id
        );
        assert_eq!(
            entity.resolution, case.expected_source,
            "Case {}: source mismatch", case.id
        );
        assert_eq!(entity.surface, case.surface.trim(), "Case {}: surface not kept", case.id);
    }
}

#[test]
fn test_canonicalization_is_idempotent() {
    let engine = DrugEngine::new();

    for case in get_golden_cases() {
        let once = engine.canonicalize(case.surface).unwrap();
        let twice = engine.canonicalize(&once.generic).unwrap();
        assert_eq!(
            once.generic, twice.generic,
            "Case {}: canonicalizing the generic changed it", case.id
        );
    }
}

#[test]
fn test_brands_listed_for_generic() {
    let engine = DrugEngine::new();
    let entity = engine.canonicalize("Crocin Advance").unwrap();
    assert_eq!(entity.generic, "paracetamol");
    assert!(entity.aliases.iter().any(|a| a == "dolo"));
    assert!(entity.aliases.iter().any(|a| a == "crocin"));
}

#[test]
fn test_strength_only_is_unresolvable() {
    let engine = DrugEngine::new();
    assert!(engine.canonicalize("650 mg").is_err());
    assert!(engine.canonicalize("   ").is_err());
}

#[test]
fn test_cleaning_table() {
    let cleaning_tests = vec![
        ("Dolo 650", "dolo"),
        ("Pan-D Capsule", "pan-d"),
        ("Shelcal 500", "shelcal"),
        ("Azee 250mg Syrup", "azee"),
        ("Vitamin D3 60k", "vitamin d3"),
        ("Combiflam (Tab)", "combiflam"),
    ];

    for (surface, expected) in cleaning_tests {
        let result = clean_drug_name(surface);
        assert_eq!(
            result, expected,
            "{} should clean to {}, got {}",
            surface, expected, result
        );
    }
}
